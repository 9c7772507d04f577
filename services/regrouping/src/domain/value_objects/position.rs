//! 槽位与目标去向

use std::fmt;

use derive_more::Display;
use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use super::UnitId;

/// 行标签（如 "DX" / "SX"）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(try_from = "String", into = "String")]
pub struct RowLabel(String);

impl RowLabel {
    pub fn new(label: impl Into<String>) -> AppResult<Self> {
        let label = label.into().trim().to_string();
        if label.is_empty() {
            return Err(AppError::validation("Row label must not be empty"));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 解析一组行标签
    pub fn parse_all<S: AsRef<str>>(labels: &[S]) -> AppResult<Vec<Self>> {
        labels.iter().map(|l| Self::new(l.as_ref())).collect()
    }
}

impl TryFrom<String> for RowLabel {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RowLabel> for String {
    fn from(value: RowLabel) -> Self {
        value.0
    }
}

/// 养殖单元中的一个物理槽位
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotPosition {
    pub unit_id: UnitId,
    pub row: RowLabel,
    /// 从 1 开始
    pub slot: u32,
}

impl SlotPosition {
    pub fn new(unit_id: UnitId, row: RowLabel, slot: u32) -> Self {
        Self { unit_id, row, slot }
    }
}

impl fmt::Display for SlotPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.unit_id, self.row, self.slot)
    }
}

/// 目标容器的去向
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    /// 售出：开启后立即关闭周期，容器不占位
    Sold,
    /// 放入指定槽位
    Placed(SlotPosition),
}

impl Destination {
    pub fn placed(unit_id: UnitId, row: RowLabel, slot: u32) -> Self {
        Self::Placed(SlotPosition::new(unit_id, row, slot))
    }

    pub fn position(&self) -> Option<&SlotPosition> {
        match self {
            Self::Sold => None,
            Self::Placed(position) => Some(position),
        }
    }

    pub fn is_sold(&self) -> bool {
        matches!(self, Self::Sold)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Sold => "sold",
            Self::Placed(_) => "placed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_label_rejects_blank() {
        assert!(RowLabel::new("  ").is_err());
        assert_eq!(RowLabel::new(" DX ").unwrap().as_str(), "DX");
    }

    #[test]
    fn test_destination_serializes_as_tagged_union() {
        let unit_id = UnitId::new();
        let placed = Destination::placed(unit_id.clone(), RowLabel::new("SX").unwrap(), 3);
        let json = serde_json::to_value(&placed).unwrap();
        assert_eq!(json["type"], "placed");
        assert_eq!(json["row"], "SX");
        assert_eq!(json["slot"], 3);

        let sold = serde_json::to_value(Destination::Sold).unwrap();
        assert_eq!(sold["type"], "sold");
        assert!(Destination::Sold.position().is_none());
    }
}
