//! 重组事件状态、类型与阶段

use serde::{Deserialize, Serialize};

/// 持久化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegroupingStatus {
    #[default]
    Draft,
    Completed,
    Cancelled,
}

impl RegroupingStatus {
    /// 终态不可再修改
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

text_enum!(RegroupingStatus {
    Draft => "draft",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// 重组类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegroupingKind {
    /// 多步骤流程
    #[default]
    Workflow,
    /// 一次性即时分选
    Instant,
}

text_enum!(RegroupingKind {
    Workflow => "workflow",
    Instant => "instant",
});

/// 由状态和参与者数量推导出的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegroupingPhase {
    Draft,
    /// 已有来源，尚无目标
    Sourcing,
    /// 来源与目标均已登记，待提交
    Destined,
    Completed,
    Cancelled,
}

impl RegroupingPhase {
    pub fn derive(status: RegroupingStatus, sources: usize, destinations: usize) -> Self {
        match status {
            RegroupingStatus::Completed => Self::Completed,
            RegroupingStatus::Cancelled => Self::Cancelled,
            RegroupingStatus::Draft if sources == 0 => Self::Draft,
            RegroupingStatus::Draft if destinations == 0 => Self::Sourcing,
            RegroupingStatus::Draft => Self::Destined,
        }
    }
}

text_enum!(RegroupingPhase {
    Draft => "draft",
    Sourcing => "sourcing",
    Destined => "destined",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_derivation() {
        use RegroupingStatus::*;
        assert_eq!(RegroupingPhase::derive(Draft, 0, 0), RegroupingPhase::Draft);
        assert_eq!(RegroupingPhase::derive(Draft, 0, 2), RegroupingPhase::Draft);
        assert_eq!(RegroupingPhase::derive(Draft, 2, 0), RegroupingPhase::Sourcing);
        assert_eq!(RegroupingPhase::derive(Draft, 2, 1), RegroupingPhase::Destined);
        assert_eq!(RegroupingPhase::derive(Completed, 2, 1), RegroupingPhase::Completed);
        assert_eq!(RegroupingPhase::derive(Cancelled, 0, 0), RegroupingPhase::Cancelled);
    }

    #[test]
    fn test_text_round_trip_for_storage() {
        assert_eq!(
            "cancelled".parse::<RegroupingStatus>().unwrap(),
            RegroupingStatus::Cancelled
        );
        assert!("archived".parse::<RegroupingStatus>().is_err());
        assert_eq!(RegroupingKind::Instant.to_string(), "instant");
    }
}
