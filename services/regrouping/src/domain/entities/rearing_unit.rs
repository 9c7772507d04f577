//! 养殖单元实体

use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{RowLabel, SlotPosition, UnitId};

/// 养殖单元
///
/// 每个单元拥有一个按行排列的槽位网格。行数由行标签决定，
/// 每行槽位数 = ceil(max_positions / 行数)，最后一行可能不满。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RearingUnit {
    id: UnitId,
    name: String,
    /// 槽位总容量
    max_positions: u32,
    active: bool,
    /// 为空时使用全局默认行标签
    row_labels: Vec<RowLabel>,
}

impl RearingUnit {
    pub fn new(name: impl Into<String>, max_positions: u32) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::validation("Rearing unit name must not be empty"));
        }
        Ok(Self {
            id: UnitId::new(),
            name,
            max_positions,
            active: true,
            row_labels: Vec::new(),
        })
    }

    pub fn restore(
        id: UnitId,
        name: String,
        max_positions: u32,
        active: bool,
        row_labels: Vec<RowLabel>,
    ) -> Self {
        Self {
            id,
            name,
            max_positions,
            active,
            row_labels,
        }
    }

    pub fn with_row_labels(mut self, row_labels: Vec<RowLabel>) -> Self {
        self.row_labels = row_labels;
        self
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    // ========== Getters ==========

    pub fn id(&self) -> &UnitId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_positions(&self) -> u32 {
        self.max_positions
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn row_labels(&self) -> &[RowLabel] {
        &self.row_labels
    }

    // ========== 网格 ==========

    /// 实际使用的行标签
    pub fn effective_rows<'a>(&'a self, defaults: &'a [RowLabel]) -> &'a [RowLabel] {
        if self.row_labels.is_empty() {
            defaults
        } else {
            &self.row_labels
        }
    }

    /// 每行槽位数
    pub fn slots_per_row(&self, row_count: usize) -> u32 {
        if row_count == 0 {
            return 0;
        }
        self.max_positions.div_ceil(row_count as u32)
    }

    /// 行 row_index（从 0 开始）中的槽位 slot（从 1 开始）是否存在
    fn slot_exists(&self, row_index: usize, slot: u32, per_row: u32) -> bool {
        slot >= 1 && slot <= per_row && row_index as u32 * per_row + slot <= self.max_positions
    }

    /// 行标签在网格中的顺序
    pub fn row_index(&self, row: &RowLabel, defaults: &[RowLabel]) -> Option<usize> {
        self.effective_rows(defaults).iter().position(|r| r == row)
    }

    /// 完整网格，按行再按槽位排序
    pub fn grid(&self, defaults: &[RowLabel]) -> Vec<SlotPosition> {
        let rows = self.effective_rows(defaults);
        let per_row = self.slots_per_row(rows.len());

        rows.iter()
            .enumerate()
            .flat_map(|(row_index, row)| {
                (1..=per_row)
                    .filter(move |slot| self.slot_exists(row_index, *slot, per_row))
                    .map(move |slot| SlotPosition::new(self.id.clone(), row.clone(), slot))
            })
            .collect()
    }

    /// 槽位是否属于本单元的网格
    pub fn contains(&self, position: &SlotPosition, defaults: &[RowLabel]) -> bool {
        if position.unit_id != self.id {
            return false;
        }
        let rows = self.effective_rows(defaults);
        match rows.iter().position(|r| *r == position.row) {
            Some(row_index) => {
                self.slot_exists(row_index, position.slot, self.slots_per_row(rows.len()))
            }
            None => false,
        }
    }
}
