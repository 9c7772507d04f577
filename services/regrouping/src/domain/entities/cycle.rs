//! 生产周期实体

use chrono::NaiveDate;
use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::domain::enums::CycleState;
use crate::domain::value_objects::{BatchId, ContainerId, CycleId};

/// 生产周期：一个容器中一批动物从启用到关闭的生命周期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    id: CycleId,
    container_id: ContainerId,
    state: CycleState,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    /// 批次锚点
    batch_id: Option<BatchId>,
}

impl Cycle {
    pub fn open(container_id: ContainerId, start_date: NaiveDate, batch_id: Option<BatchId>) -> Self {
        Self {
            id: CycleId::new(),
            container_id,
            state: CycleState::Active,
            start_date,
            end_date: None,
            batch_id,
        }
    }

    pub fn restore(
        id: CycleId,
        container_id: ContainerId,
        state: CycleState,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        batch_id: Option<BatchId>,
    ) -> Self {
        Self {
            id,
            container_id,
            state,
            start_date,
            end_date,
            batch_id,
        }
    }

    pub fn close(&mut self, end_date: NaiveDate) -> AppResult<()> {
        if self.state == CycleState::Closed {
            return Err(AppError::conflict(format!("Cycle {} is already closed", self.id)));
        }
        if end_date < self.start_date {
            return Err(AppError::validation(format!(
                "Cycle {} cannot end on {} before its start {}",
                self.id, end_date, self.start_date
            )));
        }
        self.state = CycleState::Closed;
        self.end_date = Some(end_date);
        Ok(())
    }

    /// 周期随动物转移到另一个容器（即时分选沿用同一周期）
    pub fn move_to(&mut self, container_id: ContainerId) {
        self.container_id = container_id;
    }

    // ========== Getters ==========

    pub fn id(&self) -> &CycleId {
        &self.id
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn batch_id(&self) -> Option<&BatchId> {
        self.batch_id.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state == CycleState::Active
    }
}
