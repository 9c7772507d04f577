//! 容器实体

use common::AuditInfo;
use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::domain::enums::ContainerState;
use crate::domain::value_objects::{ContainerId, CycleId, SlotPosition};

/// 容器（篮）
///
/// 不变量：只有 `active` 状态的容器可以占用槽位，且最多持有一个当前周期。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    id: ContainerId,
    /// 物理标签
    label: String,
    state: ContainerState,
    placement: Option<SlotPosition>,
    current_cycle_id: Option<CycleId>,
    audit_info: AuditInfo,
}

impl Container {
    pub fn new(label: impl Into<String>) -> AppResult<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(AppError::validation("Container label must not be empty"));
        }
        Ok(Self {
            id: ContainerId::new(),
            label,
            state: ContainerState::Available,
            placement: None,
            current_cycle_id: None,
            audit_info: AuditInfo::default(),
        })
    }

    pub fn restore(
        id: ContainerId,
        label: String,
        state: ContainerState,
        placement: Option<SlotPosition>,
        current_cycle_id: Option<CycleId>,
        audit_info: AuditInfo,
    ) -> Self {
        Self {
            id,
            label,
            state,
            placement,
            current_cycle_id,
            audit_info,
        }
    }

    /// 进入在养状态，可以不放置（如尚未上架）
    pub fn activate(&mut self, cycle_id: CycleId, placement: Option<SlotPosition>) -> AppResult<()> {
        if self.state == ContainerState::Sold {
            return Err(AppError::validation(format!(
                "Container {} is retired and cannot be activated",
                self.label
            )));
        }
        self.state = ContainerState::Active;
        self.current_cycle_id = Some(cycle_id);
        self.placement = placement;
        self.audit_info.touch(None);
        Ok(())
    }

    /// 释放：清除槽位与当前周期，回到空闲
    pub fn release(&mut self) {
        if self.state == ContainerState::Active {
            self.state = ContainerState::Available;
        }
        self.placement = None;
        self.current_cycle_id = None;
        self.audit_info.touch(None);
    }

    /// 永久退出使用
    pub fn retire(&mut self) {
        self.release();
        self.state = ContainerState::Sold;
    }

    // ========== Getters ==========

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn placement(&self) -> Option<&SlotPosition> {
        self.placement.as_ref()
    }

    pub fn current_cycle_id(&self) -> Option<&CycleId> {
        self.current_cycle_id.as_ref()
    }

    pub fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    pub fn is_active(&self) -> bool {
        self.state == ContainerState::Active
    }

    pub fn is_retired(&self) -> bool {
        self.state == ContainerState::Sold
    }

    /// 是否占用某个槽位
    pub fn occupies(&self, position: &SlotPosition) -> bool {
        self.is_active() && self.placement.as_ref() == Some(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{RowLabel, UnitId};

    #[test]
    fn test_activate_then_release() {
        let mut container = Container::new("B-001").unwrap();
        let position = SlotPosition::new(UnitId::new(), RowLabel::new("DX").unwrap(), 1);
        let cycle_id = CycleId::new();

        container.activate(cycle_id.clone(), Some(position.clone())).unwrap();
        assert!(container.occupies(&position));
        assert_eq!(container.current_cycle_id(), Some(&cycle_id));

        container.release();
        assert_eq!(container.state(), ContainerState::Available);
        assert!(container.placement().is_none());
        assert!(container.current_cycle_id().is_none());
        assert!(!container.occupies(&position));
    }

    #[test]
    fn test_retired_container_cannot_be_activated() {
        let mut container = Container::new("B-002").unwrap();
        container.retire();
        assert!(container.activate(CycleId::new(), None).is_err());
    }
}
