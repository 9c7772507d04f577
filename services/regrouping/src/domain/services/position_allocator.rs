//! 槽位分配
//!
//! 占用关系由"在养且已放置"的容器推导，不单独存储。预览给出的空位只是建议，
//! `claim` 必须在提交所在的工作单元内重新检查占用。

use std::collections::HashSet;

use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::entities::{Container, RearingUnit};
use crate::domain::unit_of_work::UnitOfWork;
use crate::domain::value_objects::{ContainerId, CycleId, RowLabel, SlotPosition, UnitId};

/// 查询范围
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "unit_id", rename_all = "snake_case")]
pub enum PositionScope {
    All,
    Unit(UnitId),
}

/// 一个空闲槽位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailablePosition {
    pub position: SlotPosition,
    pub unit_name: String,
}

/// 槽位分配器
#[derive(Debug, Clone)]
pub struct PositionAllocator {
    default_rows: Vec<RowLabel>,
}

impl PositionAllocator {
    pub fn new(default_rows: Vec<RowLabel>) -> AppResult<Self> {
        if default_rows.is_empty() {
            return Err(AppError::validation("At least one default row label is required"));
        }
        Ok(Self { default_rows })
    }

    pub fn default_rows(&self) -> &[RowLabel] {
        &self.default_rows
    }

    /// 排序：来源单元优先，其次单元名称、行的固定顺序、槽位号
    pub fn order_available(
        &self,
        units: &[RearingUnit],
        occupied: &HashSet<SlotPosition>,
        origin_unit_id: Option<&UnitId>,
    ) -> Vec<AvailablePosition> {
        let mut ordered: Vec<&RearingUnit> = units.iter().collect();
        ordered.sort_by(|a, b| {
            let a_foreign = Some(a.id()) != origin_unit_id;
            let b_foreign = Some(b.id()) != origin_unit_id;
            a_foreign
                .cmp(&b_foreign)
                .then_with(|| a.name().cmp(b.name()))
                .then_with(|| a.id().cmp(b.id()))
        });

        ordered
            .into_iter()
            .flat_map(|unit| {
                unit.grid(&self.default_rows)
                    .into_iter()
                    .filter(move |position| !occupied.contains(position))
                    .map(move |position| AvailablePosition {
                        position,
                        unit_name: unit.name().to_string(),
                    })
            })
            .collect()
    }

    /// 列出空闲槽位；`exclude_occupied_by` 中的容器所占槽位视为空闲（这些容器即将腾出）
    pub async fn list_available(
        &self,
        uow: &dyn UnitOfWork,
        scope: &PositionScope,
        origin_unit_id: Option<&UnitId>,
        exclude_occupied_by: &[ContainerId],
    ) -> AppResult<Vec<AvailablePosition>> {
        let units = match scope {
            PositionScope::All => uow.units().list(true).await?,
            PositionScope::Unit(unit_id) => {
                let unit = uow
                    .units()
                    .find_by_id(unit_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("rearing unit", unit_id))?;
                vec![unit]
            }
        };

        let occupied: HashSet<SlotPosition> = uow
            .containers()
            .list_placed_active()
            .await?
            .into_iter()
            .filter(|c| !exclude_occupied_by.contains(c.id()))
            .filter_map(|c| c.placement().cloned())
            .collect();

        Ok(self.order_available(&units, &occupied, origin_unit_id))
    }

    /// 校验槽位存在于一个启用的养殖单元中
    pub async fn validate_position(
        &self,
        uow: &dyn UnitOfWork,
        position: &SlotPosition,
    ) -> AppResult<RearingUnit> {
        let unit = uow
            .units()
            .find_by_id(&position.unit_id)
            .await?
            .ok_or_else(|| AppError::not_found("rearing unit", &position.unit_id))?;

        if !unit.is_active() {
            return Err(AppError::validation(format!(
                "Rearing unit {} is not active",
                unit.name()
            )));
        }
        if !unit.contains(position, &self.default_rows) {
            return Err(AppError::validation(format!(
                "Position {}/{} does not exist in rearing unit {} ({} positions)",
                position.row,
                position.slot,
                unit.name(),
                unit.max_positions()
            )));
        }
        Ok(unit)
    }

    /// 占用槽位并激活容器。槽位已被其他容器占用时返回 Conflict。
    pub async fn claim(
        &self,
        uow: &dyn UnitOfWork,
        container: &mut Container,
        position: &SlotPosition,
        cycle_id: CycleId,
    ) -> AppResult<()> {
        self.validate_position(uow, position).await?;

        if let Some(occupant) = uow.containers().find_occupant(position).await? {
            if occupant.id() != container.id() {
                return Err(AppError::conflict(format!(
                    "Position {}/{} is already occupied by container {}",
                    position.row,
                    position.slot,
                    occupant.label()
                )));
            }
        }

        container.activate(cycle_id, Some(position.clone()))?;
        uow.containers().update(container).await?;

        debug!(
            container_id = %container.id(),
            position = %position,
            "Position claimed"
        );
        Ok(())
    }

    /// 释放容器所占槽位
    pub async fn release(&self, uow: &dyn UnitOfWork, container: &mut Container) -> AppResult<()> {
        container.release();
        uow.containers().update(container).await
    }
}
