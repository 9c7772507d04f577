//! 测量事件与批次仓储

use async_trait::async_trait;
use chrono::NaiveDate;
use errors::AppResult;

use crate::domain::entities::{Batch, MeasurementEvent};
use crate::domain::value_objects::{BatchId, ContainerId, CycleId};

/// 测量事件仓储（只追加）
#[async_trait]
pub trait MeasurementRepository: Send + Sync {
    async fn append(&self, event: &MeasurementEvent) -> AppResult<()>;

    /// 周期在该容器上的最新一条（即时分选后多个容器可能共用一个周期）
    async fn latest_for_container(
        &self,
        container_id: &ContainerId,
        cycle_id: &CycleId,
    ) -> AppResult<Option<MeasurementEvent>>;

    /// 容器最新的一条，不限周期
    async fn last_for_container(
        &self,
        container_id: &ContainerId,
    ) -> AppResult<Option<MeasurementEvent>>;

    /// 按日期降序
    async fn list_for_cycle(&self, cycle_id: &CycleId) -> AppResult<Vec<MeasurementEvent>>;

    /// 容器是否存在晚于该日期的事件
    async fn exists_after(&self, container_id: &ContainerId, date: NaiveDate) -> AppResult<bool>;
}

/// 批次仓储
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn insert(&self, batch: &Batch) -> AppResult<()>;

    async fn find_by_id(&self, id: &BatchId) -> AppResult<Option<Batch>>;
}
