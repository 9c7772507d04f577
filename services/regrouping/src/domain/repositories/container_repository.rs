//! 容器与周期仓储

use async_trait::async_trait;
use errors::AppResult;

use crate::domain::entities::{Container, Cycle};
use crate::domain::value_objects::{ContainerId, CycleId, SlotPosition};

/// 容器仓储
#[async_trait]
pub trait ContainerRepository: Send + Sync {
    async fn insert(&self, container: &Container) -> AppResult<()>;

    async fn update(&self, container: &Container) -> AppResult<()>;

    async fn find_by_id(&self, id: &ContainerId) -> AppResult<Option<Container>>;

    /// 查询并锁定，直到工作单元结束
    async fn find_by_id_for_update(&self, id: &ContainerId) -> AppResult<Option<Container>>;

    async fn find_by_ids(&self, ids: &[ContainerId]) -> AppResult<Vec<Container>>;

    /// 占用该槽位的在养容器
    async fn find_occupant(&self, position: &SlotPosition) -> AppResult<Option<Container>>;

    /// 所有已放置的在养容器
    async fn list_placed_active(&self) -> AppResult<Vec<Container>>;

    /// 空闲容器，按标签排序
    async fn list_available(&self, limit: usize) -> AppResult<Vec<Container>>;
}

/// 周期仓储
#[async_trait]
pub trait CycleRepository: Send + Sync {
    async fn insert(&self, cycle: &Cycle) -> AppResult<()>;

    async fn update(&self, cycle: &Cycle) -> AppResult<()>;

    async fn find_by_id(&self, id: &CycleId) -> AppResult<Option<Cycle>>;

    async fn find_active_by_container(&self, container_id: &ContainerId)
    -> AppResult<Option<Cycle>>;
}
