//! Unit of Work 模式
//!
//! 一次重组的全部读写都在同一个工作单元中完成，要么全部生效，要么全部撤销。

use async_trait::async_trait;
use errors::AppResult;

use crate::domain::repositories::{
    BatchRepository, ContainerRepository, CycleRepository, LineageRepository,
    MeasurementRepository, RearingUnitRepository, RegroupingRepository, SequenceRepository,
    SizeClassRepository,
};

/// Unit of Work trait
///
/// # 使用示例
///
/// ```ignore
/// let uow = uow_factory.begin().await?;
///
/// uow.cycles().update(&cycle).await?;
/// uow.containers().update(&container).await?;
///
/// uow.commit().await?;
/// ```
///
/// 未提交就被丢弃的工作单元等同于回滚。
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn units(&self) -> &dyn RearingUnitRepository;

    fn containers(&self) -> &dyn ContainerRepository;

    fn cycles(&self) -> &dyn CycleRepository;

    fn measurements(&self) -> &dyn MeasurementRepository;

    fn batches(&self) -> &dyn BatchRepository;

    fn size_classes(&self) -> &dyn SizeClassRepository;

    fn regroupings(&self) -> &dyn RegroupingRepository;

    fn lineage(&self) -> &dyn LineageRepository;

    fn sequences(&self) -> &dyn SequenceRepository;

    /// 提交事务
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// 回滚事务
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Unit of Work 工厂 trait
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// 开始新的事务
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}
