//! 内存存储
//!
//! 整个存储位于一把异步互斥锁之后。工作单元在存活期间持有这把锁，
//! 读操作直接共享已提交的状态，第一次写入时才复制出私有副本；
//! 提交时整体替换共享状态，丢弃即回滚。

mod repositories;

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use errors::{AppError, AppResult};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::entities::{
    Batch, BatchReference, Container, Cycle, DestinationParticipant, LedgerEntry, LineageEdge,
    MeasurementEvent, RearingUnit, Regrouping, SizeClass, SourceParticipant,
};
use crate::domain::repositories::{
    BatchRepository, ContainerRepository, CycleRepository, LineageRepository,
    MeasurementRepository, RearingUnitRepository, RegroupingRepository, SequenceRepository,
    SizeClassRepository,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use crate::domain::value_objects::{BatchId, ContainerId, CycleId, RegroupingId, UnitId};

pub use repositories::*;

/// 存储的全部内容
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub units: HashMap<UnitId, RearingUnit>,
    pub containers: HashMap<ContainerId, Container>,
    pub cycles: HashMap<CycleId, Cycle>,
    pub measurements: Vec<MeasurementEvent>,
    pub batches: HashMap<BatchId, Batch>,
    pub size_classes: Vec<SizeClass>,
    pub regroupings: HashMap<RegroupingId, Regrouping>,
    pub sources: Vec<SourceParticipant>,
    pub destinations: Vec<DestinationParticipant>,
    pub edges: Vec<LineageEdge>,
    pub batch_references: Vec<BatchReference>,
    pub ledger: Vec<LedgerEntry>,
    pub sequences: HashMap<String, i64>,
}

/// 工作单元看到的状态（写时复制）
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkingState(Arc<StoreState>);

impl WorkingState {
    /// 是否仍与已提交状态共享同一份数据
    fn shares(&self, committed: &Arc<StoreState>) -> bool {
        Arc::ptr_eq(&self.0, committed)
    }
}

impl Deref for WorkingState {
    type Target = StoreState;

    fn deref(&self) -> &StoreState {
        &self.0
    }
}

impl DerefMut for WorkingState {
    fn deref_mut(&mut self) -> &mut StoreState {
        Arc::make_mut(&mut self.0)
    }
}

pub(crate) type SharedState = Arc<Mutex<WorkingState>>;

/// 内存存储（同时是工作单元工厂）
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<Arc<StoreState>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交状态的副本（等待进行中的工作单元结束）
    pub async fn snapshot(&self) -> StoreState {
        let committed = self.state.lock().await;
        StoreState::clone(&committed)
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let committed = self.state.clone().lock_owned().await;
        let working = Arc::new(Mutex::new(WorkingState(Arc::clone(&committed))));
        Ok(Box::new(InMemoryUnitOfWork::new(committed, working)))
    }
}

/// 内存 Unit of Work
pub struct InMemoryUnitOfWork {
    committed: OwnedMutexGuard<Arc<StoreState>>,
    working: SharedState,
    unit_repo: MemoryUnitRepository,
    container_repo: MemoryContainerRepository,
    cycle_repo: MemoryCycleRepository,
    measurement_repo: MemoryMeasurementRepository,
    batch_repo: MemoryBatchRepository,
    size_class_repo: MemorySizeClassRepository,
    regrouping_repo: MemoryRegroupingRepository,
    lineage_repo: MemoryLineageRepository,
    sequence_repo: MemorySequenceRepository,
}

impl InMemoryUnitOfWork {
    fn new(committed: OwnedMutexGuard<Arc<StoreState>>, working: SharedState) -> Self {
        Self {
            committed,
            unit_repo: MemoryUnitRepository::new(working.clone()),
            container_repo: MemoryContainerRepository::new(working.clone()),
            cycle_repo: MemoryCycleRepository::new(working.clone()),
            measurement_repo: MemoryMeasurementRepository::new(working.clone()),
            batch_repo: MemoryBatchRepository::new(working.clone()),
            size_class_repo: MemorySizeClassRepository::new(working.clone()),
            regrouping_repo: MemoryRegroupingRepository::new(working.clone()),
            lineage_repo: MemoryLineageRepository::new(working.clone()),
            sequence_repo: MemorySequenceRepository::new(working.clone()),
            working,
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn units(&self) -> &dyn RearingUnitRepository {
        &self.unit_repo
    }

    fn containers(&self) -> &dyn ContainerRepository {
        &self.container_repo
    }

    fn cycles(&self) -> &dyn CycleRepository {
        &self.cycle_repo
    }

    fn measurements(&self) -> &dyn MeasurementRepository {
        &self.measurement_repo
    }

    fn batches(&self) -> &dyn BatchRepository {
        &self.batch_repo
    }

    fn size_classes(&self) -> &dyn SizeClassRepository {
        &self.size_class_repo
    }

    fn regroupings(&self) -> &dyn RegroupingRepository {
        &self.regrouping_repo
    }

    fn lineage(&self) -> &dyn LineageRepository {
        &self.lineage_repo
    }

    fn sequences(&self) -> &dyn SequenceRepository {
        &self.sequence_repo
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let Self {
            mut committed,
            working,
            ..
        } = *self;
        let working = working
            .try_lock()
            .map_err(|_| AppError::internal("Unit of work still in use at commit"))?;
        if !working.shares(&committed) {
            *committed = Arc::clone(&working.0);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_publishes_and_drop_discards() {
        let store = InMemoryStore::new();
        let unit = RearingUnit::new("Alpha", 4).unwrap();

        let uow = store.begin().await.unwrap();
        uow.units().insert(&unit).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(store.snapshot().await.units.len(), 1);

        let uow = store.begin().await.unwrap();
        uow.units()
            .insert(&RearingUnit::new("Beta", 4).unwrap())
            .await
            .unwrap();
        drop(uow);
        assert_eq!(store.snapshot().await.units.len(), 1);

        let uow = store.begin().await.unwrap();
        assert!(uow.units().find_by_id(unit.id()).await.unwrap().is_some());
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_sequence_rolls_back_with_unit_of_work() {
        let store = InMemoryStore::new();

        let uow = store.begin().await.unwrap();
        assert_eq!(uow.sequences().next_value("regrouping").await.unwrap(), 1);
        uow.rollback().await.unwrap();

        let uow = store.begin().await.unwrap();
        assert_eq!(uow.sequences().next_value("regrouping").await.unwrap(), 1);
        assert_eq!(uow.sequences().next_value("regrouping").await.unwrap(), 2);
        uow.commit().await.unwrap();

        assert_eq!(store.snapshot().await.sequences["regrouping"], 2);
    }

    #[tokio::test]
    async fn test_overlapping_size_class_is_rejected() {
        let store = InMemoryStore::new();
        let uow = store.begin().await.unwrap();
        uow.size_classes()
            .insert(&SizeClass::new("M", 201.0, 400.0))
            .await
            .unwrap();

        let err = uow
            .size_classes()
            .insert(&SizeClass::new("S", 400.0, 600.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        uow.size_classes()
            .insert(&SizeClass::new("S", 401.0, 600.0))
            .await
            .unwrap();
        assert_eq!(uow.size_classes().list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reads_share_committed_state() {
        let store = InMemoryStore::new();
        let uow = store.begin().await.unwrap();
        uow.units()
            .insert(&RearingUnit::new("Alpha", 4).unwrap())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let committed = Arc::clone(&*store.state.lock().await);
        let uow = store.begin().await.unwrap();
        assert_eq!(uow.units().list(true).await.unwrap().len(), 1);
        assert!(uow.containers().list_placed_active().await.unwrap().is_empty());
        uow.commit().await.unwrap();

        // 只读工作单元既不复制也不替换已提交状态
        assert!(Arc::ptr_eq(&committed, &*store.state.lock().await));
        assert_eq!(Arc::strong_count(&committed), 2);
    }
}
