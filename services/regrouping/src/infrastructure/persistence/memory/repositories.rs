//! 内存仓储
//!
//! 唯一性约束与 PostgreSQL 中的索引保持一致：同一槽位只能有一个在养容器，
//! 一个容器只能有一个在养周期，台账幂等键唯一。

use async_trait::async_trait;
use chrono::NaiveDate;
use domain_core::Entity;
use errors::{AppError, AppResult};

use super::SharedState;
use crate::domain::entities::{
    Batch, BatchReference, Container, Cycle, DestinationParticipant, LedgerEntry, LineageEdge,
    MeasurementEvent, RearingUnit, Regrouping, SizeClass, SourceParticipant,
};
use crate::domain::repositories::{
    BatchRepository, ContainerRepository, CycleRepository, LineageRepository,
    MeasurementRepository, RearingUnitRepository, RegroupingRepository, SequenceRepository,
    SizeClassRepository,
};
use crate::domain::services::ensure_disjoint;
use crate::domain::value_objects::{
    BatchId, ContainerId, CycleId, ParticipantId, RegroupingId, SlotPosition, UnitId,
};

macro_rules! define_memory_repo {
    ($name:ident) => {
        pub struct $name {
            state: SharedState,
        }

        impl $name {
            pub fn new(state: SharedState) -> Self {
                Self { state }
            }
        }
    };
}

define_memory_repo!(MemoryUnitRepository);
define_memory_repo!(MemorySizeClassRepository);
define_memory_repo!(MemoryContainerRepository);
define_memory_repo!(MemoryCycleRepository);
define_memory_repo!(MemoryMeasurementRepository);
define_memory_repo!(MemoryBatchRepository);
define_memory_repo!(MemoryRegroupingRepository);
define_memory_repo!(MemoryLineageRepository);
define_memory_repo!(MemorySequenceRepository);

// ============ 养殖单元与规格 ============

#[async_trait]
impl RearingUnitRepository for MemoryUnitRepository {
    async fn insert(&self, unit: &RearingUnit) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.units.contains_key(unit.id()) {
            return Err(AppError::conflict(format!("Rearing unit {} already exists", unit.id())));
        }
        state.units.insert(unit.id().clone(), unit.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &UnitId) -> AppResult<Option<RearingUnit>> {
        Ok(self.state.lock().await.units.get(id).cloned())
    }

    async fn list(&self, active_only: bool) -> AppResult<Vec<RearingUnit>> {
        let state = self.state.lock().await;
        let mut units: Vec<RearingUnit> = state
            .units
            .values()
            .filter(|u| !active_only || u.is_active())
            .cloned()
            .collect();
        units.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(units)
    }
}

#[async_trait]
impl SizeClassRepository for MemorySizeClassRepository {
    async fn insert(&self, size_class: &SizeClass) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.size_classes.iter().any(|c| c.code == size_class.code) {
            return Err(AppError::conflict(format!(
                "Size class {} already exists",
                size_class.code
            )));
        }
        ensure_disjoint(&state.size_classes, size_class)?;
        state.size_classes.push(size_class.clone());
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<SizeClass>> {
        let mut classes = self.state.lock().await.size_classes.clone();
        classes.sort_by(|a, b| a.min_animals_per_kg.total_cmp(&b.min_animals_per_kg));
        Ok(classes)
    }
}

// ============ 容器与周期 ============

fn ensure_slot_free(
    containers: impl Iterator<Item = Container>,
    container: &Container,
) -> AppResult<()> {
    let Some(position) = container.placement().filter(|_| container.is_active()) else {
        return Ok(());
    };
    if let Some(occupant) = containers
        .into_iter()
        .find(|c| c.id() != container.id() && c.occupies(position))
    {
        return Err(AppError::conflict(format!(
            "Position {} is already occupied by container {}",
            position,
            occupant.label()
        )));
    }
    Ok(())
}

#[async_trait]
impl ContainerRepository for MemoryContainerRepository {
    async fn insert(&self, container: &Container) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.containers.contains_key(container.id()) {
            return Err(AppError::conflict(format!(
                "Container {} already exists",
                container.label()
            )));
        }
        ensure_slot_free(state.containers.values().cloned(), container)?;
        state.containers.insert(container.id().clone(), container.clone());
        Ok(())
    }

    async fn update(&self, container: &Container) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.containers.contains_key(container.id()) {
            return Err(AppError::not_found("container", container.id()));
        }
        ensure_slot_free(state.containers.values().cloned(), container)?;
        state.containers.insert(container.id().clone(), container.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ContainerId) -> AppResult<Option<Container>> {
        Ok(self.state.lock().await.containers.get(id).cloned())
    }

    async fn find_by_id_for_update(&self, id: &ContainerId) -> AppResult<Option<Container>> {
        // 工作单元已独占整个存储
        self.find_by_id(id).await
    }

    async fn find_by_ids(&self, ids: &[ContainerId]) -> AppResult<Vec<Container>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.containers.get(id).cloned())
            .collect())
    }

    async fn find_occupant(&self, position: &SlotPosition) -> AppResult<Option<Container>> {
        Ok(self
            .state
            .lock()
            .await
            .containers
            .values()
            .find(|c| c.occupies(position))
            .cloned())
    }

    async fn list_placed_active(&self) -> AppResult<Vec<Container>> {
        let state = self.state.lock().await;
        let mut placed: Vec<Container> = state
            .containers
            .values()
            .filter(|c| c.is_active() && c.placement().is_some())
            .cloned()
            .collect();
        placed.sort_by(|a, b| a.label().cmp(b.label()));
        Ok(placed)
    }

    async fn list_available(&self, limit: usize) -> AppResult<Vec<Container>> {
        let state = self.state.lock().await;
        let mut available: Vec<Container> = state
            .containers
            .values()
            .filter(|c| !c.is_active() && !c.is_retired())
            .cloned()
            .collect();
        available.sort_by(|a, b| a.label().cmp(b.label()));
        available.truncate(limit);
        Ok(available)
    }
}

#[async_trait]
impl CycleRepository for MemoryCycleRepository {
    async fn insert(&self, cycle: &Cycle) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if cycle.is_active()
            && state
                .cycles
                .values()
                .any(|c| c.is_active() && c.container_id() == cycle.container_id())
        {
            return Err(AppError::conflict(format!(
                "Container {} already has an active cycle",
                cycle.container_id()
            )));
        }
        state.cycles.insert(cycle.id().clone(), cycle.clone());
        Ok(())
    }

    async fn update(&self, cycle: &Cycle) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.cycles.contains_key(cycle.id()) {
            return Err(AppError::not_found("cycle", cycle.id()));
        }
        if cycle.is_active()
            && state.cycles.values().any(|c| {
                c.id() != cycle.id() && c.is_active() && c.container_id() == cycle.container_id()
            })
        {
            return Err(AppError::conflict(format!(
                "Container {} already has an active cycle",
                cycle.container_id()
            )));
        }
        state.cycles.insert(cycle.id().clone(), cycle.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &CycleId) -> AppResult<Option<Cycle>> {
        Ok(self.state.lock().await.cycles.get(id).cloned())
    }

    async fn find_active_by_container(&self, container_id: &ContainerId) -> AppResult<Option<Cycle>> {
        Ok(self
            .state
            .lock()
            .await
            .cycles
            .values()
            .find(|c| c.is_active() && c.container_id() == container_id)
            .cloned())
    }
}

// ============ 测量与批次 ============

#[async_trait]
impl MeasurementRepository for MemoryMeasurementRepository {
    async fn append(&self, event: &MeasurementEvent) -> AppResult<()> {
        self.state.lock().await.measurements.push(event.clone());
        Ok(())
    }

    async fn latest_for_container(
        &self,
        container_id: &ContainerId,
        cycle_id: &CycleId,
    ) -> AppResult<Option<MeasurementEvent>> {
        Ok(self
            .state
            .lock()
            .await
            .measurements
            .iter()
            .filter(|m| &m.container_id == container_id && &m.cycle_id == cycle_id)
            .max_by(|a, b| a.recency_key().cmp(&b.recency_key()))
            .cloned())
    }

    async fn last_for_container(
        &self,
        container_id: &ContainerId,
    ) -> AppResult<Option<MeasurementEvent>> {
        Ok(self
            .state
            .lock()
            .await
            .measurements
            .iter()
            .filter(|m| &m.container_id == container_id)
            .max_by(|a, b| a.recency_key().cmp(&b.recency_key()))
            .cloned())
    }

    async fn list_for_cycle(&self, cycle_id: &CycleId) -> AppResult<Vec<MeasurementEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<MeasurementEvent> = state
            .measurements
            .iter()
            .filter(|m| &m.cycle_id == cycle_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        Ok(events)
    }

    async fn exists_after(&self, container_id: &ContainerId, date: NaiveDate) -> AppResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .measurements
            .iter()
            .any(|m| &m.container_id == container_id && m.date > date))
    }
}

#[async_trait]
impl BatchRepository for MemoryBatchRepository {
    async fn insert(&self, batch: &Batch) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.batches.contains_key(&batch.id) {
            return Err(AppError::conflict(format!("Batch {} already exists", batch.id)));
        }
        state.batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &BatchId) -> AppResult<Option<Batch>> {
        Ok(self.state.lock().await.batches.get(id).cloned())
    }
}

// ============ 重组 ============

#[async_trait]
impl RegroupingRepository for MemoryRegroupingRepository {
    async fn insert(&self, regrouping: &Regrouping) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.regroupings.values().any(|r| r.number() == regrouping.number()) {
            return Err(AppError::conflict(format!(
                "Regrouping number {} already issued",
                regrouping.number()
            )));
        }
        state
            .regroupings
            .insert(regrouping.id().clone(), regrouping.clone());
        Ok(())
    }

    async fn update(&self, regrouping: &Regrouping) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.regroupings.get_mut(regrouping.id()) {
            Some(existing) => {
                *existing = regrouping.clone();
                Ok(())
            }
            None => Err(AppError::not_found("regrouping", regrouping.id())),
        }
    }

    async fn find_by_id(&self, id: &RegroupingId) -> AppResult<Option<Regrouping>> {
        Ok(self.state.lock().await.regroupings.get(id).cloned())
    }

    async fn find_by_id_for_update(&self, id: &RegroupingId) -> AppResult<Option<Regrouping>> {
        self.find_by_id(id).await
    }

    async fn insert_source(&self, source: &SourceParticipant) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state
            .sources
            .iter()
            .any(|s| s.regrouping_id == source.regrouping_id && s.container_id() == source.container_id())
        {
            return Err(AppError::conflict(format!(
                "Container {} is already a source of this regrouping",
                source.container_id()
            )));
        }
        state.sources.push(source.clone());
        Ok(())
    }

    async fn list_sources(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<SourceParticipant>> {
        Ok(self
            .state
            .lock()
            .await
            .sources
            .iter()
            .filter(|s| &s.regrouping_id == regrouping_id)
            .cloned()
            .collect())
    }

    async fn delete_source(
        &self,
        regrouping_id: &RegroupingId,
        participant_id: &ParticipantId,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.sources.len();
        state
            .sources
            .retain(|s| !(&s.regrouping_id == regrouping_id && &s.id == participant_id));
        Ok(state.sources.len() < before)
    }

    async fn insert_destination(&self, destination: &DestinationParticipant) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.destinations.iter().any(|d| {
            d.regrouping_id == destination.regrouping_id
                && d.container_id == destination.container_id
        }) {
            return Err(AppError::conflict(format!(
                "Container {} is already a destination of this regrouping",
                destination.container_id
            )));
        }
        state.destinations.push(destination.clone());
        Ok(())
    }

    async fn update_destination(&self, destination: &DestinationParticipant) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.destinations.iter_mut().find(|d| d.id == destination.id) {
            Some(existing) => {
                *existing = destination.clone();
                Ok(())
            }
            None => Err(AppError::not_found("destination participant", &destination.id)),
        }
    }

    async fn list_destinations(
        &self,
        regrouping_id: &RegroupingId,
    ) -> AppResult<Vec<DestinationParticipant>> {
        Ok(self
            .state
            .lock()
            .await
            .destinations
            .iter()
            .filter(|d| &d.regrouping_id == regrouping_id)
            .cloned()
            .collect())
    }

    async fn delete_destination(
        &self,
        regrouping_id: &RegroupingId,
        participant_id: &ParticipantId,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.destinations.len();
        state
            .destinations
            .retain(|d| !(&d.regrouping_id == regrouping_id && &d.id == participant_id));
        Ok(state.destinations.len() < before)
    }
}

// ============ 谱系 ============

#[async_trait]
impl LineageRepository for MemoryLineageRepository {
    async fn record_edge(&self, edge: &LineageEdge) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.edges.contains(edge) {
            state.edges.push(edge.clone());
        }
        Ok(())
    }

    async fn record_batch_reference(&self, reference: &BatchReference) -> AppResult<()> {
        self.state.lock().await.batch_references.push(reference.clone());
        Ok(())
    }

    async fn record_ledger_entry(&self, entry: &LedgerEntry) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state
            .ledger
            .iter()
            .any(|e| e.idempotency_key == entry.idempotency_key)
        {
            return Ok(false);
        }
        state.ledger.push(entry.clone());
        Ok(true)
    }

    async fn edges_for_regrouping(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<LineageEdge>> {
        Ok(self
            .state
            .lock()
            .await
            .edges
            .iter()
            .filter(|e| &e.regrouping_id == regrouping_id)
            .cloned()
            .collect())
    }

    async fn batch_references_for_cycle(&self, cycle_id: &CycleId) -> AppResult<Vec<BatchReference>> {
        Ok(self
            .state
            .lock()
            .await
            .batch_references
            .iter()
            .filter(|r| &r.destination_cycle_id == cycle_id)
            .cloned()
            .collect())
    }

    async fn batch_references_for_regrouping(
        &self,
        regrouping_id: &RegroupingId,
    ) -> AppResult<Vec<BatchReference>> {
        Ok(self
            .state
            .lock()
            .await
            .batch_references
            .iter()
            .filter(|r| &r.regrouping_id == regrouping_id)
            .cloned()
            .collect())
    }

    async fn ledger_for_regrouping(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<LedgerEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| &e.regrouping_id == regrouping_id)
            .cloned()
            .collect())
    }
}

// ============ 编号 ============

#[async_trait]
impl SequenceRepository for MemorySequenceRepository {
    async fn next_value(&self, name: &str) -> AppResult<i64> {
        let mut state = self.state.lock().await;
        let value = state.sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
