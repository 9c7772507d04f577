//! 事务感知的 Repository 实现
//!
//! 这些 Repository 使用共享的 Transaction 而非 PgPool。

use adapter_postgres::map_sqlx_error;
use async_trait::async_trait;
use chrono::NaiveDate;
use domain_core::{AggregateRoot, Entity};
use errors::{AppError, AppResult};
use uuid::Uuid;

use super::SharedTx;
use super::rows::*;
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

/// 宏：定义一个简单的 TxRepository 结构体
macro_rules! define_tx_repo {
    ($name:ident) => {
        pub struct $name {
            tx: SharedTx,
        }

        impl $name {
            pub fn new(tx: SharedTx) -> Self {
                Self { tx }
            }
        }
    };
}

define_tx_repo!(TxUnitRepository);
define_tx_repo!(TxSizeClassRepository);
define_tx_repo!(TxContainerRepository);
define_tx_repo!(TxCycleRepository);
define_tx_repo!(TxMeasurementRepository);
define_tx_repo!(TxBatchRepository);
define_tx_repo!(TxRegroupingRepository);
define_tx_repo!(TxLineageRepository);
define_tx_repo!(TxSequenceRepository);

/// 取出事务，事务已提交或回滚时报错
macro_rules! tx_of {
    ($guard:ident) => {
        $guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?
    };
}

// =============================================================================
// 养殖单元与规格目录
// =============================================================================

#[async_trait]
impl RearingUnitRepository for TxUnitRepository {
    async fn insert(&self, unit: &RearingUnit) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row_labels: Vec<String> = unit
            .row_labels()
            .iter()
            .map(|l| l.as_str().to_string())
            .collect();
        let max_positions = i32::try_from(unit.max_positions())
            .map_err(|_| AppError::validation("max_positions is out of range"))?;

        sqlx::query(
            r#"
            INSERT INTO rearing_units (id, name, max_positions, active, row_labels)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(unit.id().0)
        .bind(unit.name())
        .bind(max_positions)
        .bind(unit.is_active())
        .bind(&row_labels)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UnitId) -> AppResult<Option<RearingUnit>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, UnitRow>("SELECT * FROM rearing_units WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(UnitRow::into_unit).transpose()
    }

    async fn list(&self, active_only: bool) -> AppResult<Vec<RearingUnit>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, UnitRow>(
            "SELECT * FROM rearing_units WHERE ($1 = FALSE OR active) ORDER BY name, id",
        )
        .bind(active_only)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(UnitRow::into_unit).collect()
    }
}

#[async_trait]
impl SizeClassRepository for TxSizeClassRepository {
    async fn insert(&self, size_class: &SizeClass) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        // 表级锁：并发登记的两个规格不能都通过区间检查
        sqlx::query("LOCK TABLE size_classes IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        let existing: Vec<SizeClass> = sqlx::query_as::<_, SizeClassRow>("SELECT * FROM size_classes")
            .fetch_all(&mut **tx)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(SizeClassRow::into_size_class)
            .collect();
        ensure_disjoint(&existing, size_class)?;

        sqlx::query(
            r#"
            INSERT INTO size_classes (id, code, min_animals_per_kg, max_animals_per_kg)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(size_class.id.0)
        .bind(&size_class.code)
        .bind(size_class.min_animals_per_kg)
        .bind(size_class.max_animals_per_kg)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<SizeClass>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, SizeClassRow>(
            "SELECT * FROM size_classes ORDER BY min_animals_per_kg, code",
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SizeClassRow::into_size_class).collect())
    }
}

// =============================================================================
// 容器与周期
// =============================================================================

#[async_trait]
impl ContainerRepository for TxContainerRepository {
    async fn insert(&self, container: &Container) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let (unit_id, row_label, slot) = position_to_db(container.placement())?;
        let audit = container.audit_info();

        sqlx::query(
            r#"
            INSERT INTO containers (id, label, state, unit_id, row_label, slot, current_cycle_id,
                                    created_at, created_by, updated_at, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(container.id().0)
        .bind(container.label())
        .bind(container.state().as_str())
        .bind(unit_id)
        .bind(row_label)
        .bind(slot)
        .bind(container.current_cycle_id().map(|c| c.0))
        .bind(audit.created_at)
        .bind(audit.created_by.as_ref().map(|u| u.0))
        .bind(audit.updated_at)
        .bind(audit.updated_by.as_ref().map(|u| u.0))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, container: &Container) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let (unit_id, row_label, slot) = position_to_db(container.placement())?;
        let audit = container.audit_info();

        let result = sqlx::query(
            r#"
            UPDATE containers
            SET state = $2, unit_id = $3, row_label = $4, slot = $5, current_cycle_id = $6,
                updated_at = $7, updated_by = $8
            WHERE id = $1
            "#,
        )
        .bind(container.id().0)
        .bind(container.state().as_str())
        .bind(unit_id)
        .bind(row_label)
        .bind(slot)
        .bind(container.current_cycle_id().map(|c| c.0))
        .bind(audit.updated_at)
        .bind(audit.updated_by.as_ref().map(|u| u.0))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("container", container.id()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &ContainerId) -> AppResult<Option<Container>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, ContainerRow>("SELECT * FROM containers WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ContainerRow::into_container).transpose()
    }

    async fn find_by_id_for_update(&self, id: &ContainerId) -> AppResult<Option<Container>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(ContainerRow::into_container).transpose()
    }

    async fn find_by_ids(&self, ids: &[ContainerId]) -> AppResult<Vec<Container>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE id = ANY($1) ORDER BY label",
        )
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ContainerRow::into_container).collect()
    }

    async fn find_occupant(&self, position: &SlotPosition) -> AppResult<Option<Container>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, ContainerRow>(
            r#"
            SELECT * FROM containers
            WHERE state = 'active' AND unit_id = $1 AND row_label = $2 AND slot = $3
            "#,
        )
        .bind(position.unit_id.0)
        .bind(position.row.as_str())
        .bind(slot_to_db(position.slot)?)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(ContainerRow::into_container).transpose()
    }

    async fn list_placed_active(&self) -> AppResult<Vec<Container>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE state = 'active' AND unit_id IS NOT NULL ORDER BY label",
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ContainerRow::into_container).collect()
    }

    async fn list_available(&self, limit: usize) -> AppResult<Vec<Container>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE state = 'available' ORDER BY label LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ContainerRow::into_container).collect()
    }
}

#[async_trait]
impl CycleRepository for TxCycleRepository {
    async fn insert(&self, cycle: &Cycle) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        sqlx::query(
            r#"
            INSERT INTO cycles (id, container_id, state, start_date, end_date, batch_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cycle.id().0)
        .bind(cycle.container_id().0)
        .bind(cycle.state().as_str())
        .bind(cycle.start_date())
        .bind(cycle.end_date())
        .bind(cycle.batch_id().map(|b| b.0))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, cycle: &Cycle) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let result = sqlx::query(
            r#"
            UPDATE cycles
            SET container_id = $2, state = $3, end_date = $4, batch_id = $5
            WHERE id = $1
            "#,
        )
        .bind(cycle.id().0)
        .bind(cycle.container_id().0)
        .bind(cycle.state().as_str())
        .bind(cycle.end_date())
        .bind(cycle.batch_id().map(|b| b.0))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("cycle", cycle.id()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &CycleId) -> AppResult<Option<Cycle>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, CycleRow>("SELECT * FROM cycles WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(CycleRow::into_cycle).transpose()
    }

    async fn find_active_by_container(
        &self,
        container_id: &ContainerId,
    ) -> AppResult<Option<Cycle>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, CycleRow>(
            "SELECT * FROM cycles WHERE container_id = $1 AND state = 'active'",
        )
        .bind(container_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(CycleRow::into_cycle).transpose()
    }
}

// =============================================================================
// 测量事件与批次
// =============================================================================

#[async_trait]
impl MeasurementRepository for TxMeasurementRepository {
    async fn append(&self, event: &MeasurementEvent) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        sqlx::query(
            r#"
            INSERT INTO measurement_events (id, container_id, cycle_id, kind, date, animal_count,
                                            total_weight_g, animals_per_kg, size_class_id,
                                            dead_count, mortality_rate, batch_id, regrouping_id,
                                            notes, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(event.id.0)
        .bind(event.container_id.0)
        .bind(event.cycle_id.0)
        .bind(event.kind.as_str())
        .bind(event.date)
        .bind(event.animal_count)
        .bind(event.total_weight_g)
        .bind(event.animals_per_kg)
        .bind(event.size_class_id.as_ref().map(|s| s.0))
        .bind(event.dead_count)
        .bind(event.mortality_rate)
        .bind(event.batch_id.as_ref().map(|b| b.0))
        .bind(event.regrouping_id.as_ref().map(|r| r.0))
        .bind(&event.notes)
        .bind(event.recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn latest_for_container(
        &self,
        container_id: &ContainerId,
        cycle_id: &CycleId,
    ) -> AppResult<Option<MeasurementEvent>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, MeasurementRow>(
            r#"
            SELECT * FROM measurement_events
            WHERE container_id = $1 AND cycle_id = $2
            ORDER BY date DESC, recorded_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(container_id.0)
        .bind(cycle_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(MeasurementRow::into_event).transpose()
    }

    async fn last_for_container(
        &self,
        container_id: &ContainerId,
    ) -> AppResult<Option<MeasurementEvent>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, MeasurementRow>(
            r#"
            SELECT * FROM measurement_events
            WHERE container_id = $1
            ORDER BY date DESC, recorded_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(container_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(MeasurementRow::into_event).transpose()
    }

    async fn list_for_cycle(&self, cycle_id: &CycleId) -> AppResult<Vec<MeasurementEvent>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, MeasurementRow>(
            r#"
            SELECT * FROM measurement_events
            WHERE cycle_id = $1
            ORDER BY date DESC, recorded_at DESC, id DESC
            "#,
        )
        .bind(cycle_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(MeasurementRow::into_event).collect()
    }

    async fn exists_after(&self, container_id: &ContainerId, date: NaiveDate) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM measurement_events WHERE container_id = $1 AND date > $2)",
        )
        .bind(container_id.0)
        .bind(date)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(exists)
    }
}

#[async_trait]
impl BatchRepository for TxBatchRepository {
    async fn insert(&self, batch: &Batch) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        sqlx::query(
            r#"
            INSERT INTO batches (id, supplier, arrival_date, quality_grade, initial_count)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(batch.id.0)
        .bind(&batch.supplier)
        .bind(batch.arrival_date)
        .bind(&batch.quality_grade)
        .bind(batch.initial_count)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &BatchId) -> AppResult<Option<Batch>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, BatchRow>("SELECT * FROM batches WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(BatchRow::into_batch))
    }
}

// =============================================================================
// 重组事件
// =============================================================================

#[async_trait]
impl RegroupingRepository for TxRegroupingRepository {
    async fn insert(&self, regrouping: &Regrouping) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let audit = regrouping.audit_info();
        sqlx::query(
            r#"
            INSERT INTO regroupings (id, number, date, kind, status, purpose, notes,
                                     reference_size_class_id, cancellation_reason, completed_at,
                                     created_at, created_by, updated_at, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(regrouping.id().0)
        .bind(regrouping.number())
        .bind(regrouping.date())
        .bind(regrouping.kind().as_str())
        .bind(regrouping.status().as_str())
        .bind(regrouping.purpose())
        .bind(regrouping.notes())
        .bind(regrouping.reference_size_class_id().map(|s| s.0))
        .bind(regrouping.cancellation_reason())
        .bind(regrouping.completed_at())
        .bind(audit.created_at)
        .bind(audit.created_by.as_ref().map(|u| u.0))
        .bind(audit.updated_at)
        .bind(audit.updated_by.as_ref().map(|u| u.0))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, regrouping: &Regrouping) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let audit = regrouping.audit_info();
        let result = sqlx::query(
            r#"
            UPDATE regroupings
            SET status = $2, purpose = $3, notes = $4, reference_size_class_id = $5,
                cancellation_reason = $6, completed_at = $7, updated_at = $8, updated_by = $9
            WHERE id = $1
            "#,
        )
        .bind(regrouping.id().0)
        .bind(regrouping.status().as_str())
        .bind(regrouping.purpose())
        .bind(regrouping.notes())
        .bind(regrouping.reference_size_class_id().map(|s| s.0))
        .bind(regrouping.cancellation_reason())
        .bind(regrouping.completed_at())
        .bind(audit.updated_at)
        .bind(audit.updated_by.as_ref().map(|u| u.0))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("regrouping", regrouping.id()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &RegroupingId) -> AppResult<Option<Regrouping>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, RegroupingRow>("SELECT * FROM regroupings WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        row.map(RegroupingRow::into_regrouping).transpose()
    }

    async fn find_by_id_for_update(&self, id: &RegroupingId) -> AppResult<Option<Regrouping>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let row = sqlx::query_as::<_, RegroupingRow>(
            "SELECT * FROM regroupings WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(RegroupingRow::into_regrouping).transpose()
    }

    async fn insert_source(&self, source: &SourceParticipant) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let snapshot = &source.snapshot;
        let (unit_id, row_label, slot) = position_to_db(snapshot.placement.as_ref())?;

        sqlx::query(
            r#"
            INSERT INTO regrouping_sources (id, regrouping_id, container_id, container_label,
                                            cycle_id, unit_id, row_label, slot, animal_count,
                                            total_weight_g, animals_per_kg, size_class_id,
                                            batch_id, attached_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(source.id.0)
        .bind(source.regrouping_id.0)
        .bind(snapshot.container_id.0)
        .bind(&snapshot.container_label)
        .bind(snapshot.cycle_id.0)
        .bind(unit_id)
        .bind(row_label)
        .bind(slot)
        .bind(snapshot.animal_count)
        .bind(snapshot.total_weight_g)
        .bind(snapshot.animals_per_kg)
        .bind(snapshot.size_class_id.as_ref().map(|s| s.0))
        .bind(snapshot.batch_id.as_ref().map(|b| b.0))
        .bind(source.attached_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_sources(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<SourceParticipant>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT * FROM regrouping_sources WHERE regrouping_id = $1 ORDER BY attached_at, id",
        )
        .bind(regrouping_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(SourceRow::into_participant).collect()
    }

    async fn delete_source(
        &self,
        regrouping_id: &RegroupingId,
        participant_id: &ParticipantId,
    ) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let result =
            sqlx::query("DELETE FROM regrouping_sources WHERE regrouping_id = $1 AND id = $2")
                .bind(regrouping_id.0)
                .bind(participant_id.0)
                .execute(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_destination(&self, destination: &DestinationParticipant) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let (unit_id, row_label, slot) = position_to_db(destination.position())?;
        let sample = destination.sample.as_ref();

        sqlx::query(
            r#"
            INSERT INTO regrouping_destinations (id, regrouping_id, container_id, container_label,
                                                 destination_type, unit_id, row_label, slot,
                                                 sample_weight_g, live_count, dead_count,
                                                 total_weight_g, animal_count, animals_per_kg,
                                                 size_class_id, mortality_rate, cycle_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(destination.id.0)
        .bind(destination.regrouping_id.0)
        .bind(destination.container_id.0)
        .bind(&destination.container_label)
        .bind(destination.destination.type_name())
        .bind(unit_id)
        .bind(row_label)
        .bind(slot)
        .bind(sample.map(|s| s.sample_weight_g))
        .bind(sample.map(|s| s.live_count))
        .bind(sample.map(|s| s.dead_count))
        .bind(destination.total_weight_g)
        .bind(destination.animal_count)
        .bind(destination.animals_per_kg)
        .bind(destination.size_class_id.as_ref().map(|s| s.0))
        .bind(destination.mortality_rate)
        .bind(destination.cycle_id.as_ref().map(|c| c.0))
        .bind(&destination.notes)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_destination(&self, destination: &DestinationParticipant) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let result = sqlx::query(
            "UPDATE regrouping_destinations SET cycle_id = $2, notes = $3 WHERE id = $1",
        )
        .bind(destination.id.0)
        .bind(destination.cycle_id.as_ref().map(|c| c.0))
        .bind(&destination.notes)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("destination", &destination.id));
        }
        Ok(())
    }

    async fn list_destinations(
        &self,
        regrouping_id: &RegroupingId,
    ) -> AppResult<Vec<DestinationParticipant>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        // 参与者 ID 按时间生成，按 ID 排序即登记顺序
        let rows = sqlx::query_as::<_, DestinationRow>(
            "SELECT * FROM regrouping_destinations WHERE regrouping_id = $1 ORDER BY id",
        )
        .bind(regrouping_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DestinationRow::into_participant).collect()
    }

    async fn delete_destination(
        &self,
        regrouping_id: &RegroupingId,
        participant_id: &ParticipantId,
    ) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let result =
            sqlx::query("DELETE FROM regrouping_destinations WHERE regrouping_id = $1 AND id = $2")
                .bind(regrouping_id.0)
                .bind(participant_id.0)
                .execute(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// 谱系与台账
// =============================================================================

#[async_trait]
impl LineageRepository for TxLineageRepository {
    async fn record_edge(&self, edge: &LineageEdge) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        sqlx::query(
            r#"
            INSERT INTO lineage_edges (regrouping_id, source_container_id, source_cycle_id,
                                       destination_container_id, destination_cycle_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(edge.regrouping_id.0)
        .bind(edge.source_container_id.0)
        .bind(edge.source_cycle_id.0)
        .bind(edge.destination_container_id.0)
        .bind(edge.destination_cycle_id.0)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn record_batch_reference(&self, reference: &BatchReference) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        sqlx::query(
            r#"
            INSERT INTO batch_references (regrouping_id, destination_container_id,
                                          destination_cycle_id, batch_id, animal_count, share,
                                          dominant)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reference.regrouping_id.0)
        .bind(reference.destination_container_id.0)
        .bind(reference.destination_cycle_id.0)
        .bind(reference.batch_id.0)
        .bind(reference.animal_count)
        .bind(reference.share)
        .bind(reference.dominant)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn record_ledger_entry(&self, entry: &LedgerEntry) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let result = sqlx::query(
            r#"
            INSERT INTO lot_ledger (id, regrouping_id, kind, batch_id, container_id, cycle_id,
                                    animal_count, date, idempotency_key, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(entry.id.0)
        .bind(entry.regrouping_id.0)
        .bind(entry.kind.as_str())
        .bind(entry.batch_id.0)
        .bind(entry.container_id.as_ref().map(|c| c.0))
        .bind(entry.cycle_id.as_ref().map(|c| c.0))
        .bind(entry.animal_count)
        .bind(entry.date)
        .bind(&entry.idempotency_key)
        .bind(entry.recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn edges_for_regrouping(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<LineageEdge>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT * FROM lineage_edges
            WHERE regrouping_id = $1
            ORDER BY source_container_id, destination_container_id
            "#,
        )
        .bind(regrouping_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EdgeRow::into_edge).collect())
    }

    async fn batch_references_for_cycle(&self, cycle_id: &CycleId) -> AppResult<Vec<BatchReference>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, BatchReferenceRow>(
            "SELECT * FROM batch_references WHERE destination_cycle_id = $1 ORDER BY regrouping_id, batch_id",
        )
        .bind(cycle_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BatchReferenceRow::into_reference).collect())
    }

    async fn batch_references_for_regrouping(
        &self,
        regrouping_id: &RegroupingId,
    ) -> AppResult<Vec<BatchReference>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, BatchReferenceRow>(
            r#"
            SELECT * FROM batch_references
            WHERE regrouping_id = $1
            ORDER BY destination_container_id, animal_count DESC
            "#,
        )
        .bind(regrouping_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BatchReferenceRow::into_reference).collect())
    }

    async fn ledger_for_regrouping(&self, regrouping_id: &RegroupingId) -> AppResult<Vec<LedgerEntry>> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT * FROM lot_ledger WHERE regrouping_id = $1 ORDER BY recorded_at, id",
        )
        .bind(regrouping_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }
}

// =============================================================================
// 编号
// =============================================================================

#[async_trait]
impl SequenceRepository for TxSequenceRepository {
    async fn next_value(&self, name: &str) -> AppResult<i64> {
        let mut guard = self.tx.lock().await;
        let tx = tx_of!(guard);

        // 行锁保证并发事务拿到不同的值，回滚时自增一并撤销
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(value)
    }
}
