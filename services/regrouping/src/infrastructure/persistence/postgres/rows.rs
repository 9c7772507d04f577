//! 数据行映射

use chrono::{DateTime, NaiveDate, Utc};
use common::{AuditInfo, UserId};
use errors::{AppError, AppResult};
use uuid::Uuid;

use crate::domain::entities::{
    Batch, BatchReference, Container, Cycle, DestinationParticipant, LedgerEntry, LineageEdge,
    MeasurementEvent, RearingUnit, Regrouping, SizeClass, SourceParticipant, SourceSnapshot,
};
use crate::domain::value_objects::{
    BatchId, ContainerId, CycleId, Destination, LedgerEntryId, MeasurementId, ParticipantId,
    RegroupingId, RowLabel, SampleInput, SizeClassId, SlotPosition, UnitId,
};

pub(super) fn slot_to_db(slot: u32) -> AppResult<i32> {
    i32::try_from(slot).map_err(|_| AppError::validation(format!("Slot {} is out of range", slot)))
}

fn slot_from_db(slot: i32) -> AppResult<u32> {
    u32::try_from(slot).map_err(|_| AppError::internal(format!("Stored slot {} is negative", slot)))
}

/// 三个可空列要么全有，要么全无
fn position_from_db(
    unit_id: Option<Uuid>,
    row_label: Option<String>,
    slot: Option<i32>,
) -> AppResult<Option<SlotPosition>> {
    match (unit_id, row_label, slot) {
        (Some(unit_id), Some(row), Some(slot)) => Ok(Some(SlotPosition::new(
            UnitId::from_uuid(unit_id),
            RowLabel::new(row)?,
            slot_from_db(slot)?,
        ))),
        (None, None, None) => Ok(None),
        _ => Err(AppError::internal("Stored position is partially filled")),
    }
}

/// 位置拆成三列
pub(super) fn position_to_db(
    position: Option<&SlotPosition>,
) -> AppResult<(Option<Uuid>, Option<String>, Option<i32>)> {
    match position {
        Some(p) => Ok((
            Some(p.unit_id.0),
            Some(p.row.as_str().to_string()),
            Some(slot_to_db(p.slot)?),
        )),
        None => Ok((None, None, None)),
    }
}

fn audit_from_db(
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
) -> AuditInfo {
    AuditInfo {
        created_at,
        created_by: created_by.map(UserId),
        updated_at,
        updated_by: updated_by.map(UserId),
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct UnitRow {
    pub id: Uuid,
    pub name: String,
    pub max_positions: i32,
    pub active: bool,
    pub row_labels: Vec<String>,
}

impl UnitRow {
    pub fn into_unit(self) -> AppResult<RearingUnit> {
        let max_positions = u32::try_from(self.max_positions).map_err(|_| {
            AppError::internal(format!("Stored max_positions {} is negative", self.max_positions))
        })?;
        Ok(RearingUnit::restore(
            UnitId::from_uuid(self.id),
            self.name,
            max_positions,
            self.active,
            RowLabel::parse_all(&self.row_labels)?,
        ))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct SizeClassRow {
    pub id: Uuid,
    pub code: String,
    pub min_animals_per_kg: f64,
    pub max_animals_per_kg: f64,
}

impl SizeClassRow {
    pub fn into_size_class(self) -> SizeClass {
        SizeClass {
            id: SizeClassId::from_uuid(self.id),
            code: self.code,
            min_animals_per_kg: self.min_animals_per_kg,
            max_animals_per_kg: self.max_animals_per_kg,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ContainerRow {
    pub id: Uuid,
    pub label: String,
    pub state: String,
    pub unit_id: Option<Uuid>,
    pub row_label: Option<String>,
    pub slot: Option<i32>,
    pub current_cycle_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

impl ContainerRow {
    pub fn into_container(self) -> AppResult<Container> {
        Ok(Container::restore(
            ContainerId::from_uuid(self.id),
            self.label,
            self.state.parse()?,
            position_from_db(self.unit_id, self.row_label, self.slot)?,
            self.current_cycle_id.map(CycleId::from_uuid),
            audit_from_db(self.created_at, self.created_by, self.updated_at, self.updated_by),
        ))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct CycleRow {
    pub id: Uuid,
    pub container_id: Uuid,
    pub state: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub batch_id: Option<Uuid>,
}

impl CycleRow {
    pub fn into_cycle(self) -> AppResult<Cycle> {
        Ok(Cycle::restore(
            CycleId::from_uuid(self.id),
            ContainerId::from_uuid(self.container_id),
            self.state.parse()?,
            self.start_date,
            self.end_date,
            self.batch_id.map(BatchId::from_uuid),
        ))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct MeasurementRow {
    pub id: Uuid,
    pub container_id: Uuid,
    pub cycle_id: Uuid,
    pub kind: String,
    pub date: NaiveDate,
    pub animal_count: Option<i64>,
    pub total_weight_g: Option<f64>,
    pub animals_per_kg: Option<f64>,
    pub size_class_id: Option<Uuid>,
    pub dead_count: Option<i64>,
    pub mortality_rate: Option<f64>,
    pub batch_id: Option<Uuid>,
    pub regrouping_id: Option<Uuid>,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MeasurementRow {
    pub fn into_event(self) -> AppResult<MeasurementEvent> {
        Ok(MeasurementEvent {
            id: MeasurementId::from_uuid(self.id),
            container_id: ContainerId::from_uuid(self.container_id),
            cycle_id: CycleId::from_uuid(self.cycle_id),
            kind: self.kind.parse()?,
            date: self.date,
            animal_count: self.animal_count,
            total_weight_g: self.total_weight_g,
            animals_per_kg: self.animals_per_kg,
            size_class_id: self.size_class_id.map(SizeClassId::from_uuid),
            dead_count: self.dead_count,
            mortality_rate: self.mortality_rate,
            batch_id: self.batch_id.map(BatchId::from_uuid),
            regrouping_id: self.regrouping_id.map(RegroupingId::from_uuid),
            notes: self.notes,
            recorded_at: self.recorded_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct BatchRow {
    pub id: Uuid,
    pub supplier: String,
    pub arrival_date: NaiveDate,
    pub quality_grade: Option<String>,
    pub initial_count: i64,
}

impl BatchRow {
    pub fn into_batch(self) -> Batch {
        Batch {
            id: BatchId::from_uuid(self.id),
            supplier: self.supplier,
            arrival_date: self.arrival_date,
            quality_grade: self.quality_grade,
            initial_count: self.initial_count,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct RegroupingRow {
    pub id: Uuid,
    pub number: i64,
    pub date: NaiveDate,
    pub kind: String,
    pub status: String,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub reference_size_class_id: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

impl RegroupingRow {
    pub fn into_regrouping(self) -> AppResult<Regrouping> {
        Ok(Regrouping::restore(
            RegroupingId::from_uuid(self.id),
            self.number,
            self.date,
            self.kind.parse()?,
            self.status.parse()?,
            self.purpose,
            self.notes,
            self.reference_size_class_id.map(SizeClassId::from_uuid),
            self.cancellation_reason,
            self.completed_at,
            audit_from_db(self.created_at, self.created_by, self.updated_at, self.updated_by),
        ))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct SourceRow {
    pub id: Uuid,
    pub regrouping_id: Uuid,
    pub container_id: Uuid,
    pub container_label: String,
    pub cycle_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub row_label: Option<String>,
    pub slot: Option<i32>,
    pub animal_count: i64,
    pub total_weight_g: Option<f64>,
    pub animals_per_kg: Option<f64>,
    pub size_class_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub attached_at: DateTime<Utc>,
}

impl SourceRow {
    pub fn into_participant(self) -> AppResult<SourceParticipant> {
        Ok(SourceParticipant {
            id: ParticipantId::from_uuid(self.id),
            regrouping_id: RegroupingId::from_uuid(self.regrouping_id),
            snapshot: SourceSnapshot {
                container_id: ContainerId::from_uuid(self.container_id),
                container_label: self.container_label,
                cycle_id: CycleId::from_uuid(self.cycle_id),
                placement: position_from_db(self.unit_id, self.row_label, self.slot)?,
                animal_count: self.animal_count,
                total_weight_g: self.total_weight_g,
                animals_per_kg: self.animals_per_kg,
                size_class_id: self.size_class_id.map(SizeClassId::from_uuid),
                batch_id: self.batch_id.map(BatchId::from_uuid),
            },
            attached_at: self.attached_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct DestinationRow {
    pub id: Uuid,
    pub regrouping_id: Uuid,
    pub container_id: Uuid,
    pub container_label: String,
    pub destination_type: String,
    pub unit_id: Option<Uuid>,
    pub row_label: Option<String>,
    pub slot: Option<i32>,
    pub sample_weight_g: Option<f64>,
    pub live_count: Option<i64>,
    pub dead_count: Option<i64>,
    pub total_weight_g: f64,
    pub animal_count: i64,
    pub animals_per_kg: f64,
    pub size_class_id: Option<Uuid>,
    pub mortality_rate: Option<f64>,
    pub cycle_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl DestinationRow {
    pub fn into_participant(self) -> AppResult<DestinationParticipant> {
        let destination = match (
            self.destination_type.as_str(),
            position_from_db(self.unit_id, self.row_label, self.slot)?,
        ) {
            ("sold", None) => Destination::Sold,
            ("placed", Some(position)) => Destination::Placed(position),
            (other, _) => {
                return Err(AppError::internal(format!(
                    "Inconsistent stored destination of type {}",
                    other
                )));
            }
        };
        let sample = match (self.sample_weight_g, self.live_count, self.dead_count) {
            (Some(weight), Some(live), Some(dead)) => Some(SampleInput::new(weight, live, dead)),
            _ => None,
        };

        Ok(DestinationParticipant {
            id: ParticipantId::from_uuid(self.id),
            regrouping_id: RegroupingId::from_uuid(self.regrouping_id),
            container_id: ContainerId::from_uuid(self.container_id),
            container_label: self.container_label,
            destination,
            sample,
            total_weight_g: self.total_weight_g,
            animal_count: self.animal_count,
            animals_per_kg: self.animals_per_kg,
            size_class_id: self.size_class_id.map(SizeClassId::from_uuid),
            mortality_rate: self.mortality_rate,
            cycle_id: self.cycle_id.map(CycleId::from_uuid),
            notes: self.notes,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct EdgeRow {
    pub regrouping_id: Uuid,
    pub source_container_id: Uuid,
    pub source_cycle_id: Uuid,
    pub destination_container_id: Uuid,
    pub destination_cycle_id: Uuid,
}

impl EdgeRow {
    pub fn into_edge(self) -> LineageEdge {
        LineageEdge {
            regrouping_id: RegroupingId::from_uuid(self.regrouping_id),
            source_container_id: ContainerId::from_uuid(self.source_container_id),
            source_cycle_id: CycleId::from_uuid(self.source_cycle_id),
            destination_container_id: ContainerId::from_uuid(self.destination_container_id),
            destination_cycle_id: CycleId::from_uuid(self.destination_cycle_id),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct BatchReferenceRow {
    pub regrouping_id: Uuid,
    pub destination_container_id: Uuid,
    pub destination_cycle_id: Uuid,
    pub batch_id: Uuid,
    pub animal_count: i64,
    pub share: f64,
    pub dominant: bool,
}

impl BatchReferenceRow {
    pub fn into_reference(self) -> BatchReference {
        BatchReference {
            regrouping_id: RegroupingId::from_uuid(self.regrouping_id),
            destination_container_id: ContainerId::from_uuid(self.destination_container_id),
            destination_cycle_id: CycleId::from_uuid(self.destination_cycle_id),
            batch_id: BatchId::from_uuid(self.batch_id),
            animal_count: self.animal_count,
            share: self.share,
            dominant: self.dominant,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct LedgerRow {
    pub id: Uuid,
    pub regrouping_id: Uuid,
    pub kind: String,
    pub batch_id: Uuid,
    pub container_id: Option<Uuid>,
    pub cycle_id: Option<Uuid>,
    pub animal_count: i64,
    pub date: NaiveDate,
    pub idempotency_key: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerRow {
    pub fn into_entry(self) -> AppResult<LedgerEntry> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(self.id),
            regrouping_id: RegroupingId::from_uuid(self.regrouping_id),
            kind: self.kind.parse()?,
            batch_id: BatchId::from_uuid(self.batch_id),
            container_id: self.container_id.map(ContainerId::from_uuid),
            cycle_id: self.cycle_id.map(CycleId::from_uuid),
            animal_count: self.animal_count,
            date: self.date,
            idempotency_key: self.idempotency_key,
            recorded_at: self.recorded_at,
        })
    }
}
