//! 测量事件

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::enums::MeasurementKind;
use crate::domain::value_objects::{
    BatchId, ContainerId, CycleId, MeasurementId, RegroupingId, SizeClassId,
};

/// 测量事件：只追加的审计记录，容器在当前周期内最新的一条即为当前数量与规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEvent {
    pub id: MeasurementId,
    pub container_id: ContainerId,
    pub cycle_id: CycleId,
    pub kind: MeasurementKind,
    pub date: NaiveDate,
    pub animal_count: Option<i64>,
    /// 总重（克）
    pub total_weight_g: Option<f64>,
    pub animals_per_kg: Option<f64>,
    pub size_class_id: Option<SizeClassId>,
    pub dead_count: Option<i64>,
    pub mortality_rate: Option<f64>,
    pub batch_id: Option<BatchId>,
    pub regrouping_id: Option<RegroupingId>,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MeasurementEvent {
    pub fn new(
        container_id: ContainerId,
        cycle_id: CycleId,
        kind: MeasurementKind,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: MeasurementId::new(),
            container_id,
            cycle_id,
            kind,
            date,
            animal_count: None,
            total_weight_g: None,
            animals_per_kg: None,
            size_class_id: None,
            dead_count: None,
            mortality_rate: None,
            batch_id: None,
            regrouping_id: None,
            notes: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_population(
        mut self,
        animal_count: i64,
        total_weight_g: Option<f64>,
        animals_per_kg: Option<f64>,
    ) -> Self {
        self.animal_count = Some(animal_count);
        self.total_weight_g = total_weight_g;
        self.animals_per_kg = animals_per_kg;
        self
    }

    pub fn with_size_class(mut self, size_class_id: Option<SizeClassId>) -> Self {
        self.size_class_id = size_class_id;
        self
    }

    pub fn with_mortality(mut self, dead_count: Option<i64>, mortality_rate: Option<f64>) -> Self {
        self.dead_count = dead_count;
        self.mortality_rate = mortality_rate;
        self
    }

    pub fn with_batch(mut self, batch_id: Option<BatchId>) -> Self {
        self.batch_id = batch_id;
        self
    }

    pub fn for_regrouping(mut self, regrouping_id: RegroupingId) -> Self {
        self.regrouping_id = Some(regrouping_id);
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// "最新"的排序键：日期优先，同日按记录时间
    pub fn recency_key(&self) -> (NaiveDate, DateTime<Utc>, &MeasurementId) {
        (self.date, self.recorded_at, &self.id)
    }
}
