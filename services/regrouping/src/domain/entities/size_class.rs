//! 规格等级

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::SizeClassId;

/// 按每公斤个体数划分的规格等级，区间为闭区间 [min, max]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeClass {
    pub id: SizeClassId,
    pub code: String,
    pub min_animals_per_kg: f64,
    pub max_animals_per_kg: f64,
}

impl SizeClass {
    pub fn new(code: impl Into<String>, min_animals_per_kg: f64, max_animals_per_kg: f64) -> Self {
        Self {
            id: SizeClassId::new(),
            code: code.into(),
            min_animals_per_kg,
            max_animals_per_kg,
        }
    }

    pub fn contains(&self, animals_per_kg: f64) -> bool {
        self.min_animals_per_kg <= animals_per_kg && animals_per_kg <= self.max_animals_per_kg
    }

    /// 两个闭区间是否有交集（端点相接也算）
    pub fn overlaps(&self, other: &SizeClass) -> bool {
        self.min_animals_per_kg <= other.max_animals_per_kg
            && other.min_animals_per_kg <= self.max_animals_per_kg
    }

    pub fn midpoint(&self) -> f64 {
        (self.min_animals_per_kg + self.max_animals_per_kg) / 2.0
    }
}
