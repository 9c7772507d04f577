//! 批次实体

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::BatchId;

/// 批次：一次来自供应商的到货，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub supplier: String,
    pub arrival_date: NaiveDate,
    pub quality_grade: Option<String>,
    pub initial_count: i64,
}

impl Batch {
    pub fn new(supplier: impl Into<String>, arrival_date: NaiveDate, initial_count: i64) -> Self {
        Self {
            id: BatchId::new(),
            supplier: supplier.into(),
            arrival_date,
            quality_grade: None,
            initial_count,
        }
    }

    pub fn with_quality_grade(mut self, grade: impl Into<String>) -> Self {
        self.quality_grade = Some(grade.into());
        self
    }
}
