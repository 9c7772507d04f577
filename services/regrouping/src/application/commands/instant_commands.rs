//! 即时分选命令

use chrono::NaiveDate;
use errors::{AppError, AppResult};

use super::{ensure_distinct, ensure_positive_weight};
use crate::domain::value_objects::{ContainerId, Destination, SampleInput};

/// 即时分选的一个目标
#[derive(Debug, Clone)]
pub struct InstantDestinationSpec {
    pub container_id: ContainerId,
    pub destination: Destination,
    /// 总重（克）
    pub total_weight_g: f64,
    /// 已知个体数；为空时由总重和样本推算
    pub animal_count: Option<i64>,
    pub notes: Option<String>,
}

impl InstantDestinationSpec {
    pub fn validate(&self) -> AppResult<()> {
        ensure_positive_weight(self.total_weight_g, "Destination total weight")?;
        if let Some(count) = self.animal_count {
            if count <= 0 {
                return Err(AppError::validation(format!(
                    "Destination animal count must be positive, got {}",
                    count
                )));
            }
        }
        Ok(())
    }
}

/// 执行即时分选
#[derive(Debug, Clone)]
pub struct ExecuteInstantRegroupingCommand {
    pub source_container_ids: Vec<ContainerId>,
    pub destinations: Vec<InstantDestinationSpec>,
    /// 所有目标共用的样本
    pub sample: SampleInput,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

impl ExecuteInstantRegroupingCommand {
    pub fn validate(&self) -> AppResult<()> {
        ensure_distinct(&self.source_container_ids, "source container")?;
        let ids: Vec<ContainerId> = self
            .destinations
            .iter()
            .map(|d| d.container_id.clone())
            .collect();
        ensure_distinct(&ids, "destination container")?;
        self.destinations
            .iter()
            .try_for_each(InstantDestinationSpec::validate)
    }
}
