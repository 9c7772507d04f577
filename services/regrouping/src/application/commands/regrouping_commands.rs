//! 多步骤重组命令

use chrono::NaiveDate;
use errors::{AppError, AppResult};

use super::{ensure_distinct, ensure_positive_weight};
use crate::domain::value_objects::{
    ContainerId, Destination, ParticipantId, RegroupingId, SampleInput, SizeClassId,
};

const MAX_TEXT_LEN: usize = 1000;

fn ensure_text(value: &Option<String>, field: &str) -> AppResult<()> {
    if let Some(text) = value {
        if text.len() > MAX_TEXT_LEN {
            return Err(AppError::validation(format!(
                "{} must not exceed {} characters",
                field, MAX_TEXT_LEN
            )));
        }
    }
    Ok(())
}

/// 创建重组草稿
#[derive(Debug, Clone)]
pub struct CreateRegroupingCommand {
    pub date: NaiveDate,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub reference_size_class_id: Option<SizeClassId>,
}

impl CreateRegroupingCommand {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            purpose: None,
            notes: None,
            reference_size_class_id: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        ensure_text(&self.purpose, "Purpose")?;
        ensure_text(&self.notes, "Notes")
    }
}

/// 登记来源容器
#[derive(Debug, Clone)]
pub struct AttachSourcesCommand {
    pub regrouping_id: RegroupingId,
    pub container_ids: Vec<ContainerId>,
}

impl AttachSourcesCommand {
    pub fn validate(&self) -> AppResult<()> {
        ensure_distinct(&self.container_ids, "source container")
    }
}

/// 一个目标容器的去向与抽样
#[derive(Debug, Clone)]
pub struct DestinationSpec {
    pub container_id: ContainerId,
    pub destination: Destination,
    /// 目标容器中动物总重（克）
    pub total_weight_g: f64,
    pub sample: SampleInput,
    pub notes: Option<String>,
}

impl DestinationSpec {
    pub fn validate(&self) -> AppResult<()> {
        ensure_positive_weight(self.total_weight_g, "Destination total weight")?;
        ensure_text(&self.notes, "Notes")
    }
}

/// 登记目标容器（只暂存，不提交）
#[derive(Debug, Clone)]
pub struct AttachDestinationsCommand {
    pub regrouping_id: RegroupingId,
    pub destinations: Vec<DestinationSpec>,
}

impl AttachDestinationsCommand {
    pub fn validate(&self) -> AppResult<()> {
        let ids: Vec<ContainerId> = self
            .destinations
            .iter()
            .map(|d| d.container_id.clone())
            .collect();
        ensure_distinct(&ids, "destination container")?;
        self.destinations.iter().try_for_each(DestinationSpec::validate)
    }
}

/// 提交已登记的来源与目标
#[derive(Debug, Clone)]
pub struct CompleteRegroupingCommand {
    pub regrouping_id: RegroupingId,
}

/// 移除一个来源（仅草稿）
#[derive(Debug, Clone)]
pub struct RemoveSourceCommand {
    pub regrouping_id: RegroupingId,
    pub participant_id: ParticipantId,
}

/// 移除一个目标（仅草稿）
#[derive(Debug, Clone)]
pub struct RemoveDestinationCommand {
    pub regrouping_id: RegroupingId,
    pub participant_id: ParticipantId,
}

/// 取消重组（仅草稿）
#[derive(Debug, Clone)]
pub struct CancelRegroupingCommand {
    pub regrouping_id: RegroupingId,
    pub reason: Option<String>,
}

impl CancelRegroupingCommand {
    pub fn validate(&self) -> AppResult<()> {
        ensure_text(&self.reason, "Reason")
    }
}
