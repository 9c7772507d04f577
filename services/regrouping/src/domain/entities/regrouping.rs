//! 重组事件聚合根

use chrono::{DateTime, NaiveDate, Utc};
use common::AuditInfo;
use domain_core::{AggregateRoot, Entity};
use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::domain::enums::{RegroupingKind, RegroupingPhase, RegroupingStatus};
use crate::domain::value_objects::{RegroupingId, SizeClassId};

/// 重组事件
///
/// 状态机：`draft → completed`，`draft → cancelled`。终态不可变，
/// 撤销一次已完成的重组需要发起新的重组。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regrouping {
    id: RegroupingId,
    /// 对外展示的顺序编号
    number: i64,
    date: NaiveDate,
    kind: RegroupingKind,
    status: RegroupingStatus,
    purpose: Option<String>,
    notes: Option<String>,
    /// 用于按相似度排序候选容器
    reference_size_class_id: Option<SizeClassId>,
    cancellation_reason: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    audit_info: AuditInfo,
}

impl Regrouping {
    /// 创建多步骤流程的草稿
    pub fn new_workflow(number: i64, date: NaiveDate) -> Self {
        Self::new(number, date, RegroupingKind::Workflow)
    }

    /// 创建即时分选记录，提交时直接完成
    pub fn new_instant(number: i64, date: NaiveDate) -> Self {
        Self::new(number, date, RegroupingKind::Instant)
    }

    fn new(number: i64, date: NaiveDate, kind: RegroupingKind) -> Self {
        Self {
            id: RegroupingId::new(),
            number,
            date,
            kind,
            status: RegroupingStatus::Draft,
            purpose: None,
            notes: None,
            reference_size_class_id: None,
            cancellation_reason: None,
            completed_at: None,
            audit_info: AuditInfo::default(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: RegroupingId,
        number: i64,
        date: NaiveDate,
        kind: RegroupingKind,
        status: RegroupingStatus,
        purpose: Option<String>,
        notes: Option<String>,
        reference_size_class_id: Option<SizeClassId>,
        cancellation_reason: Option<String>,
        completed_at: Option<DateTime<Utc>>,
        audit_info: AuditInfo,
    ) -> Self {
        Self {
            id,
            number,
            date,
            kind,
            status,
            purpose,
            notes,
            reference_size_class_id,
            cancellation_reason,
            completed_at,
            audit_info,
        }
    }

    pub fn with_purpose(mut self, purpose: Option<String>) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_reference_size_class(mut self, size_class_id: Option<SizeClassId>) -> Self {
        self.reference_size_class_id = size_class_id;
        self
    }

    // ========== 状态迁移 ==========

    /// 只有草稿可以编辑参与者
    pub fn ensure_editable(&self) -> AppResult<()> {
        match self.status {
            RegroupingStatus::Draft => Ok(()),
            status => Err(AppError::validation(format!(
                "Regrouping #{} is {} and can no longer be edited",
                self.number, status
            ))),
        }
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> AppResult<()> {
        self.ensure_editable()?;
        self.status = RegroupingStatus::Completed;
        self.completed_at = Some(at);
        self.mark_modified(None);
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<String>) -> AppResult<()> {
        match self.status {
            RegroupingStatus::Draft => {
                self.status = RegroupingStatus::Cancelled;
                self.cancellation_reason = reason;
                self.mark_modified(None);
                Ok(())
            }
            RegroupingStatus::Cancelled => Err(AppError::validation(format!(
                "Regrouping #{} is already cancelled",
                self.number
            ))),
            RegroupingStatus::Completed => Err(AppError::validation(format!(
                "Regrouping #{} is completed; model the reversal as a new regrouping",
                self.number
            ))),
        }
    }

    pub fn phase(&self, sources: usize, destinations: usize) -> RegroupingPhase {
        RegroupingPhase::derive(self.status, sources, destinations)
    }

    // ========== Getters ==========

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn kind(&self) -> RegroupingKind {
        self.kind
    }

    pub fn status(&self) -> RegroupingStatus {
        self.status
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn reference_size_class_id(&self) -> Option<&SizeClassId> {
        self.reference_size_class_id.as_ref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

impl Entity for Regrouping {
    type Id = RegroupingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Regrouping {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> Regrouping {
        Regrouping::new_workflow(7, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut regrouping = draft();
        regrouping.complete(Utc::now()).unwrap();
        assert_eq!(regrouping.status(), RegroupingStatus::Completed);
        assert!(regrouping.ensure_editable().is_err());
        assert!(regrouping.cancel(None).is_err());
        assert!(regrouping.complete(Utc::now()).is_err());
    }

    #[test]
    fn test_cancel_draft_once() {
        let mut regrouping = draft();
        regrouping.cancel(Some("wrong date".to_string())).unwrap();
        assert_eq!(regrouping.status(), RegroupingStatus::Cancelled);
        assert_eq!(regrouping.cancellation_reason(), Some("wrong date"));
        assert!(regrouping.cancel(None).unwrap_err().is_validation());
    }
}
