//! Regrouping Metrics
//!
//! 业务指标记录

use std::time::Instant;

use errors::AppError;
use metrics::{counter, histogram};

use crate::domain::enums::RegroupingKind;

// ============================================================================
// 重组 Metrics
// ============================================================================

/// 记录一次完成的重组
pub fn record_regrouping_completed(kind: RegroupingKind, animals_moved: i64) {
    let labels = [("kind", kind.as_str().to_string())];

    counter!("regrouping_completed_total", &labels).increment(1);
    if animals_moved > 0 {
        counter!("regrouping_animals_moved_total", &labels).increment(animals_moved as u64);
    }
}

/// 记录取消
pub fn record_regrouping_cancelled() {
    counter!("regrouping_cancelled_total").increment(1);
}

/// 记录被拒绝的操作，按错误类别区分
pub fn record_regrouping_rejected(kind: RegroupingKind, error: &AppError) {
    let labels = [
        ("kind", kind.as_str().to_string()),
        ("reason", error.kind().as_str().to_string()),
    ];
    counter!("regrouping_rejected_total", &labels).increment(1);
}

/// 记录通知发送失败
pub fn record_notification_failed(topic: &str) {
    let labels = [("topic", topic.to_string())];
    counter!("regrouping_notifications_failed_total", &labels).increment(1);
}

// ============================================================================
// 槽位 Metrics
// ============================================================================

/// 记录槽位占用结果
pub fn record_position_claim(success: bool) {
    let outcome = if success { "claimed" } else { "rejected" };
    let labels = [("outcome", outcome.to_string())];
    counter!("position_claims_total", &labels).increment(1);
}

// ============================================================================
// 提交耗时 Metrics
// ============================================================================

/// 提交计时器
pub struct CommitTimer {
    start: Instant,
    kind: RegroupingKind,
}

impl CommitTimer {
    pub fn new(kind: RegroupingKind) -> Self {
        Self {
            start: Instant::now(),
            kind,
        }
    }

    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        let labels = [
            ("kind", self.kind.as_str().to_string()),
            ("success", success.to_string()),
        ];

        histogram!("regrouping_commit_duration_seconds", &labels).record(duration);
    }
}
