//! 重组领域事件

use chrono::{DateTime, NaiveDate, Utc};
use event_core::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::domain::enums::RegroupingKind;
use crate::domain::value_objects::RegroupingId;

/// 重组领域事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegroupingDomainEvent {
    Completed {
        regrouping_id: RegroupingId,
        number: i64,
        kind: RegroupingKind,
        date: NaiveDate,
        source_labels: Vec<String>,
        destination_labels: Vec<String>,
        source_total: i64,
        destination_total: i64,
        mortality_loss: i64,
        timestamp: DateTime<Utc>,
    },
    Cancelled {
        regrouping_id: RegroupingId,
        number: i64,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl RegroupingDomainEvent {
    pub fn regrouping_id(&self) -> &RegroupingId {
        match self {
            Self::Completed { regrouping_id, .. } | Self::Cancelled { regrouping_id, .. } => {
                regrouping_id
            }
        }
    }
}

impl DomainEvent for RegroupingDomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "regrouping_completed",
            Self::Cancelled { .. } => "regrouping_cancelled",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "Regrouping"
    }

    fn aggregate_id(&self) -> String {
        self.regrouping_id().to_string()
    }
}
