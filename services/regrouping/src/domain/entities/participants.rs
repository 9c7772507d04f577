//! 重组参与者

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{
    BatchId, ContainerId, CycleId, Destination, ParticipantId, RegroupingId, SampleInput,
    SizeClassId, SlotPosition,
};

/// 来源容器在登记时的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub container_id: ContainerId,
    pub container_label: String,
    pub cycle_id: CycleId,
    pub placement: Option<SlotPosition>,
    pub animal_count: i64,
    pub total_weight_g: Option<f64>,
    pub animals_per_kg: Option<f64>,
    pub size_class_id: Option<SizeClassId>,
    pub batch_id: Option<BatchId>,
}

/// 来源参与者
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceParticipant {
    pub id: ParticipantId,
    pub regrouping_id: RegroupingId,
    pub snapshot: SourceSnapshot,
    pub attached_at: DateTime<Utc>,
}

impl SourceParticipant {
    pub fn new(regrouping_id: RegroupingId, snapshot: SourceSnapshot) -> Self {
        Self {
            id: ParticipantId::new(),
            regrouping_id,
            snapshot,
            attached_at: Utc::now(),
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.snapshot.container_id
    }

    pub fn cycle_id(&self) -> &CycleId {
        &self.snapshot.cycle_id
    }
}

/// 目标参与者
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationParticipant {
    pub id: ParticipantId,
    pub regrouping_id: RegroupingId,
    pub container_id: ContainerId,
    pub container_label: String,
    pub destination: Destination,
    /// 抽样数据（即时分选由命令统一给出时为 None）
    pub sample: Option<SampleInput>,
    pub total_weight_g: f64,
    pub animal_count: i64,
    pub animals_per_kg: f64,
    pub size_class_id: Option<SizeClassId>,
    pub mortality_rate: Option<f64>,
    /// 提交时分配
    pub cycle_id: Option<CycleId>,
    pub notes: Option<String>,
}

impl DestinationParticipant {
    pub fn position(&self) -> Option<&SlotPosition> {
        self.destination.position()
    }
}
