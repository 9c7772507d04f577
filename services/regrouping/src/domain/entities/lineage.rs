//! 谱系记录

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::enums::LedgerKind;
use crate::domain::value_objects::{
    BatchId, ContainerId, CycleId, LedgerEntryId, RegroupingId,
};

/// 来源 → 目标的谱系边
///
/// 一次重组会记录完整的二部图（每个来源连接每个目标）：当批次无法精确归属到
/// 单一来源时，下游必须把目标的批次来源视为"混合"。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    pub regrouping_id: RegroupingId,
    pub source_container_id: ContainerId,
    pub source_cycle_id: CycleId,
    pub destination_container_id: ContainerId,
    pub destination_cycle_id: CycleId,
}

/// 批次向目标周期的传播
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReference {
    pub regrouping_id: RegroupingId,
    pub destination_container_id: ContainerId,
    pub destination_cycle_id: CycleId,
    pub batch_id: BatchId,
    /// 按比例分配到该目标的个体数
    pub animal_count: i64,
    /// 在该目标中的占比（0..=1）
    pub share: f64,
    /// 是否为该目标中数量最多的批次
    pub dominant: bool,
}

/// 批次台账条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub regrouping_id: RegroupingId,
    pub kind: LedgerKind,
    pub batch_id: BatchId,
    pub container_id: Option<ContainerId>,
    pub cycle_id: Option<CycleId>,
    pub animal_count: i64,
    pub date: NaiveDate,
    /// 重复写入同一个键会被忽略
    pub idempotency_key: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        regrouping_id: RegroupingId,
        regrouping_number: i64,
        kind: LedgerKind,
        batch_id: BatchId,
        container_id: Option<ContainerId>,
        cycle_id: Option<CycleId>,
        animal_count: i64,
        date: NaiveDate,
    ) -> Self {
        let idempotency_key =
            Self::key_for(kind, regrouping_number, &batch_id, container_id.as_ref());
        Self {
            id: LedgerEntryId::new(),
            regrouping_id,
            kind,
            batch_id,
            container_id,
            cycle_id,
            animal_count,
            date,
            idempotency_key,
            recorded_at: Utc::now(),
        }
    }

    /// `{kind}_reg_{number}_batch_{batch}[_container_{id}]`
    pub fn key_for(
        kind: LedgerKind,
        regrouping_number: i64,
        batch_id: &BatchId,
        container_id: Option<&ContainerId>,
    ) -> String {
        let mut key = format!("{}_reg_{}_batch_{}", kind, regrouping_number, batch_id);
        if let Some(container_id) = container_id {
            key.push_str(&format!("_container_{}", container_id));
        }
        key
    }
}
