//! 操作结果

use serde::Serialize;

use crate::domain::entities::{
    BatchReference, Container, DestinationParticipant, LedgerEntry, LineageEdge, Regrouping,
    SizeClass, SourceParticipant, SourceSnapshot,
};
use crate::domain::enums::RegroupingPhase;
use crate::domain::services::{AvailablePosition, MassBalance, SampleMeasurement};
use crate::domain::value_objects::{
    ContainerId, CycleId, SizeClassId, SlotPosition,
};

/// 多步骤重组提交结果
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub regrouping: Regrouping,
    pub mass_balance: MassBalance,
    pub sources: Vec<SourceParticipant>,
    /// 已分配新周期的目标
    pub destinations: Vec<DestinationParticipant>,
    pub edges: usize,
    pub ledger_entries: usize,
}

impl CompletionOutcome {
    pub fn new_cycles(&self) -> Vec<(ContainerId, CycleId)> {
        self.destinations
            .iter()
            .filter_map(|d| d.cycle_id.clone().map(|cycle_id| (d.container_id.clone(), cycle_id)))
            .collect()
    }
}

/// 即时分选结果
#[derive(Debug, Clone, Serialize)]
pub struct InstantOutcome {
    pub regrouping: Regrouping,
    /// 沿用的来源周期
    pub cycle_id: CycleId,
    pub sample: SampleMeasurement,
    pub size_class_id: Option<SizeClassId>,
    pub sources: Vec<SourceParticipant>,
    pub destinations: Vec<DestinationParticipant>,
    pub mass_balance: MassBalance,
    pub ledger_entries: usize,
}

/// 即时分选预览
#[derive(Debug, Clone, Serialize)]
pub struct InstantPreview {
    pub sources: Vec<SourceSnapshot>,
    pub total_animals: i64,
    pub sample: SampleMeasurement,
    pub size_class: Option<SizeClass>,
    /// 可作为目标的空闲容器
    pub suggested_destinations: Vec<Container>,
    pub available_positions: Vec<AvailablePosition>,
}

/// 重组详情
#[derive(Debug, Clone, Serialize)]
pub struct RegroupingDetail {
    pub regrouping: Regrouping,
    pub phase: RegroupingPhase,
    pub sources: Vec<SourceParticipant>,
    pub destinations: Vec<DestinationParticipant>,
    pub edges: Vec<LineageEdge>,
    pub batch_references: Vec<BatchReference>,
    pub ledger: Vec<LedgerEntry>,
}

/// 候选来源
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSource {
    pub container_id: ContainerId,
    pub container_label: String,
    pub placement: Option<SlotPosition>,
    pub cycle_id: CycleId,
    pub animal_count: i64,
    pub animals_per_kg: Option<f64>,
    pub size_class_id: Option<SizeClassId>,
    /// 每公斤个体数落在参考规格区间内
    pub in_reference_class: bool,
    /// 与参考规格中点的距离
    pub distance: Option<f64>,
}
