//! 谱系追踪
//!
//! 记录来源与目标之间的谱系边、批次向新周期的传播，以及批次台账。

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use domain_core::Entity;
use errors::{AppError, AppResult};
use tracing::debug;

use super::balanced_rounding::distribute;
use crate::domain::entities::{
    BatchReference, LedgerEntry, LineageEdge, Regrouping, SourceSnapshot,
};
use crate::domain::enums::LedgerKind;
use crate::domain::unit_of_work::UnitOfWork;
use crate::domain::value_objects::{BatchId, ContainerId, CycleId, RegroupingId};

/// 批次组成：批次 → 个体数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchComposition(BTreeMap<BatchId, i64>);

impl BatchComposition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(batch_id: BatchId, animal_count: i64) -> Self {
        let mut composition = Self::new();
        composition.add(batch_id, animal_count);
        composition
    }

    pub fn add(&mut self, batch_id: BatchId, animal_count: i64) {
        if animal_count > 0 {
            let count = self.0.entry(batch_id).or_insert(0);
            *count = count.saturating_add(animal_count);
        }
    }

    pub fn merge(&mut self, other: &BatchComposition) {
        for (batch_id, count) in &other.0 {
            self.add(batch_id.clone(), *count);
        }
    }

    pub fn total(&self) -> i64 {
        self.0.values().fold(0, |total, count| total.saturating_add(*count))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn count_of(&self, batch_id: &BatchId) -> i64 {
        self.0.get(batch_id).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BatchId, i64)> {
        self.0.iter().map(|(batch_id, count)| (batch_id, *count))
    }

    /// 数量最多的批次；数量相同取 ID 较小者
    pub fn dominant(&self) -> Option<&BatchId> {
        self.0
            .iter()
            .fold(None::<(&BatchId, i64)>, |best, (batch_id, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((batch_id, *count)),
            })
            .map(|(batch_id, _)| batch_id)
    }

    fn weights(&self) -> Vec<(BatchId, f64)> {
        self.0
            .iter()
            .map(|(batch_id, count)| (batch_id.clone(), *count as f64))
            .collect()
    }

    /// 按现有比例缩放到 `total`，各批次之和严格等于 `total`
    pub fn scaled_to(&self, total: i64) -> AppResult<BatchComposition> {
        if self.is_empty() || total == 0 {
            return Ok(Self::new());
        }
        let mut scaled = Self::new();
        for (batch_id, count) in distribute(total, &self.weights())? {
            scaled.add(batch_id, count);
        }
        Ok(scaled)
    }
}

/// 来源的转出明细
#[derive(Debug, Clone)]
pub struct TransferOut {
    pub container_id: ContainerId,
    pub cycle_id: CycleId,
    pub composition: BatchComposition,
}

/// 目标的转入明细
#[derive(Debug, Clone)]
pub struct TransferIn {
    pub container_id: ContainerId,
    pub cycle_id: CycleId,
    pub sold: bool,
    pub references: Vec<BatchReference>,
}

/// 谱系追踪器
#[derive(Debug, Clone, Default)]
pub struct LineageTracker;

impl LineageTracker {
    pub fn new() -> Self {
        Self
    }

    /// 来源当前的批次组成：优先使用该周期上记录过的批次引用，否则使用周期自身的批次
    pub async fn source_composition(
        &self,
        uow: &dyn UnitOfWork,
        snapshot: &SourceSnapshot,
    ) -> AppResult<BatchComposition> {
        let references = uow
            .lineage()
            .batch_references_for_cycle(&snapshot.cycle_id)
            .await?;

        // 同一周期可能被多次重组引用（即时分选沿用周期），只取编号最大的那次写给该容器的引用
        let candidates: BTreeSet<RegroupingId> = references
            .iter()
            .filter(|r| r.destination_container_id == snapshot.container_id)
            .map(|r| r.regrouping_id.clone())
            .collect();
        let mut latest: Option<(i64, RegroupingId)> = None;
        for regrouping_id in candidates {
            let number = uow
                .regroupings()
                .find_by_id(&regrouping_id)
                .await?
                .ok_or_else(|| AppError::not_found("regrouping", &regrouping_id))?
                .number();
            if latest.as_ref().map_or(true, |(best, _)| number > *best) {
                latest = Some((number, regrouping_id));
            }
        }
        if let Some((_, latest)) = latest {
            let mut recorded = BatchComposition::new();
            for reference in references.into_iter().filter(|r| {
                r.regrouping_id == latest && r.destination_container_id == snapshot.container_id
            }) {
                recorded.add(reference.batch_id, reference.animal_count);
            }
            return recorded.scaled_to(snapshot.animal_count);
        }

        Ok(match &snapshot.batch_id {
            Some(batch_id) => BatchComposition::single(batch_id.clone(), snapshot.animal_count),
            None => BatchComposition::new(),
        })
    }

    /// 记录一条谱系边
    pub async fn record_edge(
        &self,
        uow: &dyn UnitOfWork,
        regrouping_id: &RegroupingId,
        source: (&ContainerId, &CycleId),
        destination: (&ContainerId, &CycleId),
    ) -> AppResult<LineageEdge> {
        let edge = LineageEdge {
            regrouping_id: regrouping_id.clone(),
            source_container_id: source.0.clone(),
            source_cycle_id: source.1.clone(),
            destination_container_id: destination.0.clone(),
            destination_cycle_id: destination.1.clone(),
        };
        uow.lineage().record_edge(&edge).await?;
        Ok(edge)
    }

    /// 每个来源与每个目标之间都记录一条边
    pub async fn record_bipartite(
        &self,
        uow: &dyn UnitOfWork,
        regrouping_id: &RegroupingId,
        sources: &[(ContainerId, CycleId)],
        destinations: &[(ContainerId, CycleId)],
    ) -> AppResult<Vec<LineageEdge>> {
        let mut edges = Vec::with_capacity(sources.len() * destinations.len());
        for (source_container, source_cycle) in sources {
            for (destination_container, destination_cycle) in destinations {
                edges.push(
                    self.record_edge(
                        uow,
                        regrouping_id,
                        (source_container, source_cycle),
                        (destination_container, destination_cycle),
                    )
                    .await?,
                );
            }
        }
        debug!(%regrouping_id, edges = edges.len(), "Lineage edges recorded");
        Ok(edges)
    }

    /// 把一个批次传播到目标的新周期
    #[allow(clippy::too_many_arguments)]
    pub async fn propagate_batch(
        &self,
        uow: &dyn UnitOfWork,
        regrouping_id: &RegroupingId,
        destination_container_id: &ContainerId,
        destination_cycle_id: &CycleId,
        batch_id: &BatchId,
        animal_count: i64,
        destination_total: i64,
        dominant: bool,
    ) -> AppResult<BatchReference> {
        let share = if destination_total > 0 {
            animal_count as f64 / destination_total as f64
        } else {
            0.0
        };
        let reference = BatchReference {
            regrouping_id: regrouping_id.clone(),
            destination_container_id: destination_container_id.clone(),
            destination_cycle_id: destination_cycle_id.clone(),
            batch_id: batch_id.clone(),
            animal_count,
            share,
            dominant,
        };
        uow.lineage().record_batch_reference(&reference).await?;
        Ok(reference)
    }

    /// 按总体组成比例把批次分配到一个目标
    pub async fn propagate_composition(
        &self,
        uow: &dyn UnitOfWork,
        regrouping_id: &RegroupingId,
        destination: (&ContainerId, &CycleId),
        aggregate: &BatchComposition,
        destination_count: i64,
    ) -> AppResult<Vec<BatchReference>> {
        let dominant = aggregate.dominant().cloned();
        let allocated = aggregate.scaled_to(destination_count)?;

        let mut references = Vec::with_capacity(allocated.len());
        for (batch_id, count) in allocated.iter() {
            references.push(
                self.propagate_batch(
                    uow,
                    regrouping_id,
                    destination.0,
                    destination.1,
                    batch_id,
                    count,
                    destination_count,
                    dominant.as_ref() == Some(batch_id),
                )
                .await?,
            );
        }
        Ok(references)
    }

    /// 写入批次台账：来源转出、目标转入或售出、按比例分摊的损耗
    pub async fn record_ledger(
        &self,
        uow: &dyn UnitOfWork,
        regrouping: &Regrouping,
        date: NaiveDate,
        outflows: &[TransferOut],
        inflows: &[TransferIn],
        aggregate: &BatchComposition,
        mortality: i64,
    ) -> AppResult<usize> {
        let mut entries = Vec::new();

        for outflow in outflows {
            for (batch_id, count) in outflow.composition.iter() {
                entries.push(LedgerEntry::new(
                    regrouping.id().clone(),
                    regrouping.number(),
                    LedgerKind::TransferOut,
                    batch_id.clone(),
                    Some(outflow.container_id.clone()),
                    Some(outflow.cycle_id.clone()),
                    count,
                    date,
                ));
            }
        }

        for inflow in inflows {
            let kind = if inflow.sold {
                LedgerKind::Sale
            } else {
                LedgerKind::TransferIn
            };
            for reference in inflow.references.iter().filter(|r| r.animal_count > 0) {
                entries.push(LedgerEntry::new(
                    regrouping.id().clone(),
                    regrouping.number(),
                    kind,
                    reference.batch_id.clone(),
                    Some(inflow.container_id.clone()),
                    Some(inflow.cycle_id.clone()),
                    reference.animal_count,
                    date,
                ));
            }
        }

        if mortality > 0 && !aggregate.is_empty() {
            for (batch_id, count) in aggregate.scaled_to(mortality)?.iter() {
                entries.push(LedgerEntry::new(
                    regrouping.id().clone(),
                    regrouping.number(),
                    LedgerKind::Mortality,
                    batch_id.clone(),
                    None,
                    None,
                    count,
                    date,
                ));
            }
        }

        let mut written = 0;
        for entry in &entries {
            if uow.lineage().record_ledger_entry(entry).await? {
                written += 1;
            } else {
                debug!(key = %entry.idempotency_key, "Ledger entry already recorded");
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_batch() {
        let a = BatchId::new();
        let b = BatchId::new();
        let mut composition = BatchComposition::new();
        composition.add(a.clone(), 10_000);
        composition.add(b.clone(), 8_000);
        assert_eq!(composition.dominant(), Some(&a));

        composition.add(b.clone(), 5_000);
        assert_eq!(composition.dominant(), Some(&b));
        assert_eq!(composition.total(), 23_000);
    }

    #[test]
    fn test_scaling_preserves_total() {
        let mut composition = BatchComposition::new();
        composition.add(BatchId::new(), 10_000);
        composition.add(BatchId::new(), 8_000);

        let scaled = composition.scaled_to(9_600).unwrap();
        assert_eq!(scaled.total(), 9_600);
        assert_eq!(scaled.len(), 2);
    }

    #[test]
    fn test_empty_composition_scales_to_empty() {
        let scaled = BatchComposition::new().scaled_to(500).unwrap();
        assert!(scaled.is_empty());
        assert!(scaled.dominant().is_none());
    }

    #[test]
    fn test_non_positive_counts_ignored() {
        let mut composition = BatchComposition::new();
        composition.add(BatchId::new(), 0);
        composition.add(BatchId::new(), -4);
        assert!(composition.is_empty());
    }

    #[tokio::test]
    async fn test_latest_references_follow_regrouping_number() {
        use common::AuditInfo;
        use uuid::Uuid;

        use crate::domain::enums::{RegroupingKind, RegroupingStatus};
        use crate::domain::unit_of_work::UnitOfWorkFactory;
        use crate::infrastructure::persistence::InMemoryStore;

        let store = InMemoryStore::new();
        let uow = store.begin().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let regrouping = |id: u128, number: i64| {
            Regrouping::restore(
                RegroupingId(Uuid::from_u128(id)),
                number,
                date,
                RegroupingKind::Instant,
                RegroupingStatus::Completed,
                None,
                None,
                None,
                None,
                None,
                AuditInfo::default(),
            )
        };
        // 编号较大的一次拥有较小的 ID
        let earlier = regrouping(u128::MAX, 1);
        let later = regrouping(1, 2);
        uow.regroupings().insert(&earlier).await.unwrap();
        uow.regroupings().insert(&later).await.unwrap();

        let container_id = ContainerId::new();
        let cycle_id = CycleId::new();
        let old_batch = BatchId::new();
        let new_batch = BatchId::new();
        for (regrouping, batch_id) in [(&earlier, &old_batch), (&later, &new_batch)] {
            uow.lineage()
                .record_batch_reference(&BatchReference {
                    regrouping_id: regrouping.id().clone(),
                    destination_container_id: container_id.clone(),
                    destination_cycle_id: cycle_id.clone(),
                    batch_id: batch_id.clone(),
                    animal_count: 100,
                    share: 1.0,
                    dominant: true,
                })
                .await
                .unwrap();
        }

        let snapshot = SourceSnapshot {
            container_id,
            container_label: "B1".to_string(),
            cycle_id,
            placement: None,
            animal_count: 80,
            total_weight_g: None,
            animals_per_kg: None,
            size_class_id: None,
            batch_id: None,
        };
        let composition = LineageTracker::new()
            .source_composition(uow.as_ref(), &snapshot)
            .await
            .unwrap();
        assert_eq!(composition.count_of(&new_batch), 80);
        assert_eq!(composition.count_of(&old_batch), 0);
    }
}
