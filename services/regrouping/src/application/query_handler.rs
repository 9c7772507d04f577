//! 查询处理

use std::cmp::Ordering;

use domain_core::Entity;
use errors::{AppError, AppResult};

use super::handler::{ServiceHandler, discard};
use super::queries::*;
use super::results::{CandidateSource, RegroupingDetail};
use crate::domain::services::AvailablePosition;
use crate::domain::unit_of_work::UnitOfWork;

impl ServiceHandler {
    /// 列出空闲槽位
    pub async fn list_available_positions(
        &self,
        query: ListAvailablePositionsQuery,
    ) -> AppResult<Vec<AvailablePosition>> {
        let uow = self.uow_factory.begin().await?;
        let result = self
            .allocator
            .list_available(
                uow.as_ref(),
                &query.scope,
                query.origin_unit_id.as_ref(),
                query.exclude_occupied_by.as_slice(),
            )
            .await;
        discard(uow, result).await
    }

    /// 重组详情：参与者、谱系边、批次引用与台账
    pub async fn get_regrouping(&self, query: GetRegroupingQuery) -> AppResult<RegroupingDetail> {
        let uow = self.uow_factory.begin().await?;
        let result = self.load_detail(uow.as_ref(), &query).await;
        discard(uow, result).await
    }

    async fn load_detail(
        &self,
        uow: &dyn UnitOfWork,
        query: &GetRegroupingQuery,
    ) -> AppResult<RegroupingDetail> {
        let regrouping = uow
            .regroupings()
            .find_by_id(&query.regrouping_id)
            .await?
            .ok_or_else(|| AppError::not_found("regrouping", &query.regrouping_id))?;
        let id = regrouping.id().clone();

        let sources = uow.regroupings().list_sources(&id).await?;
        let destinations = uow.regroupings().list_destinations(&id).await?;

        Ok(RegroupingDetail {
            phase: regrouping.phase(sources.len(), destinations.len()),
            regrouping,
            sources,
            destinations,
            edges: uow.lineage().edges_for_regrouping(&id).await?,
            batch_references: uow.lineage().batch_references_for_regrouping(&id).await?,
            ledger: uow.lineage().ledger_for_regrouping(&id).await?,
        })
    }

    /// 候选来源：参考规格内的排在前面，其余按与规格中点的距离排序；没有参考规格时按标签排序
    pub async fn rank_candidate_sources(
        &self,
        query: RankCandidateSourcesQuery,
    ) -> AppResult<Vec<CandidateSource>> {
        let uow = self.uow_factory.begin().await?;
        let result = self.collect_candidates(uow.as_ref(), &query).await;
        discard(uow, result).await
    }

    async fn collect_candidates(
        &self,
        uow: &dyn UnitOfWork,
        query: &RankCandidateSourcesQuery,
    ) -> AppResult<Vec<CandidateSource>> {
        let regrouping = uow
            .regroupings()
            .find_by_id(&query.regrouping_id)
            .await?
            .ok_or_else(|| AppError::not_found("regrouping", &query.regrouping_id))?;

        let catalog = uow.size_classes().list().await?;
        let reference = regrouping
            .reference_size_class_id()
            .and_then(|id| catalog.iter().find(|class| &class.id == id));
        let attached = uow.regroupings().list_sources(regrouping.id()).await?;

        let mut candidates = Vec::new();
        for container in uow.containers().list_placed_active().await? {
            if attached.iter().any(|s| s.container_id() == container.id()) {
                continue;
            }
            let Some(cycle_id) = container.current_cycle_id().cloned() else {
                continue;
            };
            let Some(latest) = uow
                .measurements()
                .latest_for_container(container.id(), &cycle_id)
                .await? else {
                continue;
            };
            let Some(animal_count) = latest.animal_count else {
                continue;
            };

            let apk = latest.animals_per_kg;
            candidates.push(CandidateSource {
                container_id: container.id().clone(),
                container_label: container.label().to_string(),
                placement: container.placement().cloned(),
                cycle_id,
                animal_count,
                animals_per_kg: apk,
                size_class_id: latest.size_class_id.clone(),
                in_reference_class: matches!((reference, apk), (Some(r), Some(a)) if r.contains(a)),
                distance: reference.zip(apk).map(|(r, a)| (a - r.midpoint()).abs()),
            });
        }

        candidates.sort_by(|a, b| {
            b.in_reference_class
                .cmp(&a.in_reference_class)
                .then_with(|| match (a.distance, b.distance) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| a.container_label.cmp(&b.container_label))
        });
        if let Some(limit) = query.limit {
            candidates.truncate(limit);
        }
        Ok(candidates)
    }
}
