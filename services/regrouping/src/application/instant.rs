//! 即时分选
//!
//! 预览只读不写；执行在一个工作单元内完成全部来源与目标。
//! 目标沿用第一个来源的周期，其余来源的周期关闭（仍有其他容器共用时移交）。

use std::collections::HashSet;

use chrono::Utc;
use common::with_conditional_retry;
use domain_core::Entity;
use errors::{AppError, AppResult};
use tracing::{debug, info, warn};

use super::commands::{ExecuteInstantRegroupingCommand, ensure_distinct};
use super::handler::{ActiveSource, ServiceHandler, discard, finish};
use super::queries::PreviewInstantRegroupingQuery;
use super::results::{InstantOutcome, InstantPreview};
use super::workflow::completed_event;
use crate::domain::entities::{
    DestinationParticipant, MeasurementEvent, Regrouping, SourceParticipant,
};
use crate::domain::enums::{MeasurementKind, RegroupingKind};
use crate::domain::services::{
    BatchComposition, MassBalance, PositionScope, SampleMeasurement, TransferIn, TransferOut,
    classify, compute_sample, extrapolate_count, total_animals,
};
use crate::domain::unit_of_work::UnitOfWork;
use crate::domain::value_objects::{ContainerId, CycleId, Destination, ParticipantId, SlotPosition};
use crate::infrastructure::observability::metrics::{self, CommitTimer};

impl ServiceHandler {
    /// 预览即时分选：计算规格、死亡率、建议目标与空闲槽位，不做任何写入
    pub async fn preview_instant_regrouping(
        &self,
        query: PreviewInstantRegroupingQuery,
    ) -> AppResult<InstantPreview> {
        ensure_distinct(&query.source_container_ids, "source container")?;
        let sample = compute_sample(&query.sample)?;

        let uow = self.uow_factory.begin().await?;
        let result = self.build_preview(uow.as_ref(), &query, sample).await;
        discard(uow, result).await
    }

    async fn build_preview(
        &self,
        uow: &dyn UnitOfWork,
        query: &PreviewInstantRegroupingQuery,
        sample: SampleMeasurement,
    ) -> AppResult<InstantPreview> {
        let catalog = uow.size_classes().list().await?;

        let mut sources = Vec::with_capacity(query.source_container_ids.len());
        for container_id in &query.source_container_ids {
            let source = self
                .load_active_source(uow, container_id, query.date, &catalog)
                .await?;
            sources.push(source.snapshot);
        }

        let origin_unit_id = sources
            .iter()
            .find_map(|s| s.placement.as_ref().map(|p| p.unit_id.clone()));
        // 来源的槽位会在执行时腾出
        let available_positions = self
            .allocator
            .list_available(
                uow,
                &PositionScope::All,
                origin_unit_id.as_ref(),
                &query.source_container_ids,
            )
            .await?;

        let suggested_destinations = uow
            .containers()
            .list_available(self.config.suggestion_limit)
            .await?;

        Ok(InstantPreview {
            total_animals: total_animals(sources.iter().map(|s| s.animal_count))?,
            sources,
            size_class: classify(&catalog, sample.animals_per_kg).cloned(),
            sample,
            suggested_destinations,
            available_positions,
        })
    }

    /// 执行即时分选
    pub async fn execute_instant_regrouping(
        &self,
        cmd: ExecuteInstantRegroupingCommand,
    ) -> AppResult<InstantOutcome> {
        cmd.validate()?;

        with_conditional_retry(
            &self.retry,
            "execute_instant_regrouping",
            || self.execute_instant_once(&cmd),
            AppError::is_retryable,
        )
        .await
    }

    async fn execute_instant_once(
        &self,
        cmd: &ExecuteInstantRegroupingCommand,
    ) -> AppResult<InstantOutcome> {
        let timer = CommitTimer::new(RegroupingKind::Instant);
        let uow = self.uow_factory.begin().await?;
        let result = self.apply_instant(uow.as_ref(), cmd).await;

        let outcome = match finish(uow, result).await {
            Ok(outcome) => {
                timer.finish(true);
                outcome
            }
            Err(e) => {
                timer.finish(false);
                warn!(error = %e, "Instant regrouping rejected");
                metrics::record_regrouping_rejected(RegroupingKind::Instant, &e);
                return Err(e);
            }
        };

        metrics::record_regrouping_completed(
            RegroupingKind::Instant,
            outcome.mass_balance.destination_total,
        );
        info!(
            regrouping_id = %outcome.regrouping.id(),
            number = outcome.regrouping.number(),
            cycle_id = %outcome.cycle_id,
            sources = outcome.sources.len(),
            destinations = outcome.destinations.len(),
            animals_per_kg = outcome.sample.animals_per_kg,
            "Instant regrouping completed"
        );

        self.notify(completed_event(
            &outcome.regrouping,
            outcome.sources.iter().map(|s| s.snapshot.container_label.clone()).collect(),
            outcome.destinations.iter().map(|d| d.container_label.clone()).collect(),
            &outcome.mass_balance,
        ))
        .await;

        Ok(outcome)
    }

    async fn apply_instant(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &ExecuteInstantRegroupingCommand,
    ) -> AppResult<InstantOutcome> {
        let sample = compute_sample(&cmd.sample)?;
        let catalog = uow.size_classes().list().await?;
        let size_class_id = classify(&catalog, sample.animals_per_kg).map(|c| c.id.clone());

        // 1. 校验来源
        let mut sources: Vec<ActiveSource> = Vec::with_capacity(cmd.source_container_ids.len());
        for container_id in &cmd.source_container_ids {
            sources.push(
                self.load_active_source(uow, container_id, Some(cmd.date), &catalog)
                    .await?,
            );
        }
        let Some(originating) = sources.first() else {
            return Err(AppError::validation("At least one source container is required"));
        };
        let mut cycle = originating.cycle.clone();
        let cycle_id = cycle.id().clone();
        let originating_id = originating.container.id().clone();

        // 2. 校验目标并计算数量
        let source_ids: HashSet<ContainerId> =
            sources.iter().map(|s| s.container.id().clone()).collect();
        let mut targeted: HashSet<SlotPosition> = HashSet::new();
        let mut planned = Vec::with_capacity(cmd.destinations.len());
        for spec in &cmd.destinations {
            let container = uow
                .containers()
                .find_by_id_for_update(&spec.container_id)
                .await?
                .ok_or_else(|| AppError::not_found("container", &spec.container_id))?;
            if container.is_retired() {
                return Err(AppError::validation(format!(
                    "Container {} is retired",
                    container.label()
                )));
            }
            if container.is_active() && !source_ids.contains(container.id()) {
                return Err(AppError::conflict(format!(
                    "Destination container {} already has an active cycle",
                    container.label()
                )));
            }
            if let Destination::Placed(position) = &spec.destination {
                self.allocator.validate_position(uow, position).await?;
                if !targeted.insert(position.clone()) {
                    return Err(AppError::conflict(format!(
                        "Position {} is targeted by more than one destination",
                        position
                    )));
                }
            }

            let animal_count = match spec.animal_count {
                Some(count) => count,
                None => extrapolate_count(spec.total_weight_g, sample.animals_per_kg)?,
            };
            if animal_count <= 0 {
                return Err(AppError::validation(format!(
                    "Destination {} would hold no animals",
                    container.label()
                )));
            }
            planned.push((spec, container.label().to_string(), animal_count));
        }

        let mass_balance = MassBalance::from_counts(
            sources.iter().map(|s| s.snapshot.animal_count),
            planned.iter().map(|(_, _, count)| *count),
        )?;
        if self.config.strict_mass_balance
            && !mass_balance.within_tolerance(self.config.mass_balance_tolerance_percent)
        {
            return Err(AppError::validation(format!(
                "Destinations hold {} animals but sources only {} ({:.2}% over)",
                mass_balance.destination_total,
                mass_balance.source_total,
                mass_balance.discrepancy_percent
            )));
        }

        // 3. 重组记录与批次组成
        let number = self.sequence.next(uow).await?;
        let mut regrouping = Regrouping::new_instant(number, cmd.date)
            .with_notes(cmd.notes.clone())
            .with_reference_size_class(size_class_id.clone());
        uow.regroupings().insert(&regrouping).await?;
        let regrouping_id = regrouping.id().clone();

        let mut aggregate = BatchComposition::new();
        let mut outflows = Vec::with_capacity(sources.len());
        for source in &sources {
            let composition = self.lineage.source_composition(uow, &source.snapshot).await?;
            aggregate.merge(&composition);
            outflows.push(TransferOut {
                container_id: source.snapshot.container_id.clone(),
                cycle_id: source.snapshot.cycle_id.clone(),
                composition,
            });
        }
        let dominant = aggregate.dominant().cloned();

        // 4. 来源：写测量并腾出容器；非起始来源的周期关闭
        let mut source_participants = Vec::with_capacity(sources.len());
        let mut source_pairs: Vec<(ContainerId, CycleId)> = Vec::with_capacity(sources.len());
        for source in sources.iter_mut() {
            let snapshot = &source.snapshot;
            let screening = MeasurementEvent::new(
                snapshot.container_id.clone(),
                snapshot.cycle_id.clone(),
                MeasurementKind::Screening,
                cmd.date,
            )
            .with_population(snapshot.animal_count, snapshot.total_weight_g, snapshot.animals_per_kg)
            .with_size_class(snapshot.size_class_id.clone())
            .with_batch(snapshot.batch_id.clone())
            .for_regrouping(regrouping_id.clone());
            uow.measurements().append(&screening).await?;

            if snapshot.cycle_id != cycle_id {
                self.settle_source_cycle(
                    uow,
                    &mut source.cycle,
                    &snapshot.container_id,
                    &source_ids,
                    cmd.date,
                )
                .await?;
            }
            self.allocator.release(uow, &mut source.container).await?;

            let participant = SourceParticipant::new(regrouping_id.clone(), source.snapshot.clone());
            uow.regroupings().insert_source(&participant).await?;
            source_pairs.push((participant.container_id().clone(), participant.cycle_id().clone()));
            source_participants.push(participant);
        }

        // 5. 目标：写测量，上架的占用槽位，售出的保持空闲
        let mut destinations = Vec::with_capacity(planned.len());
        let mut destination_pairs: Vec<(ContainerId, CycleId)> = Vec::with_capacity(planned.len());
        let mut first_placed: Option<ContainerId> = None;
        for (spec, label, animal_count) in planned {
            let kind = if spec.destination.is_sold() {
                MeasurementKind::Sale
            } else {
                MeasurementKind::Screening
            };
            let event = MeasurementEvent::new(spec.container_id.clone(), cycle_id.clone(), kind, cmd.date)
                .with_population(
                    animal_count,
                    Some(spec.total_weight_g),
                    Some(sample.animals_per_kg),
                )
                .with_size_class(size_class_id.clone())
                .with_mortality(Some(sample.dead_count), sample.mortality_rate_percent)
                .with_batch(dominant.clone())
                .for_regrouping(regrouping_id.clone())
                .with_notes(spec.notes.clone());
            uow.measurements().append(&event).await?;

            if let Destination::Placed(position) = &spec.destination {
                // 重新读取：该容器可能刚作为来源被释放
                let mut container = uow
                    .containers()
                    .find_by_id_for_update(&spec.container_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("container", &spec.container_id))?;
                let claimed = self
                    .allocator
                    .claim(uow, &mut container, position, cycle_id.clone())
                    .await;
                metrics::record_position_claim(claimed.is_ok());
                claimed?;
                first_placed.get_or_insert_with(|| spec.container_id.clone());
            }

            let participant = DestinationParticipant {
                id: ParticipantId::new(),
                regrouping_id: regrouping_id.clone(),
                container_id: spec.container_id.clone(),
                container_label: label,
                destination: spec.destination.clone(),
                sample: Some(cmd.sample),
                total_weight_g: spec.total_weight_g,
                animal_count,
                animals_per_kg: sample.animals_per_kg,
                size_class_id: size_class_id.clone(),
                mortality_rate: sample.mortality_rate_percent,
                cycle_id: Some(cycle_id.clone()),
                notes: spec.notes.clone(),
            };
            uow.regroupings().insert_destination(&participant).await?;

            debug!(
                container_id = %participant.container_id,
                destination = participant.destination.type_name(),
                animal_count,
                "Instant destination applied"
            );
            destination_pairs.push((participant.container_id.clone(), cycle_id.clone()));
            destinations.push(participant);
        }

        // 起始周期跟随第一个上架目标；全部售出时按来源周期处理
        match first_placed {
            Some(container_id) => {
                cycle.move_to(container_id);
                uow.cycles().update(&cycle).await?;
            }
            None => {
                self.settle_source_cycle(uow, &mut cycle, &originating_id, &source_ids, cmd.date)
                    .await?;
            }
        }

        // 6. 谱系与批次台账
        self.lineage
            .record_bipartite(uow, &regrouping_id, &source_pairs, &destination_pairs)
            .await?;

        let mut inflows = Vec::with_capacity(destinations.len());
        for destination in &destinations {
            let references = self
                .lineage
                .propagate_composition(
                    uow,
                    &regrouping_id,
                    (&destination.container_id, &cycle_id),
                    &aggregate,
                    destination.animal_count,
                )
                .await?;
            inflows.push(TransferIn {
                container_id: destination.container_id.clone(),
                cycle_id: cycle_id.clone(),
                sold: destination.destination.is_sold(),
                references,
            });
        }
        let ledger_entries = self
            .lineage
            .record_ledger(
                uow,
                &regrouping,
                cmd.date,
                &outflows,
                &inflows,
                &aggregate,
                mass_balance.mortality_loss,
            )
            .await?;

        regrouping.complete(Utc::now())?;
        uow.regroupings().update(&regrouping).await?;

        Ok(InstantOutcome {
            regrouping,
            cycle_id,
            sample,
            size_class_id,
            sources: source_participants,
            destinations,
            mass_balance,
            ledger_entries,
        })
    }
}
