//! 多步骤重组流程
//!
//! 草稿 → 登记来源 → 登记目标 → 提交/取消。参与者可以分次登记、单独移除；
//! 提交时关闭全部来源周期、为每个目标开启新周期，并写入谱系与批次台账。

use std::collections::HashSet;

use chrono::Utc;
use common::with_conditional_retry;
use domain_core::Entity;
use errors::{AppError, AppResult};
use tracing::{debug, info, warn};

use super::commands::*;
use super::handler::{ServiceHandler, finish};
use super::results::CompletionOutcome;
use crate::domain::entities::{
    Cycle, DestinationParticipant, MeasurementEvent, Regrouping, SourceParticipant,
};
use crate::domain::enums::{MeasurementKind, RegroupingKind};
use crate::domain::events::RegroupingDomainEvent;
use crate::domain::services::{
    BatchComposition, MassBalance, TransferIn, TransferOut, classify, compute_sample,
    extrapolate_count,
};
use crate::domain::unit_of_work::UnitOfWork;
use crate::domain::value_objects::{
    ContainerId, CycleId, Destination, ParticipantId, RegroupingId, SlotPosition,
};
use crate::infrastructure::observability::metrics::{self, CommitTimer};

impl ServiceHandler {
    // ========== 草稿 ==========

    /// 创建重组草稿并分配编号
    pub async fn create_regrouping_draft(
        &self,
        cmd: CreateRegroupingCommand,
    ) -> AppResult<Regrouping> {
        cmd.validate()?;

        let regrouping = with_conditional_retry(
            &self.retry,
            "create_regrouping_draft",
            || self.create_draft_once(&cmd),
            AppError::is_retryable,
        )
        .await?;

        info!(
            regrouping_id = %regrouping.id(),
            number = regrouping.number(),
            date = %regrouping.date(),
            "Regrouping draft created"
        );
        Ok(regrouping)
    }

    async fn create_draft_once(&self, cmd: &CreateRegroupingCommand) -> AppResult<Regrouping> {
        let uow = self.uow_factory.begin().await?;
        let result = self.insert_draft(uow.as_ref(), cmd).await;
        finish(uow, result).await
    }

    async fn insert_draft(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &CreateRegroupingCommand,
    ) -> AppResult<Regrouping> {
        if let Some(size_class_id) = &cmd.reference_size_class_id {
            let catalog = uow.size_classes().list().await?;
            if !catalog.iter().any(|class| &class.id == size_class_id) {
                return Err(AppError::not_found("size class", size_class_id));
            }
        }

        let number = self.sequence.next(uow).await?;
        let regrouping = Regrouping::new_workflow(number, cmd.date)
            .with_purpose(cmd.purpose.clone())
            .with_notes(cmd.notes.clone())
            .with_reference_size_class(cmd.reference_size_class_id.clone());
        uow.regroupings().insert(&regrouping).await?;
        Ok(regrouping)
    }

    // ========== 来源 ==========

    /// 登记来源容器，可多次调用
    pub async fn attach_sources(
        &self,
        cmd: AttachSourcesCommand,
    ) -> AppResult<Vec<SourceParticipant>> {
        cmd.validate()?;

        let uow = self.uow_factory.begin().await?;
        let result = self.stage_sources(uow.as_ref(), &cmd).await;
        let attached = finish(uow, result).await.inspect_err(|e| {
            warn!(regrouping_id = %cmd.regrouping_id, error = %e, "Attaching sources rejected");
            metrics::record_regrouping_rejected(RegroupingKind::Workflow, e);
        })?;

        info!(
            regrouping_id = %cmd.regrouping_id,
            count = attached.len(),
            "Sources attached"
        );
        Ok(attached)
    }

    async fn stage_sources(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &AttachSourcesCommand,
    ) -> AppResult<Vec<SourceParticipant>> {
        let regrouping = self.load_for_update(uow, &cmd.regrouping_id).await?;
        regrouping.ensure_editable()?;

        let existing = uow.regroupings().list_sources(regrouping.id()).await?;
        let catalog = uow.size_classes().list().await?;

        let mut attached = Vec::with_capacity(cmd.container_ids.len());
        for container_id in &cmd.container_ids {
            if existing.iter().any(|s| s.container_id() == container_id) {
                return Err(AppError::validation(format!(
                    "Container {} is already a source of regrouping #{}",
                    container_id,
                    regrouping.number()
                )));
            }

            let source = self
                .load_active_source(uow, container_id, Some(regrouping.date()), &catalog)
                .await?;
            let participant = SourceParticipant::new(regrouping.id().clone(), source.snapshot);
            uow.regroupings().insert_source(&participant).await?;

            debug!(
                regrouping_id = %regrouping.id(),
                container_id = %container_id,
                animal_count = participant.snapshot.animal_count,
                "Source staged"
            );
            attached.push(participant);
        }
        Ok(attached)
    }

    /// 移除一个来源（仅草稿）
    pub async fn remove_source(&self, cmd: RemoveSourceCommand) -> AppResult<()> {
        let uow = self.uow_factory.begin().await?;
        let result = async {
            let regrouping = self.load_for_update(uow.as_ref(), &cmd.regrouping_id).await?;
            regrouping.ensure_editable()?;
            if !uow
                .regroupings()
                .delete_source(&cmd.regrouping_id, &cmd.participant_id)
                .await?
            {
                return Err(AppError::not_found("source participant", &cmd.participant_id));
            }
            Ok(())
        }
        .await;
        finish(uow, result).await?;

        info!(
            regrouping_id = %cmd.regrouping_id,
            participant_id = %cmd.participant_id,
            "Source removed"
        );
        Ok(())
    }

    // ========== 目标 ==========

    /// 登记目标容器（只暂存，稍后由 `complete_regrouping` 提交）
    pub async fn attach_destinations(
        &self,
        cmd: AttachDestinationsCommand,
    ) -> AppResult<Vec<DestinationParticipant>> {
        cmd.validate()?;

        let uow = self.uow_factory.begin().await?;
        let result = self
            .stage_destinations(uow.as_ref(), &cmd.regrouping_id, &cmd.destinations)
            .await;
        let staged = finish(uow, result).await.inspect_err(|e| {
            warn!(regrouping_id = %cmd.regrouping_id, error = %e, "Attaching destinations rejected");
            metrics::record_regrouping_rejected(RegroupingKind::Workflow, e);
        })?;

        info!(
            regrouping_id = %cmd.regrouping_id,
            count = staged.len(),
            "Destinations attached"
        );
        Ok(staged)
    }

    async fn stage_destinations(
        &self,
        uow: &dyn UnitOfWork,
        regrouping_id: &RegroupingId,
        specs: &[DestinationSpec],
    ) -> AppResult<Vec<DestinationParticipant>> {
        let regrouping = self.load_for_update(uow, regrouping_id).await?;
        regrouping.ensure_editable()?;

        let sources = uow.regroupings().list_sources(regrouping_id).await?;
        let existing = uow.regroupings().list_destinations(regrouping_id).await?;
        let catalog = uow.size_classes().list().await?;

        let mut targeted: HashSet<SlotPosition> =
            existing.iter().filter_map(|d| d.position().cloned()).collect();
        let mut staged = Vec::with_capacity(specs.len());

        for spec in specs {
            if existing.iter().any(|d| d.container_id == spec.container_id) {
                return Err(AppError::validation(format!(
                    "Container {} is already a destination of regrouping #{}",
                    spec.container_id,
                    regrouping.number()
                )));
            }

            let container = uow
                .containers()
                .find_by_id(&spec.container_id)
                .await?
                .ok_or_else(|| AppError::not_found("container", &spec.container_id))?;
            if container.is_retired() {
                return Err(AppError::validation(format!(
                    "Container {} is retired",
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
                // 来源会在提交时腾出槽位，因此被来源占用不算冲突
                if let Some(occupant) = uow.containers().find_occupant(position).await? {
                    let freed_by_source = sources.iter().any(|s| s.container_id() == occupant.id());
                    if occupant.id() != container.id() && !freed_by_source {
                        return Err(AppError::conflict(format!(
                            "Position {} is already occupied by container {}",
                            position,
                            occupant.label()
                        )));
                    }
                }
            }

            let measured = compute_sample(&spec.sample)?;
            let animal_count = extrapolate_count(spec.total_weight_g, measured.animals_per_kg)?;
            if animal_count <= 0 {
                return Err(AppError::validation(format!(
                    "Destination {} would hold no animals",
                    container.label()
                )));
            }

            let participant = DestinationParticipant {
                id: ParticipantId::new(),
                regrouping_id: regrouping_id.clone(),
                container_id: spec.container_id.clone(),
                container_label: container.label().to_string(),
                destination: spec.destination.clone(),
                sample: Some(spec.sample),
                total_weight_g: spec.total_weight_g,
                animal_count,
                animals_per_kg: measured.animals_per_kg,
                size_class_id: classify(&catalog, measured.animals_per_kg).map(|c| c.id.clone()),
                mortality_rate: measured.mortality_rate_percent,
                cycle_id: None,
                notes: spec.notes.clone(),
            };
            uow.regroupings().insert_destination(&participant).await?;

            debug!(
                regrouping_id = %regrouping_id,
                container_id = %participant.container_id,
                destination = participant.destination.type_name(),
                animal_count,
                "Destination staged"
            );
            staged.push(participant);
        }
        Ok(staged)
    }

    /// 移除一个目标（仅草稿）
    pub async fn remove_destination(&self, cmd: RemoveDestinationCommand) -> AppResult<()> {
        let uow = self.uow_factory.begin().await?;
        let result = async {
            let regrouping = self.load_for_update(uow.as_ref(), &cmd.regrouping_id).await?;
            regrouping.ensure_editable()?;
            if !uow
                .regroupings()
                .delete_destination(&cmd.regrouping_id, &cmd.participant_id)
                .await?
            {
                return Err(AppError::not_found(
                    "destination participant",
                    &cmd.participant_id,
                ));
            }
            Ok(())
        }
        .await;
        finish(uow, result).await?;

        info!(
            regrouping_id = %cmd.regrouping_id,
            participant_id = %cmd.participant_id,
            "Destination removed"
        );
        Ok(())
    }

    // ========== 提交 ==========

    /// 提交已登记的来源与目标
    pub async fn complete_regrouping(
        &self,
        cmd: CompleteRegroupingCommand,
    ) -> AppResult<CompletionOutcome> {
        with_conditional_retry(
            &self.retry,
            "complete_regrouping",
            || self.complete_once(&cmd.regrouping_id, None),
            AppError::is_retryable,
        )
        .await
    }

    /// 登记目标并立即提交，二者在同一个工作单元内
    pub async fn attach_destinations_and_complete(
        &self,
        cmd: AttachDestinationsCommand,
    ) -> AppResult<CompletionOutcome> {
        cmd.validate()?;

        with_conditional_retry(
            &self.retry,
            "attach_destinations_and_complete",
            || self.complete_once(&cmd.regrouping_id, Some(cmd.destinations.as_slice())),
            AppError::is_retryable,
        )
        .await
    }

    async fn complete_once(
        &self,
        regrouping_id: &RegroupingId,
        staged: Option<&[DestinationSpec]>,
    ) -> AppResult<CompletionOutcome> {
        let timer = CommitTimer::new(RegroupingKind::Workflow);
        let uow = self.uow_factory.begin().await?;
        let result = async {
            if let Some(specs) = staged {
                self.stage_destinations(uow.as_ref(), regrouping_id, specs).await?;
            }
            self.commit_staged(uow.as_ref(), regrouping_id).await
        }
        .await;

        let outcome = match finish(uow, result).await {
            Ok(outcome) => {
                timer.finish(true);
                outcome
            }
            Err(e) => {
                timer.finish(false);
                warn!(regrouping_id = %regrouping_id, error = %e, "Regrouping completion rejected");
                metrics::record_regrouping_rejected(RegroupingKind::Workflow, &e);
                return Err(e);
            }
        };

        metrics::record_regrouping_completed(
            RegroupingKind::Workflow,
            outcome.mass_balance.destination_total,
        );
        info!(
            regrouping_id = %regrouping_id,
            number = outcome.regrouping.number(),
            sources = outcome.sources.len(),
            destinations = outcome.destinations.len(),
            source_total = outcome.mass_balance.source_total,
            destination_total = outcome.mass_balance.destination_total,
            "Regrouping completed"
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

    async fn commit_staged(
        &self,
        uow: &dyn UnitOfWork,
        regrouping_id: &RegroupingId,
    ) -> AppResult<CompletionOutcome> {
        let mut regrouping = self.load_for_update(uow, regrouping_id).await?;
        regrouping.ensure_editable()?;
        let date = regrouping.date();

        let sources = uow.regroupings().list_sources(regrouping_id).await?;
        let mut destinations = uow.regroupings().list_destinations(regrouping_id).await?;
        if sources.is_empty() {
            return Err(AppError::validation(format!(
                "Regrouping #{} has no source containers",
                regrouping.number()
            )));
        }
        if destinations.is_empty() {
            return Err(AppError::validation(format!(
                "Regrouping #{} has no destination containers",
                regrouping.number()
            )));
        }

        let mass_balance = MassBalance::from_counts(
            sources.iter().map(|s| s.snapshot.animal_count),
            destinations.iter().map(|d| d.animal_count),
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

        // 1. 锁定来源并确认登记后未被改动
        let mut source_states = Vec::with_capacity(sources.len());
        for source in &sources {
            let container = uow
                .containers()
                .find_by_id_for_update(source.container_id())
                .await?
                .ok_or_else(|| AppError::not_found("container", source.container_id()))?;
            if !container.is_active() || container.current_cycle_id() != Some(source.cycle_id()) {
                return Err(AppError::conflict(format!(
                    "Source container {} changed since it was attached",
                    container.label()
                )));
            }
            let cycle = uow
                .cycles()
                .find_by_id(source.cycle_id())
                .await?
                .ok_or_else(|| AppError::not_found("cycle", source.cycle_id()))?;
            if !cycle.is_active() {
                return Err(AppError::conflict(format!(
                    "Cycle of source container {} was closed by another operation",
                    container.label()
                )));
            }
            source_states.push((container, cycle));
        }

        // 2. 非来源的目标不能正在养殖
        let source_ids: HashSet<ContainerId> =
            sources.iter().map(|s| s.container_id().clone()).collect();
        for destination in &destinations {
            if source_ids.contains(&destination.container_id) {
                continue;
            }
            let container = uow
                .containers()
                .find_by_id_for_update(&destination.container_id)
                .await?
                .ok_or_else(|| AppError::not_found("container", &destination.container_id))?;
            if container.is_retired() {
                return Err(AppError::validation(format!(
                    "Container {} is retired",
                    container.label()
                )));
            }
            if container.is_active() {
                return Err(AppError::conflict(format!(
                    "Destination container {} already has an active cycle",
                    container.label()
                )));
            }
        }

        // 3. 汇总批次组成
        let mut aggregate = BatchComposition::new();
        let mut outflows = Vec::with_capacity(sources.len());
        for source in &sources {
            let composition = self.lineage.source_composition(uow, &source.snapshot).await?;
            aggregate.merge(&composition);
            outflows.push(TransferOut {
                container_id: source.container_id().clone(),
                cycle_id: source.cycle_id().clone(),
                composition,
            });
        }
        let dominant = aggregate.dominant().cloned();

        // 4. 关闭来源：写测量、关周期、释放槽位
        for ((mut container, mut cycle), source) in source_states.into_iter().zip(&sources) {
            let snapshot = &source.snapshot;
            let closing = MeasurementEvent::new(
                container.id().clone(),
                cycle.id().clone(),
                MeasurementKind::RegroupingSource,
                date,
            )
            .with_population(snapshot.animal_count, snapshot.total_weight_g, snapshot.animals_per_kg)
            .with_size_class(snapshot.size_class_id.clone())
            .with_batch(snapshot.batch_id.clone())
            .for_regrouping(regrouping_id.clone());
            uow.measurements().append(&closing).await?;

            self.settle_source_cycle(uow, &mut cycle, container.id(), &source_ids, date)
                .await?;
            self.allocator.release(uow, &mut container).await?;

            debug!(container_id = %container.id(), "Source closed");
        }

        // 5. 开启目标：新周期、首次激活测量，售出或上架
        let mut opened: Vec<(ContainerId, CycleId)> = Vec::with_capacity(destinations.len());
        for destination in destinations.iter_mut() {
            let mut container = uow
                .containers()
                .find_by_id_for_update(&destination.container_id)
                .await?
                .ok_or_else(|| AppError::not_found("container", &destination.container_id))?;

            let mut cycle = Cycle::open(container.id().clone(), date, dominant.clone());
            uow.cycles().insert(&cycle).await?;

            let activation = MeasurementEvent::new(
                container.id().clone(),
                cycle.id().clone(),
                MeasurementKind::FirstActivation,
                date,
            )
            .with_population(
                destination.animal_count,
                Some(destination.total_weight_g),
                Some(destination.animals_per_kg),
            )
            .with_size_class(destination.size_class_id.clone())
            .with_mortality(
                destination.sample.map(|s| s.dead_count),
                destination.mortality_rate,
            )
            .with_batch(dominant.clone())
            .for_regrouping(regrouping_id.clone())
            .with_notes(destination.notes.clone());
            uow.measurements().append(&activation).await?;

            match &destination.destination {
                Destination::Sold => {
                    let sale = MeasurementEvent::new(
                        container.id().clone(),
                        cycle.id().clone(),
                        MeasurementKind::Sale,
                        date,
                    )
                    .with_population(
                        destination.animal_count,
                        Some(destination.total_weight_g),
                        Some(destination.animals_per_kg),
                    )
                    .with_size_class(destination.size_class_id.clone())
                    .with_batch(dominant.clone())
                    .for_regrouping(regrouping_id.clone());
                    uow.measurements().append(&sale).await?;

                    cycle.close(date)?;
                    uow.cycles().update(&cycle).await?;
                }
                Destination::Placed(position) => {
                    let claimed = self
                        .allocator
                        .claim(uow, &mut container, position, cycle.id().clone())
                        .await;
                    metrics::record_position_claim(claimed.is_ok());
                    claimed?;
                }
            }

            destination.cycle_id = Some(cycle.id().clone());
            uow.regroupings().update_destination(destination).await?;
            opened.push((container.id().clone(), cycle.id().clone()));

            debug!(
                container_id = %container.id(),
                destination = destination.destination.type_name(),
                "Destination opened"
            );
        }

        // 6. 谱系与批次台账
        let source_pairs: Vec<(ContainerId, CycleId)> = sources
            .iter()
            .map(|s| (s.container_id().clone(), s.cycle_id().clone()))
            .collect();
        let edges = self
            .lineage
            .record_bipartite(uow, regrouping_id, &source_pairs, &opened)
            .await?;

        let mut inflows = Vec::with_capacity(destinations.len());
        for (destination, (container_id, cycle_id)) in destinations.iter().zip(&opened) {
            let references = self
                .lineage
                .propagate_composition(
                    uow,
                    regrouping_id,
                    (container_id, cycle_id),
                    &aggregate,
                    destination.animal_count,
                )
                .await?;
            inflows.push(TransferIn {
                container_id: container_id.clone(),
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
                date,
                &outflows,
                &inflows,
                &aggregate,
                mass_balance.mortality_loss,
            )
            .await?;

        // 7. 完成
        regrouping.complete(Utc::now())?;
        uow.regroupings().update(&regrouping).await?;

        Ok(CompletionOutcome {
            regrouping,
            mass_balance,
            sources,
            destinations,
            edges: edges.len(),
            ledger_entries,
        })
    }

    // ========== 取消 ==========

    /// 取消草稿，不影响任何容器
    pub async fn cancel_regrouping(&self, cmd: CancelRegroupingCommand) -> AppResult<Regrouping> {
        cmd.validate()?;

        let uow = self.uow_factory.begin().await?;
        let result = async {
            let mut regrouping = self.load_for_update(uow.as_ref(), &cmd.regrouping_id).await?;
            regrouping.cancel(cmd.reason.clone())?;
            uow.regroupings().update(&regrouping).await?;
            Ok::<_, AppError>(regrouping)
        }
        .await;
        let regrouping = finish(uow, result).await?;

        metrics::record_regrouping_cancelled();
        info!(
            regrouping_id = %regrouping.id(),
            number = regrouping.number(),
            "Regrouping cancelled"
        );

        self.notify(RegroupingDomainEvent::Cancelled {
            regrouping_id: regrouping.id().clone(),
            number: regrouping.number(),
            reason: regrouping.cancellation_reason().map(str::to_string),
            timestamp: Utc::now(),
        })
        .await;

        Ok(regrouping)
    }
}

/// 完成通知
pub(super) fn completed_event(
    regrouping: &Regrouping,
    source_labels: Vec<String>,
    destination_labels: Vec<String>,
    mass_balance: &MassBalance,
) -> RegroupingDomainEvent {
    RegroupingDomainEvent::Completed {
        regrouping_id: regrouping.id().clone(),
        number: regrouping.number(),
        kind: regrouping.kind(),
        date: regrouping.date(),
        source_labels,
        destination_labels,
        source_total: mass_balance.source_total,
        destination_total: mass_balance.destination_total,
        mortality_loss: mass_balance.mortality_loss,
        timestamp: Utc::now(),
    }
}
