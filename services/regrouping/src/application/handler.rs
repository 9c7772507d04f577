//! 重组服务入口
//!
//! 每个公开操作只开启一个工作单元：校验与全部写入都在其中完成，失败即回滚。
//! 通知在提交之后发送，发送失败只记日志。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use common::RetryConfig;
use config::RegroupingConfig;
use errors::{AppError, AppResult};
use event_core::{EventEnvelope, EventMetadata};
use ports::EventPublisher;
use tracing::{debug, warn};

use crate::domain::entities::{Container, Cycle, Regrouping, SizeClass, SourceSnapshot};
use crate::domain::enums::MeasurementKind;
use crate::domain::events::RegroupingDomainEvent;
use crate::domain::services::{LineageTracker, PositionAllocator, SequenceGenerator, classify};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use crate::domain::value_objects::{ContainerId, RegroupingId, RowLabel};
use crate::infrastructure::observability::metrics;

pub struct ServiceHandler {
    pub(super) uow_factory: Arc<dyn UnitOfWorkFactory>,
    pub(super) publisher: Arc<dyn EventPublisher>,
    pub(super) config: RegroupingConfig,
    pub(super) allocator: PositionAllocator,
    pub(super) lineage: LineageTracker,
    pub(super) sequence: SequenceGenerator,
    pub(super) retry: RetryConfig,
}

/// 在养来源的当前状态
pub(super) struct ActiveSource {
    pub container: Container,
    pub cycle: Cycle,
    pub snapshot: SourceSnapshot,
}

impl ServiceHandler {
    pub fn new(
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        publisher: Arc<dyn EventPublisher>,
        config: RegroupingConfig,
    ) -> AppResult<Self> {
        let rows = RowLabel::parse_all(&config.default_row_labels)?;
        Ok(Self {
            uow_factory,
            publisher,
            allocator: PositionAllocator::new(rows)?,
            lineage: LineageTracker::new(),
            sequence: SequenceGenerator::new(config.sequence_name.clone()),
            retry: RetryConfig::new(3, Duration::from_millis(20), Duration::from_millis(200)),
            config,
        })
    }

    /// 覆盖事务中止时的重试策略
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &RegroupingConfig {
        &self.config
    }

    pub fn allocator(&self) -> &PositionAllocator {
        &self.allocator
    }

    // ========== 内部辅助 ==========

    pub(super) async fn load_for_update(
        &self,
        uow: &dyn UnitOfWork,
        regrouping_id: &RegroupingId,
    ) -> AppResult<Regrouping> {
        uow.regroupings()
            .find_by_id_for_update(regrouping_id)
            .await?
            .ok_or_else(|| AppError::not_found("regrouping", regrouping_id))
    }

    /// 读取并锁定在养来源，生成快照
    ///
    /// 给出 `date` 时，来源在该日期之后已有测量则拒绝。
    pub(super) async fn load_active_source(
        &self,
        uow: &dyn UnitOfWork,
        container_id: &ContainerId,
        date: Option<NaiveDate>,
        catalog: &[SizeClass],
    ) -> AppResult<ActiveSource> {
        let container = uow
            .containers()
            .find_by_id_for_update(container_id)
            .await?
            .ok_or_else(|| AppError::not_found("container", container_id))?;

        let Some(cycle_id) = container
            .current_cycle_id()
            .filter(|_| container.is_active())
            .cloned()
        else {
            return Err(self.inactive_source_error(uow, &container).await?);
        };

        let cycle = uow
            .cycles()
            .find_by_id(&cycle_id)
            .await?
            .ok_or_else(|| AppError::not_found("cycle", &cycle_id))?;
        if !cycle.is_active() {
            return Err(AppError::validation(format!(
                "Cycle of container {} is already closed",
                container.label()
            )));
        }

        if let Some(date) = date {
            if uow.measurements().exists_after(container_id, date).await? {
                return Err(AppError::validation(format!(
                    "Container {} has measurements dated after {}",
                    container.label(),
                    date
                )));
            }
        }

        let latest = uow
            .measurements()
            .latest_for_container(container_id, &cycle_id)
            .await?
            .ok_or_else(|| {
                AppError::validation(format!(
                    "Container {} has no measurement in its current cycle",
                    container.label()
                ))
            })?;
        let animal_count = latest.animal_count.ok_or_else(|| {
            AppError::validation(format!(
                "Latest measurement of container {} carries no animal count",
                container.label()
            ))
        })?;

        let size_class_id = latest.size_class_id.clone().or_else(|| {
            latest
                .animals_per_kg
                .and_then(|apk| classify(catalog, apk))
                .map(|class| class.id.clone())
        });

        let snapshot = SourceSnapshot {
            container_id: container.id().clone(),
            container_label: container.label().to_string(),
            cycle_id: cycle_id.clone(),
            placement: container.placement().cloned(),
            animal_count,
            total_weight_g: latest.total_weight_g,
            animals_per_kg: latest.animals_per_kg,
            size_class_id,
            batch_id: latest.batch_id.clone().or_else(|| cycle.batch_id().cloned()),
        };

        debug!(
            container_id = %snapshot.container_id,
            animal_count,
            "Source snapshot taken"
        );

        Ok(ActiveSource {
            container,
            cycle,
            snapshot,
        })
    }

    /// 来源已不在养时的错误
    ///
    /// 最近一次是被重组腾出的（并发操作先一步提交）返回 Conflict，
    /// 从未在养或正常售出的返回 Validation。
    async fn inactive_source_error(
        &self,
        uow: &dyn UnitOfWork,
        container: &Container,
    ) -> AppResult<AppError> {
        let released_by = uow
            .measurements()
            .last_for_container(container.id())
            .await?
            .filter(|m| m.kind != MeasurementKind::Sale)
            .and_then(|m| m.regrouping_id);

        Ok(match released_by {
            Some(regrouping_id) => AppError::conflict(format!(
                "Container {} was already released by regrouping {}",
                container.label(),
                regrouping_id
            )),
            None => AppError::validation(format!(
                "Container {} has no active cycle",
                container.label()
            )),
        })
    }

    /// 来源腾出后处理其周期
    ///
    /// 即时分选后一个周期可能由多个容器共用：仍有来源以外的容器在养时，
    /// 周期移交给该容器；否则按 `date` 关闭。
    pub(super) async fn settle_source_cycle(
        &self,
        uow: &dyn UnitOfWork,
        cycle: &mut Cycle,
        released: &ContainerId,
        sources: &HashSet<ContainerId>,
        date: NaiveDate,
    ) -> AppResult<()> {
        let holder = uow
            .containers()
            .list_placed_active()
            .await?
            .into_iter()
            .find(|c| c.current_cycle_id() == Some(cycle.id()) && !sources.contains(c.id()));

        match holder {
            Some(holder) if cycle.container_id() == released => {
                debug!(cycle_id = %cycle.id(), container_id = %holder.id(), "Shared cycle handed over");
                cycle.move_to(holder.id().clone());
            }
            Some(_) => return Ok(()),
            None => cycle.close(date)?,
        }
        uow.cycles().update(cycle).await
    }

    /// 发送通知；失败只记录，不影响已提交的结果
    pub(super) async fn notify(&self, event: RegroupingDomainEvent) {
        let envelope = EventEnvelope::new(event, 1, EventMetadata::default());
        let topic = envelope.event_type.clone();

        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to encode notification");
                metrics::record_notification_failed(&topic);
                return;
            }
        };

        if let Err(e) = self.publisher.publish_raw(&topic, &payload).await {
            warn!(topic = %topic, error = %e, "Failed to publish notification");
            metrics::record_notification_failed(&topic);
        }
    }
}

/// 成功则提交，失败则回滚并返回原错误
pub(super) async fn finish<T>(uow: Box<dyn UnitOfWork>, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// 只读操作：总是回滚
pub(super) async fn discard<T>(uow: Box<dyn UnitOfWork>, result: AppResult<T>) -> AppResult<T> {
    if let Err(e) = uow.rollback().await {
        warn!(error = %e, "Rollback of read-only unit of work failed");
    }
    result
}
