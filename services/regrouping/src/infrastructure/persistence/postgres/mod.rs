//! PostgreSQL 持久化
//!
//! 一个工作单元对应一个数据库事务，所有仓储共享该事务。

mod repositories;
mod rows;

use std::sync::Arc;

use adapter_postgres::{TransactionOptions, begin_with_options, map_sqlx_error};
use async_trait::async_trait;
use errors::{AppError, AppResult};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::repositories::{
    BatchRepository, ContainerRepository, CycleRepository, LineageRepository,
    MeasurementRepository, RearingUnitRepository, RegroupingRepository, SequenceRepository,
    SizeClassRepository,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

pub use repositories::*;

/// Shared transaction type
pub type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// Postgres Unit of Work 工厂
pub struct PostgresUnitOfWorkFactory {
    pool: PgPool,
    options: TransactionOptions,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            options: TransactionOptions::new(),
        }
    }

    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = begin_with_options(&self.pool, &self.options).await?;
        Ok(Box::new(PostgresUnitOfWork::new(tx)))
    }
}

/// Postgres Unit of Work 实现
pub struct PostgresUnitOfWork {
    tx: SharedTx,
    unit_repo: TxUnitRepository,
    container_repo: TxContainerRepository,
    cycle_repo: TxCycleRepository,
    measurement_repo: TxMeasurementRepository,
    batch_repo: TxBatchRepository,
    size_class_repo: TxSizeClassRepository,
    regrouping_repo: TxRegroupingRepository,
    lineage_repo: TxLineageRepository,
    sequence_repo: TxSequenceRepository,
}

impl PostgresUnitOfWork {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        let tx = Arc::new(Mutex::new(Some(tx)));

        Self {
            unit_repo: TxUnitRepository::new(tx.clone()),
            container_repo: TxContainerRepository::new(tx.clone()),
            cycle_repo: TxCycleRepository::new(tx.clone()),
            measurement_repo: TxMeasurementRepository::new(tx.clone()),
            batch_repo: TxBatchRepository::new(tx.clone()),
            size_class_repo: TxSizeClassRepository::new(tx.clone()),
            regrouping_repo: TxRegroupingRepository::new(tx.clone()),
            lineage_repo: TxLineageRepository::new(tx.clone()),
            sequence_repo: TxSequenceRepository::new(tx.clone()),
            tx,
        }
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn units(&self) -> &dyn RearingUnitRepository {
        &self.unit_repo
    }

    fn containers(&self) -> &dyn ContainerRepository {
        &self.container_repo
    }

    fn cycles(&self) -> &dyn CycleRepository {
        &self.cycle_repo
    }

    fn measurements(&self) -> &dyn MeasurementRepository {
        &self.measurement_repo
    }

    fn batches(&self) -> &dyn BatchRepository {
        &self.batch_repo
    }

    fn size_classes(&self) -> &dyn SizeClassRepository {
        &self.size_class_repo
    }

    fn regroupings(&self) -> &dyn RegroupingRepository {
        &self.regrouping_repo
    }

    fn lineage(&self) -> &dyn LineageRepository {
        &self.lineage_repo
    }

    fn sequences(&self) -> &dyn SequenceRepository {
        &self.sequence_repo
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        // 串行化冲突可能在提交时才出现，需要映射为可重试错误
        tx.commit().await.map_err(map_sqlx_error)?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        tx.rollback().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}
