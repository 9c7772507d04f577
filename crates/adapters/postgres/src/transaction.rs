//! PostgreSQL 事务管理

use std::str::FromStr;

use errors::{AppError, AppResult};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::map_sqlx_error;

/// 事务隔离级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// 读已提交（PostgreSQL 默认）
    ReadCommitted,
    /// 可重复读
    RepeatableRead,
    /// 可串行化
    #[default]
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            other => Err(AppError::validation(format!(
                "Unknown isolation level: {}",
                other
            ))),
        }
    }
}

/// 事务选项
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// 生成 SET TRANSACTION 语句
    pub fn to_sql(&self) -> String {
        format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            self.isolation_level.as_sql()
        )
    }
}

/// 开始带选项的事务
pub async fn begin_with_options(
    pool: &PgPool,
    options: &TransactionOptions,
) -> AppResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    sqlx::query(&options.to_sql())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

    debug!(isolation = options.isolation_level.as_sql(), "Transaction started");
    Ok(tx)
}
