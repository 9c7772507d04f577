//! 数据库错误映射工具
//!
//! 提供统一的 SQLx 错误到 AppError 的转换

use errors::AppError;

/// 将 SQLx 错误转换为 AppError，区分不同错误类型
pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::consistency("Record not found"),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // 唯一约束：槽位已被占用、序列号或幂等键重复
            Some("23505") => AppError::conflict(format!(
                "Unique constraint violated{}",
                db_err
                    .constraint()
                    .map(|c| format!(" ({})", c))
                    .unwrap_or_default()
            )),
            // 串行化失败 / 死锁
            Some("40001") | Some("40P01") => {
                AppError::transaction_aborted(format!("Transaction aborted: {}", db_err))
            }
            Some("23P01") => AppError::validation(format!(
                "Exclusion constraint violated{}",
                db_err
                    .constraint()
                    .map(|c| format!(" ({})", c))
                    .unwrap_or_default()
            )),
            Some("23503") => AppError::validation("Foreign key constraint violation"),
            Some("23514") => AppError::validation("Check constraint violation"),
            Some("23502") => AppError::validation("Not null constraint violation"),
            Some("22P02") => AppError::validation("Invalid input syntax"),
            Some(code) => AppError::database(format!("Database error ({}): {}", code, db_err)),
            None => AppError::database(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut => {
            AppError::transaction_aborted("Database connection pool timeout")
        }
        sqlx::Error::Io(io) => AppError::transaction_aborted(format!("Connection lost: {}", io)),
        sqlx::Error::PoolClosed => AppError::internal("Database connection pool is closed"),
        sqlx::Error::Protocol(msg) => {
            AppError::internal(format!("Database protocol error: {}", msg))
        }
        _ => AppError::database(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Consistency(_)));
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_pool_closed() {
        let err = map_sqlx_error(sqlx::Error::PoolClosed);
        assert!(matches!(err, AppError::Internal(_)));
    }
}
