//! 计数器仓储

use async_trait::async_trait;
use errors::AppResult;

/// 原子计数器
///
/// `next_value` 必须是原子自增：并发调用者不能拿到同一个值，
/// 工作单元回滚时自增一并撤销。
#[async_trait]
pub trait SequenceRepository: Send + Sync {
    async fn next_value(&self, name: &str) -> AppResult<i64>;
}
