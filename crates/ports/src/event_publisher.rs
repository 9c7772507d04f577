//! Event Publisher trait 定义

use async_trait::async_trait;
use errors::{AppError, AppResult};
use serde::Serialize;

/// 事件发布者 trait
///
/// 通知是"发出即忘"的：调用方不依赖投递成功。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布原始 JSON 字符串
    async fn publish_raw(&self, topic: &str, payload: &str) -> AppResult<()>;
}

/// 为所有发布者提供序列化发布
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    /// 序列化为 JSON 后发布
    async fn publish<E: Serialize + Send + Sync>(&self, topic: &str, event: &E) -> AppResult<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::internal(format!("Failed to serialize event: {}", e)))?;
        self.publish_raw(topic, &payload).await
    }
}

impl<T: EventPublisher + ?Sized> EventPublisherExt for T {}
