//! 通知发布者实现

use std::sync::Arc;

use async_trait::async_trait;
use errors::AppResult;
use ports::EventPublisher;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 空发布者（不做任何事）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_raw(&self, topic: &str, _payload: &str) -> AppResult<()> {
        debug!(topic, "Notification dropped (no-op publisher)");
        Ok(())
    }
}

/// 只写日志的发布者
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher;

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish_raw(&self, topic: &str, payload: &str) -> AppResult<()> {
        info!(topic, payload, "Notification published");
        Ok(())
    }
}

/// 已发布的一条通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedNotification {
    pub topic: String,
    pub payload: String,
}

impl PublishedNotification {
    /// 解析负载
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }
}

/// 内存事件总线（用于测试和嵌入式使用）
#[derive(Clone)]
pub struct InMemoryEventBus {
    events: Arc<RwLock<Vec<PublishedNotification>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// 获取所有发布的通知
    pub async fn get_events(&self) -> Vec<PublishedNotification> {
        self.events.read().await.clone()
    }

    /// 按主题过滤
    pub async fn events_for(&self, topic: &str) -> Vec<PublishedNotification> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    /// 清空通知
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish_raw(&self, topic: &str, payload: &str) -> AppResult<()> {
        debug!(topic, "Notification captured");
        self.events.write().await.push(PublishedNotification {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::EventPublisherExt;

    #[tokio::test]
    async fn test_in_memory_bus_records_and_clears() {
        let bus = InMemoryEventBus::new();
        bus.publish("regrouping_completed", &serde_json::json!({ "number": 7 }))
            .await
            .unwrap();
        bus.publish_raw("regrouping_cancelled", "{}").await.unwrap();

        let completed = bus.events_for("regrouping_completed").await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].json().unwrap()["number"], 7);
        assert_eq!(bus.get_events().await.len(), 2);

        bus.clear().await;
        assert!(bus.get_events().await.is_empty());
    }
}
