//! Regrouping Service Library
//!
//! 分箱重组：把若干在养容器的动物合并、称重抽样后重新分配到目标容器，
//! 同时维护槽位占用、生产周期、批次谱系与批次台账。
//!
//! 模块化架构：
//! - `domain`: 实体、值对象、领域服务、仓储接口与工作单元
//! - `application`: 命令、查询与服务入口（两阶段流程与即时重组）
//! - `infrastructure`: 持久化（PostgreSQL / 内存）、通知发布与指标

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::ServiceHandler;
pub use infrastructure::events::{InMemoryEventBus, LoggingEventPublisher, NoOpEventPublisher};
pub use infrastructure::persistence::{InMemoryStore, PostgresUnitOfWorkFactory};
