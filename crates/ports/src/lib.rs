//! ports - 抽象 trait 层
//!
//! 定义核心依赖的基础设施接口

mod event_publisher;

pub use event_publisher::*;
