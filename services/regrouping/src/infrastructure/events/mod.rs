//! 通知发布实现

mod event_publisher;

pub use event_publisher::*;
