//! 领域事件

mod regrouping_events;

pub use regrouping_events::*;
