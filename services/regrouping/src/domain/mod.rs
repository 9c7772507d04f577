//! 领域层
//!
//! 实体、值对象、枚举、仓储接口、领域服务、领域事件和工作单元

pub mod entities;
pub mod enums;
pub mod events;
pub mod repositories;
pub mod services;
pub mod unit_of_work;
pub mod value_objects;

pub use entities::*;
pub use enums::*;
pub use events::*;
pub use repositories::*;
pub use unit_of_work::*;
pub use value_objects::*;
