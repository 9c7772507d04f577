//! 应用层：命令、查询与服务入口

pub mod commands;
pub mod handler;
mod instant;
pub mod queries;
mod query_handler;
pub mod results;
mod workflow;

pub use commands::*;
pub use handler::ServiceHandler;
pub use queries::*;
pub use results::*;
