//! 仓储接口

mod container_repository;
mod lineage_repository;
mod measurement_repository;
mod regrouping_repository;
mod sequence_repository;
mod unit_repository;

pub use container_repository::*;
pub use lineage_repository::*;
pub use measurement_repository::*;
pub use regrouping_repository::*;
pub use sequence_repository::*;
pub use unit_repository::*;
