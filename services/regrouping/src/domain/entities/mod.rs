//! 实体

mod batch;
mod container;
mod cycle;
mod lineage;
mod measurement;
mod participants;
mod rearing_unit;
mod regrouping;
mod size_class;

pub use batch::*;
pub use container::*;
pub use cycle::*;
pub use lineage::*;
pub use measurement::*;
pub use participants::*;
pub use rearing_unit::*;
pub use regrouping::*;
pub use size_class::*;
