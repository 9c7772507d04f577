//! 领域服务

pub mod balanced_rounding;
pub mod lineage_tracker;
pub mod mass_balance;
pub mod mortality;
pub mod position_allocator;
pub mod sequence_generator;
pub mod size_classifier;

pub use lineage_tracker::{BatchComposition, LineageTracker, TransferIn, TransferOut};
pub use mass_balance::{MassBalance, total_animals};
pub use mortality::{SampleMeasurement, compute_sample, extrapolate_count};
pub use position_allocator::{AvailablePosition, PositionAllocator, PositionScope};
pub use sequence_generator::SequenceGenerator;
pub use size_classifier::{classify, ensure_disjoint};
