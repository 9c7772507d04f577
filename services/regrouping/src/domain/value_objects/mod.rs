//! 值对象

mod ids;
mod position;
mod sample;

pub use ids::*;
pub use position::*;
pub use sample::*;
