//! 周期状态

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Active,
    Closed,
}

text_enum!(CycleState {
    Active => "active",
    Closed => "closed",
});
