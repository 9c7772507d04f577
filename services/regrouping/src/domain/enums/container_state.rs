//! 容器状态

use serde::{Deserialize, Serialize};

/// 容器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// 空闲，可作为目标
    #[default]
    Available,
    /// 在养，持有一个活动周期
    Active,
    /// 已退出使用
    Sold,
}

text_enum!(ContainerState {
    Available => "available",
    Active => "active",
    Sold => "sold",
});
