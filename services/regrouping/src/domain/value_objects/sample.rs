//! 抽样输入

use serde::{Deserialize, Serialize};

/// 一次抽样的原始数据
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleInput {
    /// 样本重量（克）
    pub sample_weight_g: f64,
    /// 样本中活体数量
    pub live_count: i64,
    /// 样本中死亡数量
    pub dead_count: i64,
}

impl SampleInput {
    pub fn new(sample_weight_g: f64, live_count: i64, dead_count: i64) -> Self {
        Self {
            sample_weight_g,
            live_count,
            dead_count,
        }
    }
}
