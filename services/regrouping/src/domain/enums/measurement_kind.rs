//! 测量事件类型

use serde::{Deserialize, Serialize};

/// 测量事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// 首次启用（新周期的第一条记录）
    FirstActivation,
    WeightCheck,
    SizeCheck,
    /// 即时分选
    Screening,
    /// 重组来源关闭
    RegroupingSource,
    /// 重组目标
    RegroupingDestination,
    /// 售出
    Sale,
}

text_enum!(MeasurementKind {
    FirstActivation => "first_activation",
    WeightCheck => "weight_check",
    SizeCheck => "size_check",
    Screening => "screening",
    RegroupingSource => "regrouping_source",
    RegroupingDestination => "regrouping_destination",
    Sale => "sale",
});
