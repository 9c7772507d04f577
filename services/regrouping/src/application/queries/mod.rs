//! 查询

use chrono::NaiveDate;

use crate::domain::services::PositionScope;
use crate::domain::value_objects::{ContainerId, RegroupingId, SampleInput, UnitId};

/// 列出空闲槽位
#[derive(Debug, Clone)]
pub struct ListAvailablePositionsQuery {
    pub scope: PositionScope,
    /// 该单元的槽位排在最前
    pub origin_unit_id: Option<UnitId>,
    /// 该容器当前占用的槽位视为空闲
    pub exclude_occupied_by: Option<ContainerId>,
}

impl ListAvailablePositionsQuery {
    pub fn all() -> Self {
        Self {
            scope: PositionScope::All,
            origin_unit_id: None,
            exclude_occupied_by: None,
        }
    }

    pub fn unit(unit_id: UnitId) -> Self {
        Self {
            scope: PositionScope::Unit(unit_id),
            origin_unit_id: None,
            exclude_occupied_by: None,
        }
    }

    pub fn with_origin(mut self, origin_unit_id: UnitId) -> Self {
        self.origin_unit_id = Some(origin_unit_id);
        self
    }
}

/// 即时分选预览（不写入）
#[derive(Debug, Clone)]
pub struct PreviewInstantRegroupingQuery {
    pub source_container_ids: Vec<ContainerId>,
    pub sample: SampleInput,
    /// 给出时检查来源在该日期之后是否已有测量
    pub date: Option<NaiveDate>,
}

/// 重组详情
#[derive(Debug, Clone)]
pub struct GetRegroupingQuery {
    pub regrouping_id: RegroupingId,
}

/// 按参考规格排序的候选来源
#[derive(Debug, Clone)]
pub struct RankCandidateSourcesQuery {
    pub regrouping_id: RegroupingId,
    pub limit: Option<usize>,
}
