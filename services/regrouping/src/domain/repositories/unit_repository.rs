//! 养殖单元与规格目录仓储

use async_trait::async_trait;
use errors::AppResult;

use crate::domain::entities::{RearingUnit, SizeClass};
use crate::domain::value_objects::UnitId;

/// 养殖单元仓储
#[async_trait]
pub trait RearingUnitRepository: Send + Sync {
    async fn insert(&self, unit: &RearingUnit) -> AppResult<()>;

    async fn find_by_id(&self, id: &UnitId) -> AppResult<Option<RearingUnit>>;

    /// 按名称排序
    async fn list(&self, active_only: bool) -> AppResult<Vec<RearingUnit>>;
}

/// 规格目录（只读，insert 仅用于初始化）
#[async_trait]
pub trait SizeClassRepository: Send + Sync {
    async fn insert(&self, size_class: &SizeClass) -> AppResult<()>;

    /// 按最小值升序
    async fn list(&self) -> AppResult<Vec<SizeClass>>;
}
