//! 规格分级
//!
//! 纯函数：每次都基于当前目录重新计算，不缓存结果。

use errors::{AppError, AppResult};

use crate::domain::entities::SizeClass;

/// 返回第一个闭区间包含该值的规格；落在区间空隙中的值返回 None（未分级，不是错误）
pub fn classify(catalog: &[SizeClass], animals_per_kg: f64) -> Option<&SizeClass> {
    if !animals_per_kg.is_finite() {
        return None;
    }
    catalog.iter().find(|class| class.contains(animals_per_kg))
}

/// 新规格的区间必须非空，且不能与目录中已有的任何区间相交，否则分级结果取决于目录顺序
pub fn ensure_disjoint(catalog: &[SizeClass], candidate: &SizeClass) -> AppResult<()> {
    // NaN 也视为空区间
    let ordered = candidate.min_animals_per_kg <= candidate.max_animals_per_kg;
    if !ordered {
        return Err(AppError::validation(format!(
            "Size class {} has an empty range",
            candidate.code
        )));
    }
    if let Some(existing) = catalog
        .iter()
        .find(|c| c.id != candidate.id && c.overlaps(candidate))
    {
        return Err(AppError::validation(format!(
            "Size class {} [{}, {}] overlaps {} [{}, {}]",
            candidate.code,
            candidate.min_animals_per_kg,
            candidate.max_animals_per_kg,
            existing.code,
            existing.min_animals_per_kg,
            existing.max_animals_per_kg
        )));
    }
    Ok(())
}
