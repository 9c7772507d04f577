//! 命令

mod instant_commands;
mod regrouping_commands;

pub use instant_commands::*;
pub use regrouping_commands::*;

use std::collections::HashSet;
use std::hash::Hash;

use errors::{AppError, AppResult};

/// 列表不能为空且不能有重复项
pub(crate) fn ensure_distinct<T: Eq + Hash + std::fmt::Display>(
    items: &[T],
    what: &str,
) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation(format!("At least one {} is required", what)));
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item) {
            return Err(AppError::validation(format!("Duplicate {}: {}", what, item)));
        }
    }
    Ok(())
}

pub(crate) fn ensure_positive_weight(weight_g: f64, what: &str) -> AppResult<()> {
    if !weight_g.is_finite() || weight_g <= 0.0 {
        return Err(AppError::validation(format!(
            "{} must be a positive weight in grams, got {}",
            what, weight_g
        )));
    }
    Ok(())
}
