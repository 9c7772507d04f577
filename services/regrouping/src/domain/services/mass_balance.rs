//! 质量平衡

use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// 累加个体数；超出 i64 范围视为输入错误
pub fn total_animals(counts: impl IntoIterator<Item = i64>) -> AppResult<i64> {
    counts.into_iter().try_fold(0i64, |total, count| {
        total.checked_add(count).ok_or_else(|| {
            AppError::validation("Animal counts exceed the supported range")
        })
    })
}

/// 一次重组的来源总数与目标总数对比
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassBalance {
    pub source_total: i64,
    pub destination_total: i64,
    /// 来源多于目标的部分，视为损耗
    pub mortality_loss: i64,
    /// (目标 - 来源) / 来源 * 100；来源为零时为 0
    pub discrepancy_percent: f64,
}

impl MassBalance {
    /// 由来源与目标的个体数汇总
    pub fn from_counts(
        source_counts: impl IntoIterator<Item = i64>,
        destination_counts: impl IntoIterator<Item = i64>,
    ) -> AppResult<Self> {
        Ok(Self::compute(
            total_animals(source_counts)?,
            total_animals(destination_counts)?,
        ))
    }

    pub fn compute(source_total: i64, destination_total: i64) -> Self {
        let discrepancy_percent = common::percentage(
            destination_total as f64 - source_total as f64,
            source_total as f64,
        )
        .unwrap_or(0.0);

        Self {
            source_total,
            destination_total,
            mortality_loss: source_total.saturating_sub(destination_total).max(0),
            discrepancy_percent,
        }
    }

    /// 目标比来源多出的部分
    fn excess(&self) -> i64 {
        self.destination_total.saturating_sub(self.source_total).max(0)
    }

    /// 目标不超过来源，或超出部分在容差内
    pub fn within_tolerance(&self, tolerance_percent: f64) -> bool {
        self.excess() == 0 || self.discrepancy_percent <= tolerance_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_accounts_for_difference() {
        let balance = MassBalance::compute(18_000, 9_600);
        assert_eq!(balance.mortality_loss, 8_400);
        assert_eq!(balance.destination_total + balance.mortality_loss, balance.source_total);
        assert!(balance.within_tolerance(0.0));
    }

    #[test]
    fn test_excess_against_tolerance() {
        let balance = MassBalance::compute(10_000, 10_050);
        assert_eq!(balance.mortality_loss, 0);
        assert_eq!(balance.excess(), 50);
        assert!(balance.within_tolerance(1.0));
        assert!(!balance.within_tolerance(0.1));
    }

    #[test]
    fn test_overflowing_counts_are_rejected() {
        let huge = i64::MAX / 2 + 1;
        let err = MassBalance::from_counts([1_000], [huge, huge]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let balance = MassBalance::from_counts([huge], [huge - 1]).unwrap();
        assert_eq!(balance.mortality_loss, 1);
    }
}
