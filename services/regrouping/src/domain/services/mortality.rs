//! 死亡率与数量推算

use errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::SampleInput;

/// 抽样结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleMeasurement {
    /// 每公斤个体数 = 活体数 / (样本克重 / 1000)
    pub animals_per_kg: f64,
    /// 死亡数 / (活体 + 死亡) * 100；样本总数为零时为 None
    pub mortality_rate_percent: Option<f64>,
    pub total_sample_count: i64,
    pub dead_count: i64,
}

/// 根据样本计算每公斤个体数与死亡率
pub fn compute_sample(sample: &SampleInput) -> AppResult<SampleMeasurement> {
    if !sample.sample_weight_g.is_finite() || sample.sample_weight_g <= 0.0 {
        return Err(AppError::validation(format!(
            "Sample weight must be positive, got {}",
            sample.sample_weight_g
        )));
    }
    if sample.live_count <= 0 {
        return Err(AppError::validation(format!(
            "Sample live count must be positive, got {}",
            sample.live_count
        )));
    }
    if sample.dead_count < 0 {
        return Err(AppError::validation(format!(
            "Sample dead count must not be negative, got {}",
            sample.dead_count
        )));
    }

    let total_sample_count = sample
        .live_count
        .checked_add(sample.dead_count)
        .ok_or_else(|| AppError::validation("Sample counts exceed the supported range"))?;
    let mortality_rate_percent = common::percentage(sample.dead_count as f64, total_sample_count as f64);

    Ok(SampleMeasurement {
        animals_per_kg: sample.live_count as f64 / (sample.sample_weight_g / 1000.0),
        mortality_rate_percent,
        total_sample_count,
        dead_count: sample.dead_count,
    })
}

/// 由总重推算个体数：round(总重 / (1000 / 每公斤个体数))
pub fn extrapolate_count(total_weight_g: f64, animals_per_kg: f64) -> AppResult<i64> {
    if !total_weight_g.is_finite() || total_weight_g <= 0.0 {
        return Err(AppError::validation(format!(
            "Total weight must be positive, got {}",
            total_weight_g
        )));
    }
    if !animals_per_kg.is_finite() || animals_per_kg <= 0.0 {
        return Err(AppError::validation(format!(
            "Animals per kg must be positive, got {}",
            animals_per_kg
        )));
    }

    let mean_weight_g = 1000.0 / animals_per_kg;
    let count = (total_weight_g / mean_weight_g).round();
    // i64::MAX as f64 向上取整到 2^63，相等也已越界
    if !count.is_finite() || count >= i64::MAX as f64 {
        return Err(AppError::validation(format!(
            "Extrapolated animal count {} exceeds the supported range",
            count
        )));
    }
    Ok(count as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_of_fifty() {
        let result = compute_sample(&SampleInput::new(100.0, 48, 2)).unwrap();
        assert!((result.animals_per_kg - 480.0).abs() < 1e-9);
        assert_eq!(result.mortality_rate_percent, Some(4.0));
        assert_eq!(result.total_sample_count, 50);
    }

    #[test]
    fn test_no_dead_is_zero_percent() {
        let result = compute_sample(&SampleInput::new(50.0, 10, 0)).unwrap();
        assert_eq!(result.mortality_rate_percent, Some(0.0));
    }

    #[test]
    fn test_invalid_samples_rejected() {
        assert!(compute_sample(&SampleInput::new(0.0, 10, 0)).unwrap_err().is_validation());
        assert!(compute_sample(&SampleInput::new(-5.0, 10, 0)).is_err());
        assert!(compute_sample(&SampleInput::new(f64::NAN, 10, 0)).is_err());
        assert!(compute_sample(&SampleInput::new(10.0, 0, 3)).is_err());
        assert!(compute_sample(&SampleInput::new(10.0, 5, -1)).is_err());
    }

    #[test]
    fn test_extrapolation() {
        assert_eq!(extrapolate_count(20_000.0, 480.0).unwrap(), 9_600);
        assert_eq!(extrapolate_count(1_000.0, 3.0).unwrap(), 3);
    }

    #[test]
    fn test_extrapolation_guards_division() {
        assert!(extrapolate_count(1000.0, 0.0).unwrap_err().is_validation());
        assert!(extrapolate_count(0.0, 480.0).is_err());
        assert!(extrapolate_count(f64::INFINITY, 480.0).is_err());
    }

    #[test]
    fn test_counts_beyond_range_are_rejected() {
        assert!(compute_sample(&SampleInput::new(10.0, i64::MAX, 1)).unwrap_err().is_validation());
        assert!(extrapolate_count(f64::MAX, 1e6).unwrap_err().is_validation());
    }
}
