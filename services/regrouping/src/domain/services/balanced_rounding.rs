//! 最大余数法分配
//!
//! 把整数总量按权重拆分，保证各部分之和严格等于总量。

use errors::{AppError, AppResult};

/// 按权重分配 `total`：先取每份的整数部分，余下的按小数部分从大到小逐个补 1。
/// 小数部分相同时按输入顺序。
pub fn distribute<K: Clone>(total: i64, weights: &[(K, f64)]) -> AppResult<Vec<(K, i64)>> {
    if total < 0 {
        return Err(AppError::validation(format!(
            "Cannot distribute a negative total ({})",
            total
        )));
    }
    if weights.is_empty() {
        return Err(AppError::validation("Cannot distribute over an empty set of weights"));
    }
    if weights.iter().any(|(_, w)| !w.is_finite() || *w < 0.0) {
        return Err(AppError::validation("Distribution weights must be finite and non-negative"));
    }

    let weight_sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if weight_sum <= 0.0 {
        return Err(AppError::validation("Distribution weights sum to zero"));
    }

    let mut parts: Vec<(usize, i64, f64)> = weights
        .iter()
        .enumerate()
        .map(|(index, (_, weight))| {
            let exact = total as f64 * weight / weight_sum;
            let floor = exact.floor();
            (index, floor as i64, exact - floor)
        })
        .collect();

    let assigned = parts
        .iter()
        .try_fold(0i64, |sum, (_, floor, _)| sum.checked_add(*floor))
        .ok_or_else(|| AppError::validation(format!("Cannot distribute {} exactly", total)))?;
    let mut remainder = total.saturating_sub(assigned);

    let mut by_fraction: Vec<usize> = (0..parts.len()).collect();
    by_fraction.sort_by(|a, b| parts[*b].2.total_cmp(&parts[*a].2).then(a.cmp(b)));

    // 浮点误差下 remainder 可能超过份数，循环分配
    let mut cursor = 0;
    while remainder > 0 {
        let index = by_fraction[cursor % by_fraction.len()];
        parts[index].1 += 1;
        remainder -= 1;
        cursor += 1;
    }

    Ok(parts
        .into_iter()
        .map(|(index, count, _)| (weights[index].0.clone(), count))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(result: Vec<(&str, i64)>) -> Vec<i64> {
        result.into_iter().map(|(_, c)| c).collect()
    }

    #[test]
    fn test_sum_is_exact() {
        let weights = [("a", 1.0), ("b", 1.0), ("c", 1.0)];
        let result = distribute(100, &weights).unwrap();
        assert_eq!(counts(result), vec![34, 33, 33]);
    }

    #[test]
    fn test_largest_fraction_wins_remainder() {
        let weights = [("a", 10_000.0), ("b", 8_000.0)];
        let result = distribute(9_600, &weights).unwrap();
        // 5333.33 / 4266.67
        assert_eq!(counts(result), vec![5_333, 4_267]);
    }

    #[test]
    fn test_zero_total() {
        let result = distribute(0, &[("a", 2.0), ("b", 3.0)]).unwrap();
        assert_eq!(counts(result), vec![0, 0]);
    }

    #[test]
    fn test_zero_weight_gets_nothing() {
        let result = distribute(7, &[("a", 0.0), ("b", 3.0)]).unwrap();
        assert_eq!(counts(result), vec![0, 7]);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(distribute::<&str>(10, &[]).is_err());
        assert!(distribute(-1, &[("a", 1.0)]).is_err());
        assert!(distribute(10, &[("a", 0.0)]).is_err());
        assert!(distribute(10, &[("a", f64::NAN)]).is_err());
    }
}
