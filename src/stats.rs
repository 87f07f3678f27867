//! Sample statistics shared by the estimators
//!
//! Percentiles use linear interpolation between closest ranks, so the p-th
//! percentile of `n` sorted values sits at fractional rank `p * (n - 1)`.

/// Sort a copy of `values` ascending (NaN-safe total order)
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Percentile of already-sorted data, `q` in [0, 1]
///
/// Returns `None` for empty input.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let q = q.clamp(0.0, 1.0);
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f64;

    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Percentile of unsorted data, `q` in [0, 1]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    percentile_sorted(&sorted(values), q)
}

/// Arithmetic mean, `None` for empty input
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean of all values at or above `threshold`, falling back to `threshold`
/// when the tail is empty
pub fn upper_tail_mean(values: &[f64], threshold: f64) -> f64 {
    let tail: Vec<f64> = values.iter().copied().filter(|v| *v >= threshold).collect();
    mean(&tail).unwrap_or(threshold)
}

/// VaR and CVaR of a return series as positive loss fractions
///
/// VaR is the negated `(1 - confidence)` percentile; CVaR is the mean loss of
/// returns at or below `-VaR` (falls back to VaR on an empty tail).
pub fn loss_var_cvar(returns: &[f64], confidence: f64) -> Option<(f64, f64)> {
    let var = -percentile(returns, 1.0 - confidence)?;
    let losses: Vec<f64> = returns.iter().filter(|r| **r <= -var).map(|r| -r).collect();
    let cvar = mean(&losses).unwrap_or(var);
    Some((var, cvar.max(var)))
}

/// `n` evenly spaced points from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| if i == n - 1 { end } else { start + step * i as f64 }).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_percentile_interpolates() {
        let data = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_relative_eq!(percentile(&data, 0.5).unwrap(), 3.0);
        assert_relative_eq!(percentile(&data, 0.25).unwrap(), 2.0);
        assert_relative_eq!(percentile(&data, 0.9).unwrap(), 4.6);
        assert_relative_eq!(percentile(&data, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&data, 1.0).unwrap(), 5.0);
    }

    #[test]
    fn test_percentile_empty() {
        assert!(percentile(&[], 0.5).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_upper_tail_mean_fallback() {
        let data = vec![1.0, 2.0, 3.0];
        assert_relative_eq!(upper_tail_mean(&data, 2.0), 2.5);
        assert_relative_eq!(upper_tail_mean(&data, 10.0), 10.0);
    }

    #[test]
    fn test_loss_var_cvar() {
        let returns = vec![-0.10, -0.05, -0.02, 0.0, 0.01, 0.02, 0.03, 0.04, 0.05, 0.06];
        let (var, cvar) = loss_var_cvar(&returns, 0.9).unwrap();

        // 10th percentile sits between -0.10 and -0.05
        assert_relative_eq!(var, 0.055, epsilon = 1e-12);
        assert_relative_eq!(cvar, 0.10, epsilon = 1e-12);
        assert!(cvar >= var);
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 0), Vec::<f64>::new());
        assert_eq!(linspace(0.0, 1.0, 1), vec![0.0]);
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    proptest! {
        #[test]
        fn prop_percentile_monotone(
            data in prop::collection::vec(-1e6f64..1e6, 1..200),
            q1 in 0.0f64..1.0,
            q2 in 0.0f64..1.0,
        ) {
            let (lo, hi) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
            let a = percentile(&data, lo).unwrap();
            let b = percentile(&data, hi).unwrap();
            prop_assert!(a <= b);
        }

        #[test]
        fn prop_cvar_at_least_var(
            data in prop::collection::vec(-0.5f64..0.5, 1..400),
            confidence in 0.5f64..0.999,
        ) {
            let (var, cvar) = loss_var_cvar(&data, confidence).unwrap();
            prop_assert!(cvar >= var);
        }
    }
}
