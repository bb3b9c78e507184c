//! Small statistics helpers shared by the forecast models.
//!
//! All helpers are total: empty or degenerate input yields `0.0` instead of
//! NaN so callers can fold the result straight into interval arithmetic.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;

/// z-score of a two-sided 95% normal interval, as used by the fallback and
/// ensemble bounds.
pub const Z_95: f64 = 1.96;

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.mean()
}

/// Compute sample standard deviation (n - 1 denominator).
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    data.std_dev()
}

/// Compute population standard deviation (n denominator).
pub fn population_std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.population_std_dev()
}

/// Mean of the last `n` values (or of all values when fewer exist).
pub fn tail_mean(data: &[f64], n: usize) -> f64 {
    let start = data.len().saturating_sub(n);
    mean(&data[start..])
}

/// Two-sided standard-normal quantile for a central interval of `width`
/// (0.95 -> ~1.96).
pub fn interval_z(width: f64) -> f64 {
    let width = width.clamp(1e-6, 1.0 - 1e-9);
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(0.5 + width / 2.0))
        .unwrap_or(Z_95)
}

/// Approximate half-width of a 95% interval around a mean estimate:
/// `1.96 * sigma / sqrt(n)` with population sigma.
pub fn standard_error_band(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    population_std_dev(data) * Z_95 / (data.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let data = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&data) - 5.0).abs() < 1e-12);
        assert!((population_std_dev(&data) - 2.0).abs() < 1e-12);
        assert!(std_dev(&data) > population_std_dev(&data));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
        assert_eq!(population_std_dev(&[]), 0.0);
        assert_eq!(standard_error_band(&[]), 0.0);
        assert_eq!(standard_error_band(&[10.0]), 0.0);
    }

    #[test]
    fn test_tail_mean() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        assert!((tail_mean(&data, 5) - 5.0).abs() < 1e-12);
        assert!((tail_mean(&data[..2], 5) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_interval_z() {
        assert!((interval_z(0.95) - 1.959964).abs() < 1e-4);
        assert!((interval_z(0.80) - 1.281552).abs() < 1e-4);
        assert!(interval_z(0.99) > interval_z(0.95));
    }
}
