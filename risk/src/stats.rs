//! Shared numerics used by every estimator
//!
//! All dispersion measures here are population moments (ddof = 0). Using one
//! convention everywhere keeps VaR, volatility, Sharpe and marginal VaR
//! consistent with each other.

use crate::error::{RiskError, RiskResult};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use statrs::statistics::Statistics;

/// Trading days used to annualize daily figures
pub const TRADING_DAYS: f64 = 252.0;

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation, 0.0 for an empty slice
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Population covariance of two equally long slices
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mean_a = mean(a);
    let mean_b = mean(b);
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / n as f64
}

/// Pearson correlation of the common tail of two slices
///
/// Returns `None` when either side has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let var_a = covariance(a, a);
    let var_b = covariance(b, b);
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    let corr = covariance(a, b) / (var_a * var_b).sqrt();
    corr.is_finite().then(|| corr.clamp(-1.0, 1.0))
}

/// Bias-corrected sample skewness (G1); 0.0 for fewer than 4 points
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 3 {
        return 0.0;
    }
    let (m2, m3, _) = central_moments(values);
    if m2 <= 0.0 {
        return 0.0;
    }
    let n = n as f64;
    let g1 = m3 / m2.powf(1.5);
    (n * (n - 1.0)).sqrt() / (n - 2.0) * g1
}

/// Bias-corrected sample excess kurtosis (G2); 0.0 for fewer than 5 points
pub fn kurtosis(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 4 {
        return 0.0;
    }
    let (m2, _, m4) = central_moments(values);
    if m2 <= 0.0 {
        return 0.0;
    }
    let n = n as f64;
    let g2 = m4 / (m2 * m2) - 3.0;
    ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
}

fn central_moments(values: &[f64]) -> (f64, f64, f64) {
    let mu = mean(values);
    let n = values.len() as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - mu;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

fn standard_normal() -> RiskResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| RiskError::ComputationError(e.to_string()))
}

/// Inverse CDF of the standard normal distribution
pub fn normal_quantile(p: f64) -> RiskResult<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(RiskError::InvalidParameter(format!(
            "Probability {} outside (0, 1)",
            p
        )));
    }
    Ok(standard_normal()?.inverse_cdf(p))
}

/// Density of the standard normal distribution
pub fn normal_pdf(z: f64) -> RiskResult<f64> {
    Ok(standard_normal()?.pdf(z))
}

/// Convert a signed return into a non-negative loss magnitude
///
/// Gains map to zero loss.
pub fn loss(value: f64) -> f64 {
    if value < 0.0 {
        -value
    } else {
        0.0
    }
}

/// Copy and sort ascending, ordering NaN last
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Length of the most recent window shared by every slice
pub fn common_tail_len<'a, I>(series: I) -> usize
where
    I: IntoIterator<Item = &'a [f64]>,
{
    series.into_iter().map(|s| s.len()).min().unwrap_or(0)
}

/// Compound periodic returns into a value path starting at 1.0
///
/// The starting value is not included; the first element is `1 + r[0]`.
pub fn cumulative_values(returns: &[f64]) -> Vec<f64> {
    let mut wealth = 1.0;
    returns
        .iter()
        .map(|r| {
            wealth *= 1.0 + r;
            wealth
        })
        .collect()
}

/// Least-squares slope of `values` against their index
///
/// Fewer than two points, or non-finite input, gives 0.
pub fn trend_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }

    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
    }

    let slope = (n * sxy - sx * sy) / (n * sxx - sx * sx);
    if slope.is_finite() {
        slope
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values), 5.0);
        assert_relative_eq!(std_dev(&values), 2.0, epsilon = 1e-12);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn test_pearson() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let c = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert_relative_eq!(pearson(&a, &b).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pearson(&a, &c).unwrap(), -1.0, epsilon = 1e-12);
        assert!(pearson(&a, &[1.0; 5]).is_none());
    }

    #[test]
    fn test_trend_slope() {
        assert_relative_eq!(trend_slope(&[1.0, 3.0, 5.0, 7.0]), 2.0, epsilon = 1e-12);
        assert_relative_eq!(trend_slope(&[0.05, 0.04, 0.06, 0.05]), 0.002, epsilon = 1e-12);
        assert_relative_eq!(trend_slope(&[0.3; 6]), 0.0, epsilon = 1e-12);
        assert_eq!(trend_slope(&[0.1]), 0.0);
        assert_eq!(trend_slope(&[0.1, f64::NAN]), 0.0);
    }

    #[test]
    fn test_pearson_uses_common_tail() {
        let a = [100.0, 1.0, 2.0, 3.0];
        let b = [1.0, 2.0, 3.0];
        assert_relative_eq!(pearson(&a, &b).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_symmetric_series_has_no_skew() {
        let values = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert_relative_eq!(skewness(&values), 0.0, epsilon = 1e-12);
        assert_eq!(skewness(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(kurtosis(&[1.0, 2.0, 3.0, 4.0]), 0.0);
    }

    #[test]
    fn test_uniform_kurtosis_is_negative() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert!(kurtosis(&values) < -1.0);
    }

    #[test]
    fn test_normal_quantile() {
        assert_relative_eq!(normal_quantile(0.05).unwrap(), -1.6448536, epsilon = 1e-6);
        assert_relative_eq!(normal_quantile(0.5).unwrap(), 0.0, epsilon = 1e-12);
        assert!(normal_quantile(1.0).is_err());
        assert_relative_eq!(normal_pdf(0.0).unwrap(), 0.3989422804, epsilon = 1e-9);
    }

    #[test]
    fn test_loss_and_cumulative() {
        assert_eq!(loss(-0.05), 0.05);
        assert_eq!(loss(0.02), 0.0);
        let values = cumulative_values(&[0.1, -0.5]);
        assert_relative_eq!(values[0], 1.1);
        assert_relative_eq!(values[1], 0.55);
    }
}
