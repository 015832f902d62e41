//! Value at Risk (VaR) and Conditional VaR estimation
//!
//! Implements three estimation methods over a periodic return series:
//! - Historical: empirical lower-tail quantile of the observed returns
//! - Parametric: normal approximation, VaR = -(μ + z·σ), CVaR = -(μ - σ·φ(z)/α)
//! - Monte Carlo: historical method applied to a simulated normal sample
//!
//! Both figures are reported as non-negative loss magnitudes. A tail quantile
//! that is a gain is reported as zero loss.

use crate::error::{check_confidence, RiskError, RiskResult};
use crate::stats;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// VaR calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    Historical,
    Parametric,
    MonteCarlo,
}

impl VarMethod {
    /// Every supported method, in reporting order
    pub const ALL: [VarMethod; 3] = [
        VarMethod::Historical,
        VarMethod::Parametric,
        VarMethod::MonteCarlo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VarMethod::Historical => "historical",
            VarMethod::Parametric => "parametric",
            VarMethod::MonteCarlo => "monte_carlo",
        }
    }
}

impl fmt::Display for VarMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarMethod {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "historical" => Ok(VarMethod::Historical),
            "parametric" => Ok(VarMethod::Parametric),
            "monte_carlo" | "montecarlo" | "mc" => Ok(VarMethod::MonteCarlo),
            other => Err(RiskError::InvalidParameter(format!(
                "Unknown VaR method '{}': expected historical, parametric or monte_carlo",
                other
            ))),
        }
    }
}

/// VaR engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarConfig {
    /// Number of Monte Carlo draws
    #[serde(default = "default_simulations")]
    pub simulations: usize,

    /// Minimum number of historical observations required
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    /// Random seed for Monte Carlo (None = fresh entropy on every call)
    #[serde(default = "default_random_seed")]
    pub random_seed: Option<u64>,
}

fn default_simulations() -> usize {
    10_000
}

pub(crate) fn default_min_observations() -> usize {
    30
}

fn default_random_seed() -> Option<u64> {
    Some(42)
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            simulations: default_simulations(),
            min_observations: default_min_observations(),
            random_seed: default_random_seed(),
        }
    }
}

/// Raw VaR/CVaR pair
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VarCvar {
    /// VaR as a positive loss fraction
    pub var: f64,

    /// Expected loss beyond VaR as a positive fraction
    pub cvar: f64,
}

/// VaR calculation result as exposed to API consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarCvarReport {
    pub var: f64,
    pub cvar: f64,
    pub method: VarMethod,
    pub confidence: f64,
    pub observations: usize,
}

/// VaR calculation engine
///
/// Stateless apart from its configuration; every call is a pure function of
/// its inputs (Monte Carlo included, when a seed is configured).
#[derive(Debug, Clone, Default)]
pub struct VarEngine {
    config: VarConfig,
}

impl VarEngine {
    /// Create a new VaR engine with configuration
    pub fn new(config: VarConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Estimate VaR and CVaR, surfacing short series and numerical failures
    /// as errors
    pub fn estimate(
        &self,
        returns: &[f64],
        confidence_level: f64,
        method: VarMethod,
    ) -> RiskResult<VarCvar> {
        check_confidence(confidence_level)?;

        if returns.len() < self.config.min_observations {
            return Err(RiskError::insufficient(
                self.config.min_observations,
                returns.len(),
            ));
        }

        if returns.iter().any(|r| !r.is_finite()) {
            return Err(RiskError::ComputationError(
                "Return series contains non-finite values".to_string(),
            ));
        }

        let result = match method {
            VarMethod::Historical => historical_var_cvar(returns, confidence_level),
            VarMethod::Parametric => parametric_var_cvar(returns, confidence_level)?,
            VarMethod::MonteCarlo => self.monte_carlo_var_cvar(returns, confidence_level)?,
        };

        if !result.var.is_finite() || !result.cvar.is_finite() {
            return Err(RiskError::ComputationError(format!(
                "{} VaR produced a non-finite result",
                method
            )));
        }

        Ok(result)
    }

    /// Calculate VaR and CVaR for API consumers
    ///
    /// Short series yield a zeroed report and numerical failures are logged and
    /// zeroed. Only an invalid confidence level is returned as an error.
    pub fn calculate(
        &self,
        returns: &[f64],
        confidence_level: f64,
        method: VarMethod,
    ) -> RiskResult<VarCvarReport> {
        let value = match self.estimate(returns, confidence_level, method) {
            Ok(value) => value,
            Err(e) if e.is_insufficient_data() => {
                debug!("{} VaR skipped: {}", method, e);
                VarCvar::default()
            }
            Err(e) if e.is_recoverable() => {
                warn!("{} VaR failed, reporting zero: {}", method, e);
                VarCvar::default()
            }
            Err(e) => return Err(e),
        };

        Ok(VarCvarReport {
            var: value.var,
            cvar: value.cvar,
            method,
            confidence: confidence_level,
            observations: returns.len(),
        })
    }

    /// Simulate normal returns matching the sample mean and deviation, then
    /// read VaR/CVaR off the simulated sample
    fn monte_carlo_var_cvar(&self, returns: &[f64], confidence_level: f64) -> RiskResult<VarCvar> {
        if self.config.simulations == 0 {
            return Err(RiskError::InvalidParameter(
                "Number of simulations must be positive".to_string(),
            ));
        }

        let mut rng = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let normal = Normal::new(stats::mean(returns), stats::std_dev(returns))
            .map_err(|e| RiskError::ComputationError(e.to_string()))?;

        let simulated: Vec<f64> = (0..self.config.simulations)
            .map(|_| normal.sample(&mut rng))
            .collect();

        Ok(historical_var_cvar(&simulated, confidence_level))
    }
}

/// Tolerance absorbing the rounding in `1 - confidence` before the ceiling
const QUANTILE_EPSILON: f64 = 1e-9;

/// Index of the VaR quantile in an ascending sample of length `n`:
/// `ceil((1 - confidence) * n) - 1`, clamped into the sample
pub(crate) fn quantile_index(n: usize, confidence_level: f64) -> usize {
    let alpha = 1.0 - confidence_level;
    let index = (alpha * n as f64 - QUANTILE_EPSILON).ceil() as i64 - 1;
    index.clamp(0, n.saturating_sub(1) as i64) as usize
}

fn historical_var_cvar(returns: &[f64], confidence_level: f64) -> VarCvar {
    let sorted = stats::sorted(returns);
    let threshold = sorted[quantile_index(sorted.len(), confidence_level)];

    // Sorted ascending, so the tail is a prefix
    let tail_len = sorted.partition_point(|r| *r <= threshold);
    let tail_mean = if tail_len > 0 {
        stats::mean(&sorted[..tail_len])
    } else {
        threshold
    };

    VarCvar {
        var: stats::loss(threshold),
        cvar: stats::loss(tail_mean),
    }
}

fn parametric_var_cvar(returns: &[f64], confidence_level: f64) -> RiskResult<VarCvar> {
    let mean = stats::mean(returns);
    let std = stats::std_dev(returns);
    let alpha = 1.0 - confidence_level;

    let z = stats::normal_quantile(alpha)?;
    let density = stats::normal_pdf(z)?;

    Ok(VarCvar {
        var: stats::loss(mean + z * std),
        cvar: stats::loss(mean - std * density / alpha),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_returns() -> Vec<f64> {
        let base = vec![
            -0.05, -0.03, -0.02, -0.01, 0.00,
            0.01, 0.02, 0.03, 0.04, 0.05,
            -0.04, 0.01, 0.02, -0.01, 0.03,
            0.00, -0.02, 0.01, 0.02, -0.01,
        ];
        base.iter().chain(base.iter()).copied().collect()
    }

    #[test]
    fn test_historical_var() {
        let engine = VarEngine::default();
        let returns = create_test_returns();

        let result = engine.estimate(&returns, 0.95, VarMethod::Historical).unwrap();

        // 40 observations: index ceil(0.05 * 40) - 1 = 1, both -0.05 values in the tail
        assert_relative_eq!(result.var, 0.05, epsilon = 1e-12);
        assert_relative_eq!(result.cvar, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_historical_cvar_averages_tail() {
        let engine = VarEngine::default();
        let mut returns = vec![0.01; 38];
        returns.push(-0.10);
        returns.push(-0.02);
        // index ceil(0.1 * 40) - 1 = 3 -> threshold 0.01, the whole sample is in the tail
        let result = engine.estimate(&returns, 0.90, VarMethod::Historical).unwrap();
        assert_eq!(result.var, 0.0);
        assert_eq!(result.cvar, 0.0);

        // index ceil(0.05 * 40) - 1 = 1 -> threshold -0.02, tail mean -0.06
        let result = engine.estimate(&returns, 0.95, VarMethod::Historical).unwrap();
        assert_relative_eq!(result.var, 0.02, epsilon = 1e-12);
        assert_relative_eq!(result.cvar, 0.06, epsilon = 1e-12);

        // index ceil(0.025 * 40) - 1 = 0 -> threshold -0.10
        let result = engine.estimate(&returns, 0.975, VarMethod::Historical).unwrap();
        assert_relative_eq!(result.var, 0.10, epsilon = 1e-12);
        assert_relative_eq!(result.cvar, 0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_parametric_var() {
        let engine = VarEngine::default();
        let returns = create_test_returns();

        let result = engine.estimate(&returns, 0.95, VarMethod::Parametric).unwrap();

        let mean = stats::mean(&returns);
        let std = stats::std_dev(&returns);
        assert_relative_eq!(result.var, -(mean - 1.6448536269514722 * std), epsilon = 1e-9);
        assert!(result.cvar > result.var);
    }

    #[test]
    fn test_monte_carlo_var() {
        let engine = VarEngine::default();
        let returns = create_test_returns();

        let result = engine.estimate(&returns, 0.95, VarMethod::MonteCarlo).unwrap();
        let parametric = engine.estimate(&returns, 0.95, VarMethod::Parametric).unwrap();

        assert!(result.var > 0.0);
        assert!(result.cvar >= result.var);
        // 10,000 draws land close to the closed form
        assert!((result.var - parametric.var).abs() < 0.005);
    }

    #[test]
    fn test_monte_carlo_is_reproducible_with_seed() {
        let engine = VarEngine::default();
        let returns = create_test_returns();

        let first = engine.estimate(&returns, 0.99, VarMethod::MonteCarlo).unwrap();
        let second = engine.estimate(&returns, 0.99, VarMethod::MonteCarlo).unwrap();
        assert_eq!(first.var.to_bits(), second.var.to_bits());
        assert_eq!(first.cvar.to_bits(), second.cvar.to_bits());
    }

    #[test]
    fn test_invalid_confidence_level() {
        let engine = VarEngine::default();
        let returns = create_test_returns();

        assert!(matches!(
            engine.calculate(&returns, 1.5, VarMethod::Parametric),
            Err(RiskError::InvalidConfidenceLevel(_))
        ));
        assert!(engine.calculate(&returns, -0.1, VarMethod::Historical).is_err());
    }

    #[test]
    fn test_insufficient_data() {
        let engine = VarEngine::default();
        let returns = vec![0.01, 0.02];

        let err = engine.estimate(&returns, 0.95, VarMethod::Historical).unwrap_err();
        assert!(err.is_insufficient_data());

        let report = engine.calculate(&returns, 0.95, VarMethod::Historical).unwrap();
        assert_eq!(report.var, 0.0);
        assert_eq!(report.cvar, 0.0);
        assert_eq!(report.observations, 2);
    }

    #[test]
    fn test_non_finite_input_is_recovered() {
        let engine = VarEngine::default();
        let mut returns = create_test_returns();
        returns[3] = f64::NAN;

        let err = engine.estimate(&returns, 0.95, VarMethod::Parametric).unwrap_err();
        assert!(matches!(err, RiskError::ComputationError(_)));

        let report = engine.calculate(&returns, 0.95, VarMethod::Parametric).unwrap();
        assert_eq!(report.var, 0.0);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("historical".parse::<VarMethod>().unwrap(), VarMethod::Historical);
        assert_eq!("Monte_Carlo".parse::<VarMethod>().unwrap(), VarMethod::MonteCarlo);
        assert!("cornish_fisher".parse::<VarMethod>().is_err());
        assert_eq!(VarMethod::MonteCarlo.to_string(), "monte_carlo");
    }

    #[test]
    fn test_quantile_index() {
        assert_eq!(quantile_index(100, 0.99), 0);
        assert_eq!(quantile_index(100, 0.95), 4);
        assert_eq!(quantile_index(100, 0.90), 9);
        assert_eq!(quantile_index(10, 0.999), 0);
    }
}
