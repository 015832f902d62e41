//! Annualized volatility estimation
//!
//! - Historical: population standard deviation scaled by √252
//! - EWMA: RiskMetrics-style exponentially weighted variance (λ = 0.94)
//! - GARCH(1,1): fixed-parameter conditional variance recursion

use crate::error::{RiskError, RiskResult};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Volatility model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityModel {
    Historical,
    Ewma,
    Garch,
}

impl VolatilityModel {
    pub const ALL: [VolatilityModel; 3] = [
        VolatilityModel::Historical,
        VolatilityModel::Ewma,
        VolatilityModel::Garch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityModel::Historical => "historical",
            VolatilityModel::Ewma => "ewma",
            VolatilityModel::Garch => "garch",
        }
    }
}

impl fmt::Display for VolatilityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolatilityModel {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "historical" => Ok(VolatilityModel::Historical),
            "ewma" => Ok(VolatilityModel::Ewma),
            "garch" => Ok(VolatilityModel::Garch),
            other => Err(RiskError::InvalidParameter(format!(
                "Unknown volatility model '{}': expected historical, ewma or garch",
                other
            ))),
        }
    }
}

/// Volatility estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// EWMA decay factor
    #[serde(default = "default_ewma_lambda")]
    pub ewma_lambda: f64,

    /// GARCH ARCH coefficient (weight of the previous squared shock)
    #[serde(default = "default_garch_alpha")]
    pub garch_alpha: f64,

    /// GARCH persistence coefficient (weight of the previous variance)
    #[serde(default = "default_garch_beta")]
    pub garch_beta: f64,

    /// Periods per year used to annualize
    #[serde(default = "default_trading_days")]
    pub trading_days: f64,

    /// Minimum number of observations required
    #[serde(default = "crate::var::default_min_observations")]
    pub min_observations: usize,
}

fn default_ewma_lambda() -> f64 {
    0.94
}

fn default_garch_alpha() -> f64 {
    0.10
}

fn default_garch_beta() -> f64 {
    0.85
}

fn default_trading_days() -> f64 {
    stats::TRADING_DAYS
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            ewma_lambda: default_ewma_lambda(),
            garch_alpha: default_garch_alpha(),
            garch_beta: default_garch_beta(),
            trading_days: default_trading_days(),
            min_observations: crate::var::default_min_observations(),
        }
    }
}

/// Volatility result as exposed to API consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReport {
    /// Annualized volatility
    pub volatility: f64,

    /// Unscaled per-period standard deviation
    pub daily_volatility: f64,

    pub model: VolatilityModel,
    pub observations: usize,
}

/// Volatility estimator
#[derive(Debug, Clone, Default)]
pub struct VolatilityEstimator {
    config: VolatilityConfig,
}

impl VolatilityEstimator {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    /// Estimate annualized volatility with the given model
    ///
    /// A GARCH numerical failure falls back to the historical estimate; other
    /// failures are returned to the caller.
    pub fn estimate(&self, returns: &[f64], model: VolatilityModel) -> RiskResult<f64> {
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

        match model {
            VolatilityModel::Historical => Ok(self.historical(returns)),
            VolatilityModel::Ewma => self.ewma(returns),
            VolatilityModel::Garch => match self.garch(returns) {
                Ok(vol) => Ok(vol),
                Err(e) => {
                    warn!("GARCH estimate failed, using historical volatility: {}", e);
                    Ok(self.historical(returns))
                }
            },
        }
    }

    /// Calculate volatility for API consumers, zeroing short series and
    /// numerical failures
    pub fn calculate(&self, returns: &[f64], model: VolatilityModel) -> VolatilityReport {
        let volatility = match self.estimate(returns, model) {
            Ok(vol) => vol,
            Err(e) if e.is_insufficient_data() => {
                debug!("{} volatility skipped: {}", model, e);
                0.0
            }
            Err(e) => {
                warn!("{} volatility failed, reporting zero: {}", model, e);
                0.0
            }
        };

        let daily_volatility = if volatility > 0.0 {
            stats::std_dev(returns)
        } else {
            0.0
        };

        VolatilityReport {
            volatility,
            daily_volatility,
            model,
            observations: returns.len(),
        }
    }

    fn annualize(&self, variance: f64) -> f64 {
        (variance * self.config.trading_days).sqrt()
    }

    fn historical(&self, returns: &[f64]) -> f64 {
        stats::std_dev(returns) * self.config.trading_days.sqrt()
    }

    /// Most recent squared return weighted λ^0, the one before λ^1, and so on
    fn ewma(&self, returns: &[f64]) -> RiskResult<f64> {
        let lambda = self.config.ewma_lambda;
        if !(lambda > 0.0 && lambda < 1.0) {
            return Err(RiskError::InvalidParameter(format!(
                "EWMA lambda {} outside (0, 1)",
                lambda
            )));
        }

        let mut weight = 1.0;
        let mut weight_sum = 0.0;
        let mut weighted = 0.0;
        for r in returns.iter().rev() {
            weighted += weight * r * r;
            weight_sum += weight;
            weight *= lambda;
        }

        Ok(self.annualize(weighted / weight_sum))
    }

    fn garch(&self, returns: &[f64]) -> RiskResult<f64> {
        let alpha = self.config.garch_alpha;
        let beta = self.config.garch_beta;
        if alpha < 0.0 || beta < 0.0 || alpha + beta >= 1.0 {
            return Err(RiskError::InvalidParameter(format!(
                "GARCH parameters alpha={} beta={} are not stationary",
                alpha, beta
            )));
        }

        let mean = stats::mean(returns);
        let squared_residuals: Vec<f64> = returns.iter().map(|r| (r - mean).powi(2)).collect();

        // Long-run variance anchors both ω and the starting point
        let long_run_variance = stats::mean(&squared_residuals);
        let omega = long_run_variance * (1.0 - alpha - beta);

        let mut variance = long_run_variance;
        for shock in &squared_residuals[..squared_residuals.len() - 1] {
            variance = omega + alpha * shock + beta * variance;
        }

        if !variance.is_finite() || variance < 0.0 {
            return Err(RiskError::ComputationError(format!(
                "GARCH conditional variance is invalid: {}",
                variance
            )));
        }

        Ok(self.annualize(variance))
    }
}
