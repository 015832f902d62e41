//! Risk-adjusted performance metrics
//!
//! - Sharpe ratio: (annualized mean return - risk-free rate) / annualized volatility
//! - Beta: Cov(portfolio, market) / Var(market)
//! - Return distribution moments: mean, standard deviation, skewness, excess kurtosis

use crate::error::{RiskError, RiskResult};
use crate::stats;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Beta reported when it cannot be estimated
pub const DEFAULT_BETA: f64 = 1.0;

/// Summary moments of a return series
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl ReturnDistribution {
    pub fn from_returns(returns: &[f64]) -> Self {
        Self {
            mean: stats::mean(returns),
            std_dev: stats::std_dev(returns),
            skewness: stats::skewness(returns),
            kurtosis: stats::kurtosis(returns),
        }
    }
}

/// Performance metrics calculator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Risk-free rate (annualized)
    risk_free_rate: f64,

    /// Periods per year
    trading_days: f64,

    /// Minimum aligned observations for any estimate
    min_observations: usize,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new(0.02)
    }
}

impl PerformanceMetrics {
    pub fn new(risk_free_rate: f64) -> Self {
        Self {
            risk_free_rate,
            trading_days: stats::TRADING_DAYS,
            min_observations: crate::var::default_min_observations(),
        }
    }

    pub fn with_min_observations(mut self, min_observations: usize) -> Self {
        self.min_observations = min_observations;
        self
    }

    pub fn with_trading_days(mut self, trading_days: f64) -> Self {
        self.trading_days = trading_days;
        self
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    /// Calculate Sharpe Ratio
    ///
    /// Sharpe = (Mean·252 - Rf) / (Std·√252)
    pub fn sharpe_ratio(&self, returns: &[f64]) -> RiskResult<f64> {
        if returns.len() < self.min_observations {
            return Err(RiskError::insufficient(self.min_observations, returns.len()));
        }

        let annual_return = stats::mean(returns) * self.trading_days;
        let annual_volatility = stats::std_dev(returns) * self.trading_days.sqrt();

        if annual_volatility == 0.0 || !annual_volatility.is_finite() {
            return Err(RiskError::ComputationError(format!(
                "Sharpe ratio undefined for volatility {}",
                annual_volatility
            )));
        }

        Ok((annual_return - self.risk_free_rate) / annual_volatility)
    }

    /// Calculate Beta relative to market over the most recent common window
    pub fn beta(&self, returns: &[f64], market_returns: &[f64]) -> RiskResult<f64> {
        let n = returns.len().min(market_returns.len());
        if n < self.min_observations {
            return Err(RiskError::insufficient(self.min_observations, n));
        }

        let portfolio = &returns[returns.len() - n..];
        let market = &market_returns[market_returns.len() - n..];

        let market_variance = stats::covariance(market, market);
        if market_variance == 0.0 || !market_variance.is_finite() {
            return Err(RiskError::ComputationError(
                "Market variance is zero".to_string(),
            ));
        }

        let beta = stats::covariance(portfolio, market) / market_variance;
        if !beta.is_finite() {
            return Err(RiskError::ComputationError(format!("Beta is {}", beta)));
        }
        Ok(beta)
    }

    /// Sharpe ratio, or 0.0 when it cannot be estimated
    pub fn sharpe_or_default(&self, returns: &[f64]) -> f64 {
        self.sharpe_ratio(returns).unwrap_or_else(|e| {
            log_fallback("Sharpe ratio", &e, 0.0);
            0.0
        })
    }

    /// Beta, or [`DEFAULT_BETA`] when it cannot be estimated
    pub fn beta_or_default(&self, returns: &[f64], market_returns: &[f64]) -> f64 {
        self.beta(returns, market_returns).unwrap_or_else(|e| {
            log_fallback("Beta", &e, DEFAULT_BETA);
            DEFAULT_BETA
        })
    }
}

fn log_fallback(metric: &str, error: &RiskError, fallback: f64) {
    if error.is_insufficient_data() {
        debug!("{} skipped ({}), using {}", metric, error, fallback);
    } else {
        warn!("{} failed ({}), using {}", metric, error, fallback);
    }
}
