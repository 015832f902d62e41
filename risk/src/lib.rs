//! # finmon-risk: Portfolio Risk Analytics
//!
//! This library computes portfolio risk snapshots from holdings and return
//! histories supplied by pluggable providers.
//!
//! ## Core Components
//!
//! - **VarEngine**: Value-at-Risk and Conditional VaR (historical, parametric, Monte Carlo)
//! - **VolatilityEstimator**: Annualized volatility (historical, EWMA, GARCH(1,1))
//! - **DrawdownAnalyzer**: Maximum and current drawdown with recovery time
//! - **CorrelationEngine**: Correlation matrices and component VaR
//! - **RiskEngine**: Async orchestration with a TTL cache and single-flight computation
//! - **RiskMonitor**: YAML/JSON threshold policies raising alerts on snapshots
//! - **StressTestEngine**: Shock scenarios applied to positions
//!
//! ## Example Usage
//!
//! ```rust
//! use finmon_risk::{calculate_var_cvar, VarMethod};
//!
//! let returns: Vec<f64> = (0..100).map(|i| ((i * 37 % 17) as f64 - 8.0) / 1000.0).collect();
//!
//! let report = calculate_var_cvar(&returns, 0.95, VarMethod::Historical).unwrap();
//! assert!(report.var > 0.0);
//! assert!(report.cvar >= report.var);
//! ```

pub mod cache;
pub mod calculator;
pub mod config;
pub mod correlation;
pub mod drawdown;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod policy;
pub mod provider;
pub mod snapshot;
pub mod stats;
pub mod stress;
pub mod var;
pub mod volatility;

pub use cache::{cache_key, CacheBackend, CacheStats, MemoryCache, RiskCacheEntry};
pub use calculator::{AlignedReturns, PortfolioInput, RiskCalculator};
pub use config::RiskEngineConfig;
pub use correlation::{
    portfolio_returns, ComponentVarMethod, ComponentVarReport, CorrelationEngine, CorrelationMatrix,
};
pub use drawdown::{DrawdownAnalyzer, DrawdownReport};
pub use engine::{portfolio_weights, PortfolioState, RiskEngine};
pub use error::{RiskError, RiskResult};
pub use metrics::{PerformanceMetrics, ReturnDistribution, DEFAULT_BETA};
pub use monitor::{AlertSeverity, RiskAlert, RiskMonitor};
pub use policy::{RiskPolicyConfig, ThresholdRule, TrendMetric};
pub use provider::{
    MarketDataFile, Position, PositionProvider, ReturnSeries, ReturnSeriesProvider, SeriesData,
    StaticMarketData,
};
pub use snapshot::{AssetRiskReport, RiskMetrics, TailRiskEstimate};
pub use stress::{
    PositionImpact, StressScenario, StressTestEngine, StressTestReport, StressTestResult,
};
pub use var::{VarConfig, VarCvar, VarCvarReport, VarEngine, VarMethod};
pub use volatility::{VolatilityConfig, VolatilityEstimator, VolatilityModel, VolatilityReport};

use std::collections::BTreeMap;

/// VaR and CVaR with default settings
///
/// Fewer than 30 returns give a zeroed report; an invalid confidence level is
/// an error.
pub fn calculate_var_cvar(
    returns: &[f64],
    confidence_level: f64,
    method: VarMethod,
) -> RiskResult<VarCvarReport> {
    VarEngine::default().calculate(returns, confidence_level, method)
}

/// Annualized volatility with default settings
pub fn calculate_portfolio_volatility(returns: &[f64], model: VolatilityModel) -> VolatilityReport {
    VolatilityEstimator::default().calculate(returns, model)
}

/// Drawdown statistics of a value series, recovery measured in periods
pub fn calculate_max_drawdown(values: &[f64]) -> DrawdownReport {
    DrawdownAnalyzer::new().analyze(values)
}

/// Pearson correlation matrix over the most recent common window
pub fn calculate_correlation_matrix(
    asset_returns: &BTreeMap<String, Vec<f64>>,
) -> RiskResult<CorrelationMatrix> {
    CorrelationEngine::default().correlation_matrix(asset_returns)
}

/// Correlation-scaled component VaR per weighted symbol
pub fn calculate_component_var(
    weights: &BTreeMap<String, f64>,
    asset_returns: &BTreeMap<String, Vec<f64>>,
    confidence_level: f64,
) -> RiskResult<BTreeMap<String, f64>> {
    CorrelationEngine::default().component_var(
        weights,
        asset_returns,
        confidence_level,
        ComponentVarMethod::CorrelationScaled,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn returns(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| ((i * 37 % 17) as f64 - 8.0) / 1000.0)
            .collect()
    }

    #[test]
    fn test_short_series_gives_zeros() {
        let short = returns(29);
        for method in VarMethod::ALL {
            let report = calculate_var_cvar(&short, 0.95, method).unwrap();
            assert_eq!((report.var, report.cvar), (0.0, 0.0));
            assert_eq!(report.observations, 29);
        }

        let vol = calculate_portfolio_volatility(&short, VolatilityModel::Ewma);
        assert_eq!(vol.volatility, 0.0);
    }

    #[test]
    fn test_invalid_confidence_is_an_error() {
        assert!(matches!(
            calculate_var_cvar(&returns(50), 1.5, VarMethod::Historical),
            Err(RiskError::InvalidConfidenceLevel(_))
        ));
    }

    #[test]
    fn test_drawdown_entry_point() {
        let report = calculate_max_drawdown(&[100.0, 110.0, 90.0, 95.0, 120.0]);
        assert!((report.max_drawdown - 20.0 / 110.0).abs() < 1e-12);
        assert_eq!(report.current_drawdown, 0.0);
        assert_eq!(report.recovery_days, 2);
    }

    #[test]
    fn test_component_var_covers_weights() {
        let mut asset_returns = BTreeMap::new();
        asset_returns.insert("AAA".to_string(), returns(60));
        asset_returns.insert("BBB".to_string(), returns(61)[1..].to_vec());

        let weights: BTreeMap<String, f64> =
            [("AAA".to_string(), 0.5), ("BBB".to_string(), 0.5)].into_iter().collect();

        let components = calculate_component_var(&weights, &asset_returns, 0.95).unwrap();
        assert_eq!(components.len(), 2);
        assert!(components.values().all(|v| v.is_finite()));

        let matrix = calculate_correlation_matrix(&asset_returns).unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.get("AAA", "AAA"), Some(1.0));
    }
}
