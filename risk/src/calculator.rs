//! Snapshot assembly over already-fetched data
//!
//! Everything here is synchronous and CPU-bound. The engine moves a cloned
//! [`RiskCalculator`] and its inputs onto the blocking pool.

use crate::config::RiskEngineConfig;
use crate::correlation::{portfolio_returns, ComponentVarMethod, CorrelationEngine, CorrelationMatrix};
use crate::drawdown::DrawdownAnalyzer;
use crate::error::RiskResult;
use crate::metrics::{PerformanceMetrics, ReturnDistribution};
use crate::provider::ReturnSeries;
use crate::snapshot::{AssetRiskReport, RiskMetrics, TailRiskEstimate};
use crate::stats;
use crate::var::{VarEngine, VarMethod};
use crate::volatility::{VolatilityEstimator, VolatilityModel};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Data needed for one portfolio snapshot
#[derive(Debug, Clone, Default)]
pub struct PortfolioInput {
    /// Weight per symbol
    pub weights: BTreeMap<String, f64>,

    /// Return series per held symbol
    pub series: BTreeMap<String, ReturnSeries>,

    /// Benchmark series for beta
    pub benchmark: Option<ReturnSeries>,
}

/// Return series restricted to the timestamps every series shares
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedReturns {
    pub timestamps: Vec<DateTime<Utc>>,
    pub returns: BTreeMap<String, Vec<f64>>,
}

impl AlignedReturns {
    /// Intersect timestamps across every series
    ///
    /// Each series contributes one value per common timestamp; a repeated
    /// timestamp keeps its last observation.
    pub fn align<'a, I>(series: I) -> Self
    where
        I: IntoIterator<Item = &'a ReturnSeries>,
    {
        let series: Vec<&ReturnSeries> = series.into_iter().collect();
        let Some((first, rest)) = series.split_first() else {
            return Self::default();
        };

        let mut common: BTreeSet<DateTime<Utc>> = first.timestamps.iter().copied().collect();
        for s in rest {
            let other: BTreeSet<DateTime<Utc>> = s.timestamps.iter().copied().collect();
            common = common.intersection(&other).copied().collect();
        }

        let returns = series
            .iter()
            .map(|s| {
                let by_time: BTreeMap<DateTime<Utc>, f64> =
                    s.timestamps.iter().copied().zip(s.returns.iter().copied()).collect();
                let values = common.iter().filter_map(|t| by_time.get(t).copied()).collect();
                (s.symbol.clone(), values)
            })
            .collect();

        Self {
            timestamps: common.into_iter().collect(),
            returns,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Stateless risk calculator configured once per engine
#[derive(Debug, Clone)]
pub struct RiskCalculator {
    confidence_levels: Vec<f64>,
    var_methods: Vec<VarMethod>,
    volatility_models: Vec<VolatilityModel>,
    component_var_method: ComponentVarMethod,
    component_var_confidence: f64,
    var_engine: VarEngine,
    volatility: VolatilityEstimator,
    drawdown: DrawdownAnalyzer,
    correlation: CorrelationEngine,
    performance: PerformanceMetrics,
}

impl RiskCalculator {
    pub fn new(config: &RiskEngineConfig) -> Self {
        Self {
            confidence_levels: config.confidence_levels.clone(),
            var_methods: config.var_methods.clone(),
            volatility_models: config.volatility_models.clone(),
            component_var_method: config.component_var_method,
            component_var_confidence: config.component_var_confidence,
            var_engine: VarEngine::new(config.var.clone()),
            volatility: VolatilityEstimator::new(config.volatility.clone()),
            drawdown: DrawdownAnalyzer::new(),
            correlation: CorrelationEngine::new(config.var.clone()),
            performance: PerformanceMetrics::new(config.risk_free_rate)
                .with_min_observations(config.var.min_observations)
                .with_trading_days(config.volatility.trading_days),
        }
    }

    pub fn zeroed_metrics(&self, portfolio_id: &str) -> RiskMetrics {
        RiskMetrics::zeroed(
            portfolio_id,
            &self.confidence_levels,
            &self.var_methods,
            &self.volatility_models,
        )
    }

    fn tail_risk(&self, returns: &[f64]) -> RiskResult<Vec<TailRiskEstimate>> {
        let mut table = Vec::with_capacity(self.confidence_levels.len() * self.var_methods.len());
        for &confidence_level in &self.confidence_levels {
            for &method in &self.var_methods {
                let report = self.var_engine.calculate(returns, confidence_level, method)?;
                table.push(TailRiskEstimate {
                    confidence_level,
                    method,
                    var: report.var,
                    cvar: report.cvar,
                });
            }
        }
        Ok(table)
    }

    fn volatilities(&self, returns: &[f64]) -> BTreeMap<VolatilityModel, f64> {
        self.volatility_models
            .iter()
            .map(|model| (*model, self.volatility.calculate(returns, *model).volatility))
            .collect()
    }

    /// Correlation matrix of aligned returns
    pub fn correlation_matrix(&self, aligned: &AlignedReturns) -> RiskResult<CorrelationMatrix> {
        match self.correlation.correlation_matrix(&aligned.returns) {
            Err(e) if e.is_recoverable() => {
                warn!("Correlation matrix failed, using identity: {}", e);
                Ok(CorrelationMatrix::identity(
                    aligned.returns.keys().cloned().collect(),
                ))
            }
            other => other,
        }
    }

    /// Build a portfolio snapshot
    ///
    /// Symbols whose series is empty are left out of the alignment so one
    /// missing history does not erase the others.
    pub fn portfolio_metrics(&self, portfolio_id: &str, input: &PortfolioInput) -> RiskResult<RiskMetrics> {
        let mut metrics = self.zeroed_metrics(portfolio_id);
        metrics.weights = input.weights.clone();

        let held: Vec<&ReturnSeries> = input
            .series
            .values()
            .filter(|s| input.weights.contains_key(&s.symbol))
            .filter(|s| {
                if s.is_empty() {
                    warn!("No returns for {} in portfolio {}", s.symbol, portfolio_id);
                }
                !s.is_empty()
            })
            .collect();

        let aligned = AlignedReturns::align(held);
        if aligned.is_empty() {
            debug!("Portfolio {} has no aligned returns, reporting zeros", portfolio_id);
            return Ok(metrics);
        }

        let returns = portfolio_returns(&input.weights, &aligned.returns);
        metrics.observations = returns.len();
        metrics.tail_risk = self.tail_risk(&returns)?;
        metrics.volatility = self.volatilities(&returns);
        metrics.sharpe_ratio = self.performance.sharpe_or_default(&returns);

        metrics.beta = input.benchmark.as_ref().map(|benchmark| {
            let portfolio = ReturnSeries {
                symbol: portfolio_id.to_string(),
                timestamps: aligned.timestamps.clone(),
                returns: returns.clone(),
            };
            let pair = AlignedReturns::align([&portfolio, benchmark]);
            let market = pair.returns.get(&benchmark.symbol).map(Vec::as_slice).unwrap_or(&[]);
            let own = pair.returns.get(portfolio_id).map(Vec::as_slice).unwrap_or(&[]);
            self.performance.beta_or_default(own, market)
        });

        if returns.len() >= self.min_observations() {
            let values = stats::cumulative_values(&returns);
            let drawdown = self
                .drawdown
                .analyze_with_timestamps(&values, &aligned.timestamps)?;
            metrics.max_drawdown = drawdown.max_drawdown;
            metrics.current_drawdown = drawdown.current_drawdown;
            metrics.recovery_days = drawdown.recovery_days;
            metrics.distribution = ReturnDistribution::from_returns(&returns);
        }

        metrics.component_var = self.correlation.component_var(
            &input.weights,
            &aligned.returns,
            self.component_var_confidence,
            self.component_var_method,
        )?;
        metrics.correlation = self.correlation_matrix(&aligned)?;
        metrics.timestamp = Utc::now();

        Ok(metrics)
    }

    /// Build a single-asset report; fewer than the minimum observations gives
    /// a zeroed report
    pub fn asset_report(&self, series: &ReturnSeries) -> RiskResult<AssetRiskReport> {
        let series = &series.clone().normalized();
        let mut report = AssetRiskReport::zeroed(
            series.symbol.clone(),
            &self.confidence_levels,
            &self.var_methods,
            &self.volatility_models,
        );
        report.observations = series.len();

        if series.len() < self.min_observations() {
            debug!(
                "{} has {} observations, reporting zeros",
                series.symbol,
                series.len()
            );
            return Ok(report);
        }

        let returns = &series.returns;
        report.tail_risk = self.tail_risk(returns)?;
        report.volatility = self.volatilities(returns);
        report.sharpe_ratio = self.performance.sharpe_or_default(returns);

        let values = stats::cumulative_values(returns);
        let drawdown = self
            .drawdown
            .analyze_with_timestamps(&values, &series.timestamps)?;
        report.max_drawdown = drawdown.max_drawdown;
        report.current_drawdown = drawdown.current_drawdown;
        report.recovery_days = drawdown.recovery_days;
        report.distribution = ReturnDistribution::from_returns(returns);
        report.timestamp = Utc::now();

        Ok(report)
    }

    fn min_observations(&self) -> usize {
        self.var_engine.config().min_observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn wave(n: usize, phase: usize, scale: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (((i + phase) * 37 % 17) as f64 - 8.0) * scale)
            .collect()
    }

    fn input(weights: &[(&str, f64)], series: Vec<ReturnSeries>) -> PortfolioInput {
        PortfolioInput {
            weights: weights.iter().map(|(s, w)| (s.to_string(), *w)).collect(),
            series: series.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
            benchmark: None,
        }
    }

    #[test]
    fn test_align_intersects_timestamps() {
        let a = ReturnSeries::daily("A", start(), vec![0.1, 0.2, 0.3, 0.4]);
        let b = ReturnSeries::daily("B", start() + Duration::days(2), vec![0.5, 0.6, 0.7]);

        let aligned = AlignedReturns::align([&a, &b]);
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned.returns["A"], vec![0.3, 0.4]);
        assert_eq!(aligned.returns["B"], vec![0.5, 0.6]);
        assert!(AlignedReturns::align(Vec::<&ReturnSeries>::new()).is_empty());
    }

    #[test]
    fn test_align_with_repeated_timestamp() {
        let mut a = ReturnSeries::daily("A", start(), vec![0.1, 0.2, 0.3, 0.4]);
        a.timestamps[2] = a.timestamps[1];
        let b = ReturnSeries::daily("B", start(), vec![0.5, 0.6, 0.7, 0.8]);

        let aligned = AlignedReturns::align([&a, &b]);
        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned.returns["A"], vec![0.1, 0.3, 0.4]);
        assert_eq!(aligned.returns["B"], vec![0.5, 0.6, 0.8]);
    }

    #[test]
    fn test_portfolio_metrics() {
        let calculator = RiskCalculator::new(&RiskEngineConfig::default());
        let input = input(
            &[("AAA", 0.6), ("BBB", 0.4)],
            vec![
                ReturnSeries::daily("AAA", start(), wave(80, 0, 0.002)),
                ReturnSeries::daily("BBB", start(), wave(80, 5, 0.003)),
            ],
        );

        let metrics = calculator.portfolio_metrics("p1", &input).unwrap();
        assert_eq!(metrics.observations, 80);
        assert_eq!(metrics.tail_risk.len(), 6);
        for tail in &metrics.tail_risk {
            assert!(tail.var > 0.0);
            assert!(tail.cvar + 1e-12 >= tail.var);
        }
        assert!(metrics.volatility(VolatilityModel::Historical).unwrap() > 0.0);
        assert_eq!(metrics.component_var.len(), 2);
        assert_eq!(metrics.correlation.len(), 2);
        assert!(metrics.beta.is_none());
        assert!(metrics.max_drawdown > 0.0);
    }

    #[test]
    fn test_beta_against_benchmark() {
        let calculator = RiskCalculator::new(&RiskEngineConfig::default());
        let market = wave(60, 2, 0.004);
        let mut input = input(
            &[("AAA", 1.0)],
            vec![ReturnSeries::daily(
                "AAA",
                start(),
                market.iter().map(|m| m * 1.5).collect(),
            )],
        );
        input.benchmark = Some(ReturnSeries::daily("SPY", start(), market));

        let metrics = calculator.portfolio_metrics("p1", &input).unwrap();
        assert_relative_eq!(metrics.beta.unwrap(), 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_history_gives_zeroed_snapshot() {
        let calculator = RiskCalculator::new(&RiskEngineConfig::default());
        let input = input(&[("AAA", 1.0)], vec![ReturnSeries::empty("AAA")]);

        let metrics = calculator.portfolio_metrics("p1", &input).unwrap();
        assert_eq!(metrics.observations, 0);
        assert_eq!(metrics.tail_risk.len(), 6);
        assert!(metrics.tail_risk.iter().all(|t| t.var == 0.0 && t.cvar == 0.0));
        assert_eq!(metrics.weights["AAA"], 1.0);
    }

    #[test]
    fn test_short_history_zeroes_estimates() {
        let calculator = RiskCalculator::new(&RiskEngineConfig::default());
        let input = input(
            &[("AAA", 1.0)],
            vec![ReturnSeries::daily("AAA", start(), wave(12, 0, 0.01))],
        );

        let metrics = calculator.portfolio_metrics("p1", &input).unwrap();
        assert_eq!(metrics.observations, 12);
        assert!(metrics.tail_risk.iter().all(|t| t.var == 0.0));
        assert!(metrics.volatility.values().all(|v| *v == 0.0));
        assert_eq!(metrics.max_drawdown, 0.0);
        assert_eq!(metrics.component_var["AAA"], 0.0);
    }

    #[test]
    fn test_asset_report() {
        let calculator = RiskCalculator::new(&RiskEngineConfig::default());
        let series = ReturnSeries::daily("AAA", start(), wave(60, 0, 0.002));

        let report = calculator.asset_report(&series).unwrap();
        assert_eq!(report.observations, 60);
        assert!(report.var(0.95, VarMethod::Historical).unwrap() > 0.0);
        assert!(report.distribution.std_dev > 0.0);

        let short = ReturnSeries::daily("BBB", start(), wave(10, 0, 0.002));
        let report = calculator.asset_report(&short).unwrap();
        assert_eq!(report.observations, 10);
        assert_eq!(report.distribution, ReturnDistribution::default());

        let mut ragged = ReturnSeries::daily("CCC", start(), wave(60, 3, 0.002));
        ragged.timestamps[10] = ragged.timestamps[9];
        ragged.returns.push(0.01);
        let report = calculator.asset_report(&ragged).unwrap();
        assert_eq!(report.observations, 59);
        assert!(report.volatility[&VolatilityModel::Historical] > 0.0);
    }
}
