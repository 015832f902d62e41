//! Immutable risk snapshots produced by the engine

use crate::correlation::CorrelationMatrix;
use crate::metrics::ReturnDistribution;
use crate::var::VarMethod;
use crate::volatility::VolatilityModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CONFIDENCE_TOLERANCE: f64 = 1e-9;

/// VaR and CVaR for one (confidence level, method) combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailRiskEstimate {
    pub confidence_level: f64,
    pub method: VarMethod,
    pub var: f64,
    pub cvar: f64,
}

impl TailRiskEstimate {
    fn matches(&self, confidence_level: f64, method: VarMethod) -> bool {
        self.method == method && (self.confidence_level - confidence_level).abs() < CONFIDENCE_TOLERANCE
    }
}

/// Zeroed tail-risk table covering every requested combination
pub(crate) fn zeroed_tail_risk(
    confidence_levels: &[f64],
    methods: &[VarMethod],
) -> Vec<TailRiskEstimate> {
    confidence_levels
        .iter()
        .flat_map(|c| {
            methods.iter().map(move |m| TailRiskEstimate {
                confidence_level: *c,
                method: *m,
                var: 0.0,
                cvar: 0.0,
            })
        })
        .collect()
}

fn find_tail(
    table: &[TailRiskEstimate],
    confidence_level: f64,
    method: VarMethod,
) -> Option<&TailRiskEstimate> {
    table.iter().find(|t| t.matches(confidence_level, method))
}

/// Portfolio risk snapshot
///
/// Created once per computation and never mutated; the cache stores and
/// returns it as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub portfolio_id: String,

    /// Computation time
    pub timestamp: DateTime<Utc>,

    /// Length of the aligned portfolio return series
    pub observations: usize,

    /// Position weights used (market value over total market value)
    pub weights: BTreeMap<String, f64>,

    pub tail_risk: Vec<TailRiskEstimate>,

    /// Annualized volatility per model
    pub volatility: BTreeMap<VolatilityModel, f64>,

    pub sharpe_ratio: f64,

    /// Beta against the configured benchmark, if one is configured
    pub beta: Option<f64>,

    pub max_drawdown: f64,
    pub current_drawdown: f64,
    pub recovery_days: u64,

    /// Contribution to portfolio VaR per symbol
    pub component_var: BTreeMap<String, f64>,

    pub correlation: CorrelationMatrix,

    pub distribution: ReturnDistribution,
}

impl RiskMetrics {
    /// Zeroed snapshot with every configured field present
    pub fn zeroed(
        portfolio_id: impl Into<String>,
        confidence_levels: &[f64],
        methods: &[VarMethod],
        models: &[VolatilityModel],
    ) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            timestamp: Utc::now(),
            observations: 0,
            weights: BTreeMap::new(),
            tail_risk: zeroed_tail_risk(confidence_levels, methods),
            volatility: models.iter().map(|m| (*m, 0.0)).collect(),
            sharpe_ratio: 0.0,
            beta: None,
            max_drawdown: 0.0,
            current_drawdown: 0.0,
            recovery_days: 0,
            component_var: BTreeMap::new(),
            correlation: CorrelationMatrix::default(),
            distribution: ReturnDistribution::default(),
        }
    }

    pub fn tail(&self, confidence_level: f64, method: VarMethod) -> Option<&TailRiskEstimate> {
        find_tail(&self.tail_risk, confidence_level, method)
    }

    pub fn var(&self, confidence_level: f64, method: VarMethod) -> Option<f64> {
        self.tail(confidence_level, method).map(|t| t.var)
    }

    pub fn cvar(&self, confidence_level: f64, method: VarMethod) -> Option<f64> {
        self.tail(confidence_level, method).map(|t| t.cvar)
    }

    pub fn volatility(&self, model: VolatilityModel) -> Option<f64> {
        self.volatility.get(&model).copied()
    }
}

/// Single-asset risk report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRiskReport {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub observations: usize,
    pub tail_risk: Vec<TailRiskEstimate>,
    pub volatility: BTreeMap<VolatilityModel, f64>,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
    pub recovery_days: u64,
    pub distribution: ReturnDistribution,
}

impl AssetRiskReport {
    pub fn zeroed(
        symbol: impl Into<String>,
        confidence_levels: &[f64],
        methods: &[VarMethod],
        models: &[VolatilityModel],
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: Utc::now(),
            observations: 0,
            tail_risk: zeroed_tail_risk(confidence_levels, methods),
            volatility: models.iter().map(|m| (*m, 0.0)).collect(),
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            current_drawdown: 0.0,
            recovery_days: 0,
            distribution: ReturnDistribution::default(),
        }
    }

    pub fn var(&self, confidence_level: f64, method: VarMethod) -> Option<f64> {
        find_tail(&self.tail_risk, confidence_level, method).map(|t| t.var)
    }
}
