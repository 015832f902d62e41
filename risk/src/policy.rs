//! Risk threshold policy definitions
//!
//! Policies are loaded from YAML or JSON documents and evaluated against
//! portfolio snapshots by the [`RiskMonitor`](crate::monitor::RiskMonitor).

use crate::error::RiskResult;
use crate::var::VarMethod;
use crate::volatility::VolatilityModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete threshold policy configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskPolicyConfig {
    /// List of threshold rules to evaluate
    pub policies: Vec<ThresholdRule>,
}

impl Default for RiskPolicyConfig {
    fn default() -> Self {
        Self {
            policies: vec![
                ThresholdRule::VarLimit {
                    confidence_level: 0.95,
                    method: VarMethod::Historical,
                    max_var: 0.05,
                },
                ThresholdRule::VarLimit {
                    confidence_level: 0.99,
                    method: VarMethod::Historical,
                    max_var: 0.08,
                },
                ThresholdRule::VolatilityLimit {
                    model: VolatilityModel::Historical,
                    max_volatility: 0.30,
                },
                ThresholdRule::DrawdownLimit {
                    warning: 0.05,
                    critical: 0.10,
                },
                ThresholdRule::SharpeFloor { min_sharpe: 0.5 },
                ThresholdRule::ComponentVarConcentration { max_share: 0.30 },
                ThresholdRule::CorrelationCeiling {
                    max_abs_correlation: 0.8,
                },
                ThresholdRule::TrendLimit {
                    metric: TrendMetric::Var {
                        confidence_level: 0.95,
                        method: VarMethod::Historical,
                    },
                    max_slope: 0.02,
                    window: default_trend_window(),
                    min_points: default_trend_min_points(),
                },
                ThresholdRule::TrendLimit {
                    metric: TrendMetric::Volatility {
                        model: VolatilityModel::Historical,
                    },
                    max_slope: 0.05,
                    window: default_trend_window(),
                    min_points: default_trend_min_points(),
                },
            ],
        }
    }
}

impl RiskPolicyConfig {
    pub fn from_yaml(yaml: &str) -> RiskResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> RiskResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> RiskResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// Individual threshold rule types
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ThresholdRule {
    /// Warn when VaR at a confidence level exceeds a limit
    VarLimit {
        confidence_level: f64,

        #[serde(default = "default_var_method")]
        method: VarMethod,

        /// Maximum VaR as a fraction of portfolio value
        max_var: f64,
    },

    /// Warn when annualized volatility exceeds a limit
    VolatilityLimit {
        #[serde(default = "default_volatility_model")]
        model: VolatilityModel,

        max_volatility: f64,
    },

    /// Warn, then escalate to critical, as the current drawdown deepens
    DrawdownLimit { warning: f64, critical: f64 },

    /// Informational alert when the Sharpe ratio falls below a floor
    SharpeFloor { min_sharpe: f64 },

    /// Warn when one asset carries too large a share of total |component VaR|
    ComponentVarConcentration { max_share: f64 },

    /// Warn for every asset pair whose |correlation| exceeds a ceiling
    CorrelationCeiling { max_abs_correlation: f64 },

    /// Informational alert when a metric rises by more than `max_slope` per
    /// snapshot, fitted over the last `window` snapshots of a portfolio
    TrendLimit {
        metric: TrendMetric,
        max_slope: f64,

        #[serde(default = "default_trend_window")]
        window: usize,

        /// Snapshots required before the slope is trusted
        #[serde(default = "default_trend_min_points")]
        min_points: usize,
    },
}

/// Snapshot metric tracked by a [`ThresholdRule::TrendLimit`]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrendMetric {
    Var {
        confidence_level: f64,

        #[serde(default = "default_var_method")]
        method: VarMethod,
    },
    Volatility {
        #[serde(default = "default_volatility_model")]
        model: VolatilityModel,
    },
}

impl TrendMetric {
    /// Alert type raised when the metric trends up
    pub fn alert_type(&self) -> &'static str {
        match self {
            TrendMetric::Var { .. } => "increasing_var_trend",
            TrendMetric::Volatility { .. } => "increasing_volatility_trend",
        }
    }
}

fn default_var_method() -> VarMethod {
    VarMethod::Historical
}

fn default_trend_window() -> usize {
    10
}

fn default_trend_min_points() -> usize {
    5
}

fn default_volatility_model() -> VolatilityModel {
    VolatilityModel::Historical
}

impl ThresholdRule {
    /// Get a human-readable name for this rule type
    pub fn name(&self) -> &'static str {
        match self {
            ThresholdRule::VarLimit { .. } => "VarLimit",
            ThresholdRule::VolatilityLimit { .. } => "VolatilityLimit",
            ThresholdRule::DrawdownLimit { .. } => "DrawdownLimit",
            ThresholdRule::SharpeFloor { .. } => "SharpeFloor",
            ThresholdRule::ComponentVarConcentration { .. } => "ComponentVarConcentration",
            ThresholdRule::CorrelationCeiling { .. } => "CorrelationCeiling",
            ThresholdRule::TrendLimit { .. } => "TrendLimit",
        }
    }
}
