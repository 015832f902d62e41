//! Threshold monitoring over portfolio risk snapshots
//!
//! Point-in-time rules look at one snapshot. Trend rules look at the recent
//! snapshots the monitor has seen for the same portfolio.

use crate::error::RiskResult;
use crate::policy::{RiskPolicyConfig, ThresholdRule, TrendMetric};
use crate::snapshot::RiskMetrics;
use crate::stats;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A threshold breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub portfolio_id: String,

    /// Machine-readable alert type, e.g. `high_var_95`
    pub alert_type: String,

    pub severity: AlertSeverity,
    pub message: String,

    /// Observed value that breached the threshold
    pub value: f64,
    pub threshold: f64,

    /// Asset or asset pair the alert refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,

    pub timestamp: DateTime<Utc>,
}

/// Evaluates snapshots against a threshold policy
pub struct RiskMonitor {
    config: RiskPolicyConfig,

    /// Recent snapshots per portfolio, oldest first
    history: DashMap<String, VecDeque<RiskMetrics>>,

    /// Longest trend window across the rules; 0 keeps no history
    history_len: usize,
}

impl Default for RiskMonitor {
    fn default() -> Self {
        Self::new(RiskPolicyConfig::default())
    }
}

impl RiskMonitor {
    pub fn new(config: RiskPolicyConfig) -> Self {
        let history_len = config
            .policies
            .iter()
            .filter_map(|rule| match rule {
                ThresholdRule::TrendLimit { window, .. } => Some(*window),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        Self {
            config,
            history: DashMap::new(),
            history_len,
        }
    }

    pub fn from_yaml(yaml: &str) -> RiskResult<Self> {
        Ok(Self::new(RiskPolicyConfig::from_yaml(yaml)?))
    }

    pub fn from_json(json: &str) -> RiskResult<Self> {
        Ok(Self::new(RiskPolicyConfig::from_json(json)?))
    }

    pub fn config(&self) -> &RiskPolicyConfig {
        &self.config
    }

    /// Number of snapshots remembered for a portfolio
    pub fn history_len(&self, portfolio_id: &str) -> usize {
        self.history.get(portfolio_id).map_or(0, |h| h.len())
    }

    /// Evaluate every rule against a snapshot
    ///
    /// A snapshot computed from no data raises nothing.
    pub fn evaluate(&self, metrics: &RiskMetrics) -> Vec<RiskAlert> {
        if metrics.observations == 0 {
            debug!("Portfolio {} has no observations, skipping thresholds", metrics.portfolio_id);
            return Vec::new();
        }

        self.record(metrics);

        let mut alerts = Vec::new();
        for rule in &self.config.policies {
            self.evaluate_rule(rule, metrics, &mut alerts);
        }

        for alert in &alerts {
            match alert.severity {
                AlertSeverity::Info => info!("{}", alert.message),
                AlertSeverity::Warning | AlertSeverity::Critical => warn!("{}", alert.message),
            }
        }

        alerts
    }

    /// Remember a snapshot; a repeat of the latest one (a cache hit) is not
    /// counted twice
    fn record(&self, metrics: &RiskMetrics) {
        if self.history_len == 0 {
            return;
        }

        let mut history = self.history.entry(metrics.portfolio_id.clone()).or_default();
        if history.back().map(|m| m.timestamp) == Some(metrics.timestamp) {
            return;
        }
        history.push_back(metrics.clone());
        while history.len() > self.history_len {
            history.pop_front();
        }
    }

    /// Slope of a metric over the last `window` snapshots of a portfolio, or
    /// None with fewer than `min_points` usable values
    fn trend(
        &self,
        portfolio_id: &str,
        metric: &TrendMetric,
        window: usize,
        min_points: usize,
    ) -> Option<f64> {
        let history = self.history.get(portfolio_id)?;
        let values: Vec<f64> = history
            .iter()
            .skip(history.len().saturating_sub(window))
            .filter_map(|m| match metric {
                TrendMetric::Var {
                    confidence_level,
                    method,
                } => m.var(*confidence_level, *method),
                TrendMetric::Volatility { model } => m.volatility(*model),
            })
            .collect();

        if values.len() < min_points.max(2) {
            return None;
        }
        Some(stats::trend_slope(&values))
    }

    fn evaluate_rule(&self, rule: &ThresholdRule, metrics: &RiskMetrics, alerts: &mut Vec<RiskAlert>) {
        let pid = &metrics.portfolio_id;
        let alert = |alert_type: String, severity, message, value, threshold, asset| RiskAlert {
            portfolio_id: pid.clone(),
            alert_type,
            severity,
            message,
            value,
            threshold,
            asset,
            timestamp: metrics.timestamp,
        };

        match rule {
            ThresholdRule::VarLimit {
                confidence_level,
                method,
                max_var,
            } => {
                let Some(var) = metrics.var(*confidence_level, *method) else {
                    debug!(
                        "{} VaR at {} not computed for {}, rule skipped",
                        method, confidence_level, pid
                    );
                    return;
                };
                if var > *max_var {
                    let pct = (confidence_level * 100.0).round();
                    alerts.push(alert(
                        format!("high_var_{}", pct),
                        AlertSeverity::Warning,
                        format!("Portfolio {} VaR ({}%) exceeded threshold: {:.2}%", pid, pct, var * 100.0),
                        var,
                        *max_var,
                        None,
                    ));
                }
            }
            ThresholdRule::VolatilityLimit {
                model,
                max_volatility,
            } => {
                let Some(volatility) = metrics.volatility(*model) else {
                    debug!("{} volatility not computed for {}, rule skipped", model, pid);
                    return;
                };
                if volatility > *max_volatility {
                    alerts.push(alert(
                        "high_volatility".to_string(),
                        AlertSeverity::Warning,
                        format!(
                            "Portfolio {} volatility exceeded threshold: {:.2}%",
                            pid,
                            volatility * 100.0
                        ),
                        volatility,
                        *max_volatility,
                        None,
                    ));
                }
            }
            ThresholdRule::DrawdownLimit { warning, critical } => {
                let drawdown = metrics.current_drawdown;
                if drawdown > *critical {
                    alerts.push(alert(
                        "drawdown_critical".to_string(),
                        AlertSeverity::Critical,
                        format!("Portfolio {} critical drawdown: {:.2}%", pid, drawdown * 100.0),
                        drawdown,
                        *critical,
                        None,
                    ));
                } else if drawdown > *warning {
                    alerts.push(alert(
                        "drawdown_warning".to_string(),
                        AlertSeverity::Warning,
                        format!("Portfolio {} drawdown warning: {:.2}%", pid, drawdown * 100.0),
                        drawdown,
                        *warning,
                        None,
                    ));
                }
            }
            ThresholdRule::SharpeFloor { min_sharpe } => {
                if metrics.sharpe_ratio < *min_sharpe {
                    alerts.push(alert(
                        "low_sharpe_ratio".to_string(),
                        AlertSeverity::Info,
                        format!("Portfolio {} low Sharpe ratio: {:.2}", pid, metrics.sharpe_ratio),
                        metrics.sharpe_ratio,
                        *min_sharpe,
                        None,
                    ));
                }
            }
            ThresholdRule::ComponentVarConcentration { max_share } => {
                let total: f64 = metrics.component_var.values().map(|v| v.abs()).sum();
                if total <= 0.0 {
                    return;
                }
                for (symbol, component) in &metrics.component_var {
                    let share = component.abs() / total;
                    if share > *max_share {
                        alerts.push(alert(
                            "concentration_risk".to_string(),
                            AlertSeverity::Warning,
                            format!(
                                "Portfolio {} concentration risk - {} contributes {:.1}% to VaR",
                                pid,
                                symbol,
                                share * 100.0
                            ),
                            share,
                            *max_share,
                            Some(symbol.clone()),
                        ));
                    }
                }
            }
            ThresholdRule::CorrelationCeiling {
                max_abs_correlation,
            } => {
                for (a, b, rho) in metrics.correlation.pairs() {
                    if rho.abs() > *max_abs_correlation {
                        alerts.push(alert(
                            "high_correlation".to_string(),
                            AlertSeverity::Warning,
                            format!("High correlation detected: {} - {}: {:.2}", a, b, rho),
                            rho.abs(),
                            *max_abs_correlation,
                            Some(format!("{}-{}", a, b)),
                        ));
                    }
                }
            }
            ThresholdRule::TrendLimit {
                metric,
                max_slope,
                window,
                min_points,
            } => {
                let Some(slope) = self.trend(pid, metric, *window, *min_points) else {
                    return;
                };
                if slope > *max_slope {
                    let what = match metric {
                        TrendMetric::Var { .. } => "VaR",
                        TrendMetric::Volatility { .. } => "volatility",
                    };
                    alerts.push(alert(
                        metric.alert_type().to_string(),
                        AlertSeverity::Info,
                        format!("Portfolio {} {} showing increasing trend", pid, what),
                        slope,
                        *max_slope,
                        None,
                    ));
                }
            }
        }
    }
}
