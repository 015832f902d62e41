//! Cross-asset correlation and component VaR decomposition
//!
//! Portfolio returns are the weighted sum of the asset series over their most
//! recent common window. Component VaR is available in two flavours:
//! - Correlation scaled: `w_i · |z| · ρ(asset_i, portfolio) · σ_i`
//! - Euler: `w_i · |z| · (Σw)_i / σ_p`, which sums to `|z| · σ_p`

use crate::error::{check_confidence, RiskError, RiskResult};
use crate::stats;
use crate::var::{VarConfig, VarEngine, VarMethod};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Component VaR allocation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentVarMethod {
    #[default]
    CorrelationScaled,
    Euler,
}

impl ComponentVarMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentVarMethod::CorrelationScaled => "correlation_scaled",
            ComponentVarMethod::Euler => "euler",
        }
    }
}

impl fmt::Display for ComponentVarMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentVarMethod {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "correlation_scaled" | "correlation" => Ok(ComponentVarMethod::CorrelationScaled),
            "euler" => Ok(ComponentVarMethod::Euler),
            other => Err(RiskError::InvalidParameter(format!(
                "Unknown component VaR method '{}': expected correlation_scaled or euler",
                other
            ))),
        }
    }
}

/// Symmetric Pearson correlation matrix with labelled rows and columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// Row/column labels, sorted
    pub symbols: Vec<String>,

    /// Row-major values, `values[i][j]` is the correlation of symbols i and j
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn identity(symbols: Vec<String>) -> Self {
        let n = symbols.len();
        let values = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        Self { symbols, values }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Look up the correlation between two symbols
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        self.values.get(i)?.get(j).copied()
    }

    /// One row per symbol with one value per symbol
    pub fn is_square(&self) -> bool {
        self.values.len() == self.symbols.len()
            && self.values.iter().all(|row| row.len() == self.symbols.len())
    }

    /// Every unordered off-diagonal pair; cells missing from a ragged matrix
    /// are skipped
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.symbols.iter().enumerate().flat_map(move |(i, a)| {
            self.symbols[i + 1..].iter().enumerate().filter_map(move |(k, b)| {
                let rho = self.values.get(i)?.get(i + 1 + k)?;
                Some((a.as_str(), b.as_str(), *rho))
            })
        })
    }

    fn from_matrix(symbols: Vec<String>, matrix: &DMatrix<f64>) -> Self {
        let n = symbols.len();
        let values = (0..n)
            .map(|i| (0..n).map(|j| matrix[(i, j)]).collect())
            .collect();
        Self { symbols, values }
    }
}

/// Component VaR decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVarReport {
    /// Historical VaR of the weighted portfolio series
    pub portfolio_var: f64,

    pub confidence: f64,
    pub method: ComponentVarMethod,

    /// Contribution per symbol
    pub components: BTreeMap<String, f64>,

    /// Length of the aligned window used
    pub observations: usize,
}

/// Correlation and component VaR engine
#[derive(Debug, Clone, Default)]
pub struct CorrelationEngine {
    var_engine: VarEngine,
}

impl CorrelationEngine {
    pub fn new(var_config: VarConfig) -> Self {
        Self {
            var_engine: VarEngine::new(var_config),
        }
    }

    fn min_observations(&self) -> usize {
        self.var_engine.config().min_observations
    }

    /// Pearson correlation matrix over the most recent common window
    ///
    /// Empty input gives an empty matrix. Fewer aligned observations than the
    /// configured minimum gives the identity matrix.
    pub fn correlation_matrix(
        &self,
        asset_returns: &BTreeMap<String, Vec<f64>>,
    ) -> RiskResult<CorrelationMatrix> {
        let symbols: Vec<String> = asset_returns.keys().cloned().collect();
        if symbols.is_empty() {
            return Ok(CorrelationMatrix::default());
        }

        let n_obs = stats::common_tail_len(asset_returns.values().map(|v| v.as_slice()));
        if n_obs < self.min_observations() {
            debug!(
                "Correlation over {} assets needs {} observations, got {}; using identity",
                symbols.len(),
                self.min_observations(),
                n_obs
            );
            return Ok(CorrelationMatrix::identity(symbols));
        }

        let covariance = covariance_matrix(asset_returns, n_obs)?;
        let k = symbols.len();
        let mut corr = DMatrix::<f64>::identity(k, k);
        for i in 0..k {
            for j in (i + 1)..k {
                let denom = (covariance[(i, i)] * covariance[(j, j)]).sqrt();
                let rho = if denom > 0.0 {
                    (covariance[(i, j)] / denom).clamp(-1.0, 1.0)
                } else {
                    0.0
                };
                corr[(i, j)] = rho;
                corr[(j, i)] = rho;
            }
        }

        Ok(CorrelationMatrix::from_matrix(symbols, &corr))
    }

    /// Decompose portfolio VaR into per-asset contributions
    ///
    /// Symbols that carry a weight but have no return series are ignored.
    pub fn decompose(
        &self,
        weights: &BTreeMap<String, f64>,
        asset_returns: &BTreeMap<String, Vec<f64>>,
        confidence_level: f64,
        method: ComponentVarMethod,
    ) -> RiskResult<ComponentVarReport> {
        check_confidence(confidence_level)?;

        let held: BTreeMap<String, Vec<f64>> = asset_returns
            .iter()
            .filter(|(symbol, _)| weights.contains_key(*symbol))
            .map(|(symbol, returns)| (symbol.clone(), returns.clone()))
            .collect();

        let n_obs = stats::common_tail_len(held.values().map(|v| v.as_slice()));
        if held.is_empty() || n_obs < self.min_observations() {
            return Err(RiskError::insufficient(self.min_observations(), n_obs));
        }

        let portfolio = portfolio_returns(weights, &held);
        let portfolio_var = self
            .var_engine
            .estimate(&portfolio, confidence_level, VarMethod::Historical)?
            .var;

        let z = stats::normal_quantile(1.0 - confidence_level)?.abs();
        let components = match method {
            ComponentVarMethod::CorrelationScaled => {
                correlation_scaled(weights, &held, &portfolio, z)
            }
            ComponentVarMethod::Euler => euler(weights, &held, n_obs, z)?,
        };

        if components.values().any(|v| !v.is_finite()) {
            return Err(RiskError::ComputationError(
                "Component VaR produced a non-finite contribution".to_string(),
            ));
        }

        Ok(ComponentVarReport {
            portfolio_var,
            confidence: confidence_level,
            method,
            components,
            observations: n_obs,
        })
    }

    /// Component VaR mapping for API consumers
    ///
    /// Short or degenerate data maps every weighted symbol to zero.
    pub fn component_var(
        &self,
        weights: &BTreeMap<String, f64>,
        asset_returns: &BTreeMap<String, Vec<f64>>,
        confidence_level: f64,
        method: ComponentVarMethod,
    ) -> RiskResult<BTreeMap<String, f64>> {
        match self.decompose(weights, asset_returns, confidence_level, method) {
            Ok(report) => Ok(report.components),
            Err(e) if e.is_recoverable() => {
                if e.is_insufficient_data() {
                    debug!("Component VaR skipped: {}", e);
                } else {
                    warn!("Component VaR failed, reporting zero: {}", e);
                }
                Ok(weights.keys().map(|symbol| (symbol.clone(), 0.0)).collect())
            }
            Err(e) => Err(e),
        }
    }
}

/// Weighted sum of asset returns over their most recent common window
///
/// Symbols without a weight contribute nothing; weights are used as given.
pub fn portfolio_returns(
    weights: &BTreeMap<String, f64>,
    asset_returns: &BTreeMap<String, Vec<f64>>,
) -> Vec<f64> {
    let weighted: Vec<(f64, &[f64])> = asset_returns
        .iter()
        .filter_map(|(symbol, returns)| weights.get(symbol).map(|w| (*w, returns.as_slice())))
        .collect();

    let n = stats::common_tail_len(weighted.iter().map(|(_, r)| *r));
    let mut portfolio = vec![0.0; n];
    for (weight, returns) in weighted {
        let tail = &returns[returns.len() - n..];
        for (p, r) in portfolio.iter_mut().zip(tail) {
            *p += weight * r;
        }
    }
    portfolio
}

/// Population covariance of the aligned tails, columns in key order
fn covariance_matrix(
    asset_returns: &BTreeMap<String, Vec<f64>>,
    n_obs: usize,
) -> RiskResult<DMatrix<f64>> {
    let k = asset_returns.len();
    let mut centered = DMatrix::<f64>::zeros(n_obs, k);
    for (j, returns) in asset_returns.values().enumerate() {
        let tail = &returns[returns.len() - n_obs..];
        let mean = stats::mean(tail);
        for (i, r) in tail.iter().enumerate() {
            centered[(i, j)] = r - mean;
        }
    }

    let covariance = centered.transpose() * &centered / n_obs as f64;
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(RiskError::MatrixError(
            "Covariance matrix contains non-finite entries".to_string(),
        ));
    }
    Ok(covariance)
}

fn correlation_scaled(
    weights: &BTreeMap<String, f64>,
    held: &BTreeMap<String, Vec<f64>>,
    portfolio: &[f64],
    z: f64,
) -> BTreeMap<String, f64> {
    let n = portfolio.len();
    held.iter()
        .map(|(symbol, returns)| {
            let tail = &returns[returns.len() - n..];
            let rho = stats::pearson(tail, portfolio).unwrap_or(0.0);
            let marginal = z * rho * stats::std_dev(tail);
            (symbol.clone(), weights[symbol] * marginal)
        })
        .collect()
}

fn euler(
    weights: &BTreeMap<String, f64>,
    held: &BTreeMap<String, Vec<f64>>,
    n_obs: usize,
    z: f64,
) -> RiskResult<BTreeMap<String, f64>> {
    let covariance = covariance_matrix(held, n_obs)?;
    let w = DVector::from_iterator(held.len(), held.keys().map(|s| weights[s]));

    let portfolio_variance = (w.transpose() * &covariance * &w)[(0, 0)];
    if !(portfolio_variance > 0.0) {
        return Err(RiskError::ComputationError(format!(
            "Portfolio variance is not positive: {}",
            portfolio_variance
        )));
    }
    let portfolio_volatility = portfolio_variance.sqrt();

    let marginal = &covariance * &w / portfolio_volatility * z;
    Ok(held
        .keys()
        .enumerate()
        .map(|(i, symbol)| (symbol.clone(), w[i] * marginal[i]))
        .collect())
}
