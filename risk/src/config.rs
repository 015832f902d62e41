use crate::correlation::ComponentVarMethod;
use crate::error::{RiskError, RiskResult};
use crate::stress::StressScenario;
use crate::var::{VarConfig, VarMethod};
use crate::volatility::{VolatilityConfig, VolatilityModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Risk engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEngineConfig {
    /// Confidence levels for VaR/CVaR
    #[serde(default = "default_confidence_levels")]
    pub confidence_levels: Vec<f64>,

    /// VaR methods computed for every confidence level
    #[serde(default = "default_var_methods")]
    pub var_methods: Vec<VarMethod>,

    /// Volatility models computed for every snapshot
    #[serde(default = "default_volatility_models")]
    pub volatility_models: Vec<VolatilityModel>,

    /// Calendar days of history requested from the return provider
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Snapshot freshness window in seconds
    #[serde(default = "default_cache_ttl_sec")]
    pub cache_ttl_sec: u64,

    /// Annual risk-free rate used by the Sharpe ratio
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    /// Symbol whose returns are used as the market for beta
    #[serde(default)]
    pub benchmark_symbol: Option<String>,

    /// Component VaR allocation method
    #[serde(default)]
    pub component_var_method: ComponentVarMethod,

    /// Confidence level for component VaR
    #[serde(default = "default_component_var_confidence")]
    pub component_var_confidence: f64,

    /// End of the history window; the current time when unset
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,

    #[serde(default)]
    pub var: VarConfig,

    #[serde(default)]
    pub volatility: VolatilityConfig,

    /// Named scenarios available to scenario reports
    #[serde(default)]
    pub stress_scenarios: Vec<StressScenario>,
}

fn default_confidence_levels() -> Vec<f64> {
    vec![0.95, 0.99]
}

fn default_var_methods() -> Vec<VarMethod> {
    VarMethod::ALL.to_vec()
}

fn default_volatility_models() -> Vec<VolatilityModel> {
    VolatilityModel::ALL.to_vec()
}

fn default_lookback_days() -> u32 {
    252
}

fn default_cache_ttl_sec() -> u64 {
    300
}

fn default_risk_free_rate() -> f64 {
    0.02
}

fn default_component_var_confidence() -> f64 {
    0.95
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            confidence_levels: default_confidence_levels(),
            var_methods: default_var_methods(),
            volatility_models: default_volatility_models(),
            lookback_days: default_lookback_days(),
            cache_ttl_sec: default_cache_ttl_sec(),
            risk_free_rate: default_risk_free_rate(),
            benchmark_symbol: None,
            component_var_method: ComponentVarMethod::default(),
            component_var_confidence: default_component_var_confidence(),
            as_of: None,
            var: VarConfig::default(),
            volatility: VolatilityConfig::default(),
            stress_scenarios: Vec::new(),
        }
    }
}

impl RiskEngineConfig {
    /// Get cache TTL as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_sec)
    }

    /// Check every field for a usable value
    pub fn validate(&self) -> RiskResult<()> {
        if self.confidence_levels.is_empty() {
            return Err(RiskError::Config("confidence_levels is empty".to_string()));
        }
        if let Some(c) = self
            .confidence_levels
            .iter()
            .chain(std::iter::once(&self.component_var_confidence))
            .find(|c| !(**c > 0.0 && **c < 1.0))
        {
            return Err(RiskError::Config(format!(
                "confidence level {} outside (0, 1)",
                c
            )));
        }
        if self.var_methods.is_empty() {
            return Err(RiskError::Config("var_methods is empty".to_string()));
        }
        if self.volatility_models.is_empty() {
            return Err(RiskError::Config("volatility_models is empty".to_string()));
        }
        if self.var.simulations == 0 {
            return Err(RiskError::Config("var.simulations must be positive".to_string()));
        }
        if self.var.min_observations == 0 || self.volatility.min_observations == 0 {
            return Err(RiskError::Config("min_observations must be positive".to_string()));
        }

        let vol = &self.volatility;
        if !(vol.ewma_lambda > 0.0 && vol.ewma_lambda < 1.0) {
            return Err(RiskError::Config(format!(
                "volatility.ewma_lambda {} outside (0, 1)",
                vol.ewma_lambda
            )));
        }
        if vol.garch_alpha < 0.0 || vol.garch_beta < 0.0 || vol.garch_alpha + vol.garch_beta >= 1.0 {
            return Err(RiskError::Config(format!(
                "volatility.garch_alpha + garch_beta must be below 1 (got {} + {})",
                vol.garch_alpha, vol.garch_beta
            )));
        }
        if !(vol.trading_days > 0.0) {
            return Err(RiskError::Config("volatility.trading_days must be positive".to_string()));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(RiskError::Config("risk_free_rate must be finite".to_string()));
        }

        Ok(())
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> RiskResult<Self> {
        let config: RiskEngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> RiskResult<Self> {
        let config: RiskEngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> RiskResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> RiskResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}
