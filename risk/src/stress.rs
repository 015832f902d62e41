//! Stress testing and scenario analysis
//!
//! A scenario is a set of instantaneous price shocks keyed by symbol
//! (e.g. -0.20 for a 20% drop). Applying it to current positions gives the
//! stressed portfolio value and per-position impacts.

use crate::error::{RiskError, RiskResult};
use crate::provider::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Stress test scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    /// Scenario name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Price shocks by symbol; unlisted symbols are unshocked
    pub shocks: BTreeMap<String, f64>,
}

impl StressScenario {
    pub fn new(name: impl Into<String>, shocks: BTreeMap<String, f64>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shocks,
        }
    }
}

/// Effect of a scenario on one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionImpact {
    pub original_value: f64,
    pub shock: f64,
    pub stressed_value: f64,
    pub impact: f64,
}

/// Result of a stress test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub scenario_name: String,

    pub original_value: f64,
    pub stressed_value: f64,

    /// Change in portfolio value (negative for a loss)
    pub total_impact: f64,

    /// Total impact as a fraction of the original value
    pub impact_percentage: f64,

    /// Position with the most negative impact, if any position lost value
    pub worst_position: Option<String>,
    pub worst_position_impact: f64,

    pub position_impacts: BTreeMap<String, PositionImpact>,

    /// Shocks as supplied
    pub shocks: BTreeMap<String, f64>,

    pub timestamp: DateTime<Utc>,
}

/// Summary across several scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestReport {
    pub results: Vec<StressTestResult>,

    pub worst_scenario: String,

    /// Most negative total impact
    pub max_loss: f64,

    pub best_scenario: String,

    /// Most positive total impact
    pub max_gain: f64,

    pub average_impact: f64,

    pub timestamp: DateTime<Utc>,
}

/// Stress testing engine
#[derive(Debug, Clone, Default)]
pub struct StressTestEngine {
    scenarios: Vec<StressScenario>,
}

impl StressTestEngine {
    /// Create a new stress test engine with predefined scenarios
    pub fn new(scenarios: Vec<StressScenario>) -> Self {
        Self { scenarios }
    }

    pub fn scenarios(&self) -> &[StressScenario] {
        &self.scenarios
    }

    /// Apply one scenario to a set of positions
    pub fn run_stress_test(
        &self,
        positions: &[Position],
        scenario: &StressScenario,
    ) -> RiskResult<StressTestResult> {
        if positions.is_empty() {
            return Err(RiskError::insufficient(1, 0));
        }

        if let Some((symbol, shock)) = scenario
            .shocks
            .iter()
            .find(|(_, s)| !s.is_finite() || **s < -1.0)
        {
            return Err(RiskError::InvalidParameter(format!(
                "Shock {} for {} in scenario '{}' must be a finite value >= -1",
                shock, symbol, scenario.name
            )));
        }

        let mut position_impacts = BTreeMap::new();
        let mut original_value = 0.0;
        let mut total_impact = 0.0;
        let mut worst_position = None;
        let mut worst_position_impact = 0.0;

        for position in positions {
            let shock = scenario.shocks.get(&position.symbol).copied().unwrap_or(0.0);
            let impact = position.market_value * shock;

            original_value += position.market_value;
            total_impact += impact;

            if impact < worst_position_impact {
                worst_position = Some(position.symbol.clone());
                worst_position_impact = impact;
            }

            position_impacts.insert(
                position.symbol.clone(),
                PositionImpact {
                    original_value: position.market_value,
                    shock,
                    stressed_value: position.market_value + impact,
                    impact,
                },
            );
        }

        for symbol in scenario.shocks.keys() {
            if !position_impacts.contains_key(symbol) {
                debug!("Scenario '{}' shocks {} which is not held", scenario.name, symbol);
            }
        }

        let impact_percentage = if original_value != 0.0 {
            total_impact / original_value
        } else {
            0.0
        };

        Ok(StressTestResult {
            scenario_name: scenario.name.clone(),
            original_value,
            stressed_value: original_value + total_impact,
            total_impact,
            impact_percentage,
            worst_position,
            worst_position_impact,
            position_impacts,
            shocks: scenario.shocks.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Run multiple stress test scenarios
    pub fn run_scenarios(
        &self,
        positions: &[Position],
        scenarios: &[StressScenario],
    ) -> RiskResult<Vec<StressTestResult>> {
        scenarios
            .iter()
            .map(|scenario| self.run_stress_test(positions, scenario))
            .collect()
    }

    /// Run all predefined scenarios
    pub fn run_all_scenarios(&self, positions: &[Position]) -> RiskResult<Vec<StressTestResult>> {
        self.run_scenarios(positions, &self.scenarios)
    }

    /// Summarize scenario results
    pub fn generate_report(&self, results: Vec<StressTestResult>) -> RiskResult<StressTestReport> {
        let first = results
            .first()
            .ok_or_else(|| RiskError::insufficient(1, 0))?;

        let mut worst_scenario = first.scenario_name.clone();
        let mut max_loss = first.total_impact;
        let mut best_scenario = first.scenario_name.clone();
        let mut max_gain = first.total_impact;
        let mut total_impact = 0.0;

        for result in &results {
            total_impact += result.total_impact;

            if result.total_impact < max_loss {
                max_loss = result.total_impact;
                worst_scenario = result.scenario_name.clone();
            }

            if result.total_impact > max_gain {
                max_gain = result.total_impact;
                best_scenario = result.scenario_name.clone();
            }
        }

        let average_impact = total_impact / results.len() as f64;

        Ok(StressTestReport {
            results,
            worst_scenario,
            max_loss,
            best_scenario,
            max_gain,
            average_impact,
            timestamp: Utc::now(),
        })
    }
}
