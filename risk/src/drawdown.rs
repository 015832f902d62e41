//! Peak-to-trough drawdown analysis over a cumulative value series

use crate::error::{RiskError, RiskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Drawdown statistics, all magnitudes non-negative
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawdownReport {
    /// Largest decline from a running peak, as a fraction of that peak
    pub max_drawdown: f64,

    /// Decline of the last value from its running peak
    pub current_drawdown: f64,

    /// Time from the deepest trough back to a new peak; 0 if not yet recovered.
    /// Counted in periods, or in calendar days when timestamps are supplied.
    pub recovery_days: u64,
}

/// Drawdown analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawdownAnalyzer;

struct DrawdownPath {
    drawdowns: Vec<f64>,
    trough: usize,
    recovery: Option<usize>,
}

impl DrawdownAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze drawdowns, measuring recovery in periods
    pub fn estimate(&self, values: &[f64]) -> RiskResult<DrawdownReport> {
        let path = drawdown_path(values)?;
        let recovery_days = path
            .recovery
            .map(|idx| (idx - path.trough) as u64)
            .unwrap_or(0);
        Ok(path.report(recovery_days))
    }

    /// Analyze drawdowns, measuring recovery in calendar days between the
    /// trough and recovery timestamps
    pub fn estimate_with_timestamps(
        &self,
        values: &[f64],
        timestamps: &[DateTime<Utc>],
    ) -> RiskResult<DrawdownReport> {
        if values.len() != timestamps.len() {
            return Err(RiskError::InvalidParameter(format!(
                "{} values but {} timestamps",
                values.len(),
                timestamps.len()
            )));
        }

        let path = drawdown_path(values)?;
        let recovery_days = path
            .recovery
            .map(|idx| {
                (timestamps[idx] - timestamps[path.trough])
                    .num_days()
                    .max(0) as u64
            })
            .unwrap_or(0);
        Ok(path.report(recovery_days))
    }

    /// Analyze drawdowns for API consumers; short or malformed series yield
    /// an all-zero report
    pub fn analyze(&self, values: &[f64]) -> DrawdownReport {
        recover(self.estimate(values))
    }

    /// Timestamped variant of [`DrawdownAnalyzer::analyze`]
    ///
    /// A length mismatch between values and timestamps is a caller error and is
    /// returned as such.
    pub fn analyze_with_timestamps(
        &self,
        values: &[f64],
        timestamps: &[DateTime<Utc>],
    ) -> RiskResult<DrawdownReport> {
        match self.estimate_with_timestamps(values, timestamps) {
            Err(e) if !e.is_recoverable() => Err(e),
            other => Ok(recover(other)),
        }
    }
}

fn recover(result: RiskResult<DrawdownReport>) -> DrawdownReport {
    match result {
        Ok(report) => report,
        Err(e) if e.is_insufficient_data() => {
            debug!("Drawdown skipped: {}", e);
            DrawdownReport::default()
        }
        Err(e) => {
            warn!("Drawdown analysis failed, reporting zero: {}", e);
            DrawdownReport::default()
        }
    }
}

impl DrawdownPath {
    fn report(&self, recovery_days: u64) -> DrawdownReport {
        let magnitude = |d: f64| if d < 0.0 { -d } else { 0.0 };
        DrawdownReport {
            max_drawdown: magnitude(self.drawdowns[self.trough]),
            current_drawdown: magnitude(self.drawdowns.last().copied().unwrap_or(0.0)),
            recovery_days,
        }
    }
}

fn drawdown_path(values: &[f64]) -> RiskResult<DrawdownPath> {
    if values.len() < 2 {
        return Err(RiskError::insufficient(2, values.len()));
    }

    if values.iter().any(|v| !v.is_finite()) {
        return Err(RiskError::ComputationError(
            "Value series contains non-finite values".to_string(),
        ));
    }

    let mut peak = values[0];
    let mut drawdowns = Vec::with_capacity(values.len());
    for &value in values {
        if value > peak {
            peak = value;
        }
        if peak <= 0.0 {
            return Err(RiskError::ComputationError(format!(
                "Running peak {} is not positive",
                peak
            )));
        }
        drawdowns.push((value - peak) / peak);
    }

    // First occurrence of the deepest point
    let mut trough = 0;
    for (i, d) in drawdowns.iter().enumerate() {
        if *d < drawdowns[trough] {
            trough = i;
        }
    }

    let recovery = if drawdowns[trough] < 0.0 {
        drawdowns[trough + 1..]
            .iter()
            .position(|d| *d >= 0.0)
            .map(|offset| trough + 1 + offset)
    } else {
        None
    };

    Ok(DrawdownPath {
        drawdowns,
        trough,
        recovery,
    })
}
