//! Market data collaborators
//!
//! The engine never talks to a database or market-data vendor directly. It
//! consumes positions and return series through the traits below, which
//! deployments implement over their own storage.

use crate::error::{RiskError, RiskResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// A holding in a portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Asset identifier
    pub symbol: String,

    /// Current market value in portfolio currency
    pub market_value: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>, market_value: f64) -> Self {
        Self {
            symbol: symbol.into(),
            market_value,
        }
    }
}

/// Time-ordered periodic returns for one symbol
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub symbol: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub returns: Vec<f64>,
}

impl ReturnSeries {
    /// Build a series, requiring one strictly increasing timestamp per return
    pub fn new(
        symbol: impl Into<String>,
        timestamps: Vec<DateTime<Utc>>,
        returns: Vec<f64>,
    ) -> RiskResult<Self> {
        let symbol = symbol.into();
        if timestamps.len() != returns.len() {
            return Err(RiskError::InvalidParameter(format!(
                "Series {} has {} timestamps but {} returns",
                symbol,
                timestamps.len(),
                returns.len()
            )));
        }
        if timestamps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RiskError::InvalidParameter(format!(
                "Series {} timestamps are not strictly increasing",
                symbol
            )));
        }
        Ok(Self {
            symbol,
            timestamps,
            returns,
        })
    }

    /// Build a series of evenly spaced observations starting at `start`
    pub fn daily(symbol: impl Into<String>, start: DateTime<Utc>, returns: Vec<f64>) -> Self {
        let timestamps = (0..returns.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        Self {
            symbol: symbol.into(),
            timestamps,
            returns,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// One observation per timestamp, in time order
    ///
    /// Values past the shorter of `timestamps` and `returns` are dropped and a
    /// repeated timestamp keeps its last observation.
    pub fn normalized(self) -> Self {
        let paired = self.timestamps.len().min(self.returns.len());
        if self.timestamps.len() != self.returns.len() {
            warn!(
                "Series {} has {} timestamps but {} returns, keeping {}",
                self.symbol,
                self.timestamps.len(),
                self.returns.len(),
                paired
            );
        }

        let mut by_time: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
        for (t, r) in self.timestamps.iter().zip(&self.returns) {
            by_time.insert(*t, *r);
        }
        if by_time.len() < paired {
            warn!(
                "Series {} repeats {} timestamps, keeping the last observation",
                self.symbol,
                paired - by_time.len()
            );
        }

        let (timestamps, returns) = by_time.into_iter().unzip();
        Self {
            symbol: self.symbol,
            timestamps,
            returns,
        }
    }

    /// Observations with `start <= timestamp <= end`
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let lo = self.timestamps.partition_point(|t| *t < start);
        let hi = self.timestamps.partition_point(|t| *t <= end);
        let hi = hi.max(lo);
        Self {
            symbol: self.symbol.clone(),
            timestamps: self.timestamps[lo..hi].to_vec(),
            returns: self.returns[lo..hi].to_vec(),
        }
    }
}

/// Source of portfolio holdings
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Current positions for a portfolio
    ///
    /// An unknown portfolio or one with no holdings yields an empty list.
    async fn get_positions(&self, portfolio_id: &str) -> RiskResult<Vec<Position>>;
}

/// Source of historical returns
#[async_trait]
pub trait ReturnSeriesProvider: Send + Sync {
    /// Returns for `symbol` observed within `[start, end]`
    ///
    /// An unknown symbol yields an empty series.
    async fn get_return_series(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RiskResult<ReturnSeries>;
}

/// Serialized layout of a static market data document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketDataFile {
    /// Positions keyed by portfolio identifier
    #[serde(default)]
    pub portfolios: BTreeMap<String, Vec<Position>>,

    /// Return series keyed by symbol
    #[serde(default)]
    pub series: BTreeMap<String, SeriesData>,
}

/// Daily return series anchored at a start timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesData {
    pub start: DateTime<Utc>,
    pub returns: Vec<f64>,
}

/// In-memory provider backed by fixed positions and series
///
/// Used by the CLI and tests; loadable from YAML or JSON.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    portfolios: BTreeMap<String, Vec<Position>>,
    series: BTreeMap<String, ReturnSeries>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_portfolio(mut self, portfolio_id: impl Into<String>, positions: Vec<Position>) -> Self {
        self.portfolios.insert(portfolio_id.into(), positions);
        self
    }

    pub fn with_series(mut self, series: ReturnSeries) -> Self {
        self.series.insert(series.symbol.clone(), series);
        self
    }

    pub fn from_file_data(data: MarketDataFile) -> Self {
        let series = data
            .series
            .into_iter()
            .map(|(symbol, s)| {
                let series = ReturnSeries::daily(symbol.clone(), s.start, s.returns);
                (symbol, series)
            })
            .collect();
        Self {
            portfolios: data.portfolios,
            series,
        }
    }

    pub fn from_yaml(yaml: &str) -> RiskResult<Self> {
        Ok(Self::from_file_data(serde_yaml::from_str(yaml)?))
    }

    pub fn from_json(json: &str) -> RiskResult<Self> {
        Ok(Self::from_file_data(serde_json::from_str(json)?))
    }

    /// Load from a `.json` file, or YAML for any other extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> RiskResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn portfolio_ids(&self) -> impl Iterator<Item = &str> {
        self.portfolios.keys().map(|k| k.as_str())
    }

    /// Latest observation timestamp across every series
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.series
            .values()
            .filter_map(|s| s.timestamps.last().copied())
            .max()
    }
}

#[async_trait]
impl PositionProvider for StaticMarketData {
    async fn get_positions(&self, portfolio_id: &str) -> RiskResult<Vec<Position>> {
        Ok(self
            .portfolios
            .get(portfolio_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReturnSeriesProvider for StaticMarketData {
    async fn get_return_series(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RiskResult<ReturnSeries> {
        Ok(self
            .series
            .get(symbol)
            .map(|s| s.window(start, end))
            .unwrap_or_else(|| ReturnSeries::empty(symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_series_validation() {
        let t0 = start();
        assert!(ReturnSeries::new("A", vec![t0], vec![0.1, 0.2]).is_err());
        assert!(ReturnSeries::new("A", vec![t0, t0], vec![0.1, 0.2]).is_err());
        assert!(ReturnSeries::new("A", vec![t0, t0 + Duration::days(1)], vec![0.1, 0.2]).is_ok());
    }

    #[test]
    fn test_normalized_series() {
        let t0 = start();
        let t1 = t0 + Duration::days(1);
        let t2 = t0 + Duration::days(2);
        let raw = ReturnSeries {
            symbol: "A".to_string(),
            timestamps: vec![t0, t1, t1, t2],
            returns: vec![0.1, 0.2, 0.25, 0.3, 0.4],
        };

        let series = raw.normalized();
        assert_eq!(series.timestamps, vec![t0, t1, t2]);
        assert_eq!(series.returns, vec![0.1, 0.25, 0.3]);

        let clean = ReturnSeries::daily("B", t0, vec![0.1, -0.1]);
        assert_eq!(clean.clone().normalized(), clean);
    }

    #[test]
    fn test_window_is_inclusive() {
        let series = ReturnSeries::daily("A", start(), vec![0.1, 0.2, 0.3, 0.4]);
        let window = series.window(start() + Duration::days(1), start() + Duration::days(2));
        assert_eq!(window.returns, vec![0.2, 0.3]);

        let none = series.window(start() + Duration::days(10), start() + Duration::days(20));
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_static_market_data_from_yaml() {
        let yaml = r#"
portfolios:
  growth:
    - symbol: AAA
      market_value: 6000.0
    - symbol: BBB
      market_value: 4000.0
series:
  AAA:
    start: 2024-03-01T00:00:00Z
    returns: [0.01, -0.02, 0.015]
"#;
        let data = StaticMarketData::from_yaml(yaml).unwrap();

        let positions = data.get_positions("growth").await.unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0], Position::new("AAA", 6000.0));
        assert!(data.get_positions("missing").await.unwrap().is_empty());

        let series = data
            .get_return_series("AAA", start(), start() + Duration::days(30))
            .await
            .unwrap();
        assert_eq!(series.returns, vec![0.01, -0.02, 0.015]);
        assert_eq!(data.latest_timestamp(), Some(start() + Duration::days(2)));

        let missing = data
            .get_return_series("BBB", start(), start() + Duration::days(30))
            .await
            .unwrap();
        assert!(missing.is_empty());
        assert_eq!(missing.symbol, "BBB");
    }
}
