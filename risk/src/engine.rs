//! Portfolio risk orchestration
//!
//! The [`RiskEngine`] fetches holdings and returns from its collaborators,
//! runs the numeric work on tokio's blocking pool and caches one snapshot per
//! portfolio. Concurrent requests for the same portfolio share a single
//! computation.

use crate::cache::{cache_key, CacheBackend, MemoryCache, RiskCacheEntry};
use crate::calculator::{PortfolioInput, RiskCalculator};
use crate::config::RiskEngineConfig;
use crate::correlation::CorrelationMatrix;
use crate::error::{RiskError, RiskResult};
use crate::provider::{Position, PositionProvider, ReturnSeries, ReturnSeriesProvider};
use crate::snapshot::{AssetRiskReport, RiskMetrics};
use crate::stress::{StressScenario, StressTestEngine, StressTestReport, StressTestResult};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Lifecycle of a portfolio snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortfolioState {
    /// Never computed by this engine and nothing cached
    Idle,
    /// A computation is in flight
    Computing,
    /// A fresh snapshot is cached
    Cached,
    /// The last snapshot is older than the TTL
    Expired,
}

/// Per-portfolio single-flight slot holding the last snapshot computed here
type FlightSlot = Arc<Mutex<Option<RiskCacheEntry>>>;

/// Risk engine
pub struct RiskEngine {
    config: RiskEngineConfig,
    calculator: RiskCalculator,
    stress: StressTestEngine,
    positions: Arc<dyn PositionProvider>,
    returns: Arc<dyn ReturnSeriesProvider>,
    cache: Arc<dyn CacheBackend>,
    inflight: DashMap<String, FlightSlot>,
}

impl RiskEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        config: RiskEngineConfig,
        positions: Arc<dyn PositionProvider>,
        returns: Arc<dyn ReturnSeriesProvider>,
        cache: Arc<dyn CacheBackend>,
    ) -> RiskResult<Self> {
        config.validate()?;

        info!(
            "Risk engine ready: {} confidence levels, {} VaR methods, {} volatility models, ttl {}s",
            config.confidence_levels.len(),
            config.var_methods.len(),
            config.volatility_models.len(),
            config.cache_ttl_sec
        );

        Ok(Self {
            calculator: RiskCalculator::new(&config),
            stress: StressTestEngine::new(config.stress_scenarios.clone()),
            config,
            positions,
            returns,
            cache,
            inflight: DashMap::new(),
        })
    }

    /// Create an engine backed by an in-process [`MemoryCache`]
    pub fn with_memory_cache(
        config: RiskEngineConfig,
        positions: Arc<dyn PositionProvider>,
        returns: Arc<dyn ReturnSeriesProvider>,
    ) -> RiskResult<Self> {
        Self::new(config, positions, returns, Arc::new(MemoryCache::new()))
    }

    pub fn config(&self) -> &RiskEngineConfig {
        &self.config
    }

    /// Get the risk snapshot for a portfolio
    ///
    /// A fresh cached snapshot is returned as is. Otherwise the first caller
    /// computes while concurrent callers for the same portfolio wait and share
    /// its result, even when the cache backend is unavailable. Empty holdings
    /// or history give a zeroed snapshot.
    pub async fn get_portfolio_risk(&self, portfolio_id: &str) -> RiskResult<RiskMetrics> {
        if let Some(entry) = self.fresh_entry(portfolio_id).await {
            debug!("Cache hit for portfolio {}", portfolio_id);
            return Ok(entry.metrics);
        }

        let slot = self.slot(portfolio_id);
        let mut last = slot.lock().await;

        let ttl = self.config.cache_ttl();
        if let Some(entry) = last.as_ref().filter(|e| e.is_fresh(Utc::now(), ttl)) {
            debug!("Portfolio {} computed by a concurrent caller", portfolio_id);
            return Ok(entry.metrics.clone());
        }
        if let Some(entry) = self.fresh_entry(portfolio_id).await {
            debug!("Portfolio {} cached by another engine", portfolio_id);
            return Ok(entry.metrics);
        }

        let metrics = self.compute(portfolio_id).await?;
        let entry = RiskCacheEntry::new(metrics.clone());
        self.store(&entry).await;
        *last = Some(entry);

        Ok(metrics)
    }

    /// Correlation matrix of a portfolio's holdings, taken from its snapshot
    pub async fn get_portfolio_correlation(&self, portfolio_id: &str) -> RiskResult<CorrelationMatrix> {
        Ok(self.get_portfolio_risk(portfolio_id).await?.correlation)
    }

    /// Risk report for a single asset over the configured lookback window
    pub async fn get_asset_risk(&self, symbol: &str) -> RiskResult<AssetRiskReport> {
        let (start, end) = self.window();
        let series = self
            .returns
            .get_return_series(symbol, start, end)
            .await
            .map_err(provider_error)?;

        let calculator = self.calculator.clone();
        tokio::task::spawn_blocking(move || calculator.asset_report(&series))
            .await
            .map_err(join_error)?
    }

    /// Apply per-symbol shocks to a portfolio's current positions
    pub async fn stress_test(
        &self,
        portfolio_id: &str,
        shocks: BTreeMap<String, f64>,
    ) -> RiskResult<StressTestResult> {
        let positions = self.fetch_positions(portfolio_id).await?;
        let scenario = StressScenario::new("custom", shocks);
        let result = self.stress.run_stress_test(&positions, &scenario)?;

        info!(
            "Stress test on {}: impact {:.2} ({:.2}%)",
            portfolio_id,
            result.total_impact,
            result.impact_percentage * 100.0
        );
        Ok(result)
    }

    /// Run every configured scenario against a portfolio and summarize
    pub async fn run_stress_scenarios(&self, portfolio_id: &str) -> RiskResult<StressTestReport> {
        if self.stress.scenarios().is_empty() {
            return Err(RiskError::Config("No stress scenarios configured".to_string()));
        }

        let positions = self.fetch_positions(portfolio_id).await?;
        let results = self.stress.run_all_scenarios(&positions)?;
        self.stress.generate_report(results)
    }

    /// Current lifecycle state of a portfolio's snapshot
    pub async fn portfolio_state(&self, portfolio_id: &str) -> PortfolioState {
        let slot = self.inflight.get(portfolio_id).map(|s| Arc::clone(s.value()));

        let now = Utc::now();
        let ttl = self.config.cache_ttl();

        // Some(fresh) when this engine has computed the portfolio before
        let local = match &slot {
            Some(slot) => match slot.try_lock() {
                Ok(last) => last.as_ref().map(|e| e.is_fresh(now, ttl)),
                Err(_) => return PortfolioState::Computing,
            },
            None => None,
        };

        match (self.cached_entry(portfolio_id).await, local) {
            (Some(entry), _) if entry.is_fresh(now, ttl) => PortfolioState::Cached,
            (_, Some(true)) => PortfolioState::Cached,
            (Some(_), _) | (None, Some(false)) => PortfolioState::Expired,
            (None, None) => PortfolioState::Idle,
        }
    }

    /// Drop single-flight slots that are idle and hold no fresh snapshot
    ///
    /// Slots otherwise accumulate one per portfolio id ever requested. A
    /// pruned portfolio reports `Idle` until it is cached or computed again.
    /// Returns the number of slots removed.
    pub fn prune_idle_slots(&self) -> usize {
        let before = self.inflight.len();
        let now = Utc::now();
        let ttl = self.config.cache_ttl();

        self.inflight.retain(|_, slot| match slot.try_lock() {
            Ok(last) => last.as_ref().map_or(false, |e| e.is_fresh(now, ttl)),
            Err(_) => true,
        });

        let removed = before.saturating_sub(self.inflight.len());
        if removed > 0 {
            debug!("Pruned {} idle portfolio slots", removed);
        }
        removed
    }

    fn slot(&self, portfolio_id: &str) -> FlightSlot {
        self.inflight
            .entry(portfolio_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// History window ending at `as_of`, or now
    fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.config.as_of.unwrap_or_else(Utc::now);
        let start = end - Duration::days(i64::from(self.config.lookback_days));
        (start, end)
    }

    async fn compute(&self, portfolio_id: &str) -> RiskResult<RiskMetrics> {
        info!("Computing risk for portfolio {}", portfolio_id);

        let positions = self.fetch_positions(portfolio_id).await?;
        let weights = portfolio_weights(&positions);
        if weights.is_empty() {
            warn!("Portfolio {} has no weighted positions, reporting zeros", portfolio_id);
            return Ok(self.calculator.zeroed_metrics(portfolio_id));
        }

        let (series, benchmark) = self.fetch_series(weights.keys()).await?;
        let input = PortfolioInput {
            weights,
            series,
            benchmark,
        };

        let calculator = self.calculator.clone();
        let pid = portfolio_id.to_string();
        let metrics = tokio::task::spawn_blocking(move || calculator.portfolio_metrics(&pid, &input))
            .await
            .map_err(join_error)??;

        info!(
            "Portfolio {} computed over {} observations",
            portfolio_id, metrics.observations
        );
        Ok(metrics)
    }

    async fn fetch_positions(&self, portfolio_id: &str) -> RiskResult<Vec<Position>> {
        let positions = self
            .positions
            .get_positions(portfolio_id)
            .await
            .map_err(provider_error)?;
        debug!("Portfolio {} has {} positions", portfolio_id, positions.len());
        Ok(positions)
    }

    /// Fetch every held symbol and the benchmark concurrently
    async fn fetch_series<'a, I>(
        &self,
        symbols: I,
    ) -> RiskResult<(BTreeMap<String, ReturnSeries>, Option<ReturnSeries>)>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let (start, end) = self.window();

        let held = join_all(
            symbols
                .into_iter()
                .map(|symbol| self.returns.get_return_series(symbol, start, end)),
        );
        let benchmark = async {
            match &self.config.benchmark_symbol {
                Some(symbol) => self
                    .returns
                    .get_return_series(symbol, start, end)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (held, benchmark) = tokio::join!(held, benchmark);

        let mut series = BTreeMap::new();
        for result in held {
            let s = result.map_err(provider_error)?.normalized();
            series.insert(s.symbol.clone(), s);
        }
        let benchmark = benchmark.map_err(provider_error)?.map(ReturnSeries::normalized);

        Ok((series, benchmark))
    }

    /// Cached entry, with backend failures treated as a miss
    async fn cached_entry(&self, portfolio_id: &str) -> Option<RiskCacheEntry> {
        let key = cache_key(portfolio_id);
        let bytes = match self.cache.get(&key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match RiskCacheEntry::from_bytes(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring cache entry for {}: {}", key, e);
                None
            }
        }
    }

    async fn fresh_entry(&self, portfolio_id: &str) -> Option<RiskCacheEntry> {
        self.cached_entry(portfolio_id)
            .await
            .filter(|entry| entry.is_fresh(Utc::now(), self.config.cache_ttl()))
    }

    async fn store(&self, entry: &RiskCacheEntry) {
        let key = cache_key(&entry.metrics.portfolio_id);
        let bytes = match entry.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode snapshot for {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.cache.set(&key, bytes, self.config.cache_ttl()).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

/// Weight per symbol as market value over total market value
///
/// Duplicate symbols are merged. Non-finite values are dropped and a zero
/// total gives no weights.
pub fn portfolio_weights(positions: &[Position]) -> BTreeMap<String, f64> {
    let mut values: BTreeMap<String, f64> = BTreeMap::new();
    for position in positions {
        if !position.market_value.is_finite() {
            warn!("Skipping {} with market value {}", position.symbol, position.market_value);
            continue;
        }
        *values.entry(position.symbol.clone()).or_insert(0.0) += position.market_value;
    }

    let total: f64 = values.values().sum();
    if total == 0.0 || !total.is_finite() {
        return BTreeMap::new();
    }

    values
        .into_iter()
        .map(|(symbol, value)| (symbol, value / total))
        .collect()
}

fn provider_error(e: RiskError) -> RiskError {
    match e {
        RiskError::Provider(_) => e,
        other => RiskError::Provider(other.to_string()),
    }
}

fn join_error(e: tokio::task::JoinError) -> RiskError {
    RiskError::ComputationError(format!("Risk computation task failed: {}", e))
}
