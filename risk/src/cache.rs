//! Snapshot cache contract and an in-memory backend
//!
//! Backends store opaque bytes with a TTL. The engine serializes
//! [`RiskCacheEntry`] as JSON, so any key/value store with expiry can sit
//! behind [`CacheBackend`].

use crate::error::{RiskError, RiskResult};
use crate::snapshot::RiskMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const KEY_PREFIX: &str = "portfolio_risk_comprehensive";

/// Cache key for a portfolio snapshot
pub fn cache_key(portfolio_id: &str) -> String {
    format!("{}:{}", KEY_PREFIX, portfolio_id)
}

/// Key/value store with per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live value, `None` if absent or expired
    async fn get(&self, key: &str) -> RiskResult<Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> RiskResult<()>;
}

/// Persisted snapshot with its creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCacheEntry {
    pub metrics: RiskMetrics,
    pub timestamp: DateTime<Utc>,
}

impl RiskCacheEntry {
    pub fn new(metrics: RiskMetrics) -> Self {
        let timestamp = metrics.timestamp;
        Self { metrics, timestamp }
    }

    /// Check whether the entry is younger than `ttl` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.timestamp < ttl,
            Err(_) => true,
        }
    }

    pub fn to_bytes(&self) -> RiskResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> RiskResult<Self> {
        let entry: Self = serde_json::from_slice(bytes)
            .map_err(|e| RiskError::Cache(format!("Corrupt cache entry: {}", e)))?;
        if !entry.metrics.correlation.is_square() {
            return Err(RiskError::Cache(format!(
                "Corrupt cache entry for {}: correlation matrix is not square",
                entry.metrics.portfolio_id
            )));
        }
        Ok(entry)
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// In-process cache backend
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> RiskResult<Option<Vec<u8>>> {
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone());

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> RiskResult<()> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| RiskError::Cache(format!("TTL {:?} overflows the clock", ttl)))?;
        self.entries
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
