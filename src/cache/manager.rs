//! In-memory forecast cache with TTL-gated reads
//!
//! Provides a `ForecastCache` that keeps one forecast series per rounded
//! coordinate and resolution. Reads only return entries younger than the TTL;
//! expired entries are retained separately as "last-good" data so a failed
//! provider fetch can still fall back on something.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::data::{CoordinateKey, ForecastSeries, Resolution};

/// Default freshness window for a cached series
pub const DEFAULT_TTL_MINUTES: i64 = 10;

/// How long an expired series stays available as a fallback
pub const DEFAULT_LAST_GOOD_RETENTION_HOURS: i64 = 6;

/// A cache shared between concurrent fetches.
///
/// The lock is only ever taken for map operations, never across an await.
pub type SharedForecastCache = Arc<Mutex<ForecastCache>>;

/// Identifies one cached series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub coordinate: CoordinateKey,
    pub resolution: Resolution,
}

impl CacheKey {
    pub fn new(coordinate: CoordinateKey, resolution: Resolution) -> Self {
        Self {
            coordinate,
            resolution,
        }
    }
}

/// A cached series together with the time it was stored
#[derive(Debug, Clone)]
struct CacheEntry {
    series: ForecastSeries,
    cached_at: DateTime<Utc>,
}

/// Result of a fallback read, including metadata about cache freshness
#[derive(Debug, Clone)]
pub struct CachedData {
    /// The cached series
    pub series: ForecastSeries,
    /// When the series was originally cached
    pub cached_at: DateTime<Utc>,
    /// Whether the entry is past its TTL
    pub is_expired: bool,
}

/// Freshness-gated map from coordinate to forecast series
///
/// There is no background timer: expired entries are swept whenever a new
/// series is stored. Callers pass `now` explicitly so tests can freeze or
/// advance the clock.
#[derive(Debug)]
pub struct ForecastCache {
    ttl: Duration,
    last_good_retention: Duration,
    fresh: HashMap<CacheKey, CacheEntry>,
    last_good: HashMap<CacheKey, CacheEntry>,
}

impl Default for ForecastCache {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_TTL_MINUTES))
    }
}

impl ForecastCache {
    /// Creates an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_good_retention: Duration::hours(DEFAULT_LAST_GOOD_RETENTION_HOURS),
            fresh: HashMap::new(),
            last_good: HashMap::new(),
        }
    }

    /// Overrides how long expired entries remain usable as a fallback
    pub fn with_last_good_retention(mut self, retention: Duration) -> Self {
        self.last_good_retention = retention;
        self
    }

    /// Wraps the cache for sharing between tasks
    pub fn shared(self) -> SharedForecastCache {
        Arc::new(Mutex::new(self))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of fresh-or-not-yet-swept entries
    pub fn len(&self) -> usize {
        self.fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.cached_at > self.ttl
    }

    /// Returns the series for `key` if it was stored no more than TTL ago.
    ///
    /// An expired entry is evicted (moved to the last-good slot) and reported
    /// as a miss.
    pub fn get(&mut self, key: &CacheKey, now: DateTime<Utc>) -> Option<ForecastSeries> {
        let entry = self.fresh.get(key)?;
        if !self.is_expired(entry, now) {
            return Some(entry.series.clone());
        }

        if let Some(expired) = self.fresh.remove(key) {
            self.last_good.insert(*key, expired);
        }
        None
    }

    /// Stores `series` under `key`, replacing any previous entry wholesale,
    /// then sweeps every other expired entry.
    pub fn put(&mut self, key: CacheKey, series: ForecastSeries, now: DateTime<Utc>) {
        self.last_good.remove(&key);
        self.fresh.insert(
            key,
            CacheEntry {
                series,
                cached_at: now,
            },
        );
        self.sweep(now);
    }

    /// Most recent series for `key`, fresh or expired, if still retained.
    ///
    /// Only meant for graceful degradation when a provider fetch fails.
    pub fn last_good(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CachedData> {
        let entry = self.fresh.get(key).or_else(|| self.last_good.get(key))?;
        if now - entry.cached_at > self.ttl + self.last_good_retention {
            return None;
        }
        Some(CachedData {
            series: entry.series.clone(),
            cached_at: entry.cached_at,
            is_expired: self.is_expired(entry, now),
        })
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        let expired: Vec<CacheKey> = self
            .fresh
            .iter()
            .filter(|(_, entry)| now - entry.cached_at > ttl)
            .map(|(key, _)| *key)
            .collect();

        for key in expired {
            if let Some(entry) = self.fresh.remove(&key) {
                self.last_good.insert(key, entry);
            }
        }

        let horizon = ttl + self.last_good_retention;
        self.last_good
            .retain(|_, entry| now - entry.cached_at <= horizon);

        if !self.fresh.is_empty() {
            tracing::trace!(entries = self.fresh.len(), retained = self.last_good.len(), "swept forecast cache");
        }
    }
}
