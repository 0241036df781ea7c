//! Fetching and caching the forecasts a route evaluation needs.
//!
//! Each sampled coordinate is resolved once per evaluation: the shared cache
//! is consulted first, then the provider (bounded by a timeout), and on
//! failure the last good cached series. All coordinates are fetched
//! concurrently and joined before the optimizer runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{CacheKey, SharedForecastCache};
use crate::data::{
    CoordinateKey, ForecastSeries, ProviderPlan, WeatherError, WeatherProvider,
};
use crate::interpolate::TemporalInterpolator;
use crate::route::ForecastMap;

/// Time range requested from a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Where a resolved series came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastSource {
    Cache,
    Provider,
    /// Expired entry kept for degradation after a failed fetch
    LastGood,
}

/// Forecasts resolved from a single provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedLayer {
    pub forecasts: ForecastMap,
    /// Coordinates served from an expired entry after a failed fetch
    pub stale: usize,
}

/// Forecast maps for one evaluation, one per provider layer
#[derive(Debug, Clone, Default)]
pub struct ResolvedForecasts {
    pub high_res: ForecastMap,
    pub long_range: ForecastMap,
    high_res_active: bool,
    stale: usize,
}

impl ResolvedForecasts {
    pub fn high_res_active(&self) -> bool {
        self.high_res_active
    }

    /// Coordinates, across layers, that fell back to expired forecasts
    pub fn stale_count(&self) -> usize {
        self.stale
    }

    /// Layers for the window at the planned departure, most precise first
    pub fn current_layers(&self) -> Vec<&ForecastMap> {
        if self.high_res_active {
            vec![&self.high_res, &self.long_range]
        } else {
            vec![&self.long_range]
        }
    }

    /// Layers for the candidate search. Long-range data covers the whole
    /// band; high-resolution data only fills coordinates it lacks.
    pub fn candidate_layers(&self) -> Vec<&ForecastMap> {
        if self.high_res_active {
            vec![&self.long_range, &self.high_res]
        } else {
            vec![&self.long_range]
        }
    }

    /// Whether no layer resolved any coordinate
    pub fn is_empty(&self) -> bool {
        self.high_res.is_empty() && self.long_range.is_empty()
    }
}

/// Resolves forecasts for sampled coordinates through the shared cache
#[derive(Debug, Clone)]
pub struct ForecastResolver {
    cache: SharedForecastCache,
    fetch_timeout: std::time::Duration,
}

impl ForecastResolver {
    pub fn new(cache: SharedForecastCache, fetch_timeout: std::time::Duration) -> Self {
        Self {
            cache,
            fetch_timeout,
        }
    }

    /// Resolve every key against the providers of `plan`.
    ///
    /// `search` covers the whole candidate band and is used for long-range
    /// data; `trip` covers the planned departure only and is used for the
    /// high-resolution provider.
    pub async fn resolve(
        &self,
        plan: &ProviderPlan,
        keys: &[CoordinateKey],
        search: FetchWindow,
        trip: FetchWindow,
        now: DateTime<Utc>,
    ) -> ResolvedForecasts {
        match plan {
            ProviderPlan::None => {
                tracing::warn!("no weather provider configured");
                ResolvedForecasts::default()
            }
            ProviderPlan::LongRange(provider) => {
                let layer = self.resolve_layer(provider, keys, search, now).await;
                ResolvedForecasts {
                    long_range: layer.forecasts,
                    stale: layer.stale,
                    ..Default::default()
                }
            }
            ProviderPlan::HighResWithFallback {
                high_res,
                long_range,
            } => {
                let high_res_layer = self.resolve_layer(high_res, keys, trip, now);
                let long_range_layer = async {
                    match long_range {
                        Some(provider) => self.resolve_layer(provider, keys, search, now).await,
                        None => ResolvedLayer::default(),
                    }
                };
                let (high_res, long_range) =
                    futures::future::join(high_res_layer, long_range_layer).await;

                tracing::debug!(
                    high_res = high_res.forecasts.len(),
                    long_range = long_range.forecasts.len(),
                    "resolved layered forecasts"
                );
                ResolvedForecasts {
                    stale: high_res.stale + long_range.stale,
                    high_res: high_res.forecasts,
                    long_range: long_range.forecasts,
                    high_res_active: true,
                }
            }
        }
    }

    /// Resolve every key against a single provider, concurrently.
    /// Keys that cannot be resolved are absent from the map.
    pub async fn resolve_layer(
        &self,
        provider: &Arc<dyn WeatherProvider>,
        keys: &[CoordinateKey],
        window: FetchWindow,
        now: DateTime<Utc>,
    ) -> ResolvedLayer {
        let fetches = keys
            .iter()
            .map(|key| self.resolve_one(provider.as_ref(), *key, window, now));

        let mut layer = ResolvedLayer::default();
        for (resolved, key) in futures::future::join_all(fetches).await.into_iter().zip(keys) {
            if let Some((series, source)) = resolved {
                if source == ForecastSource::LastGood {
                    layer.stale += 1;
                }
                layer.forecasts.insert(*key, series);
            }
        }
        layer
    }

    async fn resolve_one(
        &self,
        provider: &dyn WeatherProvider,
        key: CoordinateKey,
        window: FetchWindow,
        now: DateTime<Utc>,
    ) -> Option<(ForecastSeries, ForecastSource)> {
        let cache_key = CacheKey::new(key, provider.resolution());

        // A fresh entry fetched for another departure may not reach this window
        let cached = self.cache.lock().get(&cache_key, now);
        match cached {
            Some(series) if series.covers(window.start, window.end) => {
                tracing::debug!(provider = provider.name(), %key, "forecast cache hit");
                return Some((series, ForecastSource::Cache));
            }
            Some(_) => {
                tracing::debug!(provider = provider.name(), %key, "cached forecast does not cover window")
            }
            None => tracing::debug!(provider = provider.name(), %key, "forecast cache miss"),
        }

        match self.fetch(provider, key, window).await {
            Ok(series) => {
                self.cache.lock().put(cache_key, series.clone(), now);
                return Some((series, ForecastSource::Provider));
            }
            Err(e) => {
                tracing::warn!(provider = provider.name(), %key, error = %e, "forecast fetch failed");
            }
        }

        let fallback = self.cache.lock().last_good(&cache_key, now)?;
        tracing::debug!(
            provider = provider.name(),
            %key,
            cached_at = %fallback.cached_at,
            "using last good forecast"
        );
        Some((fallback.series, ForecastSource::LastGood))
    }

    async fn fetch(
        &self,
        provider: &dyn WeatherProvider,
        key: CoordinateKey,
        window: FetchWindow,
    ) -> Result<ForecastSeries, WeatherError> {
        let coordinate = key.coordinate();
        let raw = tokio::time::timeout(
            self.fetch_timeout,
            provider.fetch_forecast(coordinate.lat, coordinate.lon, window.start, window.end),
        )
        .await
        .map_err(|_| WeatherError::Timeout(self.fetch_timeout))??;

        let series = TemporalInterpolator::for_resolution(provider.resolution())
            .interpolate(&raw)?;
        if series.is_empty() {
            return Err(WeatherError::MissingField("forecast intervals".to_string()));
        }
        Ok(series)
    }
}
