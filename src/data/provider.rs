//! Weather provider abstraction and provider selection policy

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::weather::WeatherError;
use super::{Resolution, WeatherCondition};

/// Trips shorter than this many minutes may use a high-resolution provider
pub const SHORT_TRIP_LIMIT_MINUTES: i64 = 120;

/// One sparse interval as reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderInterval {
    /// Start of the interval
    pub start: DateTime<Utc>,
    /// Precipitation intensity in mm/h
    pub precipitation: f64,
    /// Wind speed in km/h
    pub wind_speed: f64,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Condition category for the interval
    pub condition: WeatherCondition,
}

/// Sparse forecast for one coordinate, before interpolation
#[derive(Debug, Clone, PartialEq)]
pub struct RawForecast {
    /// Resolution class of the source
    pub resolution: Resolution,
    /// Provider's native spacing between intervals
    pub nominal_interval: Duration,
    /// Intervals in any order
    pub intervals: Vec<ProviderInterval>,
}

/// A source of forecasts for a single location
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Resolution class of the forecasts this provider returns
    fn resolution(&self) -> Resolution;

    /// Fetch the forecast covering `[start, end]` at the given location
    async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RawForecast, WeatherError>;
}

/// Which providers a single evaluation should use
#[derive(Clone)]
pub enum ProviderPlan {
    /// High-resolution data for the current window, long-range for the rest
    /// and as a per-coordinate fallback
    HighResWithFallback {
        high_res: Arc<dyn WeatherProvider>,
        long_range: Option<Arc<dyn WeatherProvider>>,
    },
    /// Long-range data only
    LongRange(Arc<dyn WeatherProvider>),
    /// Nothing configured; every point will be unresolved
    None,
}

impl ProviderPlan {
    pub fn uses_high_res(&self) -> bool {
        matches!(self, ProviderPlan::HighResWithFallback { .. })
    }
}

impl fmt::Debug for ProviderPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderPlan::HighResWithFallback { high_res, long_range } => f
                .debug_struct("HighResWithFallback")
                .field("high_res", &high_res.name())
                .field("long_range", &long_range.as_ref().map(|p| p.name()))
                .finish(),
            ProviderPlan::LongRange(p) => f.debug_tuple("LongRange").field(&p.name()).finish(),
            ProviderPlan::None => f.write_str("None"),
        }
    }
}

/// The configured providers.
///
/// Precedence is short-trip high-resolution, then long-range, then none.
#[derive(Clone, Default)]
pub struct ProviderSet {
    high_res: Option<Arc<dyn WeatherProvider>>,
    long_range: Option<Arc<dyn WeatherProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_high_res(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.high_res = Some(provider);
        self
    }

    pub fn with_long_range(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.long_range = Some(provider);
        self
    }

    /// Picks the providers for a trip of the given duration
    pub fn plan_for(&self, trip_duration: Duration) -> ProviderPlan {
        match (&self.high_res, &self.long_range) {
            (Some(high_res), long_range) if trip_duration < Duration::minutes(SHORT_TRIP_LIMIT_MINUTES) => {
                ProviderPlan::HighResWithFallback {
                    high_res: Arc::clone(high_res),
                    long_range: long_range.clone(),
                }
            }
            (_, Some(long_range)) => ProviderPlan::LongRange(Arc::clone(long_range)),
            _ => ProviderPlan::None,
        }
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet")
            .field("high_res", &self.high_res.as_ref().map(|p| p.name()))
            .field("long_range", &self.long_range.as_ref().map(|p| p.name()))
            .finish()
    }
}
