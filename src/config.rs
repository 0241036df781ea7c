//! Engine configuration
//!
//! Every tunable of the advisory engine lives in [`AdvisoryConfig`]. Values
//! are explicit: defaults come from `Default`, and may be layered from an
//! optional TOML file and `ROUTECAST_*` environment variables.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::risk::RiskThresholds;

/// Prefix for environment overrides, e.g. `ROUTECAST_MAX_ROUTE_SAMPLES=50`
pub const ENV_PREFIX: &str = "ROUTECAST";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file or environment could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How arrival times along the route are estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaMode {
    /// Progress is the vertex index over the vertex count
    #[default]
    PolylineIndex,
    /// Progress is cumulative distance over total distance
    Distance,
}

/// All tunables of the advisory engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    /// Maximum number of route coordinates sampled per evaluation
    pub max_route_samples: usize,
    /// Candidates are searched this many minutes either side of the baseline
    pub search_window_minutes: i64,
    /// Candidate spacing with long-range data
    pub search_step_minutes: i64,
    /// Candidate spacing while a high-resolution provider is active
    pub high_res_step_minutes: i64,
    /// Freshness window of cached forecasts
    pub cache_ttl_minutes: i64,
    /// mm/h above which precipitation is high risk
    pub precip_high_threshold: f64,
    /// mm/h above which precipitation is medium risk
    pub precip_medium_threshold: f64,
    /// km/h above which wind is high risk
    pub wind_high_threshold: f64,
    /// km/h above which wind is medium risk
    pub wind_medium_threshold: f64,
    /// Unresolved-point fraction above which a window's risk is escalated
    pub unresolved_fraction_escalation_limit: f64,
    /// Per-request provider timeout
    pub fetch_timeout_seconds: u64,
    /// Furthest (in degrees) a spatial fallback may reach
    pub spatial_fallback_degrees: f64,
    /// Candidates older than this relative to now are discarded
    pub past_tolerance_minutes: i64,
    /// Arrival time estimation
    pub eta_mode: EtaMode,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            max_route_samples: 100,
            search_window_minutes: 60,
            search_step_minutes: 15,
            high_res_step_minutes: 5,
            cache_ttl_minutes: 10,
            precip_high_threshold: 2.0,
            precip_medium_threshold: 0.5,
            wind_high_threshold: 50.0,
            wind_medium_threshold: 25.0,
            unresolved_fraction_escalation_limit: 0.7,
            fetch_timeout_seconds: 10,
            spatial_fallback_degrees: 0.1,
            past_tolerance_minutes: 5,
            eta_mode: EtaMode::PolylineIndex,
        }
    }
}

impl AdvisoryConfig {
    /// Loads defaults, then the optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let settings: AdvisoryConfig = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_route_samples < 2 {
            return Err(ConfigError::Invalid(
                "max_route_samples must be at least 2".to_string(),
            ));
        }
        if self.search_step_minutes <= 0 || self.high_res_step_minutes <= 0 {
            return Err(ConfigError::Invalid("search steps must be positive".to_string()));
        }
        if self.search_window_minutes < 0 {
            return Err(ConfigError::Invalid(
                "search_window_minutes must not be negative".to_string(),
            ));
        }
        if self.cache_ttl_minutes <= 0 || self.fetch_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "cache TTL and fetch timeout must be positive".to_string(),
            ));
        }
        if !(0.0..=self.precip_high_threshold).contains(&self.precip_medium_threshold) {
            return Err(ConfigError::Invalid(format!(
                "precipitation thresholds must satisfy 0 <= medium ({}) <= high ({})",
                self.precip_medium_threshold, self.precip_high_threshold
            )));
        }
        if !(0.0..=self.wind_high_threshold).contains(&self.wind_medium_threshold) {
            return Err(ConfigError::Invalid(format!(
                "wind thresholds must satisfy 0 <= medium ({}) <= high ({})",
                self.wind_medium_threshold, self.wind_high_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.unresolved_fraction_escalation_limit) {
            return Err(ConfigError::Invalid(
                "unresolved_fraction_escalation_limit must be within 0..=1".to_string(),
            ));
        }
        if self.spatial_fallback_degrees.is_nan() || self.spatial_fallback_degrees < 0.0 {
            return Err(ConfigError::Invalid(
                "spatial_fallback_degrees must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            precip_high: self.precip_high_threshold,
            precip_medium: self.precip_medium_threshold,
            wind_high: self.wind_high_threshold,
            wind_medium: self.wind_medium_threshold,
        }
    }

    pub fn search_window(&self) -> Duration {
        Duration::minutes(self.search_window_minutes)
    }

    /// Candidate spacing for the given provider mode
    pub fn search_step(&self, high_res: bool) -> Duration {
        if high_res {
            Duration::minutes(self.high_res_step_minutes)
        } else {
            Duration::minutes(self.search_step_minutes)
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::minutes(self.cache_ttl_minutes)
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn past_tolerance(&self) -> Duration {
        Duration::minutes(self.past_tolerance_minutes)
    }
}
