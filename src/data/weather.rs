//! Open-Meteo weather API client
//!
//! This module fetches hourly and 15-minutely forecasts from the Open-Meteo API
//! and turns them into the sparse provider intervals consumed by the
//! interpolator.

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::provider::{ProviderInterval, RawForecast, WeatherProvider};
use super::{Resolution, SeriesError, WeatherCondition};

/// Base URL for the Open-Meteo API
const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Variables requested for every forecast block
const FORECAST_VARIABLES: &str = "precipitation,wind_speed_10m,temperature_2m,weather_code";

/// Errors that can occur when fetching weather data
#[derive(Debug, Error)]
pub enum WeatherError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// Invalid time format in response
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// The provider did not answer in time
    #[error("Provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Intervals could not be turned into a forecast series
    #[error("Invalid forecast series: {0}")]
    InvalidSeries(#[from] SeriesError),
}

/// Client for fetching forecasts from the Open-Meteo API
///
/// The same client serves both resolutions: long-range requests use the
/// `hourly` block, high-resolution requests use the `minutely_15` block.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    resolution: Resolution,
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new(Resolution::LongRange)
    }
}

impl OpenMeteoClient {
    /// Create a new client for the given resolution
    pub fn new(resolution: Resolution) -> Self {
        Self {
            client: Client::new(),
            base_url: OPEN_METEO_BASE_URL.to_string(),
            resolution,
        }
    }

    /// Create a client pointing at a custom base URL (useful for testing)
    pub fn with_base_url(resolution: Resolution, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            resolution,
        }
    }

    /// Name of the response block this client reads
    fn block(&self) -> &'static str {
        match self.resolution {
            Resolution::HighRes => "minutely_15",
            Resolution::LongRange => "hourly",
        }
    }

    /// Native spacing of the chosen block
    fn nominal_interval(&self) -> Duration {
        match self.resolution {
            Resolution::HighRes => Duration::minutes(15),
            Resolution::LongRange => Duration::hours(1),
        }
    }

    fn forecast_url(&self, lat: f64, lon: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let interval = self.nominal_interval();
        // Round the range outward to whole provider intervals
        let start = start.duration_trunc(interval).unwrap_or(start);
        let end = end.duration_trunc(interval).map(|t| t + interval).unwrap_or(end);
        let (start_param, end_param) = match self.resolution {
            Resolution::HighRes => ("start_minutely_15", "end_minutely_15"),
            Resolution::LongRange => ("start_hour", "end_hour"),
        };

        format!(
            "{}?latitude={:.4}&longitude={:.4}&{}={}&{}={}&{}={}&wind_speed_unit=kmh&timezone=GMT",
            self.base_url,
            lat,
            lon,
            self.block(),
            FORECAST_VARIABLES,
            start_param,
            start.format("%Y-%m-%dT%H:%M"),
            end_param,
            end.format("%Y-%m-%dT%H:%M"),
        )
    }

    /// Parse the forecast block of an Open-Meteo response
    fn parse_response(&self, response: OpenMeteoResponse) -> Result<RawForecast, WeatherError> {
        let block = match self.resolution {
            Resolution::HighRes => response.minutely_15,
            Resolution::LongRange => response.hourly,
        }
        .ok_or_else(|| WeatherError::MissingField(self.block().to_string()))?;

        let len = block.time.len();

        // Validate that all arrays have the same length
        if block.precipitation.len() != len
            || block.wind_speed_10m.len() != len
            || block.temperature_2m.len() != len
            || block.weather_code.len() != len
        {
            return Err(WeatherError::MissingField(format!(
                "{} arrays have inconsistent lengths",
                self.block()
            )));
        }

        // Open-Meteo reports precipitation as a sum over the preceding interval
        let per_hour = 60.0 / self.nominal_interval().num_minutes() as f64;

        let mut intervals = Vec::with_capacity(len);
        for i in 0..len {
            // Gaps in the model output come back as nulls; skip those slots
            let (Some(precipitation), Some(wind_speed), Some(temperature)) = (
                block.precipitation[i],
                block.wind_speed_10m[i],
                block.temperature_2m[i],
            ) else {
                continue;
            };

            intervals.push(ProviderInterval {
                start: parse_datetime(&block.time[i])?,
                precipitation: precipitation * per_hour,
                wind_speed,
                temperature,
                condition: block.weather_code[i]
                    .map(weather_code_to_condition)
                    .unwrap_or(WeatherCondition::Cloudy),
            });
        }

        if intervals.is_empty() {
            return Err(WeatherError::MissingField(format!("{} values", self.block())));
        }

        Ok(RawForecast {
            resolution: self.resolution,
            nominal_interval: self.nominal_interval(),
            intervals,
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    fn name(&self) -> &str {
        match self.resolution {
            Resolution::HighRes => "open-meteo-15min",
            Resolution::LongRange => "open-meteo-hourly",
        }
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RawForecast, WeatherError> {
        let url = self.forecast_url(lat, lon, start, end);
        tracing::debug!(provider = self.name(), %url, "requesting forecast");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let text = response.text().await?;
        let api_response: OpenMeteoResponse = serde_json::from_str(&text)?;

        self.parse_response(api_response)
    }
}

/// Parse a datetime string in ISO 8601 format (e.g., "2024-07-15T05:30") as UTC
fn parse_datetime(datetime_str: &str) -> Result<DateTime<Utc>, WeatherError> {
    NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%dT%H:%M")
        .map(|naive| naive.and_utc())
        .map_err(|_| WeatherError::InvalidTimeFormat(datetime_str.to_string()))
}

/// Map WMO weather code to WeatherCondition enum
///
/// Weather codes from WMO (World Meteorological Organization):
/// - 0: Clear sky
/// - 1-2: Mainly clear / partly cloudy
/// - 3: Overcast
/// - 45, 48: Fog
/// - 51-57: Drizzle (incl. freezing)
/// - 61, 63, 65: Rain (slight, moderate, heavy)
/// - 66-67: Freezing rain (light, heavy)
/// - 71-77, 85-86: Snow
/// - 80-81: Rain showers, 82: violent showers
/// - 95-99: Thunderstorm
pub fn weather_code_to_condition(code: u8) -> WeatherCondition {
    match code {
        0 => WeatherCondition::Clear,
        1..=2 => WeatherCondition::PartlyCloudy,
        45 | 48 => WeatherCondition::Fog,
        51..=57 => WeatherCondition::Drizzle,
        61 | 66 => WeatherCondition::LightRain,
        63 => WeatherCondition::ModerateRain,
        65 | 67 | 82 => WeatherCondition::HeavyRain,
        80..=81 => WeatherCondition::Showers,
        71..=77 | 85..=86 => WeatherCondition::Snow,
        95..=99 => WeatherCondition::Thunderstorm,
        _ => WeatherCondition::Cloudy, // Overcast and unknown codes
    }
}

/// Open-Meteo API response structure
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    hourly: Option<ForecastBlock>,
    minutely_15: Option<ForecastBlock>,
}

/// Column-oriented forecast block from Open-Meteo
#[derive(Debug, Deserialize)]
struct ForecastBlock {
    time: Vec<String>,
    precipitation: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    temperature_2m: Vec<Option<f64>>,
    weather_code: Vec<Option<u8>>,
}
