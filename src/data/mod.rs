//! Core data models for the travel window advisory engine
//!
//! This module contains the types shared by every stage of the engine:
//! coordinates and their rounded cache keys, forecast points and series,
//! and the opaque route geometry handed over by a directions provider.

pub mod provider;
pub mod weather;

pub use provider::{ProviderInterval, ProviderPlan, ProviderSet, RawForecast, WeatherProvider};
pub use weather::{OpenMeteoClient, WeatherError};

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal places kept when rounding a coordinate into a cache key.
///
/// Two decimals is roughly 1.1 km at the equator, which trades a little spatial
/// accuracy for a much higher cache-hit rate along a route.
pub const COORDINATE_PRECISION: u32 = 2;

const COORDINATE_SCALE: f64 = 100.0;

/// A WGS84 position, serialized as a `[lon, lat]` pair like GeoJSON and Mapbox.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Coordinate {
    /// Longitude in degrees
    pub lon: f64,
    /// Latitude in degrees
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Rounded key used to index cached forecasts
    pub fn key(&self) -> CoordinateKey {
        CoordinateKey::from(*self)
    }

    /// Great-circle distance in meters
    pub fn haversine_meters(&self, other: &Coordinate) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }

    fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

impl From<Coordinate> for (f64, f64) {
    fn from(c: Coordinate) -> Self {
        (c.lon, c.lat)
    }
}

/// A coordinate rounded to [`COORDINATE_PRECISION`] decimals.
///
/// Stored as scaled integers so it can be hashed and compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateKey {
    lon_scaled: i32,
    lat_scaled: i32,
}

impl CoordinateKey {
    /// Center of the rounded cell
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lon: self.lon_scaled as f64 / COORDINATE_SCALE,
            lat: self.lat_scaled as f64 / COORDINATE_SCALE,
        }
    }

    /// Planar distance in degrees between two keys
    pub fn degrees_to(&self, other: &CoordinateKey) -> f64 {
        let d_lon = (self.lon_scaled - other.lon_scaled) as f64 / COORDINATE_SCALE;
        let d_lat = (self.lat_scaled - other.lat_scaled) as f64 / COORDINATE_SCALE;
        (d_lon * d_lon + d_lat * d_lat).sqrt()
    }
}

impl From<Coordinate> for CoordinateKey {
    fn from(c: Coordinate) -> Self {
        Self {
            lon_scaled: (c.lon * COORDINATE_SCALE).round() as i32,
            lat_scaled: (c.lat * COORDINATE_SCALE).round() as i32,
        }
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.coordinate();
        write!(f, "{:.2},{:.2}", c.lon, c.lat)
    }
}

/// Types of weather conditions reported by providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    LightRain,
    ModerateRain,
    HeavyRain,
    Showers,
    Thunderstorm,
    Snow,
}

impl WeatherCondition {
    /// Precipitation range (mm/h) implied by the condition itself.
    ///
    /// Used to fill in precipitation when a provider's numeric value rounds to
    /// zero but its condition text says it is raining.
    pub fn implied_precipitation(&self) -> Option<(f64, f64)> {
        match self {
            WeatherCondition::Drizzle | WeatherCondition::LightRain => Some((0.1, 0.5)),
            WeatherCondition::ModerateRain | WeatherCondition::Showers => Some((0.5, 2.0)),
            WeatherCondition::HeavyRain | WeatherCondition::Thunderstorm => Some((2.0, 5.0)),
            WeatherCondition::Snow => Some((0.2, 1.0)),
            _ => None,
        }
    }

    /// Maps a provider's free-text description ("light rain", "Heavy showers")
    /// onto a condition. Unrecognized text maps to `Cloudy`.
    pub fn from_description(text: &str) -> WeatherCondition {
        let text = text.trim().to_lowercase();
        if text.contains("thunder") {
            WeatherCondition::Thunderstorm
        } else if text.contains("snow") || text.contains("sleet") {
            WeatherCondition::Snow
        } else if text.contains("drizzle") {
            WeatherCondition::Drizzle
        } else if text.contains("heavy") && (text.contains("rain") || text.contains("shower")) {
            WeatherCondition::HeavyRain
        } else if text.contains("moderate") && text.contains("rain") {
            WeatherCondition::ModerateRain
        } else if text.contains("shower") {
            WeatherCondition::Showers
        } else if text.contains("rain") {
            WeatherCondition::LightRain
        } else if text.contains("fog") || text.contains("mist") {
            WeatherCondition::Fog
        } else if text.contains("partly") || text.contains("mostly clear") {
            WeatherCondition::PartlyCloudy
        } else if text.contains("clear") || text.contains("sunny") {
            WeatherCondition::Clear
        } else {
            WeatherCondition::Cloudy
        }
    }
}

/// Weather at a single instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// UTC instant this point describes
    pub timestamp: DateTime<Utc>,
    /// Precipitation intensity in mm/h
    pub precipitation: f64,
    /// Wind speed in km/h
    pub wind_speed: f64,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Reported condition category
    pub condition: WeatherCondition,
}

/// Temporal resolution of a forecast series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Short-range (≤2h) sub-hourly data
    HighRes,
    /// Hourly or 3-hourly data reaching days ahead
    LongRange,
}

impl Resolution {
    /// Step of the dense series produced by interpolation
    pub fn step(&self) -> Duration {
        match self {
            Resolution::HighRes => Duration::minutes(5),
            Resolution::LongRange => Duration::minutes(15),
        }
    }

    /// Furthest horizon the dense series may reach past its first interval
    pub fn max_horizon(&self) -> Duration {
        match self {
            Resolution::HighRes => Duration::hours(2),
            Resolution::LongRange => Duration::hours(120),
        }
    }

    /// How far from an arrival time a point may be and still count as a match
    pub fn lookup_tolerance(&self) -> Duration {
        match self {
            Resolution::HighRes => Duration::minutes(3),
            Resolution::LongRange => Duration::hours(3),
        }
    }
}

/// Errors raised when building a forecast series
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    /// Two points are out of order or share a timestamp
    #[error("Forecast timestamps must be strictly increasing (at index {0})")]
    NotStrictlyIncreasing(usize),
}

/// Time-ordered forecast for one coordinate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSeries {
    resolution: Resolution,
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// Builds a series, rejecting points that are not strictly increasing in time
    pub fn new(resolution: Resolution, points: Vec<ForecastPoint>) -> Result<Self, SeriesError> {
        if let Some(i) = points
            .windows(2)
            .position(|pair| pair[0].timestamp >= pair[1].timestamp)
        {
            return Err(SeriesError::NotStrictlyIncreasing(i + 1));
        }
        Ok(Self { resolution, points })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point whose timestamp equals `at` exactly
    pub fn exact(&self, at: DateTime<Utc>) -> Option<&ForecastPoint> {
        self.points
            .binary_search_by(|p| p.timestamp.cmp(&at))
            .ok()
            .map(|i| &self.points[i])
    }

    /// First and last timestamps, if the series has any points
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.points.first()?.timestamp, self.points.last()?.timestamp))
    }

    /// Whether the series has data for the whole of `[start, end]`.
    ///
    /// The last point stands for one step past its timestamp.
    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.span()
            .is_some_and(|(first, last)| first <= start && last + self.resolution.step() >= end)
    }

    /// Point closest to `at`, provided it lies within `tolerance` (inclusive).
    ///
    /// Instants more than one step before the first point or after the last
    /// are outside the series and never match.
    pub fn nearest(&self, at: DateTime<Utc>, tolerance: Duration) -> Option<&ForecastPoint> {
        let (first, last) = self.span()?;
        let step = self.resolution.step();
        if at < first - step || at > last + step {
            return None;
        }

        let idx = self.points.partition_point(|p| p.timestamp < at);
        let before = idx.checked_sub(1).and_then(|i| self.points.get(i));
        let after = self.points.get(idx);

        let closest = match (before, after) {
            (Some(b), Some(a)) => {
                if at - b.timestamp <= a.timestamp - at {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        ((closest.timestamp - at).abs() <= tolerance).then_some(closest)
    }
}

/// Errors describing why a route cannot be evaluated
#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("Route needs at least 2 coordinates, got {0}")]
    TooFewCoordinates(usize),

    #[error("Route duration must be a finite, non-negative number of seconds")]
    InvalidDuration,

    #[error("Route duration of {0} s exceeds the 120 h forecast horizon")]
    DurationTooLong(f64),

    #[error("Route coordinate at index {0} is not finite")]
    InvalidCoordinate(usize),
}

/// Longest trip that can be evaluated, matching the long-range forecast horizon
pub const MAX_TRIP_HOURS: i64 = 120;

/// Opaque route returned by a directions provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    /// Ordered polyline vertices
    pub coordinates: Vec<Coordinate>,
    /// Total distance in meters
    #[serde(default)]
    pub distance: f64,
    /// Total duration in seconds
    pub duration: f64,
}

impl RouteGeometry {
    pub fn validate(&self) -> Result<(), RouteError> {
        if self.coordinates.len() < 2 {
            return Err(RouteError::TooFewCoordinates(self.coordinates.len()));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(RouteError::InvalidDuration);
        }
        if self.duration > Duration::hours(MAX_TRIP_HOURS).num_seconds() as f64 {
            return Err(RouteError::DurationTooLong(self.duration));
        }
        if let Some(i) = self.coordinates.iter().position(|c| !c.is_finite()) {
            return Err(RouteError::InvalidCoordinate(i));
        }
        Ok(())
    }

    /// Trip duration as a chrono `Duration`, rounded to the millisecond
    pub fn trip_duration(&self) -> Duration {
        Duration::milliseconds((self.duration * 1000.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point_at(minute: u32, precipitation: f64) -> ForecastPoint {
        ForecastPoint {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 8, minute, 0).unwrap(),
            precipitation,
            wind_speed: 10.0,
            temperature: 12.0,
            condition: WeatherCondition::Cloudy,
        }
    }

    #[test]
    fn test_coordinate_key_rounds_to_two_decimals() {
        let a = Coordinate::new(-123.1544, 49.2743).key();
        let b = Coordinate::new(-123.1501, 49.2749).key();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "-123.15,49.27");
    }

    #[test]
    fn test_coordinate_key_distance_in_degrees() {
        let a = Coordinate::new(10.0, 50.0).key();
        let b = Coordinate::new(10.06, 50.08).key();
        assert!((a.degrees_to(&b) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_coordinate_deserializes_from_lon_lat_pair() {
        let route: RouteGeometry = serde_json::from_str(
            r#"{"coordinates": [[-123.1, 49.2], [-122.9, 49.3]], "distance": 18000, "duration": 1500}"#,
        )
        .unwrap();
        assert_eq!(route.coordinates[0], Coordinate::new(-123.1, 49.2));
        assert!(route.validate().is_ok());
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let d = a.haversine_meters(&b);
        assert!((d - 111_195.0).abs() < 100.0, "got {}", d);
    }

    #[test]
    fn test_route_validation_rejects_single_point() {
        let route = RouteGeometry {
            coordinates: vec![Coordinate::new(0.0, 0.0)],
            distance: 0.0,
            duration: 60.0,
        };
        assert_eq!(route.validate(), Err(RouteError::TooFewCoordinates(1)));
    }

    #[test]
    fn test_route_validation_rejects_negative_duration() {
        let route = RouteGeometry {
            coordinates: vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)],
            distance: 100.0,
            duration: -5.0,
        };
        assert_eq!(route.validate(), Err(RouteError::InvalidDuration));
    }

    #[test]
    fn test_series_rejects_duplicate_timestamps() {
        let result = ForecastSeries::new(
            Resolution::HighRes,
            vec![point_at(0, 0.0), point_at(5, 0.0), point_at(5, 1.0)],
        );
        assert_eq!(result, Err(SeriesError::NotStrictlyIncreasing(2)));
    }

    #[test]
    fn test_series_exact_lookup() {
        let series =
            ForecastSeries::new(Resolution::HighRes, vec![point_at(0, 0.0), point_at(5, 1.5)]).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 5, 0).unwrap();
        assert_eq!(series.exact(at).map(|p| p.precipitation), Some(1.5));
        assert!(series.exact(at + Duration::minutes(1)).is_none());
    }

    #[test]
    fn test_series_nearest_respects_tolerance() {
        let series =
            ForecastSeries::new(Resolution::HighRes, vec![point_at(0, 0.0), point_at(10, 2.0)]).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 8, 0).unwrap();
        let hit = series.nearest(at, Duration::minutes(3)).unwrap();
        assert_eq!(hit.precipitation, 2.0);

        let gap = Utc.with_ymd_and_hms(2026, 3, 1, 8, 5, 0).unwrap();
        assert!(series.nearest(gap, Duration::minutes(3)).is_none());
    }

    #[test]
    fn test_series_nearest_stops_one_step_past_end() {
        let series = ForecastSeries::new(Resolution::LongRange, vec![point_at(0, 0.4), point_at(15, 0.6)]).unwrap();
        let within_step = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        let past_end = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let before_start = Utc.with_ymd_and_hms(2026, 3, 1, 7, 30, 0).unwrap();

        assert_eq!(series.nearest(within_step, Duration::hours(3)).unwrap().precipitation, 0.6);
        // Inside the 3 h tolerance, but the series has no data there
        assert!(series.nearest(past_end, Duration::hours(3)).is_none());
        assert!(series.nearest(before_start, Duration::hours(3)).is_none());
    }

    #[test]
    fn test_series_covers_window() {
        let series = ForecastSeries::new(Resolution::LongRange, vec![point_at(0, 0.0), point_at(15, 0.0)]).unwrap();
        let at = |h, m| Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).unwrap();

        assert!(series.covers(at(8, 0), at(8, 30)));
        assert!(!series.covers(at(7, 45), at(8, 15)));
        assert!(!series.covers(at(8, 0), at(9, 0)));
        assert!(!ForecastSeries::new(Resolution::LongRange, Vec::new()).unwrap().covers(at(8, 0), at(8, 0)));
    }

    #[test]
    fn test_route_validation_rejects_duration_past_horizon() {
        let route = RouteGeometry {
            coordinates: vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.1, 0.1)],
            distance: 1000.0,
            duration: 1e12,
        };
        assert_eq!(route.validate(), Err(RouteError::DurationTooLong(1e12)));

        let longest = RouteGeometry {
            duration: (MAX_TRIP_HOURS * 3600) as f64,
            ..route
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_condition_from_description() {
        assert_eq!(WeatherCondition::from_description("Light rain"), WeatherCondition::LightRain);
        assert_eq!(WeatherCondition::from_description("moderate rain"), WeatherCondition::ModerateRain);
        assert_eq!(WeatherCondition::from_description("Heavy showers"), WeatherCondition::HeavyRain);
        assert_eq!(WeatherCondition::from_description("thunderstorms"), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_description("Sunny"), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_description("overcast"), WeatherCondition::Cloudy);
    }

    #[test]
    fn test_implied_precipitation_only_for_wet_conditions() {
        assert!(WeatherCondition::Clear.implied_precipitation().is_none());
        assert!(WeatherCondition::Fog.implied_precipitation().is_none());
        assert_eq!(WeatherCondition::LightRain.implied_precipitation(), Some((0.1, 0.5)));
        assert_eq!(WeatherCondition::HeavyRain.implied_precipitation(), Some((2.0, 5.0)));
    }
}
