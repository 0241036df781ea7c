//! Route sampling: mapping a route and a departure time onto forecasts
//!
//! A route can have thousands of vertices. The sampler picks a bounded subset
//! of them, estimates when the traveller reaches each one, and resolves a
//! forecast point for each arrival from one or more forecast maps.

use std::collections::HashMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

use crate::config::EtaMode;
use crate::data::{Coordinate, CoordinateKey, ForecastPoint, ForecastSeries, RouteGeometry};

/// Forecast series by rounded coordinate, fetched once per route
pub type ForecastMap = HashMap<CoordinateKey, ForecastSeries>;

/// Default maximum number of sampled coordinates
pub const DEFAULT_MAX_SAMPLES: usize = 100;

/// Default reach of the spatial fallback, roughly 11 km
pub const DEFAULT_SPATIAL_FALLBACK_DEGREES: f64 = 0.1;

/// How a sampled point's forecast was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    /// Same coordinate, timestamp equal to the arrival minute
    Exact,
    /// Same coordinate, closest timestamp within tolerance
    Nearest,
    /// A different nearby coordinate
    Spatial,
}

/// A route coordinate with its arrival time and resolved forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampledPoint {
    /// Index of the vertex in the route polyline
    pub index: usize,
    pub coordinate: Coordinate,
    pub arrival_time: DateTime<Utc>,
    pub forecast: ForecastPoint,
    pub lookup: LookupKind,
}

/// Everything the sampler learned about one departure time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteSample {
    /// Points with a forecast, in route order
    pub points: Vec<SampledPoint>,
    /// Number of coordinates sampled
    pub sampled: usize,
    /// Sampled coordinates without any forecast
    pub unresolved: usize,
}

impl RouteSample {
    /// Share of sampled points with no forecast, 0 when nothing was sampled
    pub fn unresolved_fraction(&self) -> f64 {
        if self.sampled == 0 {
            0.0
        } else {
            self.unresolved as f64 / self.sampled as f64
        }
    }
}

/// Samples a route and resolves forecasts for each sampled coordinate
#[derive(Debug, Clone)]
pub struct RouteSampler {
    max_samples: usize,
    eta_mode: EtaMode,
    spatial_fallback_degrees: f64,
}

impl Default for RouteSampler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl RouteSampler {
    /// `max_samples` below 2 is raised to 2 so both endpoints fit
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples: max_samples.max(2),
            eta_mode: EtaMode::PolylineIndex,
            spatial_fallback_degrees: DEFAULT_SPATIAL_FALLBACK_DEGREES,
        }
    }

    pub fn with_eta_mode(mut self, eta_mode: EtaMode) -> Self {
        self.eta_mode = eta_mode;
        self
    }

    pub fn with_spatial_fallback(mut self, degrees: f64) -> Self {
        self.spatial_fallback_degrees = degrees;
        self
    }

    /// Polyline indices to sample for a route of `len` vertices.
    ///
    /// Uses stride `ceil(len / max_samples)`, always includes the first and
    /// last index, and never returns more than `max_samples` indices: when the
    /// last vertex does not fall on the stride and there is no room left, it
    /// replaces the final strided index.
    pub fn sample_indices(&self, len: usize) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }
        let stride = len.div_ceil(self.max_samples);
        let mut indices: Vec<usize> = (0..len).step_by(stride).collect();

        let last = len - 1;
        if indices.last() != Some(&last) {
            if indices.len() < self.max_samples {
                indices.push(last);
            } else if let Some(tail) = indices.last_mut() {
                *tail = last;
            }
        }
        indices
    }

    /// Distinct rounded coordinates the sampler will look up for `route`
    pub fn sampled_keys(&self, route: &RouteGeometry) -> Vec<CoordinateKey> {
        let mut keys: Vec<CoordinateKey> = self
            .sample_indices(route.coordinates.len())
            .into_iter()
            .map(|i| route.coordinates[i].key())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Time from departure to each of `indices`
    pub fn arrival_offsets(&self, route: &RouteGeometry, indices: &[usize]) -> Vec<Duration> {
        let total = route.trip_duration();
        let len = route.coordinates.len();
        if len < 2 {
            return vec![Duration::zero(); indices.len()];
        }

        let progress: Vec<f64> = match self.eta_mode {
            EtaMode::PolylineIndex => indices
                .iter()
                .map(|&i| i as f64 / (len - 1) as f64)
                .collect(),
            EtaMode::Distance => distance_progress(route, indices),
        };

        progress
            .into_iter()
            .map(|p| Duration::milliseconds((total.num_milliseconds() as f64 * p).round() as i64))
            .collect()
    }

    /// Resolve forecasts along `route` for a departure at `departure`.
    ///
    /// `layers` are consulted in order; the first layer that yields a forecast
    /// for a point wins.
    pub fn sample(
        &self,
        route: &RouteGeometry,
        departure: DateTime<Utc>,
        layers: &[&ForecastMap],
    ) -> RouteSample {
        let indices = self.sample_indices(route.coordinates.len());
        let offsets = self.arrival_offsets(route, &indices);

        let mut sample = RouteSample {
            points: Vec::with_capacity(indices.len()),
            sampled: indices.len(),
            unresolved: 0,
        };

        for (&index, offset) in indices.iter().zip(offsets) {
            let coordinate = route.coordinates[index];
            let arrival_time = departure + offset;

            let resolved = layers
                .iter()
                .find_map(|layer| self.resolve(layer, coordinate.key(), arrival_time));

            match resolved {
                Some((forecast, lookup)) => sample.points.push(SampledPoint {
                    index,
                    coordinate,
                    arrival_time,
                    forecast,
                    lookup,
                }),
                None => sample.unresolved += 1,
            }
        }

        sample
    }

    fn resolve(
        &self,
        layer: &ForecastMap,
        key: CoordinateKey,
        arrival: DateTime<Utc>,
    ) -> Option<(ForecastPoint, LookupKind)> {
        let minute_key = arrival
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(arrival);

        if let Some(series) = layer.get(&key) {
            if let Some(point) = series.exact(minute_key) {
                return Some((*point, LookupKind::Exact));
            }
            if let Some(point) = series.nearest(minute_key, series.resolution().lookup_tolerance()) {
                return Some((*point, LookupKind::Nearest));
            }
        }

        let mut neighbours: Vec<(f64, &CoordinateKey, &ForecastSeries)> = layer
            .iter()
            .filter(|(other, _)| **other != key)
            .map(|(other, series)| (key.degrees_to(other), other, series))
            .filter(|(distance, _, _)| *distance <= self.spatial_fallback_degrees)
            .collect();
        // Key order breaks distance ties so map iteration order never matters
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(b.1)));

        neighbours.into_iter().find_map(|(_, _, series)| {
            series
                .nearest(minute_key, series.resolution().lookup_tolerance())
                .map(|point| (*point, LookupKind::Spatial))
        })
    }
}

/// Fraction of total route length covered at each of `indices`.
///
/// Falls back to index progress when the route has no length.
fn distance_progress(route: &RouteGeometry, indices: &[usize]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(route.coordinates.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in route.coordinates.windows(2) {
        total += pair[0].haversine_meters(&pair[1]);
        cumulative.push(total);
    }

    let len = route.coordinates.len();
    indices
        .iter()
        .map(|&i| {
            if total > 0.0 {
                cumulative[i] / total
            } else {
                i as f64 / (len - 1) as f64
            }
        })
        .collect()
}
