//! Temporal interpolation of sparse provider forecasts
//!
//! Providers report weather at their own cadence (minutely, 15-minutely,
//! hourly, 3-hourly). The engine needs a dense series at a fixed step so a
//! route point's arrival time can be matched to a forecast. This module
//! resamples sparse intervals onto a fixed grid anchored at the first interval,
//! linearly interpolating between each bracketing pair.

use std::f64::consts::PI;

use chrono::Duration;

use crate::data::{
    ForecastPoint, ForecastSeries, ProviderInterval, RawForecast, Resolution, SeriesError,
    WeatherCondition,
};

/// Supplies precipitation for slots where the numeric forecast rounds to zero
/// but the condition says otherwise.
///
/// `position` is the slot's progress through its provider interval, in `[0, 1)`.
/// Implementations must stay within the condition's implied range.
pub trait PrecipitationFill: Send + Sync {
    fn fill(&self, condition: WeatherCondition, position: f64) -> Option<f64>;
}

/// Deterministic fill: a smooth bump across the interval, centered in the
/// condition's implied range.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicFill;

impl PrecipitationFill for DeterministicFill {
    fn fill(&self, condition: WeatherCondition, position: f64) -> Option<f64> {
        let (low, high) = condition.implied_precipitation()?;
        let shape = 0.25 + 0.5 * (PI * position.clamp(0.0, 1.0)).sin();
        Some(low + (high - low) * shape)
    }
}

/// Resamples sparse provider intervals into a dense fixed-step series
#[derive(Debug, Clone)]
pub struct TemporalInterpolator<F = DeterministicFill> {
    resolution: Resolution,
    step: Duration,
    horizon: Duration,
    fill: F,
}

impl TemporalInterpolator<DeterministicFill> {
    /// Interpolator using the step and maximum horizon of `resolution`
    pub fn for_resolution(resolution: Resolution) -> Self {
        Self {
            resolution,
            step: resolution.step(),
            horizon: resolution.max_horizon(),
            fill: DeterministicFill,
        }
    }
}

impl<F: PrecipitationFill> TemporalInterpolator<F> {
    /// Shortens the horizon; it can never exceed the resolution's maximum
    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon.min(self.resolution.max_horizon());
        self
    }

    /// Replaces the precipitation fill strategy
    pub fn with_fill<G: PrecipitationFill>(self, fill: G) -> TemporalInterpolator<G> {
        TemporalInterpolator {
            resolution: self.resolution,
            step: self.step,
            horizon: self.horizon,
            fill,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Produce the dense series for `raw`.
    ///
    /// The output starts at the earliest interval, advances by `step`, and ends
    /// at whichever comes first: the horizon, or one window past the last
    /// interval (the last interval is held flat).
    pub fn interpolate(&self, raw: &RawForecast) -> Result<ForecastSeries, SeriesError> {
        let mut intervals = raw.intervals.clone();
        intervals.sort_by_key(|interval| interval.start);
        intervals.dedup_by_key(|interval| interval.start);

        let (Some(first), Some(last)) = (intervals.first(), intervals.last()) else {
            return ForecastSeries::new(self.resolution, Vec::new());
        };

        let last_window = match intervals.len() {
            0 | 1 => raw.nominal_interval,
            n => last.start - intervals[n - 2].start,
        };
        let hold_end = last.start + last_window;
        let limit = first.start + self.horizon;

        let mut points = Vec::new();
        let mut bracket = 0;
        let mut t = first.start;

        while t < hold_end && t <= limit {
            while bracket + 1 < intervals.len() && intervals[bracket + 1].start <= t {
                bracket += 1;
            }
            let current = &intervals[bracket];
            points.push(self.point_at(t, current, intervals.get(bracket + 1), last_window));
            t += self.step;
        }

        ForecastSeries::new(self.resolution, points)
    }

    fn point_at(
        &self,
        t: chrono::DateTime<chrono::Utc>,
        current: &ProviderInterval,
        next: Option<&ProviderInterval>,
        last_window: Duration,
    ) -> ForecastPoint {
        let (window, target) = match next {
            Some(next) => (next.start - current.start, next),
            None => (last_window, current),
        };
        let progress = if window > Duration::zero() {
            (t - current.start).num_milliseconds() as f64 / window.num_milliseconds() as f64
        } else {
            0.0
        };

        let lerp = |from: f64, to: f64| from + (to - from) * progress;

        let mut precipitation = round2(lerp(current.precipitation, target.precipitation).max(0.0));
        if precipitation == 0.0 {
            if let Some(filled) = self.fill.fill(current.condition, progress) {
                precipitation = round2(filled.max(0.0));
            }
        }

        ForecastPoint {
            timestamp: t,
            precipitation,
            wind_speed: round2(lerp(current.wind_speed, target.wind_speed).max(0.0)),
            temperature: round2(lerp(current.temperature, target.temperature)),
            condition: current.condition,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
