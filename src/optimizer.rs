//! Departure window search and the final recommendation.
//!
//! The optimizer evaluates a band of candidate departure times around the
//! user's planned (baseline) departure. Each candidate becomes a
//! [`TravelWindow`]: the route is sampled at that departure, the resolved
//! forecasts are aggregated and scored. Windows are ranked and reduced to a
//! [`Recommendation`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::AdvisoryConfig;
use crate::data::RouteGeometry;
use crate::risk::{RiskAnalyzer, RiskFactor, RiskLevel};
use crate::route::{ForecastMap, RouteSampler};

/// A future window counts as an improvement below this share of current peak rain
const IMPROVEMENT_RATIO: f64 = 0.7;

/// A future window counts as worse above this share of current peak rain
const WORSENING_RATIO: f64 = 1.3;

/// Risk summary for one hypothetical departure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelWindow {
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Sum of precipitation intensities over resolved points
    pub total_rain_encounter: f64,
    pub avg_rain_intensity: f64,
    pub max_rain_intensity: f64,
    pub avg_wind_speed: f64,
    pub max_wind_speed: f64,
    pub risk_level: RiskLevel,
    pub primary_risk_factor: RiskFactor,
    pub resolved_points: usize,
    pub unresolved_points: usize,
    /// Risk was raised because too much of the route lacked forecasts
    pub low_confidence: bool,
}

impl TravelWindow {
    /// Whether any sampled point had a forecast
    pub fn has_data(&self) -> bool {
        self.resolved_points > 0
    }
}

/// What the traveller should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advice {
    /// Later departures only get worse
    LeaveNow,
    /// An earlier departure carries less risk
    LeaveEarlier,
    /// Conditions are high risk now but ease shortly
    WaitUntil,
    /// Keep the planned departure
    Proceed,
    /// No forecast could be resolved for the planned trip
    InsufficientData,
}

/// Direction the weather is heading after the planned departure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "trend", rename_all = "snake_case")]
pub enum ImprovementForecast {
    Improving {
        at: DateTime<Utc>,
        max_rain_intensity: f64,
    },
    Worsening {
        at: DateTime<Utc>,
        max_rain_intensity: f64,
    },
    Stable,
}

/// Final output of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub advice: Advice,
    pub should_wait: bool,
    pub reason: String,
    /// Head of the ranked list, or the baseline when no candidate had data
    pub best_departure_time: DateTime<Utc>,
    /// Departure the advice points at, if it suggests a change
    pub suggested_departure_time: Option<DateTime<Utc>>,
    /// Candidate windows ranked by risk, then total rain
    pub windows: Vec<TravelWindow>,
    /// Window computed exactly at the baseline departure
    pub current_conditions: TravelWindow,
    pub improvement_forecast: ImprovementForecast,
    /// Part of the planned trip runs past available forecasts
    pub beyond_forecast_coverage: bool,
    /// Coordinates evaluated against expired forecasts after a failed fetch
    pub stale_forecasts: usize,
}

/// Searches candidate departure times and derives a recommendation
#[derive(Debug, Clone)]
pub struct WindowOptimizer {
    sampler: RouteSampler,
    analyzer: RiskAnalyzer,
    search_window: Duration,
    past_tolerance: Duration,
    escalation_limit: f64,
}

impl Default for WindowOptimizer {
    fn default() -> Self {
        Self::from_config(&AdvisoryConfig::default())
    }
}

impl WindowOptimizer {
    pub fn from_config(config: &AdvisoryConfig) -> Self {
        Self {
            sampler: RouteSampler::new(config.max_route_samples)
                .with_eta_mode(config.eta_mode)
                .with_spatial_fallback(config.spatial_fallback_degrees),
            analyzer: RiskAnalyzer::new(config.thresholds()),
            search_window: config.search_window(),
            past_tolerance: config.past_tolerance(),
            escalation_limit: config.unresolved_fraction_escalation_limit,
        }
    }

    pub fn sampler(&self) -> &RouteSampler {
        &self.sampler
    }

    /// Departure times in `[baseline - window, baseline + window]` every `step`,
    /// in ascending order, minus those more than the past tolerance before `now`.
    pub fn candidate_times(
        &self,
        baseline: DateTime<Utc>,
        now: DateTime<Utc>,
        step: Duration,
    ) -> Vec<DateTime<Utc>> {
        if step.num_seconds() <= 0 {
            return vec![baseline];
        }
        let reach = (self.search_window.num_seconds() / step.num_seconds()) as i32;
        let earliest_allowed = now - self.past_tolerance;

        (-reach..=reach)
            .map(|k| baseline + step * k)
            .filter(|t| *t >= earliest_allowed)
            .collect()
    }

    /// Sample, aggregate and score the route for one departure time
    pub fn build_window(
        &self,
        route: &RouteGeometry,
        departure: DateTime<Utc>,
        layers: &[&ForecastMap],
    ) -> TravelWindow {
        let sample = self.sampler.sample(route, departure, layers);
        let resolved = sample.points.len();

        let mut total_rain = 0.0;
        let mut max_rain: f64 = 0.0;
        let mut total_wind = 0.0;
        let mut max_wind: f64 = 0.0;
        for point in &sample.points {
            total_rain += point.forecast.precipitation;
            max_rain = max_rain.max(point.forecast.precipitation);
            total_wind += point.forecast.wind_speed;
            max_wind = max_wind.max(point.forecast.wind_speed);
        }

        let assessment = self.analyzer.analyze(max_rain, max_wind);
        let risk_level = if resolved > 0 && sample.unresolved_fraction() > self.escalation_limit {
            assessment.level.escalate()
        } else {
            assessment.level
        };
        let low_confidence = risk_level != assessment.level;

        let average = |total: f64| if resolved > 0 { total / resolved as f64 } else { 0.0 };

        TravelWindow {
            departure_time: departure,
            arrival_time: departure + route.trip_duration(),
            total_rain_encounter: total_rain,
            avg_rain_intensity: average(total_rain),
            max_rain_intensity: max_rain,
            avg_wind_speed: average(total_wind),
            max_wind_speed: max_wind,
            risk_level,
            primary_risk_factor: assessment.primary_factor,
            resolved_points: resolved,
            unresolved_points: sample.unresolved,
            low_confidence,
        }
    }

    /// Orders windows by risk, then by total rain; equal windows keep their order
    pub fn rank(windows: &mut [TravelWindow]) {
        windows.sort_by(|a, b| {
            a.risk_level
                .cmp(&b.risk_level)
                .then(a.total_rain_encounter.total_cmp(&b.total_rain_encounter))
        });
    }

    /// Evaluate all candidates and decide.
    ///
    /// `current_layers` are used for the window exactly at `baseline`,
    /// `candidate_layers` for every candidate in the search band. Both refer
    /// to forecasts fetched once for the whole search.
    pub fn recommend(
        &self,
        route: &RouteGeometry,
        baseline: DateTime<Utc>,
        now: DateTime<Utc>,
        step: Duration,
        current_layers: &[&ForecastMap],
        candidate_layers: &[&ForecastMap],
    ) -> Recommendation {
        let current = self.build_window(route, baseline, current_layers);

        // Windows without data would look deceptively clear, so they never rank
        let candidates: Vec<TravelWindow> = self
            .candidate_times(baseline, now, step)
            .into_iter()
            .map(|t| self.build_window(route, t, candidate_layers))
            .filter(TravelWindow::has_data)
            .collect();

        let mut ranked = candidates.clone();
        Self::rank(&mut ranked);
        let best_departure_time = ranked.first().map_or(baseline, |w| w.departure_time);

        tracing::debug!(
            candidates = candidates.len(),
            current_risk = %current.risk_level,
            resolved = current.resolved_points,
            unresolved = current.unresolved_points,
            "evaluated departure windows"
        );

        if !current.has_data() {
            return Recommendation {
                advice: Advice::InsufficientData,
                should_wait: false,
                reason: "Insufficient weather data for this route and departure time".to_string(),
                best_departure_time,
                suggested_departure_time: None,
                windows: ranked,
                beyond_forecast_coverage: current.unresolved_points > 0,
                stale_forecasts: 0,
                current_conditions: current,
                improvement_forecast: ImprovementForecast::Stable,
            };
        }

        let improvement_forecast = improvement_forecast(&current, &candidates, baseline);
        let (advice, suggested, reason) = decide(&current, &candidates, &ranked, baseline);

        Recommendation {
            advice,
            should_wait: advice == Advice::WaitUntil,
            reason,
            best_departure_time,
            suggested_departure_time: suggested,
            windows: ranked,
            beyond_forecast_coverage: current.unresolved_points > 0,
            stale_forecasts: 0,
            current_conditions: current,
            improvement_forecast,
        }
    }
}

fn decide(
    current: &TravelWindow,
    candidates: &[TravelWindow],
    ranked: &[TravelWindow],
    baseline: DateTime<Utc>,
) -> (Advice, Option<DateTime<Utc>>, String) {
    let best_later = candidates
        .iter()
        .filter(|w| w.departure_time > baseline)
        .map(|w| w.risk_level)
        .min();
    if best_later.is_some_and(|risk| risk > current.risk_level) {
        return (
            Advice::LeaveNow,
            None,
            format!(
                "Conditions worsen after {}; leave as soon as possible ({} risk now, driven by {})",
                format_time(baseline),
                current.risk_level,
                current.primary_risk_factor.label()
            ),
        );
    }

    if let Some(earlier) = ranked
        .iter()
        .find(|w| w.departure_time < baseline)
        .filter(|w| w.risk_level < current.risk_level)
    {
        return (
            Advice::LeaveEarlier,
            Some(earlier.departure_time),
            format!(
                "Leaving at {} lowers the risk from {} to {}",
                format_time(earlier.departure_time),
                current.risk_level,
                earlier.risk_level
            ),
        );
    }

    if current.risk_level == RiskLevel::High {
        if let Some(later) = ranked
            .iter()
            .find(|w| w.departure_time >= baseline)
            .filter(|w| w.risk_level < RiskLevel::High)
        {
            return (
                Advice::WaitUntil,
                Some(later.departure_time),
                format!(
                    "High {} risk now; waiting until {} lowers it to {}",
                    current.primary_risk_factor.label(),
                    format_time(later.departure_time),
                    later.risk_level
                ),
            );
        }
    }

    let reason = match current.risk_level {
        RiskLevel::Low => "Conditions are favorable for the planned departure".to_string(),
        level => format!(
            "{} {} risk, but no nearby departure is better; conditions are acceptable",
            capitalize(level.label()),
            current.primary_risk_factor.label()
        ),
    };
    (Advice::Proceed, None, reason)
}

fn improvement_forecast(
    current: &TravelWindow,
    candidates: &[TravelWindow],
    baseline: DateTime<Utc>,
) -> ImprovementForecast {
    let mut future = candidates.iter().filter(|w| w.departure_time > baseline);

    let improving = future.clone().find(|w| {
        w.max_rain_intensity < IMPROVEMENT_RATIO * current.max_rain_intensity
            || (current.risk_level == RiskLevel::High && w.risk_level < RiskLevel::High)
    });
    if let Some(w) = improving {
        return ImprovementForecast::Improving {
            at: w.departure_time,
            max_rain_intensity: w.max_rain_intensity,
        };
    }

    match future.find(|w| w.max_rain_intensity > WORSENING_RATIO * current.max_rain_intensity) {
        Some(w) => ImprovementForecast::Worsening {
            at: w.departure_time,
            max_rain_intensity: w.max_rain_intensity,
        },
        None => ImprovementForecast::Stable,
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%H:%M UTC").to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
