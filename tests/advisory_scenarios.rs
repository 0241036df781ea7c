//! End-to-end tests for the advisory engine
//!
//! Providers are scripted in-process so the scenarios are deterministic and
//! every fetch can be counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, TimeZone, Utc};

use routecast::cache::ForecastCache;
use routecast::data::{
    Coordinate, ProviderInterval, ProviderSet, RawForecast, Resolution, RouteError,
    RouteGeometry, WeatherCondition, WeatherError, WeatherProvider,
};
use routecast::risk::{RiskFactor, RiskLevel};
use routecast::{Advice, AdvisoryConfig, AdvisoryEngine, AdvisoryError};

type Weather = dyn Fn(DateTime<Utc>) -> (f64, f64) + Send + Sync;

/// Returns 15-minute intervals from `weather(t) -> (precipitation, wind)`
struct ScriptedProvider {
    resolution: Resolution,
    weather: Box<Weather>,
    delay: Option<std::time::Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(
        resolution: Resolution,
        weather: impl Fn(DateTime<Utc>) -> (f64, f64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            resolution,
            weather: Box::new(weather),
            delay: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn constant(resolution: Resolution, precipitation: f64, wind: f64) -> Self {
        Self::new(resolution, move |_| (precipitation, wind))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherProvider for ScriptedProvider {
    fn name(&self) -> &str {
        match self.resolution {
            Resolution::HighRes => "scripted-high-res",
            Resolution::LongRange => "scripted-long-range",
        }
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    async fn fetch_forecast(
        &self,
        _lat: f64,
        _lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RawForecast, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(WeatherError::MissingField("hourly".to_string()));
        }

        let step = Duration::minutes(15);
        let mut t = start.duration_trunc(Duration::hours(1)).unwrap();
        let mut intervals = Vec::new();
        while t <= end + Duration::hours(1) {
            let (precipitation, wind_speed) = (self.weather)(t);
            intervals.push(ProviderInterval {
                start: t,
                precipitation,
                wind_speed,
                temperature: 9.0,
                condition: if precipitation > 0.0 {
                    WeatherCondition::HeavyRain
                } else {
                    WeatherCondition::Clear
                },
            });
            t += step;
        }

        Ok(RawForecast {
            resolution: self.resolution,
            nominal_interval: step,
            intervals,
        })
    }
}

fn baseline() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

fn three_point_route(duration: f64) -> RouteGeometry {
    RouteGeometry {
        coordinates: vec![
            Coordinate::new(-123.10, 49.28),
            Coordinate::new(-122.80, 49.20),
            Coordinate::new(-122.50, 49.10),
        ],
        distance: 60_000.0,
        duration,
    }
}

fn long_range_engine(provider: &Arc<ScriptedProvider>) -> AdvisoryEngine {
    let providers = ProviderSet::new().with_long_range(provider.clone());
    AdvisoryEngine::new(AdvisoryConfig::default(), providers)
}

#[tokio::test]
async fn test_scenario_constant_clear_weather_is_low_risk() {
    let provider = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let engine = long_range_engine(&provider);

    let rec = engine
        .recommend(&three_point_route(5400.0), baseline(), baseline())
        .await
        .unwrap();

    assert_eq!(rec.current_conditions.risk_level, RiskLevel::Low);
    assert!(!rec.should_wait);
    assert_eq!(rec.current_conditions.resolved_points, 3);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_scenario_rain_at_midpoint_arrival_is_high_risk() {
    // 5400 s over three points: the midpoint is reached at 08:45
    let midpoint_arrival = baseline() + Duration::minutes(45);
    let provider = Arc::new(ScriptedProvider::new(Resolution::LongRange, move |t| {
        if t == midpoint_arrival {
            (5.0, 10.0)
        } else {
            (0.0, 10.0)
        }
    }));
    let engine = long_range_engine(&provider);

    let rec = engine
        .recommend(&three_point_route(5400.0), baseline(), baseline())
        .await
        .unwrap();

    assert_eq!(rec.current_conditions.max_rain_intensity, 5.0);
    assert_eq!(rec.current_conditions.risk_level, RiskLevel::High);
    assert_eq!(
        rec.current_conditions.primary_risk_factor,
        RiskFactor::Precipitation
    );
}

#[tokio::test]
async fn test_scenario_long_trip_never_uses_high_res_provider() {
    let high_res = Arc::new(ScriptedProvider::constant(Resolution::HighRes, 0.0, 10.0));
    let long_range = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let providers = ProviderSet::new()
        .with_high_res(high_res.clone())
        .with_long_range(long_range.clone());
    let engine = AdvisoryEngine::new(AdvisoryConfig::default(), providers);

    // Eight hours
    let rec = engine
        .recommend(&three_point_route(28_800.0), baseline(), baseline())
        .await
        .unwrap();

    assert_eq!(high_res.calls(), 0);
    assert!(long_range.calls() > 0);
    assert_eq!(rec.current_conditions.resolved_points, 3);
    // Long-range search spacing
    for pair in rec.windows.windows(2) {
        let gap = (pair[0].departure_time - pair[1].departure_time).num_minutes().abs();
        assert_eq!(gap % 15, 0);
    }
}

#[tokio::test]
async fn test_short_trip_uses_high_res_for_current_window() {
    let high_res = Arc::new(ScriptedProvider::constant(Resolution::HighRes, 3.0, 10.0));
    let long_range = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let providers = ProviderSet::new()
        .with_high_res(high_res.clone())
        .with_long_range(long_range.clone());
    let engine = AdvisoryEngine::new(AdvisoryConfig::default(), providers);

    let rec = engine
        .recommend(&three_point_route(1800.0), baseline(), baseline())
        .await
        .unwrap();

    assert_eq!(high_res.calls(), 3);
    assert_eq!(long_range.calls(), 3);
    // The current window sees the high-resolution rain
    assert_eq!(rec.current_conditions.max_rain_intensity, 3.0);
    assert_eq!(rec.current_conditions.risk_level, RiskLevel::High);
    // 5-minute candidates from 07:55 to 09:00
    assert_eq!(rec.windows.len(), 14);
}

#[tokio::test]
async fn test_short_trip_falls_back_to_long_range_per_coordinate() {
    let high_res = Arc::new(ScriptedProvider {
        fail: true,
        ..ScriptedProvider::constant(Resolution::HighRes, 0.0, 10.0)
    });
    let long_range = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 1.0, 10.0));
    let providers = ProviderSet::new()
        .with_high_res(high_res.clone())
        .with_long_range(long_range);
    let engine = AdvisoryEngine::new(AdvisoryConfig::default(), providers);

    let rec = engine
        .recommend(&three_point_route(1800.0), baseline(), baseline())
        .await
        .unwrap();

    assert_eq!(rec.current_conditions.resolved_points, 3);
    assert_eq!(rec.current_conditions.max_rain_intensity, 1.0);
    assert_eq!(rec.current_conditions.risk_level, RiskLevel::Medium);
}

#[tokio::test]
async fn test_windows_are_ranked_by_risk_then_rain() {
    let storm_start = baseline() + Duration::minutes(30);
    let provider = Arc::new(ScriptedProvider::new(Resolution::LongRange, move |t| {
        if t >= storm_start {
            (4.0, 20.0)
        } else {
            (0.2, 10.0)
        }
    }));
    let engine = long_range_engine(&provider);

    let rec = engine
        .recommend(
            &three_point_route(1800.0),
            baseline(),
            baseline() - Duration::hours(2),
        )
        .await
        .unwrap();

    assert_eq!(rec.windows.len(), 9);
    for pair in rec.windows.windows(2) {
        assert!(pair[0].risk_level <= pair[1].risk_level);
        if pair[0].risk_level == pair[1].risk_level {
            assert!(pair[0].total_rain_encounter <= pair[1].total_rain_encounter);
        }
    }
    assert_eq!(rec.best_departure_time, rec.windows[0].departure_time);
    assert_eq!(rec.windows[0].risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn test_forecasts_are_reused_from_cache() {
    let provider = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let engine = long_range_engine(&provider);
    let route = three_point_route(1800.0);

    engine.recommend(&route, baseline(), baseline()).await.unwrap();
    engine
        .recommend(&route, baseline(), baseline() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(provider.calls(), 3);

    // Past the 10 minute TTL the provider is asked again
    engine
        .recommend(&route, baseline(), baseline() + Duration::minutes(11))
        .await
        .unwrap();
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn test_shared_cache_is_isolated_per_instance() {
    let provider = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let route = three_point_route(1800.0);

    let cache = ForecastCache::default().shared();
    let providers = ProviderSet::new().with_long_range(provider.clone());
    let first = AdvisoryEngine::with_cache(AdvisoryConfig::default(), providers.clone(), cache.clone());
    let second = AdvisoryEngine::with_cache(AdvisoryConfig::default(), providers.clone(), cache);
    let isolated = AdvisoryEngine::new(AdvisoryConfig::default(), providers);

    first.recommend(&route, baseline(), baseline()).await.unwrap();
    second.recommend(&route, baseline(), baseline()).await.unwrap();
    assert_eq!(provider.calls(), 3);

    isolated.recommend(&route, baseline(), baseline()).await.unwrap();
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn test_failing_provider_gives_insufficient_data() {
    let provider = Arc::new(ScriptedProvider {
        fail: true,
        ..ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0)
    });
    let engine = long_range_engine(&provider);

    let rec = engine
        .recommend(&three_point_route(1800.0), baseline(), baseline())
        .await
        .unwrap();

    assert_eq!(rec.advice, Advice::InsufficientData);
    assert!(!rec.should_wait);
    assert!(rec.windows.is_empty());
    assert_eq!(rec.best_departure_time, baseline());
}

#[tokio::test]
async fn test_slow_provider_times_out_into_insufficient_data() {
    let provider = Arc::new(ScriptedProvider {
        delay: Some(std::time::Duration::from_secs(30)),
        ..ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0)
    });
    let config = AdvisoryConfig {
        fetch_timeout_seconds: 1,
        ..Default::default()
    };
    let engine = AdvisoryEngine::new(config, ProviderSet::new().with_long_range(provider.clone()));

    let rec = engine
        .recommend(&three_point_route(1800.0), baseline(), baseline())
        .await
        .unwrap();
    assert_eq!(rec.advice, Advice::InsufficientData);
}

#[tokio::test]
async fn test_newer_request_supersedes_older_one() {
    let provider = Arc::new(ScriptedProvider {
        delay: Some(std::time::Duration::from_millis(200)),
        ..ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0)
    });
    let engine = long_range_engine(&provider);
    let route = three_point_route(1800.0);

    let older = engine.recommend(&route, baseline(), baseline());
    let newer = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        engine.recommend(&route, baseline(), baseline()).await
    };
    let (older, newer) = tokio::join!(older, newer);

    assert_eq!(older.unwrap_err(), AdvisoryError::Superseded);
    assert!(newer.is_ok());
    assert_eq!(engine.generation(), 2);
}

#[tokio::test]
async fn test_invalid_route_is_rejected() {
    let provider = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let engine = long_range_engine(&provider);
    let mut route = three_point_route(1800.0);
    route.duration = f64::NAN;

    let result = engine.recommend(&route, baseline(), baseline()).await;
    assert!(matches!(result, Err(AdvisoryError::InvalidRoute(_))));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_later_departure_within_ttl_fetches_its_own_window() {
    let provider = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let engine = long_range_engine(&provider);
    let route = three_point_route(1800.0);

    engine.recommend(&route, baseline(), baseline()).await.unwrap();
    assert_eq!(provider.calls(), 3);

    // Still inside the TTL, but the cached series ends hours before 18:00
    let evening = baseline() + Duration::hours(10);
    let rec = engine
        .recommend(&route, evening, baseline() + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 6);
    assert_ne!(rec.advice, Advice::InsufficientData);
    assert_eq!(rec.current_conditions.resolved_points, 3);
    assert_eq!(rec.current_conditions.departure_time, evening);
}

#[tokio::test]
async fn test_later_departure_sees_rain_beyond_cached_series() {
    let rain_from = baseline() + Duration::hours(3);
    let provider = Arc::new(ScriptedProvider::new(Resolution::LongRange, move |t| {
        if t >= rain_from {
            (5.0, 10.0)
        } else {
            (0.0, 10.0)
        }
    }));
    let engine = long_range_engine(&provider);
    let route = three_point_route(1800.0);

    let morning = engine.recommend(&route, baseline(), baseline()).await.unwrap();
    assert_eq!(morning.current_conditions.risk_level, RiskLevel::Low);

    let rec = engine
        .recommend(
            &route,
            baseline() + Duration::hours(5),
            baseline() + Duration::minutes(5),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls(), 6);
    assert_eq!(rec.current_conditions.max_rain_intensity, 5.0);
    assert_eq!(rec.current_conditions.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn test_expired_forecasts_are_flagged_when_provider_fails() {
    let cache = ForecastCache::default().shared();
    let good = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let bad = Arc::new(ScriptedProvider {
        fail: true,
        ..ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0)
    });
    let route = three_point_route(1800.0);

    let healthy = AdvisoryEngine::with_cache(
        AdvisoryConfig::default(),
        ProviderSet::new().with_long_range(good.clone()),
        cache.clone(),
    );
    let rec = healthy.recommend(&route, baseline(), baseline()).await.unwrap();
    assert_eq!(rec.stale_forecasts, 0);

    let degraded = AdvisoryEngine::with_cache(
        AdvisoryConfig::default(),
        ProviderSet::new().with_long_range(bad.clone()),
        cache,
    );
    let rec = degraded
        .recommend(&route, baseline(), baseline() + Duration::minutes(11))
        .await
        .unwrap();

    assert_eq!(bad.calls(), 3);
    assert_eq!(rec.stale_forecasts, 3);
    assert_eq!(rec.current_conditions.resolved_points, 3);
    assert_ne!(rec.advice, Advice::InsufficientData);
}

#[tokio::test]
async fn test_superseded_request_stops_waiting_on_fetches() {
    let provider = Arc::new(ScriptedProvider {
        delay: Some(std::time::Duration::from_secs(30)),
        ..ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0)
    });
    let config = AdvisoryConfig {
        fetch_timeout_seconds: 60,
        ..Default::default()
    };
    let engine = AdvisoryEngine::new(config, ProviderSet::new().with_long_range(provider.clone()));
    let route = three_point_route(1800.0);

    let request = engine.recommend(&route, baseline(), baseline());
    let cancel = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        engine.supersede();
    };
    let (result, ()) = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        tokio::join!(request, cancel)
    })
    .await
    .expect("superseded request should return without waiting for its fetches");

    assert_eq!(result.unwrap_err(), AdvisoryError::Superseded);
    assert_eq!(provider.calls(), 3);
    assert_eq!(engine.generation(), 2);
}

#[tokio::test]
async fn test_route_longer_than_forecast_horizon_is_rejected() {
    let provider = Arc::new(ScriptedProvider::constant(Resolution::LongRange, 0.0, 10.0));
    let engine = long_range_engine(&provider);

    // Six days
    let result = engine
        .recommend(&three_point_route(518_400.0), baseline(), baseline())
        .await;
    assert!(matches!(
        result,
        Err(AdvisoryError::InvalidRoute(RouteError::DurationTooLong(_)))
    ));
    assert_eq!(provider.calls(), 0);
}
