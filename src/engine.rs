//! The advisory engine: one entry point tying providers, cache and optimizer together

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;

use crate::cache::{ForecastCache, SharedForecastCache};
use crate::config::AdvisoryConfig;
use crate::data::{ProviderSet, RouteError, RouteGeometry};
use crate::optimizer::{Recommendation, WindowOptimizer};
use crate::resolver::{FetchWindow, ForecastResolver};

/// Errors returned by [`AdvisoryEngine::recommend`]
#[derive(Debug, Error, PartialEq)]
pub enum AdvisoryError {
    /// The route cannot be evaluated
    #[error("Invalid route: {0}")]
    InvalidRoute(#[from] RouteError),

    /// A newer request started while this one was fetching forecasts
    #[error("Request superseded by a newer one")]
    Superseded,
}

/// Produces departure recommendations for routes.
///
/// Clones share the forecast cache and the request generation, so a newer
/// `recommend` on any clone supersedes older in-flight ones. A superseded
/// request stops waiting on its fetches and drops them.
#[derive(Debug, Clone)]
pub struct AdvisoryEngine {
    config: AdvisoryConfig,
    providers: ProviderSet,
    resolver: ForecastResolver,
    optimizer: WindowOptimizer,
    generation: Arc<watch::Sender<u64>>,
}

impl AdvisoryEngine {
    /// Creates an engine with its own cache
    pub fn new(config: AdvisoryConfig, providers: ProviderSet) -> Self {
        let cache = ForecastCache::new(config.cache_ttl()).shared();
        Self::with_cache(config, providers, cache)
    }

    /// Creates an engine using an existing cache
    pub fn with_cache(
        config: AdvisoryConfig,
        providers: ProviderSet,
        cache: SharedForecastCache,
    ) -> Self {
        Self {
            resolver: ForecastResolver::new(cache, config.fetch_timeout()),
            optimizer: WindowOptimizer::from_config(&config),
            config,
            providers,
            generation: Arc::new(watch::Sender::new(0)),
        }
    }

    pub fn config(&self) -> &AdvisoryConfig {
        &self.config
    }

    /// Generation of the most recent request
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Abandon any in-flight request without starting a new one
    pub fn supersede(&self) {
        self.next_generation();
    }

    fn next_generation(&self) -> u64 {
        let mut current = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            current = *generation;
        });
        current
    }

    /// Evaluate `route` for a planned departure at `baseline`.
    ///
    /// Forecasts are fetched once for the whole candidate band. If another
    /// request starts before they arrive, the pending fetches are dropped and
    /// this one returns [`AdvisoryError::Superseded`].
    pub async fn recommend(
        &self,
        route: &RouteGeometry,
        baseline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Recommendation, AdvisoryError> {
        route.validate()?;
        let generation = self.next_generation();
        let mut superseded = self.generation.subscribe();

        let trip = route.trip_duration();
        let plan = self.providers.plan_for(trip);
        let step = self.config.search_step(plan.uses_high_res());
        let search_window = self.config.search_window();

        let earliest = (baseline - search_window).max(now - self.config.past_tolerance());
        let search = FetchWindow::new(earliest.min(baseline), baseline + search_window + trip);
        let trip_window = FetchWindow::new(baseline, baseline + trip);
        let keys = self.optimizer.sampler().sampled_keys(route);

        tracing::debug!(
            generation,
            ?plan,
            coordinates = keys.len(),
            %baseline,
            "resolving forecasts"
        );

        let forecasts = tokio::select! {
            forecasts = self.resolver.resolve(&plan, &keys, search, trip_window, now) => forecasts,
            Ok(_) = superseded.wait_for(|latest| *latest != generation) => {
                tracing::debug!(generation, "cancelling superseded request");
                return Err(AdvisoryError::Superseded);
            }
        };

        if self.generation() != generation {
            tracing::debug!(generation, "discarding superseded request");
            return Err(AdvisoryError::Superseded);
        }

        let mut recommendation = self.optimizer.recommend(
            route,
            baseline,
            now,
            step,
            &forecasts.current_layers(),
            &forecasts.candidate_layers(),
        );
        recommendation.stale_forecasts = forecasts.stale_count();
        if recommendation.stale_forecasts > 0 {
            tracing::warn!(
                stale = recommendation.stale_forecasts,
                "recommendation uses expired forecasts"
            );
        }

        tracing::info!(
            advice = ?recommendation.advice,
            risk = %recommendation.current_conditions.risk_level,
            best_departure = %recommendation.best_departure_time,
            "recommendation ready"
        );
        Ok(recommendation)
    }
}
