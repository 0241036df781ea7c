//! Cache module for forecast series
//!
//! This module provides an in-memory, process-lifetime cache keyed by rounded
//! coordinate and resolution, with a configurable TTL. It supports graceful
//! degradation by keeping expired entries around as last-good data that a
//! failed fetch can fall back on.

mod manager;

pub use manager::{
    CacheKey, CachedData, ForecastCache, SharedForecastCache, DEFAULT_LAST_GOOD_RETENTION_HOURS,
    DEFAULT_TTL_MINUTES,
};
