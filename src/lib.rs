//! routecast library
//!
//! Weather-aware departure advice for a route. This module exposes the engine
//! and its building blocks for the binary and for integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod interpolate;
pub mod optimizer;
pub mod report;
pub mod resolver;
pub mod risk;
pub mod route;

pub use config::AdvisoryConfig;
pub use engine::{AdvisoryEngine, AdvisoryError};
pub use optimizer::{Advice, Recommendation, TravelWindow};
