//! Command-line interface parsing for routecast
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into a validated [`StartupConfig`]: the route is read and checked and the
//! departure time parsed before any forecast is requested.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::Parser;
use thiserror::Error;

use crate::data::{RouteError, RouteGeometry};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The departure time is not RFC 3339
    #[error("Invalid departure time: '{0}'. Expected RFC 3339, e.g. 2026-03-01T08:00:00Z")]
    InvalidDeparture(String),

    /// The route file could not be read
    #[error("Failed to read route file {path}: {source}")]
    RouteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The route file is not valid route JSON
    #[error("Failed to parse route file: {0}")]
    RouteJson(#[from] serde_json::Error),

    /// The route parsed but cannot be evaluated
    #[error("Invalid route: {0}")]
    InvalidRoute(#[from] RouteError),
}

/// routecast - decide when to leave based on rain and wind along your route
#[derive(Parser, Debug)]
#[command(name = "routecast")]
#[command(about = "Weather-aware departure advice for a route")]
#[command(version)]
pub struct Cli {
    /// Route JSON file
    ///
    /// Format: {"coordinates": [[lon, lat], ...], "distance": meters, "duration": seconds}
    #[arg(long, short, value_name = "FILE")]
    pub route: PathBuf,

    /// Planned departure time (RFC 3339); defaults to now
    #[arg(long, value_name = "TIME")]
    pub depart: Option<String>,

    /// Configuration file (TOML); ROUTECAST_* environment variables override it
    #[arg(long, short, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use 15-minute forecasts for trips shorter than two hours
    #[arg(long)]
    pub high_res: bool,

    /// Print the recommendation as JSON
    #[arg(long)]
    pub json: bool,

    /// Alternative Open-Meteo endpoint
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,
}

/// How the recommendation is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub route: RouteGeometry,
    /// `None` means depart now
    pub departure: Option<DateTime<Utc>>,
    pub config_path: Option<PathBuf>,
    pub high_res: bool,
    pub output: OutputFormat,
    pub base_url: Option<String>,
}

/// Parses a departure argument into a UTC instant
pub fn parse_departure_arg(s: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| CliError::InvalidDeparture(s.to_string()))
}

/// Reads and validates a route JSON file
pub fn load_route(path: &Path) -> Result<RouteGeometry, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CliError::RouteFile {
        path: path.to_path_buf(),
        source,
    })?;
    let route: RouteGeometry = serde_json::from_str(&contents)?;
    route.validate()?;
    Ok(route)
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with the loaded route
    /// * `Err(CliError)` if the route or departure time is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let departure = cli.depart.as_deref().map(parse_departure_arg).transpose()?;
        let route = load_route(&cli.route)?;

        Ok(StartupConfig {
            route,
            departure,
            config_path: cli.config.clone(),
            high_res: cli.high_res,
            output: if cli.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            base_url: cli.base_url.clone(),
        })
    }
}
