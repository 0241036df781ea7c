//! routecast - weather-aware departure advice
//!
//! Reads a route, fetches precipitation and wind forecasts along it from
//! Open-Meteo, and prints when to leave.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;

use routecast::cli::{Cli, OutputFormat, StartupConfig};
use routecast::data::{OpenMeteoClient, ProviderSet, Resolution};
use routecast::{report, AdvisoryConfig, AdvisoryEngine};

/// Logs go to stderr so JSON output on stdout stays clean
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("routecast=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_providers(startup: &StartupConfig) -> ProviderSet {
    let client = |resolution| match &startup.base_url {
        Some(url) => OpenMeteoClient::with_base_url(resolution, url.clone()),
        None => OpenMeteoClient::new(resolution),
    };

    let providers = ProviderSet::new().with_long_range(Arc::new(client(Resolution::LongRange)));
    if startup.high_res {
        providers.with_high_res(Arc::new(client(Resolution::HighRes)))
    } else {
        providers
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let startup = StartupConfig::from_cli(&cli)?;
    let config = AdvisoryConfig::load(startup.config_path.as_deref())?;

    let engine = AdvisoryEngine::new(config, build_providers(&startup));
    let now = Utc::now();
    let departure = startup.departure.unwrap_or(now);

    let recommendation = engine.recommend(&startup.route, departure, now).await?;

    match startup.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&recommendation)?),
        OutputFormat::Text => println!("{}", report::render_text(&recommendation)),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
