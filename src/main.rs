mod analysis;
mod chart;
mod config;
mod data;
mod loader;
mod logging;
mod market;
mod output;
mod pipeline;
mod session;

use std::io;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info};

use config::AppConfig;
use loader::CsvSource;
use market::{ConfiguredSource, FetchRequest, MarketDataSource, YahooClient};
use pipeline::AnalysisRequest;

fn main() -> ExitCode {
    let config = AppConfig::parse();
    logging::init_logging();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "run failed");
            eprintln!("An error occurred: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &AppConfig) -> Result<()> {
    config.validate()?;

    let source = ConfiguredSource::new(build_source(config)?, config.cache_ttl());
    let request = AnalysisRequest {
        fetch: FetchRequest::new(
            config.ticker.trim().to_ascii_uppercase(),
            config.start_date(),
            config.end_date(),
        ),
        prominence_factor: config.prominence_factor,
        minima_column: config.minima_column.clone(),
        maxima_column: config.maxima_column.clone(),
    };
    let chart_path = config.chart_json.as_deref();

    if config.interactive {
        info!("interactive mode; enter `quit` to stop");
        return session::run_interactive(io::stdin().lock(), &source, request, chart_path);
    }
    session::activate(&source, &request, chart_path)
}

fn build_source(config: &AppConfig) -> Result<Box<dyn MarketDataSource>> {
    match &config.input_path {
        Some(path) => {
            if !path.exists() {
                bail!("input file {:?} does not exist", path);
            }
            info!(path = ?path, "reading prices from CSV");
            Ok(Box::new(CsvSource::new(path)))
        }
        None => {
            let client = YahooClient::new(config.timeout())
                .context("failed to build the market-data HTTP client")?
                .with_base_url(config.yahoo_url.as_str());
            Ok(Box::new(client))
        }
    }
}
