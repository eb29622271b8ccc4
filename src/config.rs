use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{Days, Local, NaiveDate};
use clap::Parser;

use crate::data::{HIGH, LOW};
use crate::market::yahoo;

pub const DEFAULT_TICKER: &str = "BLK";
pub const DEFAULT_PROMINENCE_FACTOR: f64 = 0.4;
pub const DEFAULT_LOOKBACK_DAYS: u64 = 30;
pub const PROMINENCE_MIN: f64 = 0.1;
pub const PROMINENCE_MAX: f64 = 0.9;
pub const PROMINENCE_STEP: f64 = 0.1;

/// Command-line configuration for the extrema finder.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Ticker symbol to analyse.
    #[arg(short, long, env = "EXTREMA_TICKER", default_value = DEFAULT_TICKER)]
    pub ticker: String,

    /// First trading date of the window (YYYY-MM-DD). Defaults to 30 days before the end date.
    #[arg(short, long, env = "EXTREMA_START", value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last trading date of the window, inclusive (YYYY-MM-DD). Defaults to today.
    #[arg(short, long, env = "EXTREMA_END", value_name = "DATE")]
    pub end: Option<NaiveDate>,

    /// Share of the price range a swing must span to count as an extremum.
    #[arg(
        short,
        long,
        env = "EXTREMA_PROMINENCE_FACTOR",
        default_value_t = DEFAULT_PROMINENCE_FACTOR,
        value_parser = parse_prominence_factor
    )]
    pub prominence_factor: f64,

    /// Read daily OHLCV rows from a CSV file instead of querying the network.
    #[arg(short = 'i', long = "input", env = "EXTREMA_INPUT", value_name = "FILE")]
    pub input_path: Option<PathBuf>,

    /// Chart endpoint queried when no input file is given.
    #[arg(long, env = "EXTREMA_YAHOO_URL", default_value = yahoo::DEFAULT_BASE_URL)]
    pub yahoo_url: String,

    /// Timeout for a market-data request, in seconds.
    #[arg(long, env = "EXTREMA_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Keep fetched series for this many seconds (0 disables the cache).
    #[arg(long, env = "EXTREMA_CACHE_TTL_SECS", default_value_t = 0)]
    pub cache_ttl_secs: u64,

    /// Write the chart figure as JSON to this path.
    #[arg(long, env = "EXTREMA_CHART_JSON", value_name = "FILE")]
    pub chart_json: Option<PathBuf>,

    /// Column searched for troughs.
    #[arg(long, env = "EXTREMA_MINIMA_COLUMN", default_value = LOW)]
    pub minima_column: String,

    /// Column searched for peaks.
    #[arg(long, env = "EXTREMA_MAXIMA_COLUMN", default_value = HIGH)]
    pub maxima_column: String,

    /// Read one request per line from stdin until `quit`.
    #[arg(long, default_value_t = false)]
    pub interactive: bool,
}

impl AppConfig {
    pub fn end_date(&self) -> NaiveDate {
        self.end.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.unwrap_or_else(|| default_start(self.end_date()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    pub fn validate(&self) -> Result<()> {
        check_window(self.start_date(), self.end_date())?;
        if self.timeout_secs == 0 {
            bail!("timeout must be at least one second");
        }
        if self.ticker.trim().is_empty() {
            bail!("ticker must not be empty");
        }
        Ok(())
    }
}

pub fn default_start(end: NaiveDate) -> NaiveDate {
    end.checked_sub_days(Days::new(DEFAULT_LOOKBACK_DAYS))
        .unwrap_or(end)
}

pub fn check_window(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        bail!("start date {start} is after end date {end}");
    }
    Ok(())
}

/// Accept factors on the 0.1 grid between 0.1 and 0.9.
pub fn parse_prominence_factor(value: &str) -> Result<f64, String> {
    let factor: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !(PROMINENCE_MIN - 1e-9..=PROMINENCE_MAX + 1e-9).contains(&factor) {
        return Err(format!(
            "prominence factor must lie between {PROMINENCE_MIN} and {PROMINENCE_MAX}"
        ));
    }
    let steps = factor / PROMINENCE_STEP;
    if (steps - steps.round()).abs() > 1e-6 {
        return Err(format!("prominence factor must be a multiple of {PROMINENCE_STEP}"));
    }
    Ok(steps.round() / 10.0)
}
