pub mod cache;
pub mod yahoo;

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use crate::data::PriceFrame;

pub use cache::CachedSource;
pub use yahoo::YahooClient;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no data found for ticker {ticker} between {start} and {end}")]
    NoData {
        ticker: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("failed to fetch data for {ticker}: {reason}")]
    DataFetch { ticker: String, reason: String },
}

impl FetchError {
    pub fn no_data(request: &FetchRequest) -> Self {
        Self::NoData {
            ticker: request.ticker.clone(),
            start: request.start,
            end: request.end,
        }
    }

    pub fn data_fetch(request: &FetchRequest, reason: impl fmt::Display) -> Self {
        Self::DataFetch {
            ticker: request.ticker.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Ticker and inclusive date window of one market-data lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchRequest {
    pub fn new(ticker: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            start,
            end,
        }
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} .. {}]", self.ticker, self.start, self.end)
    }
}

/// Anything that can turn a [`FetchRequest`] into daily price columns.
///
/// Implementations resolve provider-specific layouts themselves; callers only
/// ever see a flat [`PriceFrame`]. An empty result must be reported as
/// [`FetchError::NoData`].
pub trait MarketDataSource {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError>;
}

impl<S: MarketDataSource + ?Sized> MarketDataSource for &S {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError> {
        (**self).fetch(request)
    }
}

impl<S: MarketDataSource + ?Sized> MarketDataSource for Box<S> {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError> {
        (**self).fetch(request)
    }
}

/// The source picked at startup, behind the fetch cache when a TTL is set.
pub enum ConfiguredSource {
    Direct(Box<dyn MarketDataSource>),
    Cached(CachedSource<Box<dyn MarketDataSource>>),
}

impl ConfiguredSource {
    pub fn new(inner: Box<dyn MarketDataSource>, ttl: Option<Duration>) -> Self {
        match ttl {
            Some(ttl) => {
                info!(ttl_secs = ttl.as_secs(), "fetch cache enabled");
                Self::Cached(CachedSource::new(inner, ttl))
            }
            None => Self::Direct(inner),
        }
    }

    /// Drop every cached series. Returns `false` when caching is disabled.
    pub fn clear_cache(&self) -> bool {
        match self {
            Self::Cached(cache) => {
                let fresh = cache.fresh_entries();
                cache.clear();
                info!(fresh, "fetch cache cleared");
                true
            }
            Self::Direct(_) => false,
        }
    }
}

impl MarketDataSource for ConfiguredSource {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError> {
        match self {
            Self::Direct(source) => source.fetch(request),
            Self::Cached(cache) => cache.fetch(request),
        }
    }
}
