pub mod extrema;
pub mod pairing;
pub mod peaks;

use chrono::NaiveDate;
use thiserror::Error;

pub use extrema::find_extrema;
pub use pairing::{ensure_maximum_after_minimum, needs_pairing};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("column '{0}' not found in data")]
    ColumnNotFound(String),

    #[error("{}", describe_missing_maximum(.minimum))]
    NoMaximumAfterMinimum { minimum: Option<NaiveDate> },
}

fn describe_missing_maximum(minimum: &Option<NaiveDate>) -> String {
    match minimum {
        Some(date) => format!("no maximum found after the minimum on {date}"),
        None => "no minimum available to anchor a maximum".to_string(),
    }
}
