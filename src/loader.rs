use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info};

use crate::data::{FrameError, PriceFrame, CLOSE, HIGH, LOW, OPEN, VOLUME};
use crate::market::{FetchError, FetchRequest, MarketDataSource};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("input file contains no valid rows")]
    Empty,

    #[error("unable to infer date from record: {0:?}")]
    Timestamp(StringRecord),

    #[error("failed to parse numeric field '{field}' from value '{value}'")]
    ParseNumber { field: String, value: String },

    #[error("trading date {0} appears more than once")]
    DuplicateDate(NaiveDate),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Column layout of a CSV file: named by a header row or the fixed OHLCV order.
enum Layout {
    Header(Vec<String>),
    Positional,
}

pub fn load_frame_from_csv<P: AsRef<Path>>(path: P) -> Result<PriceFrame> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).with_context(|| format!("failed to open {:?}", path_ref))?;
    let frame = load_frame_from_reader(file)
        .with_context(|| format!("failed to read price data from {:?}", path_ref))?;
    info!(path = ?path_ref, rows = frame.len(), "loaded CSV price data");
    Ok(frame)
}

/// Parse daily OHLCV rows.
///
/// A first row whose leading cell is not a date is taken as the header and
/// names the columns. Otherwise rows are read as `date[,time],open,high,low,close,volume`.
/// Blank, `null` and `NaN` cells become missing values.
pub fn load_frame_from_reader<R: Read>(input: R) -> Result<PriceFrame, LoaderError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let mut layout: Option<Layout> = None;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let layout = layout.get_or_insert_with(|| detect_layout(&record));
        match layout {
            Layout::Header(names) => {
                if is_header(&record) {
                    continue;
                }
                rows.push(parse_named_record(&record, names)?);
            }
            Layout::Positional => {
                if let Some(row) = parse_positional_record(&record)? {
                    rows.push(row);
                }
            }
        }
    }

    if rows.is_empty() {
        return Err(LoaderError::Empty);
    }

    rows.sort_by_key(|(date, _)| *date);
    if let Some(((date, _), _)) = rows.iter().tuple_windows().find(|(a, b)| a.0 == b.0) {
        return Err(LoaderError::DuplicateDate(*date));
    }

    let names = match layout {
        Some(Layout::Header(names)) => names,
        _ => [OPEN, HIGH, LOW, CLOSE, VOLUME]
            .iter()
            .map(|name| name.to_string())
            .collect(),
    };
    Ok(PriceFrame::from_rows(&names, rows)?)
}

fn detect_layout(record: &StringRecord) -> Layout {
    if is_header(record) {
        let names = record
            .iter()
            .skip(1)
            .map(|name| name.trim().to_string())
            .collect();
        Layout::Header(names)
    } else {
        Layout::Positional
    }
}

fn is_header(record: &StringRecord) -> bool {
    record
        .get(0)
        .map(|first| parse_date(first.trim()).is_none())
        .unwrap_or(false)
}

fn parse_named_record(
    record: &StringRecord,
    names: &[String],
) -> Result<(NaiveDate, Vec<f64>), LoaderError> {
    let date = record
        .get(0)
        .and_then(|value| parse_date(value.trim()))
        .ok_or_else(|| LoaderError::Timestamp(record.clone()))?;
    let values = names
        .iter()
        .enumerate()
        .map(|(idx, name)| parse_number(record.get(idx + 1), name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((date, values))
}

fn parse_positional_record(
    record: &StringRecord,
) -> Result<Option<(NaiveDate, Vec<f64>)>, LoaderError> {
    let fields: Vec<&str> = record.iter().map(str::trim).collect();
    if fields.len() < 6 {
        return Ok(None);
    }

    // A separate time column shifts the prices one cell to the right.
    let offset = if fields.len() >= 7 { 2 } else { 1 };
    let date = parse_date(fields[0]).ok_or_else(|| LoaderError::Timestamp(record.clone()))?;

    let values = [OPEN, HIGH, LOW, CLOSE, VOLUME]
        .iter()
        .enumerate()
        .map(|(idx, name)| parse_number(fields.get(offset + idx).copied(), name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some((date, values)))
}

fn parse_number(value: Option<&str>, field: &str) -> Result<f64, LoaderError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(f64::NAN);
    };
    if value.is_empty()
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("nan")
    {
        return Ok(f64::NAN);
    }
    value
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| LoaderError::ParseNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let date_patterns = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
    if let Some(date) = date_patterns
        .iter()
        .find_map(|pattern| NaiveDate::parse_from_str(value, pattern).ok())
    {
        return Some(date);
    }

    let datetime_patterns = [
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    datetime_patterns
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(value, pattern).ok())
        .map(|datetime| datetime.date())
}

/// Offline market data read from a local CSV export.
///
/// The file is re-read on every fetch and narrowed to the requested window;
/// the ticker only labels the request.
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MarketDataSource for CsvSource {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError> {
        let frame = load_frame_from_csv(&self.path)
            .map_err(|err| FetchError::data_fetch(request, format!("{err:#}")))?;
        let window = slice_window(&frame, request.start, request.end)
            .map_err(|err| FetchError::data_fetch(request, err))?;
        debug!(%request, rows = window.len(), "selected CSV rows in window");
        if window.is_empty() {
            return Err(FetchError::no_data(request));
        }
        Ok(window)
    }
}

/// Rows of `frame` dated within `[start, end]`.
pub fn slice_window(
    frame: &PriceFrame,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceFrame, FrameError> {
    let names: Vec<String> = frame.column_names().map(str::to_string).collect();
    let rows = frame
        .dates()
        .iter()
        .enumerate()
        .filter(|(_, date)| **date >= start && **date <= end)
        .filter_map(|(position, _)| frame.row(position))
        .map(|row| {
            let values = names
                .iter()
                .map(|name| row.get(name).unwrap_or(f64::NAN))
                .collect();
            (row.date, values)
        })
        .collect();
    PriceFrame::from_rows(&names, rows)
}
