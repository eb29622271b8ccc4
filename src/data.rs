use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("column '{column}' has {found} values but the frame has {expected} dates")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("trading dates must be strictly increasing ({previous} is followed by {next})")]
    Unordered { previous: NaiveDate, next: NaiveDate },
}

/// Daily price columns aligned on strictly increasing trading dates.
///
/// Missing observations are stored as `NaN` so every column keeps the same
/// length as `dates`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceFrame {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl PriceFrame {
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, FrameError> {
        for (name, values) in &columns {
            if values.len() != dates.len() {
                return Err(FrameError::LengthMismatch {
                    column: name.clone(),
                    expected: dates.len(),
                    found: values.len(),
                });
            }
        }
        if let Some((previous, next)) = dates.iter().tuple_windows().find(|(a, b)| b <= a) {
            return Err(FrameError::Unordered {
                previous: *previous,
                next: *next,
            });
        }
        Ok(Self { dates, columns })
    }

    /// Build a frame from row-major records sharing one column layout.
    pub fn from_rows(
        column_names: &[String],
        rows: Vec<(NaiveDate, Vec<f64>)>,
    ) -> Result<Self, FrameError> {
        let mut dates = Vec::with_capacity(rows.len());
        let mut columns: BTreeMap<String, Vec<f64>> = column_names
            .iter()
            .map(|name| (name.clone(), Vec::with_capacity(rows.len())))
            .collect();
        for (date, values) in rows {
            dates.push(date);
            for (idx, name) in column_names.iter().enumerate() {
                if let Some(column) = columns.get_mut(name) {
                    column.push(values.get(idx).copied().unwrap_or(f64::NAN));
                }
            }
        }
        Self::new(dates, columns)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn value(&self, column: &str, position: usize) -> Option<f64> {
        self.column(column)
            .and_then(|values| values.get(position))
            .copied()
    }

    pub fn row(&self, position: usize) -> Option<Row> {
        let date = *self.dates.get(position)?;
        let values = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), values[position]))
            .collect();
        Some(Row {
            position,
            date,
            values,
        })
    }
}

/// A single trading day taken out of a [`PriceFrame`], with every column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub position: usize,
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtremumKind {
    Minimum,
    Maximum,
}

/// Frame rows flagged as local extrema of one column, ordered by date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtremaSet {
    pub column: String,
    pub kind: ExtremumKind,
    pub rows: Vec<Row>,
}

impl ExtremaSet {
    pub fn empty(column: impl Into<String>, kind: ExtremumKind) -> Self {
        Self {
            column: column.into(),
            kind,
            rows: Vec::new(),
        }
    }

    /// Same column and kind, holding only `row`.
    pub fn singleton(&self, row: Row) -> Self {
        Self {
            column: self.column.clone(),
            kind: self.kind,
            rows: vec![row],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|row| row.date).collect()
    }

    /// Values of the column the set was extracted from.
    pub fn values(&self) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.get(&self.column).unwrap_or(f64::NAN))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn rejects_unordered_dates() {
        let rows = vec![(day(2), vec![1.0]), (day(2), vec![2.0])];
        let err = PriceFrame::from_rows(&[CLOSE.to_string()], rows).unwrap_err();
        assert_eq!(
            err,
            FrameError::Unordered {
                previous: day(2),
                next: day(2)
            }
        );
    }

    #[test]
    fn rejects_ragged_columns() {
        let mut columns = BTreeMap::new();
        columns.insert(HIGH.to_string(), vec![1.0, 2.0]);
        let err = PriceFrame::new(vec![day(1)], columns).unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { found: 2, .. }));
    }

    #[test]
    fn row_carries_every_column() {
        let names = vec![HIGH.to_string(), LOW.to_string()];
        let frame = PriceFrame::from_rows(
            &names,
            vec![(day(1), vec![10.0, 8.0]), (day(4), vec![11.0, 9.0])],
        )
        .unwrap();

        let row = frame.row(1).unwrap();
        assert_eq!(row.date, day(4));
        assert_eq!(row.position, 1);
        assert_eq!(row.get(HIGH), Some(11.0));
        assert_eq!(row.get(LOW), Some(9.0));
        assert_eq!(row.get(CLOSE), None);
        assert!(frame.row(2).is_none());
    }
}
