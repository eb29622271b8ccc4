use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::data::{ExtremaSet, PriceFrame, CLOSE, HIGH, LOW, OPEN};

/// Plot description: candles, extrema markers and the A-B-C connector.
#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub layout: Layout,
    pub traces: Vec<Trace>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub title: String,
    pub xaxis_title: String,
    pub yaxis_title: String,
    pub rangeslider_visible: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Candlestick {
        name: String,
        x: Vec<NaiveDate>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
    },
    Scatter {
        name: String,
        x: Vec<NaiveDate>,
        y: Vec<f64>,
        mode: String,
        marker: Marker,
        #[serde(skip_serializing_if = "Option::is_none")]
        line: Option<Line>,
    },
}

impl Trace {
    pub fn name(&self) -> &str {
        match self {
            Trace::Candlestick { name, .. } | Trace::Scatter { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub color: String,
    pub size: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Line {
    pub color: String,
    pub width: u32,
    pub dash: String,
}

fn column_or_gaps(frame: &PriceFrame, name: &str) -> Vec<f64> {
    frame
        .column(name)
        .map(<[f64]>::to_vec)
        .unwrap_or_else(|| vec![f64::NAN; frame.len()])
}

fn markers(set: &ExtremaSet, name: &str, color: &str) -> Trace {
    Trace::Scatter {
        name: name.to_string(),
        x: set.dates(),
        y: set.values(),
        mode: "markers".to_string(),
        marker: Marker {
            color: color.to_string(),
            size: 10,
        },
        line: None,
    }
}

/// Dashed path from the window's first High through the anchor trough and
/// peak to the window's last Low.
fn connector(frame: &PriceFrame, minima: &ExtremaSet, maxima: &ExtremaSet) -> Option<Trace> {
    let minimum = minima.first()?;
    let maximum = maxima.first()?;
    let (first, last) = (frame.first_date()?, frame.last_date()?);
    let last_position = frame.len() - 1;

    Some(Trace::Scatter {
        name: "A-B-C Line".to_string(),
        x: vec![first, minimum.date, maximum.date, last],
        y: vec![
            frame.value(HIGH, 0).unwrap_or(f64::NAN),
            minimum.get(&minima.column).unwrap_or(f64::NAN),
            maximum.get(&maxima.column).unwrap_or(f64::NAN),
            frame.value(LOW, last_position).unwrap_or(f64::NAN),
        ],
        mode: "lines+markers".to_string(),
        marker: Marker {
            color: "blue".to_string(),
            size: 8,
        },
        line: Some(Line {
            color: "blue".to_string(),
            width: 2,
            dash: "dash".to_string(),
        }),
    })
}

pub fn build_figure(frame: &PriceFrame, minima: &ExtremaSet, maxima: &ExtremaSet) -> Figure {
    let mut traces = vec![Trace::Candlestick {
        name: "Candlestick".to_string(),
        x: frame.dates().to_vec(),
        open: column_or_gaps(frame, OPEN),
        high: column_or_gaps(frame, HIGH),
        low: column_or_gaps(frame, LOW),
        close: column_or_gaps(frame, CLOSE),
    }];
    if !minima.is_empty() {
        traces.push(markers(minima, &format!("{} Minima", minima.column), "red"));
    }
    if !maxima.is_empty() {
        traces.push(markers(maxima, &format!("{} Maxima", maxima.column), "green"));
    }
    traces.extend(connector(frame, minima, maxima));

    Figure {
        layout: Layout {
            title: "Candlestick Chart with Extrema".to_string(),
            xaxis_title: "Date".to_string(),
            yaxis_title: "Price".to_string(),
            rangeslider_visible: false,
        },
        traces,
    }
}

pub fn write_figure(figure: &Figure, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), figure)
        .with_context(|| format!("failed to write chart to {:?}", path))?;
    let traces: Vec<&str> = figure.traces.iter().map(Trace::name).collect();
    info!(path = ?path, ?traces, "wrote chart figure");
    Ok(())
}
