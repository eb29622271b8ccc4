use chrono::NaiveDate;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::data::{ExtremaSet, PriceFrame, HIGH, LOW};
use crate::pipeline::{Outcome, Pairing};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Start, trough, peak and end of the analysed window, rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub start_date: Option<NaiveDate>,
    pub start_high: Option<f64>,
    pub minimum_date: Option<NaiveDate>,
    pub minimum_low: Option<f64>,
    pub maximum_date: Option<NaiveDate>,
    pub maximum_high: Option<f64>,
    pub end_date: Option<NaiveDate>,
    pub end_low: Option<f64>,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "A-Start-date")]
    start_date: String,
    #[tabled(rename = "A-High")]
    start_high: String,
    #[tabled(rename = "AB-Start-date")]
    minimum_date: String,
    #[tabled(rename = "B-Low")]
    minimum_low: String,
    #[tabled(rename = "BC-Start-date")]
    maximum_date: String,
    #[tabled(rename = "C-High")]
    maximum_high: String,
    #[tabled(rename = "C-End-date")]
    end_date: String,
    #[tabled(rename = "C-Low")]
    end_low: String,
}

/// Two decimals, with exact halves going to the even neighbour.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

pub fn summarize(frame: &PriceFrame, minima: &ExtremaSet, maxima: &ExtremaSet) -> Summary {
    let last = frame.len().checked_sub(1);
    let minimum = minima.first();
    let maximum = maxima.first();

    Summary {
        start_date: frame.first_date(),
        start_high: frame.value(HIGH, 0).map(round2),
        minimum_date: minimum.map(|row| row.date),
        minimum_low: minimum.and_then(|row| row.get(&minima.column)).map(round2),
        maximum_date: maximum.map(|row| row.date),
        maximum_high: maximum.and_then(|row| row.get(&maxima.column)).map(round2),
        end_date: frame.last_date(),
        end_low: last.and_then(|idx| frame.value(LOW, idx)).map(round2),
    }
}

fn date_cell(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default()
}

fn price_cell(price: Option<f64>) -> String {
    price.map(|p| format!("{p:.2}")).unwrap_or_default()
}

impl Summary {
    fn to_row(&self) -> SummaryRow {
        SummaryRow {
            start_date: date_cell(self.start_date),
            start_high: price_cell(self.start_high),
            minimum_date: date_cell(self.minimum_date),
            minimum_low: price_cell(self.minimum_low),
            maximum_date: date_cell(self.maximum_date),
            maximum_high: price_cell(self.maximum_high),
            end_date: date_cell(self.end_date),
            end_low: price_cell(self.end_low),
        }
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new([self.to_row()]);
        table.with(Style::rounded());
        table
    }
}

fn describe_set(set: &ExtremaSet) -> String {
    if set.is_empty() {
        return "none".to_string();
    }
    set.rows
        .iter()
        .map(|row| {
            format!(
                "{} @ {}",
                row.date.format(DATE_FORMAT),
                price_cell(row.get(&set.column))
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_report(outcome: &Outcome, summary: &Summary) {
    let request = &outcome.request;
    println!("\n=== Extrema Finder: {} ===\n", request.fetch.ticker);
    println!(
        "Window: {} to {} ({} trading days)",
        request.fetch.start,
        request.fetch.end,
        outcome.frame.len()
    );
    println!("Prominence factor: {:.1}", request.prominence_factor);
    println!(
        "{} minima: {}",
        outcome.minima.column,
        describe_set(&outcome.minima)
    );
    println!(
        "{} maxima: {}",
        outcome.maxima.column,
        describe_set(&outcome.maxima)
    );
    match &outcome.pairing {
        Pairing::NotNeeded => println!("Pairing: not needed"),
        Pairing::Paired => println!("Pairing: first minimum matched with the next maximum"),
        Pairing::SkippedInsufficient => println!("Pairing: skipped, too few extrema"),
        Pairing::Unmatched(err) => println!("Pairing: skipped, {err}"),
    }
    for warning in &outcome.warnings {
        println!("Warning: {warning}");
    }

    println!("\n{}\n", summary.to_table());
}
