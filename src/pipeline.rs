use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::{ensure_maximum_after_minimum, find_extrema, needs_pairing, AnalysisError};
use crate::data::{ExtremaSet, ExtremumKind, PriceFrame};
use crate::market::{FetchError, FetchRequest, MarketDataSource};

pub const INSUFFICIENT_EXTREMA: &str =
    "Could not find sufficient extrema points, displaying what we have";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Extracting,
    PairingNeeded,
    Paired,
    PairingSkipped,
    Presenting,
    Error,
}

/// How the minima and maxima handed to presentation were reconciled.
#[derive(Debug, Clone, PartialEq)]
pub enum Pairing {
    /// Neither side had more than one candidate.
    NotNeeded,
    Paired,
    /// One of the sets came back empty.
    SkippedInsufficient,
    /// No maximum follows the first minimum; the raw sets are kept.
    Unmatched(AnalysisError),
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub fetch: FetchRequest,
    pub prominence_factor: f64,
    pub minima_column: String,
    pub maxima_column: String,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub request: AnalysisRequest,
    pub frame: PriceFrame,
    pub minima: ExtremaSet,
    pub maxima: ExtremaSet,
    pub pairing: Pairing,
    pub warnings: Vec<String>,
    pub stages: Vec<Stage>,
}

#[derive(Default)]
struct StageTrail {
    stages: Vec<Stage>,
}

impl StageTrail {
    fn enter(&mut self, stage: Stage) {
        debug!(from = ?self.stages.last(), to = ?stage, "pipeline stage");
        self.stages.push(stage);
    }

    fn fail<E: Into<PipelineError>>(&mut self, err: E) -> PipelineError {
        let err = err.into();
        self.enter(Stage::Error);
        err
    }
}

/// Fetch one series, extract its extrema and reconcile them into a trough-then-peak pair.
///
/// Fetch and extraction failures abort the run. Missing extrema and an
/// unmatched pair only add warnings; whatever was found is still returned.
pub fn run_pipeline<S: MarketDataSource + ?Sized>(
    source: &S,
    request: &AnalysisRequest,
) -> Result<Outcome, PipelineError> {
    let mut trail = StageTrail::default();

    trail.enter(Stage::Fetching);
    let frame = source
        .fetch(&request.fetch)
        .map_err(|err| trail.fail(err))?;
    if frame.is_empty() {
        return Err(trail.fail(FetchError::no_data(&request.fetch)));
    }
    info!(request = %request.fetch, rows = frame.len(), "series ready");

    trail.enter(Stage::Extracting);
    let mut minima = find_extrema(
        &frame,
        &request.minima_column,
        ExtremumKind::Minimum,
        request.prominence_factor,
    )
    .map_err(|err| trail.fail(err))?;
    let mut maxima = find_extrema(
        &frame,
        &request.maxima_column,
        ExtremumKind::Maximum,
        request.prominence_factor,
    )
    .map_err(|err| trail.fail(err))?;
    info!(
        minima = minima.len(),
        maxima = maxima.len(),
        "extrema extracted"
    );

    let mut warnings = Vec::new();
    let pairing = if minima.is_empty() || maxima.is_empty() {
        if needs_pairing(&minima, &maxima) {
            trail.enter(Stage::PairingNeeded);
        }
        trail.enter(Stage::PairingSkipped);
        warn!("{INSUFFICIENT_EXTREMA}");
        warnings.push(INSUFFICIENT_EXTREMA.to_string());
        Pairing::SkippedInsufficient
    } else if needs_pairing(&minima, &maxima) {
        trail.enter(Stage::PairingNeeded);
        match ensure_maximum_after_minimum(&minima, &maxima) {
            Ok((minimum, maximum)) => {
                trail.enter(Stage::Paired);
                minima = minimum;
                maxima = maximum;
                Pairing::Paired
            }
            Err(err) => {
                trail.enter(Stage::PairingSkipped);
                let message = format!("{err}; displaying unpaired extrema");
                warn!("{message}");
                warnings.push(message);
                Pairing::Unmatched(err)
            }
        }
    } else {
        Pairing::NotNeeded
    };

    trail.enter(Stage::Presenting);
    Ok(Outcome {
        request: request.clone(),
        frame,
        minima,
        maxima,
        pairing,
        warnings,
        stages: trail.stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HIGH, LOW};
    use crate::output::summarize;
    use chrono::{Duration, NaiveDate};

    struct StubSource {
        frame: Option<PriceFrame>,
    }

    impl MarketDataSource for StubSource {
        fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError> {
            self.frame
                .clone()
                .ok_or_else(|| FetchError::no_data(request))
        }
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn day(offset: i64) -> NaiveDate {
        start() + Duration::days(offset)
    }

    fn frame_from(high: &[f64], low: &[f64]) -> PriceFrame {
        let rows = high
            .iter()
            .zip(low)
            .enumerate()
            .map(|(i, (&h, &l))| (day(i as i64), vec![h, l]))
            .collect();
        PriceFrame::from_rows(&[HIGH.to_string(), LOW.to_string()], rows).unwrap()
    }

    fn request(factor: f64) -> AnalysisRequest {
        AnalysisRequest {
            fetch: FetchRequest::new("BLK", start(), day(19)),
            prominence_factor: factor,
            minima_column: LOW.to_string(),
            maxima_column: HIGH.to_string(),
        }
    }

    fn run(high: &[f64], low: &[f64]) -> Outcome {
        let source = StubSource {
            frame: Some(frame_from(high, low)),
        };
        run_pipeline(&source, &request(0.4)).unwrap()
    }

    fn flat_with(points: &[(usize, f64)]) -> Vec<f64> {
        let mut values = vec![100.0; 20];
        for &(idx, value) in points {
            values[idx] = value;
        }
        values
    }

    #[test]
    fn single_trough_and_peak_skip_pairing() {
        let series = flat_with(&[(5, 90.0), (15, 110.0)]);
        let outcome = run(&series, &series);

        assert_eq!(outcome.pairing, Pairing::NotNeeded);
        assert_eq!(outcome.minima.dates(), vec![day(5)]);
        assert_eq!(outcome.maxima.dates(), vec![day(15)]);
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            outcome.stages,
            vec![Stage::Fetching, Stage::Extracting, Stage::Presenting]
        );

        let summary = summarize(&outcome.frame, &outcome.minima, &outcome.maxima);
        assert_eq!(summary.minimum_low, Some(90.0));
        assert_eq!(summary.maximum_high, Some(110.0));
    }

    #[test]
    fn several_minima_are_paired_with_the_next_maximum() {
        let low = flat_with(&[(3, 80.0), (10, 80.0)]);
        let high = flat_with(&[(7, 120.0)]);
        let outcome = run(&high, &low);

        assert_eq!(outcome.pairing, Pairing::Paired);
        assert_eq!(outcome.minima.dates(), vec![day(3)]);
        assert_eq!(outcome.maxima.dates(), vec![day(7)]);
        assert!(outcome.stages.contains(&Stage::PairingNeeded));
        assert!(outcome.stages.contains(&Stage::Paired));
    }

    #[test]
    fn unmatched_pair_falls_back_with_a_warning() {
        let low = flat_with(&[(12, 80.0), (15, 80.0)]);
        let high = flat_with(&[(5, 120.0)]);
        let outcome = run(&high, &low);

        assert_eq!(
            outcome.pairing,
            Pairing::Unmatched(AnalysisError::NoMaximumAfterMinimum {
                minimum: Some(day(12))
            })
        );
        assert_eq!(outcome.minima.len(), 2);
        assert_eq!(outcome.maxima.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.stages.contains(&Stage::PairingSkipped));
        assert_eq!(outcome.stages.last(), Some(&Stage::Presenting));
    }

    #[test]
    fn empty_side_is_a_warning_not_an_error() {
        let low = vec![100.0; 20];
        let high = flat_with(&[(4, 120.0), (14, 125.0)]);
        let outcome = run(&high, &low);

        assert_eq!(outcome.pairing, Pairing::SkippedInsufficient);
        assert!(outcome.minima.is_empty());
        assert_eq!(outcome.maxima.len(), 2);
        assert_eq!(outcome.warnings, vec![INSUFFICIENT_EXTREMA.to_string()]);
    }

    #[test]
    fn empty_fetch_stops_before_extraction() {
        let source = StubSource { frame: None };
        let err = run_pipeline(&source, &request(0.4)).unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(FetchError::NoData { .. })));
    }

    #[test]
    fn missing_column_aborts_the_run() {
        let series = flat_with(&[(5, 90.0)]);
        let source = StubSource {
            frame: Some(frame_from(&series, &series)),
        };
        let mut request = request(0.4);
        request.minima_column = "Adj Low".to_string();

        let err = run_pipeline(&source, &request).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Analysis(AnalysisError::ColumnNotFound(ref column)) if column == "Adj Low"
        ));
    }
}
