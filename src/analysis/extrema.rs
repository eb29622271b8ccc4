use tracing::{debug, trace};

use crate::analysis::peaks::find_peaks;
use crate::analysis::AnalysisError;
use crate::data::{ExtremaSet, ExtremumKind, PriceFrame};

/// Minimum prominence a peak needs: the value range scaled by `prominence_factor`.
pub fn prominence_threshold(values: &[f64], prominence_factor: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &value| {
            (lo.min(value), hi.max(value))
        });
    (max - min) * prominence_factor
}

/// Locate the rows of `column` that are local minima or maxima with enough prominence.
///
/// Missing samples are skipped before the search; the returned rows are taken
/// from `frame` at the positions of the samples that qualified, so gaps never
/// shift which dates are reported. Minima are found as peaks of the negated
/// series, with the threshold computed from that pass's own range.
pub fn find_extrema(
    frame: &PriceFrame,
    column: &str,
    kind: ExtremumKind,
    prominence_factor: f64,
) -> Result<ExtremaSet, AnalysisError> {
    let values = frame
        .column(column)
        .ok_or_else(|| AnalysisError::ColumnNotFound(column.to_string()))?;

    let (positions, samples): (Vec<usize>, Vec<f64>) = values
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .map(|(position, &value)| match kind {
            ExtremumKind::Maximum => (position, value),
            ExtremumKind::Minimum => (position, -value),
        })
        .unzip();

    if samples.is_empty() {
        debug!(column, "no usable samples");
        return Ok(ExtremaSet::empty(column, kind));
    }

    let threshold = prominence_threshold(&samples, prominence_factor);
    let peaks = find_peaks(&samples, threshold);
    for peak in &peaks {
        trace!(
            position = positions[peak.index],
            value = peak.value,
            prominence = peak.prominence,
            left_base = positions[peak.left_base],
            right_base = positions[peak.right_base],
            "qualifying peak"
        );
    }
    let rows: Vec<_> = peaks
        .iter()
        .filter_map(|peak| frame.row(positions[peak.index]))
        .collect();

    debug!(
        column,
        ?kind,
        samples = samples.len(),
        skipped = values.len() - samples.len(),
        threshold,
        found = rows.len(),
        "extrema search finished"
    );

    Ok(ExtremaSet {
        column: column.to_string(),
        kind,
        rows,
    })
}
