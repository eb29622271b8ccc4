use crate::analysis::AnalysisError;
use crate::data::ExtremaSet;

/// Pairing only matters when either side offers more than one candidate.
pub fn needs_pairing(minima: &ExtremaSet, maxima: &ExtremaSet) -> bool {
    minima.len() > 1 || maxima.len() > 1
}

/// Reduce both sets to the first minimum and the first maximum dated strictly after it.
pub fn ensure_maximum_after_minimum(
    minima: &ExtremaSet,
    maxima: &ExtremaSet,
) -> Result<(ExtremaSet, ExtremaSet), AnalysisError> {
    let anchor = minima
        .first()
        .ok_or(AnalysisError::NoMaximumAfterMinimum { minimum: None })?;

    let maximum = maxima
        .rows
        .iter()
        .find(|row| row.date > anchor.date)
        .ok_or(AnalysisError::NoMaximumAfterMinimum {
            minimum: Some(anchor.date),
        })?;

    Ok((
        minima.singleton(anchor.clone()),
        maxima.singleton(maximum.clone()),
    ))
}
