//! Chart series assembly.

use crate::domain::{CountrySeries, DatePolicy, Location, MetricKind, MetricSpec, Record, SeriesPoint};
use crate::error::AppError;
use crate::transform::group::{Chunk, chunk_records};
use crate::transform::metric::derive_value;

/// One point per chunk, in chunk order.
///
/// A chunk becomes [`SeriesPoint::Skip`] when its metric is undefined or its
/// representative record has no valid date.
pub fn series_from_chunks(
    label: &str,
    chunks: &[Chunk],
    kind: &MetricKind,
    constant: f64,
    policy: DatePolicy,
    visible: bool,
) -> CountrySeries {
    let points = chunks
        .iter()
        .map(|chunk| match (chunk.representative_date(policy), derive_value(kind, chunk, constant)) {
            (Some(x), Some(y)) => SeriesPoint::Value { x, y },
            _ => SeriesPoint::Skip,
        })
        .collect();

    CountrySeries {
        label: label.to_string(),
        visible,
        points,
    }
}

/// Chunk one country's date-ordered records and derive its series.
pub fn build_series(
    location: &Location,
    records: &[Record],
    metric: &MetricSpec,
    visible: bool,
) -> Result<CountrySeries, AppError> {
    let chunks = chunk_records(records, metric.bucketing.period())?;
    Ok(series_from_chunks(
        &location.name,
        &chunks,
        &metric.kind,
        location.population_millions,
        metric.bucketing.policy(),
        visible,
    ))
}
