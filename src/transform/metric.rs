//! Metric derivation: one value per chunk, or a gap.
//!
//! Every metric is computed per record first, then averaged over the records
//! that produced a finite value. A chunk where no record did yields `None`,
//! the skip sentinel; `NaN` and infinities never leave this module.

use crate::domain::{MetricKind, Record};
use crate::transform::group::Chunk;

/// Per-record value of `kind`, or `None` when undefined for this record.
///
/// `constant` is only read by `ScaledByConstant`.
pub fn record_value(kind: &MetricKind, record: &Record, constant: f64) -> Option<f64> {
    let value = match kind {
        MetricKind::AverageOfField { field } => record.value(field)?,
        MetricKind::RatioOfFields { numerator, denominator } => {
            let b = record.value(denominator).filter(|b| *b != 0.0)?;
            record.value(numerator)? / b
        }
        MetricKind::ScaledByConstant { field } => {
            if !(constant.is_finite() && constant > 0.0) {
                return None;
            }
            record.value(field)? / constant
        }
    };
    value.is_finite().then_some(value)
}

/// Derived value of a whole chunk.
pub fn derive_value(kind: &MetricKind, chunk: &Chunk, constant: f64) -> Option<f64> {
    mean(chunk.records.iter().filter_map(|r| record_value(kind, r, constant)))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        return None;
    }
    let m = sum / n as f64;
    m.is_finite().then_some(m)
}
