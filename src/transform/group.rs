//! Per-country grouping and positional chunking.
//!
//! Chunk boundaries are index-based: with a period of 7, a chunk is "the next
//! seven rows", not a calendar week, so chunks do not start on a fixed weekday
//! and a country with gaps in its reporting gets chunks spanning more than
//! seven days.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::{DatePolicy, Location, Record};
use crate::error::AppError;

/// Consecutive records of one country, at most `period` long.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub records: Vec<Record>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Date that labels the chunk on the x axis.
    pub fn representative_date(&self, policy: DatePolicy) -> Option<NaiveDate> {
        let idx = match policy {
            DatePolicy::First => 0,
            DatePolicy::Middle => self.records.len() / 2,
            DatePolicy::Last => self.records.len().checked_sub(1)?,
        };
        self.records.get(idx).and_then(|r| r.date)
    }
}

/// Split `records` into consecutive chunks of `period`; the last may be shorter.
pub fn chunk_records(records: &[Record], period: usize) -> Result<Vec<Chunk>, AppError> {
    if period == 0 {
        return Err(AppError::config("Chunk period must be > 0."));
    }
    Ok(records
        .chunks(period)
        .map(|c| Chunk { records: c.to_vec() })
        .collect())
}

/// Partition records by country, in `locations` order, each sorted by date.
///
/// Every location gets an entry, possibly empty. Sorting is stable, so rows
/// sharing a date keep their input order.
pub fn split_by_location(records: &[Record], locations: &[Location]) -> Vec<(Location, Vec<Record>)> {
    let mut by_name: HashMap<&str, Vec<Record>> = HashMap::new();
    for record in records {
        by_name.entry(record.location.as_str()).or_default().push(record.clone());
    }

    locations
        .iter()
        .map(|loc| {
            let mut rows = by_name.remove(loc.name.as_str()).unwrap_or_default();
            rows.sort_by_key(|r| r.date);
            (loc.clone(), rows)
        })
        .collect()
}
