//! Location and date filtering.

use std::collections::HashSet;

use chrono::{Months, NaiveDate};

use crate::domain::{DateCutoff, Record};
use crate::io::ingest::latest_date;

/// Row predicate applied before grouping.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    allowed: HashSet<String>,
    cutoff: NaiveDate,
    require_positive: Option<String>,
}

impl RecordFilter {
    pub fn new<I, S>(allowed: I, cutoff: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            cutoff,
            require_positive: None,
        }
    }

    /// Also drop records whose `field` is missing or not strictly positive.
    pub fn require_positive(mut self, field: impl Into<String>) -> Self {
        self.require_positive = Some(field.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        let in_window = record.date.is_some_and(|d| d > self.cutoff);
        let positive = match &self.require_positive {
            Some(field) => record.value(field).is_some_and(|v| v > 0.0),
            None => true,
        };
        in_window && positive && self.allowed.contains(&record.location)
    }

    /// Matching records, in input order.
    pub fn apply(&self, records: &[Record]) -> Vec<Record> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Records in `allowed` dated strictly after `cutoff`, in input order.
pub fn filter_records(records: &[Record], allowed: &HashSet<String>, cutoff: NaiveDate) -> Vec<Record> {
    RecordFilter::new(allowed.iter().cloned(), cutoff).apply(records)
}

/// Turn a cutoff rule into a concrete date.
///
/// `MonthsBeforeLatest` counts back from the newest valid date in `records`;
/// an empty dataset has no latest date and yields `None`.
pub fn resolve_cutoff(cutoff: DateCutoff, records: &[Record]) -> Option<NaiveDate> {
    match cutoff {
        DateCutoff::Fixed(date) => Some(date),
        DateCutoff::MonthsBeforeLatest(months) => {
            latest_date(records).and_then(|latest| latest.checked_sub_months(Months::new(months)))
        }
    }
}
