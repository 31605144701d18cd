//! CSV ingest.
//!
//! Turns the raw dataset text into `Record`s. The source CSV has no quoting or
//! escaping, so every line is split on `,` as-is; a value that itself contains
//! a comma shifts the following cells. Parsing never fails:
//!
//! - unparseable dates become `None`
//! - unparseable numbers become `NaN`
//! - columns outside the needed set are dropped

use std::collections::BTreeMap;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::domain::{DATE_FIELD, LOCATION_FIELD, MissingPolicy, Record};

/// Which columns to keep and how to treat missing cells.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Needed columns, including the date and location columns.
    pub needed: Vec<String>,
    pub date_field: String,
    pub location_field: String,
    pub missing: MissingPolicy,
}

impl ParseOptions {
    pub fn new(needed: Vec<String>) -> Self {
        Self {
            needed,
            date_field: DATE_FIELD.to_string(),
            location_field: LOCATION_FIELD.to_string(),
            missing: MissingPolicy::default(),
        }
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }
}

/// Column positions resolved against the header line.
#[derive(Debug)]
struct Columns {
    date: Option<usize>,
    location: Option<usize>,
    /// Needed numeric fields; `None` when the header lacks the column.
    numeric: Vec<(String, Option<usize>)>,
}

/// Parse CSV text into records, one per non-blank data line.
///
/// An absent or blank header line yields an empty result. Blank lines after
/// the header carry no row and produce no record, so the record count is the
/// number of non-blank lines minus one.
pub fn parse_csv(text: &str, options: &ParseOptions) -> Vec<Record> {
    let Some(first) = text.lines().next() else {
        debug!("empty CSV input");
        return Vec::new();
    };
    if normalize_header_name(first).is_empty() {
        debug!("CSV input has no header line");
        return Vec::new();
    }

    // The reader skips empty lines itself.
    let mut reader = csv::ReaderBuilder::new()
        .quoting(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            warn!(error = %e, "failed to read CSV header");
            return Vec::new();
        }
    };

    let columns = resolve_columns(&headers, options);
    debug!(?columns, "resolved CSV columns");

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header and lines are 1-based.
        let line = idx + 2;
        match result {
            Ok(row) => records.push(parse_row(&row, &columns, options.missing)),
            Err(e) => warn!(line, error = %e, "skipping unreadable CSV line"),
        }
    }

    info!(rows = records.len(), "parsed CSV");
    records
}

/// Newest valid date among `records`.
pub fn latest_date(records: &[Record]) -> Option<NaiveDate> {
    records.iter().filter_map(|r| r.date).max()
}

fn resolve_columns(headers: &StringRecord, options: &ParseOptions) -> Columns {
    let index: BTreeMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect();
    let lookup = |name: &str| index.get(&normalize_header_name(name)).copied();

    let numeric = options
        .needed
        .iter()
        .filter(|name| **name != options.date_field && **name != options.location_field)
        .map(|name| (name.clone(), lookup(name)))
        .collect();

    Columns {
        date: lookup(&options.date_field),
        location: lookup(&options.location_field),
        numeric,
    }
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM from the first header so `date` still matches.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(row: &StringRecord, columns: &Columns, missing: MissingPolicy) -> Record {
    let location = columns
        .location
        .and_then(|idx| row.get(idx))
        .unwrap_or_default()
        .to_string();
    let date = columns.date.and_then(|idx| row.get(idx)).and_then(parse_date);

    let mut values = BTreeMap::new();
    for (name, idx) in &columns.numeric {
        let cell = idx.and_then(|i| row.get(i)).filter(|c| !c.is_empty());
        match (cell, missing) {
            (Some(cell), _) => {
                values.insert(name.clone(), parse_number(cell));
            }
            (None, MissingPolicy::Nan) => {
                values.insert(name.clone(), f64::NAN);
            }
            (None, MissingPolicy::Omit) => {}
        }
    }

    Record { location, date, values }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_number(s: &str) -> f64 {
    s.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(f64::NAN)
}
