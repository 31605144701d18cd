//! Shared domain types.
//!
//! These types are kept serializable so they can be:
//!
//! - cached between runs (`Record`)
//! - exported for a chart renderer (`ChartData`, `CountrySeries`, `SeriesPoint`)
//! - reloaded later for comparisons

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{NaiveDate, TimeDelta};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Column holding the observation date.
pub const DATE_FIELD: &str = "date";
/// Column holding the country name.
pub const LOCATION_FIELD: &str = "location";

/// A parsed CSV row.
///
/// `date` is `None` when the cell did not parse as `YYYY-MM-DD`; such records
/// survive parsing and are dropped by any stage that compares dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub location: String,
    pub date: Option<NaiveDate>,
    /// Requested numeric fields. Unparseable cells are `NaN`.
    #[serde(with = "nan_as_null")]
    pub values: BTreeMap<String, f64>,
}

impl Record {
    /// Finite value of `field`, or `None` when missing or `NaN`.
    pub fn value(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied().filter(|v| v.is_finite())
    }
}

/// JSON has no `NaN`; store it as `null` and restore it on load.
mod nan_as_null {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &BTreeMap<String, f64>, serializer: S) -> Result<S::Ok, S::Error> {
        let nullable: BTreeMap<&str, Option<f64>> = values
            .iter()
            .map(|(k, v)| (k.as_str(), v.is_finite().then_some(*v)))
            .collect();
        nullable.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error> {
        let nullable = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
        Ok(nullable
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or(f64::NAN)))
            .collect())
    }
}

/// How an empty or absent numeric cell is represented on a `Record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Store `NaN` under the field name.
    #[default]
    Nan,
    /// Leave the field out of `Record::values`.
    Omit,
}

/// A chart point, or a gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPoint", into = "RawPoint")]
pub enum SeriesPoint {
    Value { x: NaiveDate, y: f64 },
    /// No valid value at this position; rendered as a gap, never interpolated.
    Skip,
}

impl SeriesPoint {
    pub fn is_skip(&self) -> bool {
        matches!(self, SeriesPoint::Skip)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            SeriesPoint::Value { x, .. } => Some(*x),
            SeriesPoint::Skip => None,
        }
    }

    pub fn y(&self) -> Option<f64> {
        match self {
            SeriesPoint::Value { y, .. } => Some(*y),
            SeriesPoint::Skip => None,
        }
    }
}

/// Wire shape of a point: `{"x": date|null, "y": number|null}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawPoint {
    x: Option<NaiveDate>,
    y: Option<f64>,
}

impl From<RawPoint> for SeriesPoint {
    fn from(raw: RawPoint) -> Self {
        match (raw.x, raw.y) {
            (Some(x), Some(y)) if y.is_finite() => SeriesPoint::Value { x, y },
            _ => SeriesPoint::Skip,
        }
    }
}

impl From<SeriesPoint> for RawPoint {
    fn from(point: SeriesPoint) -> Self {
        match point {
            SeriesPoint::Value { x, y } => RawPoint { x: Some(x), y: Some(y) },
            SeriesPoint::Skip => RawPoint { x: None, y: None },
        }
    }
}

/// Which member of a chunk supplies the chunk's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatePolicy {
    First,
    /// The record at index `len / 2`.
    Middle,
    #[default]
    Last,
}

/// What a metric computes for each record before chunk averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricKind {
    /// Mean of one field.
    AverageOfField { field: String },
    /// Mean of `numerator / denominator`, skipping zero or missing denominators.
    RatioOfFields { numerator: String, denominator: String },
    /// `field / constant`, where the constant is the country's population in millions.
    ScaledByConstant { field: String },
}

impl MetricKind {
    /// CSV columns this metric reads.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            MetricKind::AverageOfField { field } | MetricKind::ScaledByConstant { field } => vec![field.as_str()],
            MetricKind::RatioOfFields { numerator, denominator } => {
                vec![numerator.as_str(), denominator.as_str()]
            }
        }
    }
}

/// How daily records are grouped before derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Bucketing {
    /// One point per record.
    Daily,
    /// Positional chunks of `period` records (not calendar weeks).
    Weekly { period: usize, policy: DatePolicy },
}

impl Bucketing {
    pub fn period(self) -> usize {
        match self {
            Bucketing::Daily => 1,
            Bucketing::Weekly { period, .. } => period,
        }
    }

    pub fn policy(self) -> DatePolicy {
        match self {
            Bucketing::Daily => DatePolicy::Last,
            Bucketing::Weekly { policy, .. } => policy,
        }
    }
}

/// A fully specified chart metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub title: String,
    pub kind: MetricKind,
    pub bucketing: Bucketing,
}

/// Named metric configurations for the charts the tool knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Total cases per million inhabitants (daily).
    TotalCasesPerMillion,
    /// New cases per million inhabitants (daily).
    NewCasesPerMillion,
    /// Total deaths / total cases (daily).
    CaseFatality,
    /// Weekly average of new cases.
    WeeklyNewCases,
    /// Weekly average of new cases per million (as reported by the source).
    WeeklyNewCasesPerMillion,
    /// Weekly average test positive rate.
    PositiveRate,
    /// Weekly average excess mortality (P-score).
    ExcessMortality,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::TotalCasesPerMillion,
        Preset::NewCasesPerMillion,
        Preset::CaseFatality,
        Preset::WeeklyNewCases,
        Preset::WeeklyNewCasesPerMillion,
        Preset::PositiveRate,
        Preset::ExcessMortality,
    ];

    /// Presets drawn when none are requested.
    pub const DEFAULT: [Preset; 3] = [
        Preset::TotalCasesPerMillion,
        Preset::NewCasesPerMillion,
        Preset::CaseFatality,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Preset::TotalCasesPerMillion => "Total cases / per million",
            Preset::NewCasesPerMillion => "Daily cases / per million",
            Preset::CaseFatality => "Total deaths / total cases",
            Preset::WeeklyNewCases => "New cases / weekly average",
            Preset::WeeklyNewCasesPerMillion => "New cases per million / weekly average",
            Preset::PositiveRate => "Positive rate / weekly average",
            Preset::ExcessMortality => "Excess mortality / weekly average",
        }
    }

    /// Build the metric spec; `period` and `policy` only apply to weekly presets.
    pub fn spec(self, period: usize, policy: DatePolicy) -> MetricSpec {
        let weekly = Bucketing::Weekly { period, policy };
        let field = |name: &str| name.to_string();

        let (kind, bucketing) = match self {
            Preset::TotalCasesPerMillion => (
                MetricKind::ScaledByConstant { field: field("total_cases") },
                Bucketing::Daily,
            ),
            Preset::NewCasesPerMillion => (
                MetricKind::ScaledByConstant { field: field("new_cases") },
                Bucketing::Daily,
            ),
            Preset::CaseFatality => (
                MetricKind::RatioOfFields {
                    numerator: field("total_deaths"),
                    denominator: field("total_cases"),
                },
                Bucketing::Daily,
            ),
            Preset::WeeklyNewCases => (MetricKind::AverageOfField { field: field("new_cases") }, weekly),
            Preset::WeeklyNewCasesPerMillion => (
                MetricKind::AverageOfField { field: field("new_cases_per_million") },
                weekly,
            ),
            Preset::PositiveRate => (MetricKind::AverageOfField { field: field("positive_rate") }, weekly),
            Preset::ExcessMortality => (
                MetricKind::AverageOfField { field: field("excess_mortality") },
                weekly,
            ),
        };

        MetricSpec {
            title: self.title().to_string(),
            kind,
            bucketing,
        }
    }
}

/// Lower bound (exclusive) on record dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCutoff {
    Fixed(NaiveDate),
    /// `n` calendar months before the newest valid date in the dataset.
    MonthsBeforeLatest(u32),
}

/// A country to chart and its population in millions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub population_millions: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, population_millions: f64) -> Self {
        Self {
            name: name.into(),
            population_millions,
        }
    }

    /// Legend label, e.g. `Serbia (6.93 mil.)`.
    pub fn display_label(&self) -> String {
        format!("{} ({:.2} mil.)", self.name, self.population_millions)
    }
}

/// One country's line on a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySeries {
    pub label: String,
    pub visible: bool,
    pub points: Vec<SeriesPoint>,
}

impl CountrySeries {
    /// The last point that carries a value.
    pub fn latest(&self) -> Option<(NaiveDate, f64)> {
        self.points.iter().rev().find_map(|p| match p {
            SeriesPoint::Value { x, y } => Some((*x, *y)),
            SeriesPoint::Skip => None,
        })
    }
}

/// Everything a renderer needs to draw one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub title: String,
    pub metric: MetricSpec,
    pub latest_date: Option<NaiveDate>,
    pub datasets: Vec<CountrySeries>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags, environment variables and defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_url: String,
    pub cache_dir: PathBuf,
    pub cache_ttl: TimeDelta,
    /// Never touch the network; chart whatever the cache holds.
    pub offline: bool,

    pub locations: Vec<Location>,
    /// Countries whose datasets start hidden.
    pub hidden: Vec<String>,
    pub cutoff: DateCutoff,
    /// Drop rows where this field is not strictly positive.
    pub require_positive: Option<String>,
    pub missing: MissingPolicy,

    pub metrics: Vec<MetricSpec>,

    pub export_json: Option<PathBuf>,
    pub export_csv: Option<PathBuf>,
}

impl RunConfig {
    /// Columns the parser has to keep for this run.
    pub fn needed_fields(&self) -> Vec<String> {
        let mut fields = vec![DATE_FIELD.to_string(), LOCATION_FIELD.to_string()];
        let metric_fields = self.metrics.iter().flat_map(|m| m.kind.fields());
        for name in metric_fields.chain(self.require_positive.as_deref()) {
            if !fields.iter().any(|f| f == name) {
                fields.push(name.to_string());
            }
        }
        fields
    }
}
