//! Shared chart pipeline used by every front-end.
//!
//! records -> filter (countries + cutoff) -> split per country -> chunk ->
//! derive -> series, once per requested metric.
//!
//! Loading (cache, network) stays outside this module so the pipeline runs the
//! same way on a stale cached dataset and on a fresh download.

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::data::{DatasetLoader, OwidClient};
use crate::domain::{ChartData, DateCutoff, DatePolicy, Location, MetricSpec, Preset, Record, RunConfig};
use crate::error::AppError;
use crate::io::cache::{Cache, FileStore};
use crate::io::ingest::{ParseOptions, latest_date};
use crate::transform::{RecordFilter, build_series, resolve_cutoff, split_by_location};
use crate::view::ViewState;

/// All computed outputs of one pipeline pass.
#[derive(Debug, Clone)]
pub struct ChartRun {
    pub charts: Vec<ChartData>,
    /// Resolved exclusive lower bound on dates; `None` when the dataset has no valid dates.
    pub cutoff: Option<NaiveDate>,
    pub rows_read: usize,
    pub rows_used: usize,
    /// Newest date among the rows that passed the filter.
    pub latest_date: Option<NaiveDate>,
}

/// Run the pipeline over already-loaded records.
pub fn build_charts(records: &[Record], config: &RunConfig, view: &ViewState) -> Result<ChartRun, AppError> {
    let cutoff = resolve_cutoff(config.cutoff, records);

    let filtered = match cutoff {
        Some(cutoff) => {
            let mut filter = RecordFilter::new(config.locations.iter().map(|l| l.name.clone()), cutoff);
            if let Some(field) = &config.require_positive {
                filter = filter.require_positive(field.clone());
            }
            filter.apply(records)
        }
        None => {
            let reason = unresolved_cutoff_reason(config.cutoff, records);
            warn!(reason, "no date cutoff; charts will be empty");
            Vec::new()
        }
    };
    info!(rows_read = records.len(), rows_used = filtered.len(), ?cutoff, "filtered dataset");

    let by_location = split_by_location(&filtered, &config.locations);
    for (loc, rows) in &by_location {
        if rows.is_empty() {
            warn!(location = %loc.name, "no rows for location");
        }
    }

    let latest = latest_date(&filtered);
    let charts = config
        .metrics
        .iter()
        .map(|metric| build_chart(metric, &by_location, latest, view))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChartRun {
        charts,
        cutoff,
        rows_read: records.len(),
        rows_used: filtered.len(),
        latest_date: latest,
    })
}

/// Why [`resolve_cutoff`] produced no date.
fn unresolved_cutoff_reason(cutoff: DateCutoff, records: &[Record]) -> &'static str {
    match (cutoff, latest_date(records)) {
        (DateCutoff::MonthsBeforeLatest(_), Some(_)) => "month offset reaches before the earliest representable date",
        _ => "dataset has no valid dates",
    }
}

/// Derive one chart, one dataset per location, in location order.
pub fn build_chart(
    metric: &MetricSpec,
    by_location: &[(Location, Vec<Record>)],
    latest_date: Option<NaiveDate>,
    view: &ViewState,
) -> Result<ChartData, AppError> {
    let datasets = by_location
        .par_iter()
        .map(|(loc, rows)| build_series(loc, rows, metric, view.is_shown(&loc.name)))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(title = %metric.title, datasets = datasets.len(), "built chart");
    Ok(ChartData {
        title: metric.title.clone(),
        metric: metric.clone(),
        latest_date,
        datasets,
    })
}

/// Parse options for a run.
///
/// The cache is shared between runs, so the columns of every preset are kept,
/// not only those of the requested metrics.
pub fn parse_options(config: &RunConfig) -> ParseOptions {
    let mut needed = config.needed_fields();
    for preset in Preset::ALL {
        let spec = preset.spec(1, DatePolicy::Last);
        for field in spec.kind.fields() {
            if !needed.iter().any(|n| n == field) {
                needed.push(field.to_string());
            }
        }
    }
    ParseOptions::new(needed).with_missing(config.missing)
}

/// File-cached loader over the configured HTTP source.
pub fn loader_for(config: &RunConfig) -> DatasetLoader<FileStore, OwidClient> {
    let cache = Cache::new(FileStore::new(&config.cache_dir));
    DatasetLoader::new(
        cache,
        OwidClient::new(config.data_url.clone()),
        parse_options(config),
        config.cache_ttl,
    )
    .offline(config.offline)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::TimeDelta;

    use super::*;
    use crate::domain::{MissingPolicy, SeriesPoint};
    use crate::io::ingest::parse_csv;

    fn config(metrics: Vec<MetricSpec>, cutoff: DateCutoff) -> RunConfig {
        RunConfig {
            data_url: String::new(),
            cache_dir: PathBuf::from("unused"),
            cache_ttl: TimeDelta::hours(1),
            offline: true,
            locations: vec![Location::new("Serbia", 6.93), Location::new("Croatia", 4.05)],
            hidden: vec![],
            cutoff,
            require_positive: None,
            missing: MissingPolicy::Nan,
            metrics,
            export_json: None,
            export_csv: None,
        }
    }

    fn dataset() -> Vec<Record> {
        let mut csv = String::from("date,location,new_cases,total_cases,total_deaths\n");
        for day in 1..=7 {
            csv.push_str(&format!("2020-01-{day:02},Serbia,{},{},{}\n", day * 10, day * 100, day));
            csv.push_str(&format!("2020-01-{day:02},Croatia,,{},0\n", day * 50));
        }
        csv.push_str("2020-01-05,Hungary,99,99,9\n");
        parse_csv(&csv, &parse_options(&config(vec![], DateCutoff::MonthsBeforeLatest(1))))
    }

    #[test]
    fn weekly_average_over_one_chunk() {
        let cfg = config(
            vec![Preset::WeeklyNewCases.spec(7, DatePolicy::Last)],
            DateCutoff::Fixed(NaiveDate::from_ymd_opt(2019, 12, 31).unwrap()),
        );
        let view = ViewState::all_shown(&cfg.locations);
        let run = build_charts(&dataset(), &cfg, &view).unwrap();

        assert_eq!(run.rows_read, 15);
        assert_eq!(run.rows_used, 14);
        assert_eq!(run.latest_date, NaiveDate::from_ymd_opt(2020, 1, 7));

        let chart = &run.charts[0];
        assert_eq!(chart.datasets.len(), 2);
        assert_eq!(
            chart.datasets[0].points,
            vec![SeriesPoint::Value {
                x: NaiveDate::from_ymd_opt(2020, 1, 7).unwrap(),
                y: 40.0
            }]
        );
        // Croatia reports no new cases at all: one chunk, one gap.
        assert_eq!(chart.datasets[1].points, vec![SeriesPoint::Skip]);
    }

    #[test]
    fn charts_follow_metric_and_view() {
        let cfg = config(
            vec![
                Preset::TotalCasesPerMillion.spec(7, DatePolicy::Last),
                Preset::CaseFatality.spec(7, DatePolicy::Last),
            ],
            DateCutoff::Fixed(NaiveDate::from_ymd_opt(2020, 1, 3).unwrap()),
        );
        let view = ViewState::all_shown(&cfg.locations).hide("Croatia");
        let run = build_charts(&dataset(), &cfg, &view).unwrap();

        let per_million = &run.charts[0];
        assert_eq!(per_million.datasets[0].points.len(), 4);
        let (date, value) = per_million.datasets[0].latest().unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2020, 1, 7).unwrap());
        assert!((value - 700.0 / 6.93).abs() < 1e-9);
        assert!(!per_million.datasets[1].visible);

        let fatality = &run.charts[1];
        assert!(fatality.datasets[0].points.iter().all(|p| (p.y().unwrap() - 0.01).abs() < 1e-12));
        assert!(fatality.datasets[1].points.iter().all(|p| p.y() == Some(0.0)));
    }

    #[test]
    fn unmatched_locations_are_empty_series() {
        let mut cfg = config(
            vec![Preset::WeeklyNewCases.spec(7, DatePolicy::Last)],
            DateCutoff::MonthsBeforeLatest(1),
        );
        cfg.locations = vec![Location::new("Atlantis", 1.0)];
        let view = ViewState::all_shown(&cfg.locations);

        let run = build_charts(&dataset(), &cfg, &view).unwrap();
        assert_eq!(run.rows_used, 0);
        assert!(run.charts[0].datasets[0].points.is_empty());
    }

    #[test]
    fn oversized_month_offset_yields_empty_charts() {
        let cfg = config(
            vec![Preset::WeeklyNewCases.spec(7, DatePolicy::Last)],
            DateCutoff::MonthsBeforeLatest(u32::MAX),
        );
        let view = ViewState::all_shown(&cfg.locations);
        let run = build_charts(&dataset(), &cfg, &view).unwrap();

        assert_eq!(run.cutoff, None);
        assert_eq!(run.rows_used, 0);
        assert_eq!(
            unresolved_cutoff_reason(cfg.cutoff, &dataset()),
            "month offset reaches before the earliest representable date"
        );
        assert_eq!(unresolved_cutoff_reason(cfg.cutoff, &[]), "dataset has no valid dates");
    }

    #[test]
    fn zero_period_is_a_config_error() {
        let cfg = config(
            vec![Preset::WeeklyNewCases.spec(0, DatePolicy::Last)],
            DateCutoff::MonthsBeforeLatest(1),
        );
        let view = ViewState::all_shown(&cfg.locations);
        assert_eq!(build_charts(&dataset(), &cfg, &view).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn parse_options_cover_every_preset() {
        let opts = parse_options(&config(vec![], DateCutoff::MonthsBeforeLatest(1)));
        for field in ["date", "location", "positive_rate", "excess_mortality", "new_cases_per_million"] {
            assert!(opts.needed.iter().any(|n| n == field), "missing {field}");
        }
    }
}
