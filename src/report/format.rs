//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline stays free of presentation
//! and output changes stay localized.

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};

use crate::app::pipeline::ChartRun;
use crate::data::Dataset;
use crate::domain::{ChartData, CountrySeries, Location, RunConfig};
use crate::io::cache::CacheEntry;

/// Format the full run summary: data provenance, cutoff, then one table per chart.
pub fn format_run_summary(run: &ChartRun, dataset: &Dataset, config: &RunConfig) -> String {
    let mut out = String::new();

    out.push_str("=== trends - COVID-19 country trends (OWID) ===\n");
    out.push_str(&format_dataset_line(dataset));
    out.push('\n');
    out.push_str(&format!(
        "Rows: read={} used={} | after {} | latest {}\n",
        run.rows_read,
        run.rows_used,
        run.cutoff.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
        run.latest_date.map(|d| d.format("%d.%m.%Y").to_string()).unwrap_or_else(|| "-".to_string()),
    ));

    for chart in &run.charts {
        out.push('\n');
        out.push_str(&format_chart_table(chart, &config.locations));
    }

    out
}

/// One line describing where a dataset came from.
pub fn format_dataset_line(dataset: &Dataset) -> String {
    format!(
        "Data: {} | fetched {} | rows {} | latest {}",
        dataset.origin.label(),
        dataset.fetched_at.format("%Y-%m-%d %H:%M UTC"),
        dataset.records.len(),
        dataset.latest_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
    )
}

/// Latest value per country for one chart.
pub fn format_chart_table(chart: &ChartData, locations: &[Location]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", chart.title));
    out.push_str(
        format!(
            "  {:<32} {:>10} {:>14} {:>6} {:>5}\n",
            "country", "date", "latest", "points", "gaps"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("  {:-<32} {:-<10} {:-<14} {:-<6} {:-<5}\n", "", "", "", "", "").trim_end());
    out.push('\n');

    for dataset in &chart.datasets {
        out.push_str(format_row(dataset, locations).trim_end());
        out.push('\n');
    }

    out
}

fn format_row(dataset: &CountrySeries, locations: &[Location]) -> String {
    let label = locations
        .iter()
        .find(|l| l.name == dataset.label)
        .map(Location::display_label)
        .unwrap_or_else(|| dataset.label.clone());
    let marker = if dataset.visible { '*' } else { ' ' };
    let gaps = dataset.points.iter().filter(|p| p.is_skip()).count();

    let (date, value) = match dataset.latest() {
        Some((d, v)) => (d.format("%d.%m.%Y").to_string(), fmt_value(v)),
        None => ("-".to_string(), "-".to_string()),
    };

    format!(
        "{marker} {:<32} {:>10} {:>14} {:>6} {:>5}\n",
        truncate(&label, 32),
        date,
        value,
        dataset.points.len(),
        gaps
    )
}

/// Describe the cache entry (or its absence).
pub fn format_cache_status(entry: Option<&CacheEntry>, path: &Path, now: DateTime<Utc>, ttl: TimeDelta) -> String {
    let mut out = format!("Cache: {}\n", path.display());
    let Some(entry) = entry else {
        out.push_str("Status: empty\n");
        return out;
    };

    let age = now - entry.timestamp;
    out.push_str(&format!(
        "Status: {} (age {}, ttl {}m)\n",
        if entry.is_stale(now, ttl) { "stale" } else { "fresh" },
        fmt_age(age),
        ttl.num_minutes()
    ));
    out.push_str(&format!("Fetched: {}\n", entry.timestamp.to_rfc3339()));
    out.push_str(&format!("Rows: {}\n", entry.data.len()));
    out.push_str(&format!(
        "Latest date: {}\n",
        entry.latest_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    ));
    out.push_str(&format!("Columns: {}\n", entry.fields.join(", ")));
    out
}

fn fmt_value(v: f64) -> String {
    // Ratios and rates read better with more decimals than counts.
    if v.abs() < 1.0 {
        format!("{v:.4}")
    } else {
        format!("{v:.2}")
    }
}

fn fmt_age(age: TimeDelta) -> String {
    let minutes = age.num_minutes();
    if minutes < 60 {
        format!("{minutes}m")
    } else if minutes < 60 * 48 {
        format!("{}h{:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{}d", minutes / (60 * 24))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::{DatePolicy, Preset, SeriesPoint};

    fn chart() -> ChartData {
        ChartData {
            title: "New cases / weekly average".to_string(),
            metric: Preset::WeeklyNewCases.spec(7, DatePolicy::Last),
            latest_date: NaiveDate::from_ymd_opt(2020, 1, 14),
            datasets: vec![
                CountrySeries {
                    label: "Serbia".to_string(),
                    visible: true,
                    points: vec![
                        SeriesPoint::Value {
                            x: NaiveDate::from_ymd_opt(2020, 1, 7).unwrap(),
                            y: 40.0,
                        },
                        SeriesPoint::Skip,
                    ],
                },
                CountrySeries {
                    label: "Croatia".to_string(),
                    visible: false,
                    points: vec![],
                },
            ],
        }
    }

    #[test]
    fn table_shows_latest_value_and_gaps() {
        let locations = vec![Location::new("Serbia", 6.93)];
        let table = format_chart_table(&chart(), &locations);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "New cases / weekly average");
        assert!(lines[3].starts_with("* Serbia (6.93 mil.)"));
        assert!(lines[3].contains("07.01.2020"));
        assert!(lines[3].contains("40.00"));
        assert!(lines[3].ends_with("2     1"));
        assert!(lines[4].starts_with("  Croatia"));
        assert!(lines[4].contains(" - "));
    }

    #[test]
    fn cache_status_reports_staleness() {
        let now = Utc::now();
        let entry = CacheEntry::new(vec![], vec!["date".to_string()], now - TimeDelta::hours(2));
        let text = format_cache_status(Some(&entry), Path::new("c.json"), now, TimeDelta::hours(1));
        assert!(text.contains("Status: stale (age 2h00m, ttl 60m)"));

        let text = format_cache_status(None, Path::new("c.json"), now, TimeDelta::hours(1));
        assert!(text.contains("Status: empty"));
    }

    #[test]
    fn small_values_keep_precision() {
        assert_eq!(fmt_value(0.0123), "0.0123");
        assert_eq!(fmt_value(1234.567), "1234.57");
        assert_eq!(truncate("Bosnia and Herzegovina (3.28 mil.)", 10), "Bosnia an.");
    }
}
