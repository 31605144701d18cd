//! Command-line parsing for the COVID-19 trends tool.
//!
//! Argument parsing and command dispatch live here, apart from the pipeline.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{DatePolicy, MissingPolicy, Preset};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "trends", version, about = "Per-country COVID-19 trend series (OWID-based)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose (debug-level) logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Number of threads for per-country derivation (defaults to all cores).
    #[arg(long, global = true)]
    pub threads: Option<usize>,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build chart series, print a summary, and optionally export them.
    Chart(ChartArgs),
    /// Download the dataset and refresh the cache, whatever its age.
    Fetch(SourceArgs),
    /// Inspect or clear the dataset cache.
    Cache(CacheArgs),
}

/// Where the dataset comes from and how long it is cached.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Dataset URL (default: `COVID_TRENDS_URL` or the public OWID CSV).
    #[arg(long)]
    pub url: Option<String>,

    /// Cache directory (default: `COVID_TRENDS_CACHE_DIR` or `.cache/covid-trends`).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Minutes before the cached dataset is refreshed (default: `COVID_TRENDS_TTL_MINUTES` or 60).
    #[arg(long)]
    pub ttl_minutes: Option<i64>,

    /// Use the cached dataset only; never touch the network.
    #[arg(long)]
    pub offline: bool,
}

/// Options for building charts.
#[derive(Debug, Args, Clone)]
pub struct ChartArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Country to chart (repeatable or comma-separated).
    #[arg(short = 'c', long = "country", value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Metric preset(s) to chart (repeatable or comma-separated).
    #[arg(short = 'm', long = "metric", value_enum, value_delimiter = ',')]
    pub metrics: Vec<Preset>,

    /// Keep records dated strictly after this date (YYYY-MM-DD).
    #[arg(long, conflicts_with = "months")]
    pub from: Option<NaiveDate>,

    /// Keep records dated strictly after the newest date minus N months.
    #[arg(long)]
    pub months: Option<u32>,

    /// Records per chunk for weekly metrics.
    #[arg(long, default_value_t = 7)]
    pub period: usize,

    /// Which record of a chunk dates the chunk.
    #[arg(long, value_enum, default_value_t = DatePolicy::Last)]
    pub date_policy: DatePolicy,

    /// Drop rows where this column is not strictly positive (e.g. `new_cases`).
    #[arg(long)]
    pub require_positive: Option<String>,

    /// How empty numeric cells are stored.
    #[arg(long, value_enum, default_value_t = MissingPolicy::Nan)]
    pub missing: MissingPolicy,

    /// Start with this country's datasets hidden (repeatable).
    #[arg(long)]
    pub hide: Vec<String>,

    /// Population override in millions, as `NAME=MILLIONS` (repeatable).
    #[arg(long, value_parser = parse_population)]
    pub population: Vec<(String, f64)>,

    /// Export chart datasets to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    /// Export chart datasets to a long-form CSV.
    #[arg(long = "export-csv")]
    pub export_csv: Option<PathBuf>,
}

/// Options for the `cache` subcommand.
#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    /// Remove the cached dataset instead of describing it.
    #[arg(long)]
    pub clear: bool,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Parse `NAME=MILLIONS`.
pub fn parse_population(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=MILLIONS, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing country name in '{raw}'"));
    }
    let millions: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid population '{value}'"))?;
    if !(millions.is_finite() && millions > 0.0) {
        return Err(format!("population must be > 0, got {millions}"));
    }
    Ok((name.to_string(), millions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_override_parses() {
        assert_eq!(parse_population("Serbia=6.9"), Ok(("Serbia".to_string(), 6.9)));
        assert_eq!(
            parse_population("Bosnia and Herzegovina = 3.3"),
            Ok(("Bosnia and Herzegovina".to_string(), 3.3))
        );
        assert!(parse_population("Serbia").is_err());
        assert!(parse_population("=3").is_err());
        assert!(parse_population("Serbia=0").is_err());
    }

    #[test]
    fn chart_flags_accept_lists() {
        let cli = Cli::parse_from([
            "trends",
            "chart",
            "-c",
            "Serbia,Croatia",
            "--country",
            "Hungary",
            "-m",
            "weekly-new-cases,positive-rate",
            "--from",
            "2020-08-30",
            "--date-policy",
            "middle",
        ]);
        let Command::Chart(args) = cli.command else {
            panic!("expected chart command");
        };
        assert_eq!(args.countries, vec!["Serbia", "Croatia", "Hungary"]);
        assert_eq!(args.metrics, vec![Preset::WeeklyNewCases, Preset::PositiveRate]);
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2020, 8, 30));
        assert_eq!(args.date_policy, DatePolicy::Middle);
        assert_eq!(args.period, 7);
    }

    #[test]
    fn from_and_months_conflict() {
        let res = Cli::try_parse_from(["trends", "chart", "--from", "2020-01-01", "--months", "3"]);
        assert!(res.is_err());
    }
}
