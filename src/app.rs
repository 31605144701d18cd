//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and environment configuration
//! - installs the log subscriber
//! - loads the dataset (cache first, network when stale)
//! - runs the chart pipeline and prints summaries
//! - writes optional exports

use std::path::PathBuf;

use chrono::{TimeDelta, Utc};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::pipeline::ChartRun;
use crate::cli::{CacheArgs, ChartArgs, Command, SourceArgs};
use crate::data::{DEFAULT_DATA_URL, LoadOutcome};
use crate::data::owid::DATA_URL_ENV;
use crate::domain::{DEFAULT_COUNTRIES, DateCutoff, Preset, RunConfig, resolve_locations};
use crate::error::AppError;
use crate::io::cache::{Cache, DEFAULT_TTL_MINUTES, FileStore};
use crate::view::ViewState;

pub mod pipeline;

/// Environment variable for the cache directory.
pub const CACHE_DIR_ENV: &str = "COVID_TRENDS_CACHE_DIR";
/// Environment variable for the cache TTL in minutes.
pub const TTL_ENV: &str = "COVID_TRENDS_TTL_MINUTES";

const DEFAULT_CACHE_DIR: &str = ".cache/covid-trends";
const DEFAULT_MONTHS: u32 = 6;

/// Entry point for the `trends` binary.
pub fn run() -> Result<(), AppError> {
    // `trends` and `trends -c Serbia` behave like `trends chart ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    init_logging(cli.verbose, cli.quiet);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| AppError::config(format!("Failed to configure thread pool: {e}")))?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Chart(args) => handle_chart(args),
        Command::Fetch(args) => handle_fetch(args),
        Command::Cache(args) => handle_cache(args),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = match (verbose, quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };
    let filter = if verbose || quiet {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    // A second init (tests, embedding) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_chart(args: ChartArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let view = ViewState::with_hidden(&config.locations, &config.hidden);
    let loader = pipeline::loader_for(&config);

    // Every delivered dataset is charted: a stale cache first, then its refresh.
    let mut deliveries = Deliveries::default();
    let outcome = loader.load(Utc::now(), |dataset| {
        let result = pipeline::build_charts(&dataset.records, &config, &view);
        if let Ok(run) = &result {
            println!("{}", crate::report::format_run_summary(run, dataset, &config));
        }
        deliveries.accept(result);
    })?;

    if outcome == LoadOutcome::InFlight {
        return Ok(());
    }
    let run = deliveries.finish()?;

    if run.rows_used == 0 {
        warn!("no rows matched the selected countries and dates");
    }

    if let Some(path) = &config.export_json {
        crate::io::chart::write_charts_json(path, &run.charts)?;
        info!(path = %path.display(), "wrote chart JSON");
    }
    if let Some(path) = &config.export_csv {
        crate::io::export::write_series_csv(path, &run.charts)?;
        info!(path = %path.display(), "wrote series CSV");
    }

    Ok(())
}

/// Chart results of each delivery; only the newest one decides the run.
#[derive(Debug, Default)]
struct Deliveries {
    latest: Option<Result<ChartRun, AppError>>,
}

impl Deliveries {
    fn accept(&mut self, result: Result<ChartRun, AppError>) {
        if let Err(e) = &result {
            warn!(error = %e, "failed to chart delivered dataset");
        }
        self.latest = Some(result);
    }

    fn finish(self) -> Result<ChartRun, AppError> {
        self.latest
            .unwrap_or_else(|| Err(AppError::no_data("No dataset was loaded.")))
    }
}

fn handle_fetch(args: SourceArgs) -> Result<(), AppError> {
    let config = base_config(&args)?;
    let loader = pipeline::loader_for(&config).force_refresh(true);

    loader.load(Utc::now(), |dataset| {
        println!("{}", crate::report::format_dataset_line(dataset));
    })?;
    Ok(())
}

fn handle_cache(args: CacheArgs) -> Result<(), AppError> {
    let config = base_config(&args.source)?;
    let store = FileStore::new(&config.cache_dir);
    let path = store.path_for(crate::io::cache::CACHE_KEY);
    let cache = Cache::new(store);

    if args.clear {
        cache
            .clear()
            .map_err(|e| AppError::io(format!("Failed to clear cache: {e}")))?;
        println!("Cleared {}", path.display());
        return Ok(());
    }

    let entry = cache.get();
    println!(
        "{}",
        crate::report::format_cache_status(entry.as_ref(), &path, Utc::now(), config.cache_ttl)
    );
    Ok(())
}

/// Source, cache and default chart settings, before chart flags are applied.
fn base_config(args: &SourceArgs) -> Result<RunConfig, AppError> {
    dotenvy::dotenv().ok();

    let data_url = args
        .url
        .clone()
        .or_else(|| std::env::var(DATA_URL_ENV).ok())
        .unwrap_or_else(|| DEFAULT_DATA_URL.to_string());

    let cache_dir = args
        .cache_dir
        .clone()
        .or_else(|| std::env::var(CACHE_DIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

    let ttl_minutes = match args.ttl_minutes {
        Some(m) => m,
        None => match std::env::var(TTL_ENV) {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| AppError::config(format!("Invalid {TTL_ENV} '{raw}'.")))?,
            Err(_) => DEFAULT_TTL_MINUTES,
        },
    };
    if ttl_minutes < 0 {
        return Err(AppError::config("Cache TTL must be >= 0 minutes."));
    }
    let cache_ttl = TimeDelta::try_minutes(ttl_minutes)
        .ok_or_else(|| AppError::config(format!("Cache TTL of {ttl_minutes} minutes is too large.")))?;

    let names: Vec<String> = DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect();

    Ok(RunConfig {
        data_url,
        cache_dir,
        cache_ttl,
        offline: args.offline,
        locations: resolve_locations(&names, &[]),
        hidden: Vec::new(),
        cutoff: DateCutoff::MonthsBeforeLatest(DEFAULT_MONTHS),
        require_positive: None,
        missing: Default::default(),
        metrics: Preset::DEFAULT
            .iter()
            .map(|p| p.spec(7, Default::default()))
            .collect(),
        export_json: None,
        export_csv: None,
    })
}

pub fn run_config_from_args(args: &ChartArgs) -> Result<RunConfig, AppError> {
    if args.period == 0 {
        return Err(AppError::config("`--period` must be > 0."));
    }

    let mut config = base_config(&args.source)?;

    if !args.countries.is_empty() {
        config.locations = resolve_locations(&args.countries, &args.population);
    } else if !args.population.is_empty() {
        let names: Vec<String> = config.locations.iter().map(|l| l.name.clone()).collect();
        config.locations = resolve_locations(&names, &args.population);
    }
    for loc in &config.locations {
        if loc.population_millions <= 0.0 {
            warn!(location = %loc.name, "unknown population; per-million metrics will be empty");
        }
    }

    let presets: &[Preset] = if args.metrics.is_empty() {
        &Preset::DEFAULT
    } else {
        &args.metrics
    };
    config.metrics = presets
        .iter()
        .map(|p| p.spec(args.period, args.date_policy))
        .collect();

    config.cutoff = match (args.from, args.months) {
        (Some(date), _) => DateCutoff::Fixed(date),
        (None, Some(months)) => DateCutoff::MonthsBeforeLatest(months),
        (None, None) => DateCutoff::MonthsBeforeLatest(DEFAULT_MONTHS),
    };

    config.hidden = args.hide.clone();
    config.require_positive = args.require_positive.clone();
    config.missing = args.missing;
    config.export_json = args.export_json.clone();
    config.export_csv = args.export_csv.clone();

    Ok(config)
}

/// Rewrite argv so `trends` defaults to `trends chart`.
///
/// Rules:
/// - `trends`                      -> `trends chart`
/// - `trends -c Serbia ...`        -> `trends chart -c Serbia ...`
/// - `trends --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("chart".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "chart" | "fetch" | "cache");
    if is_subcommand {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "chart".to_string());
        return argv;
    }

    argv
}
