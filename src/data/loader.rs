//! Cache-first dataset loading.
//!
//! The cache is read once, before deciding whether to fetch:
//!
//! - fresh entry: delivered, no fetch
//! - stale entry: delivered immediately, then refreshed and delivered again
//! - no usable entry: fetched, stored, delivered
//!
//! A failed fetch falls back to whatever entry exists. Only one load may run at
//! a time; a load triggered while another is fetching returns
//! [`LoadOutcome::InFlight`] without touching the cache or the network.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};

use crate::data::owid::CsvSource;
use crate::domain::Record;
use crate::error::AppError;
use crate::io::cache::{Cache, CacheEntry, KeyValueStore};
use crate::io::ingest::{ParseOptions, parse_csv};

/// Where a delivered dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Cache entry younger than the TTL.
    FreshCache,
    /// Expired cache entry, shown while a refresh runs.
    StaleCache,
    /// Just downloaded.
    Network,
    /// Cache entry used because the download failed or was disabled.
    FallbackCache,
}

impl Origin {
    pub fn label(self) -> &'static str {
        match self {
            Origin::FreshCache => "cache",
            Origin::StaleCache => "stale cache",
            Origin::Network => "network",
            Origin::FallbackCache => "cache (fallback)",
        }
    }
}

/// Parsed records handed to the consumer.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub fetched_at: DateTime<Utc>,
    pub latest_date: Option<NaiveDate>,
    pub origin: Origin,
}

impl Dataset {
    fn from_entry(entry: CacheEntry, origin: Origin) -> Self {
        Self {
            records: entry.data,
            fetched_at: entry.timestamp,
            latest_date: entry.latest_date,
            origin,
        }
    }
}

/// Result of one [`DatasetLoader::load`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Data was delivered; the last delivery had this origin.
    Loaded(Origin),
    /// Another load was already running; nothing was delivered.
    InFlight,
}

pub struct DatasetLoader<S, F> {
    cache: Cache<S>,
    source: F,
    options: ParseOptions,
    ttl: TimeDelta,
    offline: bool,
    force_refresh: bool,
    in_flight: AtomicBool,
}

impl<S: KeyValueStore, F: CsvSource> DatasetLoader<S, F> {
    pub fn new(cache: Cache<S>, source: F, options: ParseOptions, ttl: TimeDelta) -> Self {
        Self {
            cache,
            source,
            options,
            ttl,
            offline: false,
            force_refresh: false,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Never fetch; use the cache regardless of age.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Fetch even when the cache is fresh.
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn cache(&self) -> &Cache<S> {
        &self.cache
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Load the dataset, calling `deliver` once per dataset made available.
    ///
    /// `deliver` runs twice when a stale entry is shown and then refreshed.
    #[instrument(skip(self, deliver))]
    pub fn load<C>(&self, now: DateTime<Utc>, mut deliver: C) -> Result<LoadOutcome, AppError>
    where
        C: FnMut(&Dataset),
    {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!("dataset load already in flight; ignoring trigger");
            return Ok(LoadOutcome::InFlight);
        };

        let cached = self.cache.get();
        let usable = cached.as_ref().is_some_and(|e| e.covers(&self.options.needed));
        if cached.is_some() && !usable {
            debug!("cached entry lacks needed columns");
        }

        if usable && !self.force_refresh {
            if let Some(entry) = cached {
                return Ok(self.serve_cached(entry, now, &mut deliver));
            }
        }

        if self.offline {
            let entry = cached.ok_or_else(|| AppError::no_data("Offline mode and no cached dataset."))?;
            info!(rows = entry.data.len(), "offline: using cached dataset");
            deliver(&Dataset::from_entry(entry, Origin::FallbackCache));
            return Ok(LoadOutcome::Loaded(Origin::FallbackCache));
        }

        match self.fetch_and_store(now) {
            Ok(dataset) => {
                deliver(&dataset);
                Ok(LoadOutcome::Loaded(Origin::Network))
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(error = %e, "fetch failed; falling back to cached dataset");
                    deliver(&Dataset::from_entry(entry, Origin::FallbackCache));
                    Ok(LoadOutcome::Loaded(Origin::FallbackCache))
                }
                None => Err(e),
            },
        }
    }

    fn serve_cached<C>(&self, entry: CacheEntry, now: DateTime<Utc>, deliver: &mut C) -> LoadOutcome
    where
        C: FnMut(&Dataset),
    {
        if !entry.is_stale(now, self.ttl) {
            info!(rows = entry.data.len(), fetched_at = %entry.timestamp, "using fresh cached dataset");
            deliver(&Dataset::from_entry(entry, Origin::FreshCache));
            return LoadOutcome::Loaded(Origin::FreshCache);
        }

        info!(fetched_at = %entry.timestamp, "cached dataset is stale; showing it while refreshing");
        deliver(&Dataset::from_entry(entry, Origin::StaleCache));
        if self.offline {
            return LoadOutcome::Loaded(Origin::StaleCache);
        }

        match self.fetch_and_store(now) {
            Ok(dataset) => {
                deliver(&dataset);
                LoadOutcome::Loaded(Origin::Network)
            }
            Err(e) => {
                warn!(error = %e, "refresh failed; keeping stale dataset");
                LoadOutcome::Loaded(Origin::StaleCache)
            }
        }
    }

    fn fetch_and_store(&self, now: DateTime<Utc>) -> Result<Dataset, AppError> {
        let text = self.source.fetch_csv()?;
        let records = parse_csv(&text, &self.options);
        if records.is_empty() {
            return Err(AppError::no_data("Downloaded dataset has no rows."));
        }

        let entry = CacheEntry::new(records, self.options.needed.clone(), now);
        if let Err(e) = self.cache.set(&entry) {
            warn!(error = %e, "failed to write dataset cache");
        }
        Ok(Dataset::from_entry(entry, Origin::Network))
    }
}

/// Holds the in-flight flag for the duration of a load.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex};

    use super::*;
    use crate::io::cache::MemoryStore;

    const CSV: &str = "date,location,new_cases\n2020-09-01,Serbia,10\n2020-09-02,Serbia,20\n";

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<String, AppError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<String, AppError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CsvSource for ScriptedSource {
        fn fetch_csv(&self) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::io("no scripted response")))
        }
    }

    fn options() -> ParseOptions {
        ParseOptions::new(vec!["date".into(), "location".into(), "new_cases".into()])
    }

    fn loader(source: ScriptedSource) -> DatasetLoader<MemoryStore, ScriptedSource> {
        DatasetLoader::new(Cache::new(MemoryStore::new()), source, options(), TimeDelta::hours(1))
    }

    fn seed_cache<F: CsvSource>(loader: &DatasetLoader<MemoryStore, F>, age: TimeDelta, now: DateTime<Utc>) {
        let records = parse_csv("date,location,new_cases\n2020-08-01,Serbia,5\n", &options());
        let entry = CacheEntry::new(records, options().needed, now - age);
        loader.cache().set(&entry).unwrap();
    }

    fn collect<S: KeyValueStore, F: CsvSource>(
        loader: &DatasetLoader<S, F>,
        now: DateTime<Utc>,
    ) -> (Result<LoadOutcome, AppError>, Vec<(Origin, usize)>) {
        let mut seen = Vec::new();
        let outcome = loader.load(now, |d| seen.push((d.origin, d.records.len())));
        (outcome, seen)
    }

    #[test]
    fn empty_cache_fetches_and_stores() {
        let now = Utc::now();
        let loader = loader(ScriptedSource::new(vec![Ok(CSV.to_string())]));

        let (outcome, seen) = collect(&loader, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::Network));
        assert_eq!(seen, vec![(Origin::Network, 2)]);

        let stored = loader.cache().get().unwrap();
        assert_eq!(stored.timestamp, now);
        assert_eq!(stored.latest_date, NaiveDate::from_ymd_opt(2020, 9, 2));
    }

    #[test]
    fn fresh_cache_skips_the_network() {
        let now = Utc::now();
        let loader = loader(ScriptedSource::new(vec![]));
        seed_cache(&loader, TimeDelta::minutes(10), now);

        let (outcome, seen) = collect(&loader, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::FreshCache));
        assert_eq!(seen, vec![(Origin::FreshCache, 1)]);
        assert_eq!(loader.source.calls(), 0);
    }

    #[test]
    fn stale_cache_is_shown_then_refreshed() {
        let now = Utc::now();
        let loader = loader(ScriptedSource::new(vec![Ok(CSV.to_string())]));
        seed_cache(&loader, TimeDelta::hours(2), now);

        let (outcome, seen) = collect(&loader, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::Network));
        assert_eq!(seen, vec![(Origin::StaleCache, 1), (Origin::Network, 2)]);
        assert_eq!(loader.cache().get().unwrap().data.len(), 2);
    }

    #[test]
    fn failed_refresh_keeps_stale_data() {
        let now = Utc::now();
        let loader = loader(ScriptedSource::new(vec![Err(AppError::io("offline"))]));
        seed_cache(&loader, TimeDelta::hours(2), now);

        let (outcome, seen) = collect(&loader, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::StaleCache));
        assert_eq!(seen, vec![(Origin::StaleCache, 1)]);
        assert_eq!(loader.cache().get().unwrap().timestamp, now - TimeDelta::hours(2));
    }

    #[test]
    fn failed_fetch_without_cache_is_an_error() {
        let loader = loader(ScriptedSource::new(vec![Err(AppError::io("down"))]));
        let (outcome, seen) = collect(&loader, Utc::now());
        assert_eq!(outcome.unwrap_err().exit_code(), 4);
        assert!(seen.is_empty());
    }

    #[test]
    fn forced_refresh_falls_back_to_cache() {
        let now = Utc::now();
        let loader = loader(ScriptedSource::new(vec![Err(AppError::io("down"))])).force_refresh(true);
        seed_cache(&loader, TimeDelta::minutes(1), now);

        let (outcome, seen) = collect(&loader, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::FallbackCache));
        assert_eq!(seen, vec![(Origin::FallbackCache, 1)]);
        assert_eq!(loader.source.calls(), 1);
    }

    #[test]
    fn empty_download_does_not_overwrite_cache() {
        let now = Utc::now();
        let loader = loader(ScriptedSource::new(vec![Ok(String::new())])).force_refresh(true);
        seed_cache(&loader, TimeDelta::minutes(1), now);

        let (outcome, _) = collect(&loader, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::FallbackCache));
        assert_eq!(loader.cache().get().unwrap().data.len(), 1);
    }

    #[test]
    fn offline_uses_any_cache_or_fails() {
        let now = Utc::now();
        let empty = loader(ScriptedSource::new(vec![])).offline(true);
        assert_eq!(collect(&empty, now).0.unwrap_err().exit_code(), 3);

        let seeded = loader(ScriptedSource::new(vec![])).offline(true);
        seed_cache(&seeded, TimeDelta::days(3), now);
        let (outcome, seen) = collect(&seeded, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::StaleCache));
        assert_eq!(seen, vec![(Origin::StaleCache, 1)]);
        assert_eq!(seeded.source.calls(), 0);
    }

    #[test]
    fn entry_missing_columns_triggers_fetch() {
        let now = Utc::now();
        let loader = loader(ScriptedSource::new(vec![Ok(CSV.to_string())]));
        let entry = CacheEntry::new(vec![], vec!["date".into(), "location".into()], now);
        loader.cache().set(&entry).unwrap();

        let (outcome, _) = collect(&loader, now);
        assert_eq!(outcome.unwrap(), LoadOutcome::Loaded(Origin::Network));
        assert_eq!(loader.source.calls(), 1);
    }

    struct BlockingSource {
        started: Barrier,
        release: Barrier,
    }

    impl CsvSource for BlockingSource {
        fn fetch_csv(&self) -> Result<String, AppError> {
            self.started.wait();
            self.release.wait();
            Ok(CSV.to_string())
        }
    }

    #[test]
    fn concurrent_trigger_is_rejected_while_fetching() {
        let source = BlockingSource {
            started: Barrier::new(2),
            release: Barrier::new(2),
        };
        let loader = DatasetLoader::new(Cache::new(MemoryStore::new()), source, options(), TimeDelta::hours(1));
        let now = Utc::now();

        std::thread::scope(|s| {
            let first = s.spawn(|| loader.load(now, |_| {}));

            loader.source.started.wait();
            assert!(loader.is_in_flight());
            let mut delivered = false;
            let second = loader.load(now, |_| delivered = true).unwrap();
            assert_eq!(second, LoadOutcome::InFlight);
            assert!(!delivered);

            loader.source.release.wait();
            let first = first.join().unwrap().unwrap();
            assert_eq!(first, LoadOutcome::Loaded(Origin::Network));
        });

        assert!(!loader.is_in_flight());
    }
}
