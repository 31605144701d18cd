//! Dataset acquisition: the HTTP source and the cache-aware loader.

pub mod loader;
pub mod owid;

pub use loader::{Dataset, DatasetLoader, LoadOutcome, Origin};
pub use owid::{CsvSource, DEFAULT_DATA_URL, OwidClient};
