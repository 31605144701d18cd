//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parsed dataset rows (`Record`) and chart output (`SeriesPoint`, `CountrySeries`, `ChartData`)
//! - metric configuration (`MetricKind`, `Bucketing`, `Preset`)
//! - the built-in population table (`countries`)

pub mod countries;
pub mod types;

pub use countries::*;
pub use types::*;
