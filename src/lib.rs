//! `covid-trends` library crate.
//!
//! The binary (`trends`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes or touching the network
//! - the chart output can feed other renderers
//!
//! Flow: `data` (cache + download) -> `io::ingest` (CSV) -> `transform`
//! (filter, group, derive, series) -> `io::chart` / `io::export` / `report`.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod report;
pub mod transform;
pub mod view;
