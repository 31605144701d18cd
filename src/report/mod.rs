//! Terminal reporting: run summaries, per-country tables and cache status.

pub mod format;

pub use format::*;
