//! Dataset transformation stages.
//!
//! Records flow one way through these stages, each returning a new sequence:
//!
//! `filter` (allow-list + date cutoff) -> `group` (per-country, positional
//! chunks) -> `metric` (one value or a gap per chunk) -> `series` (chart points)

pub mod filter;
pub mod group;
pub mod metric;
pub mod series;

pub use filter::*;
pub use group::*;
pub use metric::*;
pub use series::*;
