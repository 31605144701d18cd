//! Input/output helpers.
//!
//! - CSV ingest (`ingest`)
//! - dataset cache over a key-value store (`cache`)
//! - chart JSON read/write (`chart`)
//! - long-form CSV export (`export`)

pub mod cache;
pub mod chart;
pub mod export;
pub mod ingest;

pub use cache::*;
pub use chart::*;
pub use export::*;
pub use ingest::*;
