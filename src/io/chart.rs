//! Read/write chart JSON files.
//!
//! Chart JSON is what an external renderer consumes: one object per chart
//! holding the title, the metric definition, the newest data date and one
//! dataset per country (`label`, `visible`, `points`). Gaps are encoded as
//! `{"x": null, "y": null}`.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::ChartData;
use crate::error::AppError;

/// A file holding every chart of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartFile {
    pub tool: String,
    pub charts: Vec<ChartData>,
}

/// Write all charts to a JSON file.
pub fn write_charts_json(path: &Path, charts: &[ChartData]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create chart JSON '{}': {e}", path.display())))?;

    let out = ChartFile {
        tool: "trends".to_string(),
        charts: charts.to_vec(),
    };

    serde_json::to_writer_pretty(file, &out)
        .map_err(|e| AppError::io(format!("Failed to write chart JSON: {e}")))?;

    Ok(())
}

/// Read a chart JSON file.
pub fn read_charts_json(path: &Path) -> Result<ChartFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open chart JSON '{}': {e}", path.display())))?;
    let charts: ChartFile =
        serde_json::from_reader(file).map_err(|e| AppError::config(format!("Invalid chart JSON: {e}")))?;
    Ok(charts)
}
