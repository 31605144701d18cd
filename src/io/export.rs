//! Export chart series to a long-form CSV.
//!
//! One row per point: `chart,location,visible,date,value`. Gap points keep
//! their row with empty `date` and `value` so row positions still line up
//! with the chart's x labels.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{ChartData, SeriesPoint};
use crate::error::AppError;

/// Write every dataset of every chart to a CSV file.
pub fn write_series_csv(path: &Path, charts: &[ChartData]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    write_series(&mut file, charts)
        .map_err(|e| AppError::io(format!("Failed to write export CSV: {e}")))
}

fn write_series<W: Write>(out: &mut W, charts: &[ChartData]) -> std::io::Result<()> {
    writeln!(out, "chart,location,visible,date,value")?;

    for chart in charts {
        for dataset in &chart.datasets {
            for point in &dataset.points {
                let (date, value) = match point {
                    SeriesPoint::Value { x, y } => (x.to_string(), format!("{y:.6}")),
                    SeriesPoint::Skip => (String::new(), String::new()),
                };
                writeln!(
                    out,
                    "{},{},{},{},{}",
                    chart.title.replace(',', ";"),
                    dataset.label,
                    dataset.visible,
                    date,
                    value
                )?;
            }
        }
    }

    Ok(())
}
