//! Dataset loading for the training command.
//!
//! The bundled Iris table ships inside the binary; custom tables use the same
//! layout: a header row, four numeric columns, then a species label.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::common::error::{ServeError, ServeResult};

use super::domain::{Dataset, Species, N_FEATURES};

const IRIS_CSV: &str = include_str!("iris.csv");

/// The 150-sample Iris dataset.
pub fn iris() -> ServeResult<Dataset> {
    parse_csv(IRIS_CSV.as_bytes())
}

/// Load a dataset from a CSV file on disk.
pub fn load_csv(path: &Path) -> ServeResult<Dataset> {
    let file = File::open(path)?;
    let dataset = parse_csv(BufReader::new(file))?;
    debug!(path = %path.display(), rows = dataset.len(), "dataset loaded");
    Ok(dataset)
}

/// Parse CSV rows from any buffered reader. The first line is a header.
pub fn parse_csv<R: BufRead>(reader: R) -> ServeResult<Dataset> {
    let mut dataset = Dataset::default();

    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line_no = idx + 1;
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols.len() != N_FEATURES + 1 {
            return Err(ServeError::invalid(format!(
                "line {line_no}: expected {} columns, got {}",
                N_FEATURES + 1,
                cols.len()
            )));
        }

        let mut row = [0.0; N_FEATURES];
        for (slot, raw) in row.iter_mut().zip(&cols[..N_FEATURES]) {
            *slot = raw
                .parse()
                .map_err(|_| ServeError::invalid(format!("line {line_no}: bad number '{raw}'")))?;
        }

        let species = Species::parse(cols[N_FEATURES]).ok_or_else(|| {
            ServeError::invalid(format!(
                "line {line_no}: unknown species '{}'",
                cols[N_FEATURES]
            ))
        })?;

        dataset.push(row, species.index());
    }

    if dataset.is_empty() {
        return Err(ServeError::invalid("dataset has no rows"));
    }
    Ok(dataset)
}
