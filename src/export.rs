//! Flat, comma-separated rendering of interval results.

use std::io::{Read, Write};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::detection::summary::jump_percentage;
use crate::models::IntervalResult;

pub const EXPORT_COLUMNS: [&str; 9] = [
    "start_time",
    "end_time",
    "estimated_state",
    "is_tower_jump",
    "confidence_percentage",
    "record_count",
    "states_observed",
    "max_distance_km",
    "max_speed_kmh",
];

/// One exported interval, every field already formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub start_time: String,
    pub end_time: String,
    pub estimated_state: String,
    pub is_tower_jump: String,
    pub confidence_percentage: String,
    pub record_count: String,
    pub states_observed: String,
    pub max_distance_km: String,
    pub max_speed_kmh: String,
}

/// Totals recomputed from exported rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub total_intervals: usize,
    pub tower_jump_intervals: usize,
    pub tower_jump_percentage: f64,
}

fn format_measure(value: f64) -> String {
    if value == 0.0 {
        String::new()
    } else {
        format!("{:.2}", value)
    }
}

impl From<&IntervalResult> for ExportRow {
    fn from(result: &IntervalResult) -> Self {
        Self {
            start_time: result.start_time.to_rfc3339(),
            end_time: result.end_time.to_rfc3339(),
            estimated_state: result.estimated_state.clone(),
            is_tower_jump: if result.is_tower_jump { "yes" } else { "no" }.to_string(),
            confidence_percentage: format!("{:.1}%", result.confidence_percentage),
            record_count: result.record_count.to_string(),
            states_observed: result.states_observed.join("|"),
            max_distance_km: format_measure(result.max_distance_km),
            max_speed_kmh: format_measure(result.max_speed_kmh),
        }
    }
}

impl ExportRow {
    pub fn is_tower_jump(&self) -> bool {
        self.is_tower_jump == "yes"
    }
}

/// Write a header line and one record per result, in the order given.
pub fn write_export<W: Write>(writer: W, results: &[IntervalResult]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer
        .write_record(EXPORT_COLUMNS)
        .context("Failed to write export header")?;
    for result in results {
        let row = ExportRow::from(result);
        csv_writer
            .serialize(&row)
            .with_context(|| format!("Failed to write interval starting {}", row.start_time))?;
    }
    csv_writer.flush().context("Failed to flush export")?;
    Ok(())
}

/// Parse text produced by [`write_export`] back into rows.
pub fn read_export<R: Read>(reader: R) -> Result<Vec<ExportRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader
        .headers()
        .context("Failed to read export header")?;
    if headers.iter().ne(EXPORT_COLUMNS) {
        let found: Vec<&str> = headers.iter().collect();
        bail!("Unexpected export header: {}", found.join(","));
    }

    let mut rows = Vec::new();
    for (number, record) in csv_reader.deserialize::<ExportRow>().enumerate() {
        let row = record.with_context(|| format!("Malformed export record {}", number + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn summarize_export(rows: &[ExportRow]) -> ExportSummary {
    let total_intervals = rows.len();
    let tower_jump_intervals = rows.iter().filter(|r| r.is_tower_jump()).count();
    ExportSummary {
        total_intervals,
        tower_jump_intervals,
        tower_jump_percentage: jump_percentage(tower_jump_intervals, total_intervals),
    }
}
