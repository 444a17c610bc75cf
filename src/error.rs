//! Error types for configuration and analysis runs.

use thiserror::Error;

/// An `AnalysisConfig` value outside its accepted range.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("time_window_minutes must be between 1 and 1440, got {0}")]
    WindowMinutes(u32),

    #[error("max_speed_mph must be between 1.0 and 200.0, got {0}")]
    MaxSpeed(f64),

    #[error("confidence_threshold must be between 0.0 and 1.0, got {0}")]
    ConfidenceThreshold(f64),

    #[error("{name} must be a finite, non-negative number, got {value}")]
    Tunable { name: &'static str, value: f64 },
}

/// A fatal failure that ends an analysis run with an `error` event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("No usable data: none of the {total_rows} input rows produced a valid record")]
    NoRecords { total_rows: usize },

    #[error("No records with location data found ({total_records} valid records)")]
    NoLocatedRecords { total_records: usize },

    #[error("Window range for device {device_id} cannot be represented")]
    WindowOverflow { device_id: String },

    #[error("Analysis failed: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Stable identifier carried in the `error` event payload.
    pub fn error_type(&self) -> &'static str {
        match self {
            AnalysisError::NoRecords { .. } => "NO_RECORDS",
            AnalysisError::NoLocatedRecords { .. } => "NO_LOCATED_RECORDS",
            AnalysisError::WindowOverflow { .. } => "WINDOW_OVERFLOW",
            AnalysisError::Internal(_) => "INTERNAL",
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            AnalysisError::NoLocatedRecords { .. } => {
                Some("All records are missing latitude/longitude coordinates".to_string())
            }
            AnalysisError::Internal(details) => Some(details.clone()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
