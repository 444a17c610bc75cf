//! Tower jump detection for carrier location records.
//!
//! Raw rows go in; an [`AnalysisRun`] turns them into a lazy sequence of
//! [`AnalysisEvent`]s ending in either a `completion` or an `error` event.

pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod export;
pub mod models;
pub mod pipeline;
mod utils;

pub use config::AnalysisConfig;
pub use detection::AnalysisSummary;
pub use error::{AnalysisError, ConfigError};
pub use events::{AnalysisEvent, EventData, EventType};
pub use export::{read_export, summarize_export, write_export, ExportRow, ExportSummary};
pub use models::{IntervalResult, LocationRecord, RawRow};
pub use pipeline::{AnalysisRun, RelayOutcome, RunState, StopReason, StreamController};

/// Initialize logging (reads RUST_LOG env var). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
