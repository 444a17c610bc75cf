//! Run orchestration: the pull-based event iterator and its async relay.

pub mod controller;
pub mod orchestrator;
pub mod state;
pub mod stream;

pub use controller::{StreamController, DEFAULT_STREAM_CAPACITY};
pub use orchestrator::{AnalysisRun, RunContext};
pub use state::RunState;
pub use stream::{relay_events, RelayOutcome, StopReason};
