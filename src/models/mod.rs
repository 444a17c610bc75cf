pub mod interval;
pub mod record;

pub use interval::{IntervalResult, KinematicSample};
pub use record::{LocationRecord, RawRow};

/// State label used when no record in a window carries one.
pub const UNKNOWN_STATE: &str = "Unknown";
