pub mod kinematics;
pub mod normalize;
pub mod scoring;
pub mod summary;
pub mod windowing;

pub use kinematics::{compute_kinematics, flag_anomalies, haversine_km, DeviceKinematics};
pub use normalize::{normalize_rows, DataStats, NormalizedData};
pub use scoring::{analyze_window, JumpTransition, WindowVerdict};
pub use summary::{summarize, AnalysisSummary};
pub use windowing::{build_device_windows, chronological_order, DeviceWindows, TimeWindow};
