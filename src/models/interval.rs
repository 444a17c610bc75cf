use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Movement between two consecutive located records of one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicSample {
    /// Timeline position of the earlier record
    pub from_index: usize,
    /// Timeline position of the later record; the sample "ends" here
    pub to_index: usize,
    pub distance_km: f64,
    pub elapsed_hours: f64,
    pub speed_kmh: f64,
    /// Coarse pre-flag: clearly impossible single hop
    pub is_anomalous: bool,
}

/// Verdict for one non-empty time window of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalResult {
    pub device_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub estimated_state: String,
    pub states_observed: Vec<String>,
    pub record_count: usize,
    pub max_distance_km: f64,
    pub max_speed_kmh: f64,
    pub confidence_percentage: f64,
    pub is_tower_jump: bool,
    pub anomalous_samples: usize,
}
