use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ConfigError;

pub const KM_PER_MILE: f64 = 1.60934;

/// Tunable thresholds for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of each time window (1..=1440)
    pub time_window_minutes: u32,

    /// Fastest plausible travel speed; anything above is a jump (1.0..=200.0)
    pub max_speed_mph: f64,

    /// Multi-state windows at or below this confidence are jumps (0.0..=1.0)
    pub confidence_threshold: f64,

    /// Coarse pre-flag: a hop longer than this...
    pub min_jump_distance_km: f64,

    /// ...completed in less than this many minutes is flagged as anomalous
    pub min_movement_minutes: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_window_minutes: 15,
            max_speed_mph: 80.0,
            confidence_threshold: 0.5,
            min_jump_distance_km: 5.0,
            min_movement_minutes: 6.0,
        }
    }
}

impl AnalysisConfig {
    /// Load a config from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: AnalysisConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(1..=1440).contains(&self.time_window_minutes) {
            return Err(ConfigError::WindowMinutes(self.time_window_minutes));
        }
        // NaN fails every range check below
        if !(1.0..=200.0).contains(&self.max_speed_mph) {
            return Err(ConfigError::MaxSpeed(self.max_speed_mph));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceThreshold(self.confidence_threshold));
        }
        for (name, value) in [
            ("min_jump_distance_km", self.min_jump_distance_km),
            ("min_movement_minutes", self.min_movement_minutes),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Tunable { name, value });
            }
        }
        Ok(())
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_mph * KM_PER_MILE
    }

    pub fn window_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.time_window_minutes))
    }

    pub fn min_movement_hours(&self) -> f64 {
        self.min_movement_minutes / 60.0
    }
}

pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh / KM_PER_MILE
}
