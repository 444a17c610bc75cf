use serde::Serialize;

use crate::config::{kmh_to_mph, AnalysisConfig};
use crate::detection::kinematics::DeviceKinematics;
use crate::detection::windowing::TimeWindow;
use crate::models::{IntervalResult, KinematicSample, LocationRecord, UNKNOWN_STATE};

// Per-window detail is too noisy for normal runs
const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// Where a detected jump appears to go, for the `tower_jump_detected` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JumpTransition {
    pub from_location: String,
    pub to_location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowVerdict {
    pub result: IntervalResult,
    /// Present only when `result.is_tower_jump`
    pub transition: Option<JumpTransition>,
}

/// State labels in order of first appearance, with their record counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateTally {
    entries: Vec<(String, usize)>,
}

impl StateTally {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a LocationRecord>) -> Self {
        let mut tally = Self::default();
        for state in records.into_iter().filter_map(|r| r.state.as_deref()) {
            match tally.entries.iter_mut().find(|(s, _)| s == state) {
                Some((_, count)) => *count += 1,
                None => tally.entries.push((state.to_string(), 1)),
            }
        }
        tally
    }

    /// Highest count wins; ties go to the label seen first.
    pub fn dominant(&self) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (state, count) in &self.entries {
            if best.map_or(true, |(_, c)| *count > c) {
                best = Some((state.as_str(), *count));
            }
        }
        best
    }

    pub fn states(&self) -> Vec<String> {
        self.entries.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Share of the window's records agreeing with the dominant state, in percent.
fn score_state_agreement(matching: usize, record_count: usize) -> f64 {
    if record_count == 0 {
        return 0.0;
    }
    100.0 * matching as f64 / record_count as f64
}

/// Scale confidence down by how far the fastest hop overshoots the limit.
fn apply_speed_penalty(confidence: f64, observed_mph: f64, limit_mph: f64) -> f64 {
    if observed_mph > limit_mph {
        confidence * (limit_mph / observed_mph)
    } else {
        confidence
    }
}

/// Produce the verdict for one non-empty window.
///
/// `timeline` is the device's full time-ordered record list; `window` refers
/// into it by position, and so do the samples in `kinematics`.
pub fn analyze_window(
    device_id: &str,
    window: &TimeWindow,
    timeline: &[LocationRecord],
    kinematics: &DeviceKinematics,
    config: &AnalysisConfig,
) -> WindowVerdict {
    let record_count = window.record_count();
    let tally = StateTally::from_records(
        window
            .record_indices
            .iter()
            .filter_map(|&i| timeline.get(i)),
    );

    let (estimated_state, matching) = match tally.dominant() {
        Some((state, count)) => (state.to_string(), count),
        None => (UNKNOWN_STATE.to_string(), 0),
    };
    let states_observed = if tally.is_empty() {
        vec![UNKNOWN_STATE.to_string()]
    } else {
        tally.states()
    };

    let mut max_distance_km = 0.0_f64;
    let mut fastest: Option<&KinematicSample> = None;
    let mut anomalous_samples = 0;
    for sample in kinematics.ending_in(&window.record_indices) {
        max_distance_km = max_distance_km.max(sample.distance_km);
        if fastest.map_or(true, |f| sample.speed_kmh > f.speed_kmh) {
            fastest = Some(sample);
        }
        if sample.is_anomalous {
            anomalous_samples += 1;
        }
    }
    let max_speed_kmh = fastest.map_or(0.0, |s| s.speed_kmh);
    let observed_mph = kmh_to_mph(max_speed_kmh);

    let confidence_percentage = apply_speed_penalty(
        score_state_agreement(matching, record_count),
        observed_mph,
        config.max_speed_mph,
    )
    .clamp(0.0, 100.0);

    let speed_violation = observed_mph > config.max_speed_mph;
    let low_confidence_multi_state =
        tally.len() > 1 && confidence_percentage / 100.0 <= config.confidence_threshold;
    let is_tower_jump = speed_violation || low_confidence_multi_state;

    log_debug!(
        "window {} [{}]: state={} confidence={:.1} max_speed_kmh={:.1} jump={}",
        device_id,
        window.start_time,
        estimated_state,
        confidence_percentage,
        max_speed_kmh,
        is_tower_jump
    );

    let transition = if !is_tower_jump {
        None
    } else if speed_violation {
        let endpoint_state = |index: usize| {
            timeline
                .get(index)
                .and_then(|r| r.state.clone())
                .unwrap_or_else(|| estimated_state.clone())
        };
        fastest.map(|s| JumpTransition {
            from_location: endpoint_state(s.from_index),
            to_location: endpoint_state(s.to_index),
        })
    } else {
        let other = states_observed
            .iter()
            .find(|s| **s != estimated_state)
            .cloned()
            .unwrap_or_else(|| estimated_state.clone());
        Some(JumpTransition {
            from_location: estimated_state.clone(),
            to_location: other,
        })
    };

    WindowVerdict {
        result: IntervalResult {
            device_id: device_id.to_string(),
            start_time: window.start_time,
            end_time: window.end_time,
            estimated_state,
            states_observed,
            record_count,
            max_distance_km,
            max_speed_kmh,
            confidence_percentage,
            is_tower_jump,
            anomalous_samples,
        },
        transition,
    }
}
