use serde::{Deserialize, Serialize};

use crate::models::{IntervalResult, UNKNOWN_STATE};

/// Run-level rollup carried by the `completion` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_intervals: usize,
    pub tower_jump_intervals: usize,
    pub tower_jump_percentage: f64,
    pub most_common_state: String,
    /// Mean of `confidence_percentage`, so also 0..=100
    pub average_confidence: f64,
    /// Distinct estimated states, first appearance first
    pub states_observed: Vec<String>,
}

pub fn jump_percentage(jumps: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        jumps as f64 / total as f64 * 100.0
    }
}

pub fn summarize(intervals: &[IntervalResult]) -> AnalysisSummary {
    let total_intervals = intervals.len();
    let tower_jump_intervals = intervals.iter().filter(|i| i.is_tower_jump).count();

    let mut frequency: Vec<(&str, usize)> = Vec::new();
    for interval in intervals {
        let state = interval.estimated_state.as_str();
        if state == UNKNOWN_STATE {
            continue;
        }
        match frequency.iter_mut().find(|(s, _)| *s == state) {
            Some((_, count)) => *count += 1,
            None => frequency.push((state, 1)),
        }
    }

    let most_common_state = frequency
        .iter()
        .fold(None::<(&str, usize)>, |best, &(state, count)| match best {
            Some((_, c)) if c >= count => best,
            _ => Some((state, count)),
        })
        .map_or(UNKNOWN_STATE, |(state, _)| state)
        .to_string();

    let average_confidence = if total_intervals == 0 {
        0.0
    } else {
        intervals
            .iter()
            .map(|i| i.confidence_percentage)
            .sum::<f64>()
            / total_intervals as f64
    };

    AnalysisSummary {
        total_intervals,
        tower_jump_intervals,
        tower_jump_percentage: jump_percentage(tower_jump_intervals, total_intervals),
        most_common_state,
        average_confidence,
        states_observed: frequency.iter().map(|(s, _)| s.to_string()).collect(),
    }
}
