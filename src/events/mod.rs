//! Typed progress and result events produced by an analysis run.
//!
//! Every consumer (the JSON-lines binary, a network relay, tests) sees the
//! same `{type, timestamp, message, data}` shape.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::detection::{AnalysisSummary, DataStats, JumpTransition};
use crate::error::AnalysisError;
use crate::models::IntervalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DataLoading,
    Processing,
    WindowCreation,
    AnalysisProgress,
    IntervalCompleted,
    TowerJumpDetected,
    Completion,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DataLoading => "data_loading",
            EventType::Processing => "processing",
            EventType::WindowCreation => "window_creation",
            EventType::AnalysisProgress => "analysis_progress",
            EventType::IntervalCompleted => "interval_completed",
            EventType::TowerJumpDetected => "tower_jump_detected",
            EventType::Completion => "completion",
            EventType::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    DataframeConversion,
    DistanceCalculation,
    AnomalyDetection,
    WindowCreation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataLoadingData {
    pub total_records: usize,
    pub records_with_location: usize,
    pub rejected_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingData {
    pub step: ProcessingStep,
    pub progress: f64,
    pub detail: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowCreationData {
    pub window_count: usize,
    pub window_size_minutes: u32,
    pub device_count: usize,
    pub empty_windows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisProgressData {
    pub current_window: usize,
    pub total_windows: usize,
    pub progress_percentage: f64,
    pub estimated_state: String,
    pub is_tower_jump: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TowerJumpData {
    pub device_id: String,
    pub from_location: String,
    pub to_location: String,
    pub confidence: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionData {
    pub total_intervals: usize,
    pub tower_jumps_detected: usize,
    pub tower_jump_percentage: f64,
    pub summary: AnalysisSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorData {
    pub error_type: String,
    pub error_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    DataLoading(DataLoadingData),
    Processing(ProcessingData),
    WindowCreation(WindowCreationData),
    AnalysisProgress(AnalysisProgressData),
    IntervalCompleted(IntervalResult),
    TowerJumpDetected(TowerJumpData),
    Completion(CompletionData),
    Error(ErrorData),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub data: EventData,
}

impl AnalysisEvent {
    fn new(kind: EventType, message: impl Into<String>, data: EventData) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            message: message.into(),
            data,
        }
    }

    pub fn data_loading(stats: &DataStats) -> Self {
        Self::new(
            EventType::DataLoading,
            format!(
                "Loaded {} records ({} with location)",
                stats.total_records, stats.records_with_location
            ),
            EventData::DataLoading(DataLoadingData {
                total_records: stats.total_records,
                records_with_location: stats.records_with_location,
                rejected_records: stats.rejected.rejected_rows(),
            }),
        )
    }

    pub fn processing(step: ProcessingStep, message: impl Into<String>, detail: Value) -> Self {
        Self::new(
            EventType::Processing,
            message,
            EventData::Processing(ProcessingData {
                step,
                progress: 100.0,
                detail,
            }),
        )
    }

    pub fn window_creation(data: WindowCreationData) -> Self {
        Self::new(
            EventType::WindowCreation,
            format!("Created {} time windows", data.window_count),
            EventData::WindowCreation(data),
        )
    }

    pub fn analysis_progress(current: usize, total: usize, result: &IntervalResult) -> Self {
        let progress_percentage = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self::new(
            EventType::AnalysisProgress,
            format!(
                "Analyzed window {}/{}: {}",
                current, total, result.estimated_state
            ),
            EventData::AnalysisProgress(AnalysisProgressData {
                current_window: current,
                total_windows: total,
                progress_percentage,
                estimated_state: result.estimated_state.clone(),
                is_tower_jump: result.is_tower_jump,
            }),
        )
    }

    pub fn interval_completed(result: IntervalResult) -> Self {
        Self::new(
            EventType::IntervalCompleted,
            format!(
                "Completed interval {} - {}",
                result.start_time.format("%H:%M"),
                result.end_time.format("%H:%M")
            ),
            EventData::IntervalCompleted(result),
        )
    }

    pub fn tower_jump_detected(result: &IntervalResult, transition: JumpTransition) -> Self {
        Self::new(
            EventType::TowerJumpDetected,
            format!(
                "Tower jump for {}: {} -> {}",
                result.device_id, transition.from_location, transition.to_location
            ),
            EventData::TowerJumpDetected(TowerJumpData {
                device_id: result.device_id.clone(),
                from_location: transition.from_location,
                to_location: transition.to_location,
                confidence: result.confidence_percentage,
                start_time: result.start_time,
                end_time: result.end_time,
            }),
        )
    }

    pub fn completion(summary: AnalysisSummary) -> Self {
        Self::new(
            EventType::Completion,
            "Analysis completed successfully",
            EventData::Completion(CompletionData {
                total_intervals: summary.total_intervals,
                tower_jumps_detected: summary.tower_jump_intervals,
                tower_jump_percentage: summary.tower_jump_percentage,
                summary,
            }),
        )
    }

    pub fn error(err: &AnalysisError) -> Self {
        Self::new(
            EventType::Error,
            err.to_string(),
            EventData::Error(ErrorData {
                error_type: err.error_type().to_string(),
                error_details: err.details(),
            }),
        )
    }

    /// Nothing follows a `completion` or `error` event.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventType::Completion | EventType::Error)
    }

    pub fn interval(&self) -> Option<&IntervalResult> {
        match &self.data {
            EventData::IntervalCompleted(result) => Some(result),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn result() -> IntervalResult {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap();
        IntervalResult {
            device_id: "D1".into(),
            start_time: start,
            end_time: start + Duration::minutes(15),
            estimated_state: "NY".into(),
            states_observed: vec!["NY".into(), "NJ".into()],
            record_count: 2,
            max_distance_km: 80.0,
            max_speed_kmh: 4800.0,
            confidence_percentage: 2.7,
            is_tower_jump: true,
            anomalous_samples: 1,
        }
    }

    #[test]
    fn serializes_type_message_and_payload() {
        let event = AnalysisEvent::analysis_progress(1, 3, &result());
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "analysis_progress");
        assert_eq!(value["message"], "Analyzed window 1/3: NY");
        assert_eq!(value["data"]["current_window"], 1);
        assert_eq!(value["data"]["total_windows"], 3);
        assert_eq!(value["data"]["progress_percentage"], 33.3);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn tower_jump_payload_carries_transition() {
        let event = AnalysisEvent::tower_jump_detected(
            &result(),
            JumpTransition {
                from_location: "NY".into(),
                to_location: "NJ".into(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], EventType::TowerJumpDetected.as_str());
        assert_eq!(value["data"]["device_id"], "D1");
        assert_eq!(value["data"]["from_location"], "NY");
        assert_eq!(value["data"]["to_location"], "NJ");
        assert_eq!(value["data"]["confidence"], 2.7);
    }

    #[test]
    fn error_event_is_terminal() {
        let event = AnalysisEvent::error(&AnalysisError::NoLocatedRecords { total_records: 2 });
        let value = serde_json::to_value(&event).unwrap();

        assert!(event.is_terminal());
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["error_type"], "NO_LOCATED_RECORDS");
        assert!(value["message"]
            .as_str()
            .unwrap()
            .starts_with("No records with location data found"));
    }

    #[test]
    fn processing_step_names() {
        let event = AnalysisEvent::processing(
            ProcessingStep::DataframeConversion,
            "Grouped records",
            serde_json::json!({ "devices": 1 }),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["step"], "dataframe_conversion");
        assert_eq!(value["data"]["progress"], 100.0);
        assert_eq!(value["data"]["detail"]["devices"], 1);
        assert!(!event.is_terminal());
    }
}
