use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};

use tower_jumps::{
    AnalysisConfig, AnalysisEvent, AnalysisRun, ConfigError, EventData, EventType, IntervalResult,
    RawRow,
};

fn row(device: &str, minute_offset: i64, state: &str, lat: f64, lon: f64) -> RawRow {
    let ts = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minute_offset);
    RawRow::new()
        .with("device_id", device)
        .with("timestamp", ts.to_rfc3339())
        .with("state", state)
        .with("latitude", lat.to_string())
        .with("longitude", lon.to_string())
}

fn run_events(rows: Vec<RawRow>, config: AnalysisConfig) -> Vec<AnalysisEvent> {
    AnalysisRun::new(rows, config).unwrap().collect()
}

fn intervals(events: &[AnalysisEvent]) -> Vec<&IntervalResult> {
    events.iter().filter_map(AnalysisEvent::interval).collect()
}

#[test]
fn scenario_a_eighty_km_in_one_minute_is_a_jump() {
    let rows = vec![
        row("D1", 0, "NY", 40.0, -74.0),
        row("D1", 1, "NY", 40.0 + 80.0 / 111.195, -74.0),
    ];
    let events = run_events(rows, AnalysisConfig::default());
    let results = intervals(&events);

    assert_eq!(results.len(), 1);
    assert_relative_eq!(results[0].max_speed_kmh, 4800.0, epsilon = 3.0);
    assert!(results[0].is_tower_jump);
    assert!(events.iter().any(|e| e.kind == EventType::TowerJumpDetected));
}

#[test]
fn scenario_b_steady_single_state_window() {
    let rows = (0..10)
        .map(|i| row("D1", i, "NY", 40.7128, -74.0060))
        .collect();
    let events = run_events(rows, AnalysisConfig::default());
    let results = intervals(&events);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].estimated_state, "NY");
    assert_eq!(results[0].confidence_percentage, 100.0);
    assert_eq!(results[0].record_count, 10);
    assert!(!results[0].is_tower_jump);
}

#[test]
fn scenario_c_empty_input_is_a_single_error() {
    let events = run_events(Vec::new(), AnalysisConfig::default());

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventType::Error);
    assert!(intervals(&events).is_empty());
    match &events[0].data {
        EventData::Error(data) => assert_eq!(data.error_type, "NO_RECORDS"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn scenario_d_even_split_at_threshold_is_a_jump() {
    // Two nearby towers straddling a state line
    let rows = vec![
        row("D1", 0, "NY", 40.90, -73.91),
        row("D1", 4, "NJ", 40.90, -73.92),
        row("D1", 8, "NY", 40.90, -73.91),
        row("D1", 12, "NJ", 40.90, -73.92),
    ];
    let events = run_events(rows, AnalysisConfig::default());
    let results = intervals(&events);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].confidence_percentage, 50.0);
    assert!(results[0].is_tower_jump);
    assert_eq!(results[0].states_observed, vec!["NY".to_string(), "NJ".to_string()]);
}

#[test]
fn out_of_range_config_fails_before_any_event() {
    let config = AnalysisConfig {
        max_speed_mph: 500.0,
        ..AnalysisConfig::default()
    };
    let rows = vec![row("D1", 0, "NY", 40.0, -74.0)];

    assert_eq!(
        AnalysisRun::new(rows, config).err(),
        Some(ConfigError::MaxSpeed(500.0))
    );
}

#[test]
fn bad_rows_are_counted_not_fatal() {
    let rows = vec![
        row("D1", 0, "NY", 40.7, -74.0),
        RawRow::new().with("timestamp", "2023-01-01T12:01:00Z"),
        RawRow::new()
            .with("device_id", "D1")
            .with("timestamp", "not a time"),
        row("D1", 2, "NY", 40.7, -74.0),
    ];
    let events = run_events(rows, AnalysisConfig::default());

    match &events[0].data {
        EventData::DataLoading(data) => {
            assert_eq!(data.total_records, 2);
            assert_eq!(data.records_with_location, 2);
            assert_eq!(data.rejected_records, 2);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(events.last().map(|e| e.kind), Some(EventType::Completion));
}

#[test]
fn completion_matches_emitted_intervals() {
    let rows = vec![
        row("D1", 0, "NY", 40.7128, -74.0060),
        row("D1", 5, "NY", 40.7128, -74.0060),
        row("D1", 20, "CA", 34.0522, -118.2437),
        row("D2", 3, "NJ", 40.90, -73.92),
        row("D2", 50, "NJ", 40.90, -73.92),
    ];
    let events = run_events(rows, AnalysisConfig::default());
    let results = intervals(&events);
    let jumps = results.iter().filter(|r| r.is_tower_jump).count();

    match &events.last().unwrap().data {
        EventData::Completion(data) => {
            assert_eq!(data.total_intervals, results.len());
            assert_eq!(data.tower_jumps_detected, jumps);
            assert_eq!(data.summary.total_intervals, results.len());
        }
        other => panic!("unexpected payload {other:?}"),
    }
    let progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match &e.data {
            EventData::AnalysisProgress(p) if e.kind == EventType::AnalysisProgress => {
                Some(p.current_window)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, (1..=results.len()).collect::<Vec<_>>());
}

#[test]
fn events_serialize_with_type_tag() {
    let events = run_events(vec![row("D1", 0, "NY", 40.7, -74.0)], AnalysisConfig::default());
    let json: serde_json::Value = serde_json::from_str(&events[0].to_json().unwrap()).unwrap();

    assert_eq!(json["type"], "data_loading");
    assert_eq!(json["data"]["total_records"], 1);
    assert!(json["message"].is_string());
    assert!(json["timestamp"].is_string());
}
