use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::AnalysisConfig;
use crate::detection::{
    analyze_window, build_device_windows, chronological_order, compute_kinematics,
    flag_anomalies, normalize_rows, summarize, DeviceKinematics, DeviceWindows,
};
use crate::error::{AnalysisError, ConfigError, Result};
use crate::events::{AnalysisEvent, ProcessingStep, WindowCreationData};
use crate::models::{IntervalResult, LocationRecord, RawRow};

use super::RunState;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Everything one run owns exclusively; nothing is shared between runs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub config: AnalysisConfig,
    pub started_at: DateTime<Utc>,
}

/// One device's sorted records and everything derived from them.
#[derive(Debug, Clone)]
struct DeviceTimeline {
    device_id: String,
    records: Vec<LocationRecord>,
    kinematics: DeviceKinematics,
    windows: Option<DeviceWindows>,
}

/// A single analysis run, driven by pulling events from it.
///
/// Work happens inside `next()`: the loading and processing stages run when
/// their first event is requested, and each window is analyzed only when the
/// consumer asks for the event that reports it. Dropping the run part-way
/// abandons the remaining windows.
pub struct AnalysisRun {
    context: RunContext,
    state: RunState,
    rows: Vec<RawRow>,
    records: Vec<LocationRecord>,
    devices: Vec<DeviceTimeline>,
    order: Vec<(usize, usize)>,
    cursor: usize,
    pending: VecDeque<AnalysisEvent>,
    results: Vec<IntervalResult>,
    failure: Option<AnalysisError>,
}

impl AnalysisRun {
    /// Validate `config` and set up a run. No event exists until the first `next()`.
    pub fn new(rows: Vec<RawRow>, config: AnalysisConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let context = RunContext {
            run_id: Uuid::new_v4(),
            config,
            started_at: Utc::now(),
        };
        log_info!(
            "run {} created: {} rows, window={}min, max_speed={}mph, confidence_threshold={}",
            context.run_id,
            rows.len(),
            context.config.time_window_minutes,
            context.config.max_speed_mph,
            context.config.confidence_threshold
        );

        Ok(Self {
            context,
            state: RunState::default(),
            rows,
            records: Vec::new(),
            devices: Vec::new(),
            order: Vec::new(),
            cursor: 0,
            pending: VecDeque::new(),
            results: Vec::new(),
            failure: None,
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Intervals produced so far, in output order.
    pub fn results(&self) -> &[IntervalResult] {
        &self.results
    }

    pub fn failure(&self) -> Option<&AnalysisError> {
        self.failure.as_ref()
    }

    /// Drive the run to the end and return the ordered intervals.
    pub fn into_results(mut self) -> Result<Vec<IntervalResult>> {
        while self.next().is_some() {}
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }

    /// Wall-clock time since the run was created.
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.context.started_at
    }

    fn advance(&mut self, target: RunState) {
        debug_assert!(self.state.can_transition_to(target));
        log_debug!("run {}: {:?} -> {:?}", self.context.run_id, self.state, target);
        self.state = target;
    }

    fn fail(&mut self, err: AnalysisError) {
        log_error!(
            "run {} failed during {:?} after {}ms: {}",
            self.context.run_id,
            self.state,
            self.elapsed().num_milliseconds(),
            err
        );
        self.advance(RunState::Error);
        self.pending.clear();
        self.pending.push_back(AnalysisEvent::error(&err));
        self.records = Vec::new();
        self.devices = Vec::new();
        self.order = Vec::new();
        self.failure = Some(err);
    }

    fn step(&mut self) -> Result<()> {
        match self.state {
            RunState::Loading => self.load(),
            RunState::Processing => self.process(),
            RunState::Windowing => self.build_windows(),
            RunState::Analyzing => self.analyze_next(),
            RunState::Completed | RunState::Error => Ok(()),
        }
    }

    fn load(&mut self) -> Result<()> {
        let rows = std::mem::take(&mut self.rows);
        let data = normalize_rows(&rows);

        if data.stats.total_records == 0 {
            return Err(AnalysisError::NoRecords {
                total_rows: data.stats.total_rows,
            });
        }
        if data.stats.records_with_location == 0 {
            return Err(AnalysisError::NoLocatedRecords {
                total_records: data.stats.total_records,
            });
        }

        self.pending.push_back(AnalysisEvent::data_loading(&data.stats));
        self.records = data.records;
        self.advance(RunState::Processing);
        Ok(())
    }

    fn process(&mut self) -> Result<()> {
        // Group by device in first-appearance order, then sort each timeline
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut devices: Vec<DeviceTimeline> = Vec::new();
        for record in std::mem::take(&mut self.records) {
            let slot = match index.get(&record.device_id) {
                Some(&slot) => slot,
                None => {
                    index.insert(record.device_id.clone(), devices.len());
                    devices.push(DeviceTimeline {
                        device_id: record.device_id.clone(),
                        records: Vec::new(),
                        kinematics: DeviceKinematics::default(),
                        windows: None,
                    });
                    devices.len() - 1
                }
            };
            devices[slot].records.push(record);
        }
        for device in &mut devices {
            device.records.sort_by_key(|r| r.timestamp);
        }
        let record_count: usize = devices.iter().map(|d| d.records.len()).sum();
        self.pending.push_back(AnalysisEvent::processing(
            ProcessingStep::DataframeConversion,
            format!("Grouped {} records into {} device timelines", record_count, devices.len()),
            json!({ "records": record_count, "devices": devices.len() }),
        ));

        let mut samples = 0;
        let mut discarded = 0;
        for device in &mut devices {
            device.kinematics = compute_kinematics(&device.records);
            samples += device.kinematics.sample_count();
            discarded += device.kinematics.discarded;
        }
        log_info!(
            "run {}: {} kinematic samples ({} discarded for non-increasing time)",
            self.context.run_id,
            samples,
            discarded
        );
        self.pending.push_back(AnalysisEvent::processing(
            ProcessingStep::DistanceCalculation,
            "Distance and speed calculation completed",
            json!({ "samples": samples, "discarded_samples": discarded }),
        ));

        let mut anomalies = 0;
        for device in &mut devices {
            anomalies += flag_anomalies(&mut device.kinematics, &self.context.config);
        }
        log_info!(
            "run {}: {} anomalous hops pre-flagged",
            self.context.run_id,
            anomalies
        );
        self.pending.push_back(AnalysisEvent::processing(
            ProcessingStep::AnomalyDetection,
            "Anomaly detection completed",
            json!({
                "anomalies_detected": anomalies,
                "max_speed_kmh": self.context.config.max_speed_kmh(),
            }),
        ));

        self.devices = devices;
        self.advance(RunState::Windowing);
        Ok(())
    }

    fn build_windows(&mut self) -> Result<()> {
        let size = self.context.config.window_duration();
        let mut built = Vec::with_capacity(self.devices.len());
        for (i, device) in self.devices.iter().enumerate() {
            built.push(build_device_windows(i, &device.device_id, &device.records, size)?);
        }

        let order = chronological_order(&built);
        let empty_windows: usize = built.iter().map(DeviceWindows::empty_count).sum();
        let data = WindowCreationData {
            window_count: order.len(),
            window_size_minutes: self.context.config.time_window_minutes,
            device_count: built.len(),
            empty_windows,
        };
        log_info!(
            "run {}: {} windows to analyze across {} devices ({} empty skipped)",
            self.context.run_id,
            data.window_count,
            data.device_count,
            empty_windows
        );

        for (device, windows) in self.devices.iter_mut().zip(built) {
            device.windows = Some(windows);
        }
        self.order = order;

        self.pending.push_back(AnalysisEvent::processing(
            ProcessingStep::WindowCreation,
            "Time windows created",
            json!({ "window_count": data.window_count, "empty_windows": empty_windows }),
        ));
        self.pending.push_back(AnalysisEvent::window_creation(data));
        self.advance(RunState::Analyzing);
        Ok(())
    }

    fn analyze_next(&mut self) -> Result<()> {
        let total = self.order.len();
        let Some(&(d, w)) = self.order.get(self.cursor) else {
            let summary = summarize(&self.results);
            log_info!(
                "run {} completed in {}ms: {} intervals, {} tower jumps ({:.1}%), most common state {}",
                self.context.run_id,
                self.elapsed().num_milliseconds(),
                summary.total_intervals,
                summary.tower_jump_intervals,
                summary.tower_jump_percentage,
                summary.most_common_state
            );
            self.pending.push_back(AnalysisEvent::completion(summary));
            self.advance(RunState::Completed);
            return Ok(());
        };

        let device = self
            .devices
            .get(d)
            .ok_or_else(|| AnalysisError::Internal(format!("device {d} missing")))?;
        let window = device
            .windows
            .as_ref()
            .and_then(|dw| dw.windows.get(w))
            .ok_or_else(|| {
                AnalysisError::Internal(format!("window {w} of {} missing", device.device_id))
            })?;

        let verdict = analyze_window(
            &device.device_id,
            window,
            &device.records,
            &device.kinematics,
            &self.context.config,
        );
        self.cursor += 1;

        let result = verdict.result;
        self.pending
            .push_back(AnalysisEvent::analysis_progress(self.cursor, total, &result));
        if let Some(transition) = verdict.transition {
            log_debug!(
                "tower jump for {} at {}: {} -> {} ({:.1}%)",
                result.device_id,
                result.start_time,
                transition.from_location,
                transition.to_location,
                result.confidence_percentage
            );
            self.pending
                .push_back(AnalysisEvent::interval_completed(result.clone()));
            self.pending
                .push_back(AnalysisEvent::tower_jump_detected(&result, transition));
        } else {
            self.pending
                .push_back(AnalysisEvent::interval_completed(result.clone()));
        }
        self.results.push(result);
        Ok(())
    }
}

impl Iterator for AnalysisRun {
    type Item = AnalysisEvent;

    fn next(&mut self) -> Option<AnalysisEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.state.is_terminal() {
                return None;
            }
            if let Err(err) = self.step() {
                self.fail(err);
            }
        }
    }
}
