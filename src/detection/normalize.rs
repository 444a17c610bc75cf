use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::models::{LocationRecord, RawRow, UNKNOWN_STATE};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const DEVICE_COLUMNS: &[&str] = &["deviceid", "device", "imei", "subscriberid", "msisdn"];
const TIMESTAMP_COLUMNS: &[&str] = &["utcdatetime", "timestamp", "datetime", "time", "utctime"];
const LOCAL_TIMESTAMP_COLUMNS: &[&str] = &["localdatetime", "localtime"];
const LATITUDE_COLUMNS: &[&str] = &["latitude", "lat"];
const LONGITUDE_COLUMNS: &[&str] = &["longitude", "lon", "lng"];
const STATE_COLUMNS: &[&str] = &["state", "region"];

/// Naive layouts tried after RFC 3339, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Why a row produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingDeviceId,
    BadTimestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub missing_device_id: usize,
    pub bad_timestamp: usize,
    /// Rows kept, but with out-of-range or non-numeric coordinates dropped
    pub coordinates_discarded: usize,
}

impl RejectionCounts {
    pub fn rejected_rows(&self) -> usize {
        self.missing_device_id + self.bad_timestamp
    }
}

/// Data-loading statistics surfaced in the `data_loading` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataStats {
    pub total_rows: usize,
    pub total_records: usize,
    pub records_with_location: usize,
    pub rejected: RejectionCounts,
    pub unique_states: Vec<String>,
    pub device_count: usize,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedData {
    pub records: Vec<LocationRecord>,
    pub stats: DataStats,
}

/// Normalize every row, dropping the ones that cannot become a record.
pub fn normalize_rows(rows: &[RawRow]) -> NormalizedData {
    let mut records = Vec::with_capacity(rows.len());
    let mut stats = DataStats {
        total_rows: rows.len(),
        ..DataStats::default()
    };
    let mut devices: Vec<&str> = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        match normalize_row(row, &mut stats.rejected) {
            Ok(record) => records.push(record),
            Err(reason) => {
                log_debug!("dropping row {}: {:?}", i, reason);
                match reason {
                    Rejection::MissingDeviceId => stats.rejected.missing_device_id += 1,
                    Rejection::BadTimestamp => stats.rejected.bad_timestamp += 1,
                }
            }
        }
    }

    for record in &records {
        if record.has_location() {
            stats.records_with_location += 1;
        }
        if let Some(state) = &record.state {
            if !stats.unique_states.contains(state) {
                stats.unique_states.push(state.clone());
            }
        }
        if !devices.contains(&record.device_id.as_str()) {
            devices.push(&record.device_id);
        }
        stats.first_timestamp = Some(match stats.first_timestamp {
            Some(ts) => ts.min(record.timestamp),
            None => record.timestamp,
        });
        stats.last_timestamp = Some(match stats.last_timestamp {
            Some(ts) => ts.max(record.timestamp),
            None => record.timestamp,
        });
    }
    stats.total_records = records.len();
    stats.device_count = devices.len();

    if stats.rejected.rejected_rows() > 0 {
        log_warn!(
            "rejected {} of {} rows (missing device id: {}, bad timestamp: {})",
            stats.rejected.rejected_rows(),
            stats.total_rows,
            stats.rejected.missing_device_id,
            stats.rejected.bad_timestamp
        );
    }
    log_info!(
        "normalized {} records ({} with location) for {} devices",
        stats.total_records,
        stats.records_with_location,
        stats.device_count
    );

    NormalizedData { records, stats }
}

/// Turn one raw row into a record, or say why it cannot be one.
pub fn normalize_row(
    row: &RawRow,
    counts: &mut RejectionCounts,
) -> Result<LocationRecord, Rejection> {
    let device_id = row
        .lookup(DEVICE_COLUMNS)
        .ok_or(Rejection::MissingDeviceId)?
        .to_string();
    let timestamp = row
        .lookup(TIMESTAMP_COLUMNS)
        .and_then(parse_timestamp)
        .ok_or(Rejection::BadTimestamp)?;

    let raw_lat = row.lookup(LATITUDE_COLUMNS);
    let raw_lon = row.lookup(LONGITUDE_COLUMNS);
    let latitude = raw_lat.and_then(|v| parse_coordinate(v, 90.0));
    let longitude = raw_lon.and_then(|v| parse_coordinate(v, 180.0));
    let (latitude, longitude) = match (latitude, longitude) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => {
            if is_real_value(raw_lat) || is_real_value(raw_lon) {
                counts.coordinates_discarded += 1;
            }
            (None, None)
        }
    };

    let state = row
        .lookup(STATE_COLUMNS)
        .filter(|s| !s.eq_ignore_ascii_case(UNKNOWN_STATE))
        .map(str::to_string);

    Ok(LocationRecord {
        device_id,
        timestamp,
        local_timestamp: row.lookup(LOCAL_TIMESTAMP_COLUMNS).and_then(parse_timestamp),
        latitude,
        longitude,
        state,
        city: row.lookup(&["city"]).map(str::to_string),
        county: row.lookup(&["county"]).map(str::to_string),
        country: row.lookup(&["country"]).map(str::to_string),
        cell_type: row
            .lookup(&["celltype"])
            .unwrap_or(UNKNOWN_STATE)
            .to_string(),
    })
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Parse a coordinate and check it against `±limit`.
///
/// Carrier exports write `0` for "no fix", so an exact zero counts as missing.
fn parse_coordinate(value: &str, limit: f64) -> Option<f64> {
    let parsed: f64 = value.trim().parse().ok()?;
    if !parsed.is_finite() || parsed == 0.0 || parsed.abs() > limit {
        return None;
    }
    Some(parsed)
}

/// A non-blank cell that is not the zero "no fix" marker.
fn is_real_value(value: Option<&str>) -> bool {
    match value {
        Some(v) => v.trim().parse::<f64>().map(|f| f != 0.0).unwrap_or(true),
        None => false,
    }
}
