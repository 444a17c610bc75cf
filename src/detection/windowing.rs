use chrono::{DateTime, Duration, Utc};

use crate::error::{AnalysisError, Result};
use crate::models::LocationRecord;

/// A non-empty `[start_time, end_time)` bucket of one device's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    /// Position of the device in first-appearance order
    pub device_index: usize,
    pub bucket: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Timeline positions of the records inside the window, in time order
    pub record_indices: Vec<usize>,
}

impl TimeWindow {
    pub fn record_count(&self) -> usize {
        self.record_indices.len()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceWindows {
    pub device_id: String,
    pub anchor: DateTime<Utc>,
    /// Buckets tiling `[anchor, last record]`, empty ones included
    pub bucket_count: usize,
    pub windows: Vec<TimeWindow>,
}

impl DeviceWindows {
    pub fn empty_count(&self) -> usize {
        self.bucket_count - self.windows.len()
    }
}

/// Floor `ts` to a multiple of `size` counted from UTC midnight of the same day.
pub fn window_anchor(ts: DateTime<Utc>, size: Duration) -> DateTime<Utc> {
    let midnight = ts
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(ts);
    let offset = (ts - midnight).num_milliseconds();
    let size_ms = size.num_milliseconds().max(1);
    midnight + Duration::milliseconds(offset - offset.rem_euclid(size_ms))
}

/// Partition one time-ordered device timeline into fixed windows.
///
/// `records` must be sorted by timestamp; out-of-order input is rejected with
/// `AnalysisError::Internal`. Every record lands in exactly one bucket; only
/// non-empty buckets are kept.
pub fn build_device_windows(
    device_index: usize,
    device_id: &str,
    records: &[LocationRecord],
    size: Duration,
) -> Result<DeviceWindows> {
    let Some(first) = records.first() else {
        return Ok(DeviceWindows {
            device_id: device_id.to_string(),
            anchor: DateTime::<Utc>::MIN_UTC,
            bucket_count: 0,
            windows: Vec::new(),
        });
    };

    let overflow = || AnalysisError::WindowOverflow {
        device_id: device_id.to_string(),
    };
    let anchor = window_anchor(first.timestamp, size);
    let size_ms = size.num_milliseconds().max(1);

    let mut windows: Vec<TimeWindow> = Vec::new();
    let mut last_bucket = 0usize;

    for (i, record) in records.iter().enumerate() {
        if i > 0 && record.timestamp < records[i - 1].timestamp {
            return Err(AnalysisError::Internal(format!(
                "records for device {device_id} are not in time order at position {i}"
            )));
        }
        let offset = (record.timestamp - anchor).num_milliseconds();
        let bucket = usize::try_from(offset.div_euclid(size_ms)).map_err(|_| overflow())?;
        last_bucket = last_bucket.max(bucket);

        match windows.last_mut() {
            Some(window) if window.bucket == bucket => window.record_indices.push(i),
            _ => {
                let bucket_i32 = i32::try_from(bucket).map_err(|_| overflow())?;
                let start_time = size
                    .checked_mul(bucket_i32)
                    .and_then(|offset| anchor.checked_add_signed(offset))
                    .ok_or_else(overflow)?;
                let end_time = start_time.checked_add_signed(size).ok_or_else(overflow)?;
                windows.push(TimeWindow {
                    device_index,
                    bucket,
                    start_time,
                    end_time,
                    record_indices: vec![i],
                });
            }
        }
    }

    Ok(DeviceWindows {
        device_id: device_id.to_string(),
        anchor,
        bucket_count: last_bucket + 1,
        windows,
    })
}

/// Order windows of all devices chronologically, ties by device order.
pub fn chronological_order(devices: &[DeviceWindows]) -> Vec<(usize, usize)> {
    let mut order: Vec<(usize, usize)> = devices
        .iter()
        .enumerate()
        .flat_map(|(d, dw)| (0..dw.windows.len()).map(move |w| (d, w)))
        .collect();
    order.sort_by_key(|&(d, w)| (devices[d].windows[w].start_time, d));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, h, m, s).unwrap()
    }

    fn record(ts: DateTime<Utc>) -> LocationRecord {
        LocationRecord {
            device_id: "D1".into(),
            timestamp: ts,
            local_timestamp: None,
            latitude: None,
            longitude: None,
            state: Some("NY".into()),
            city: None,
            county: None,
            country: None,
            cell_type: "Unknown".into(),
        }
    }

    #[test]
    fn anchor_floors_to_window_boundary() {
        let size = Duration::minutes(15);
        assert_eq!(window_anchor(at(12, 7, 30), size), at(12, 0, 0));
        assert_eq!(window_anchor(at(12, 15, 0), size), at(12, 15, 0));
        assert_eq!(window_anchor(at(0, 0, 0), size), at(0, 0, 0));
        // 7-minute buckets count from midnight: 12:00 is minute 720 = 102*7 + 6
        assert_eq!(window_anchor(at(12, 0, 0), Duration::minutes(7)), at(11, 54, 0));
    }

    #[test]
    fn records_land_in_exactly_one_window() {
        let records = [
            record(at(12, 1, 0)),
            record(at(12, 14, 59)),
            record(at(12, 15, 0)),
            record(at(12, 58, 0)),
        ];
        let dw = build_device_windows(0, "D1", &records, Duration::minutes(15)).unwrap();

        assert_eq!(dw.anchor, at(12, 0, 0));
        assert_eq!(dw.bucket_count, 4);
        assert_eq!(dw.windows.len(), 3);
        assert_eq!(dw.empty_count(), 1);

        assert_eq!(dw.windows[0].record_indices, vec![0, 1]);
        assert_eq!(dw.windows[0].start_time, at(12, 0, 0));
        assert_eq!(dw.windows[0].end_time, at(12, 15, 0));
        assert_eq!(dw.windows[1].record_indices, vec![2]);
        assert_eq!(dw.windows[2].record_indices, vec![3]);
        assert_eq!(dw.windows[2].start_time, at(12, 45, 0));

        let total: usize = dw.windows.iter().map(TimeWindow::record_count).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn windows_never_overlap_and_keep_fixed_width() {
        let records: Vec<LocationRecord> = (0..40)
            .map(|i| record(at(10, 0, 0) + Duration::minutes(i * 7)))
            .collect();
        let size = Duration::minutes(20);
        let dw = build_device_windows(0, "D1", &records, size).unwrap();

        for pair in dw.windows.windows(2) {
            assert!(pair[0].end_time <= pair[1].start_time);
        }
        for window in &dw.windows {
            assert_eq!(window.end_time - window.start_time, size);
            for &i in &window.record_indices {
                let ts = records[i].timestamp;
                assert!(window.start_time <= ts && ts < window.end_time);
            }
        }
    }

    #[test]
    fn unsorted_timeline_is_rejected_as_unordered() {
        let records = [record(at(12, 20, 0)), record(at(12, 5, 0))];
        let err = build_device_windows(0, "D1", &records, Duration::minutes(15)).unwrap_err();

        assert_eq!(err.error_type(), "INTERNAL");
        assert!(err.to_string().contains("not in time order"));
    }

    #[test]
    fn equal_timestamps_share_a_window() {
        let records = [record(at(12, 5, 0)), record(at(12, 5, 0))];
        let dw = build_device_windows(0, "D1", &records, Duration::minutes(15)).unwrap();

        assert_eq!(dw.windows.len(), 1);
        assert_eq!(dw.windows[0].record_indices, vec![0, 1]);
    }

    #[test]
    fn empty_timeline_has_no_windows() {
        let dw = build_device_windows(0, "D1", &[], Duration::minutes(15)).unwrap();
        assert_eq!(dw.bucket_count, 0);
        assert!(dw.windows.is_empty());
    }

    #[test]
    fn chronological_order_interleaves_devices() {
        let a = [record(at(12, 20, 0)), record(at(12, 40, 0))];
        let b = [record(at(12, 5, 0)), record(at(12, 25, 0))];
        let size = Duration::minutes(15);
        let devices = vec![
            build_device_windows(0, "A", &a, size).unwrap(),
            build_device_windows(1, "B", &b, size).unwrap(),
        ];

        // A: 12:15, 12:30; B: 12:00, 12:15
        assert_eq!(
            chronological_order(&devices),
            vec![(1, 0), (0, 0), (1, 1), (0, 1)]
        );
    }
}
