use chrono::Duration;

use crate::config::AnalysisConfig;
use crate::models::{KinematicSample, LocationRecord};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// A positive duration in hours, at microsecond resolution where it fits.
fn elapsed_hours(delta: Duration) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None => delta.num_milliseconds() as f64 / 3_600_000.0,
    }
}

/// Samples for one device's timeline, indexed by the later record.
#[derive(Debug, Clone, Default)]
pub struct DeviceKinematics {
    /// `by_end[i]` is the sample ending at record `i`, if any
    pub by_end: Vec<Option<KinematicSample>>,
    /// Pairs dropped because time did not move forward
    pub discarded: usize,
}

impl DeviceKinematics {
    pub fn samples(&self) -> impl Iterator<Item = &KinematicSample> {
        self.by_end.iter().flatten()
    }

    pub fn sample_count(&self) -> usize {
        self.samples().count()
    }

    pub fn anomaly_count(&self) -> usize {
        self.samples().filter(|s| s.is_anomalous).count()
    }

    /// Samples whose later endpoint lies in `indices`.
    pub fn ending_in<'a>(
        &'a self,
        indices: &'a [usize],
    ) -> impl Iterator<Item = &'a KinematicSample> + 'a {
        indices
            .iter()
            .filter_map(move |&i| self.by_end.get(i).and_then(Option::as_ref))
    }
}

/// Compute samples for consecutive record pairs of one time-ordered device timeline.
///
/// A pair yields a sample only when both records are located and the later
/// one is strictly after the earlier one.
pub fn compute_kinematics(records: &[LocationRecord]) -> DeviceKinematics {
    let mut kinematics = DeviceKinematics {
        by_end: vec![None; records.len()],
        discarded: 0,
    };

    for i in 1..records.len() {
        let (prev, curr) = (&records[i - 1], &records[i]);
        let (Some((lat1, lon1)), Some((lat2, lon2))) = (prev.coordinates(), curr.coordinates())
        else {
            continue;
        };

        if curr.timestamp <= prev.timestamp {
            kinematics.discarded += 1;
            continue;
        }

        let distance_km = haversine_km(lat1, lon1, lat2, lon2);
        let elapsed_hours = elapsed_hours(curr.timestamp - prev.timestamp);
        kinematics.by_end[i] = Some(KinematicSample {
            from_index: i - 1,
            to_index: i,
            distance_km,
            elapsed_hours,
            speed_kmh: distance_km / elapsed_hours,
            is_anomalous: false,
        });
    }

    kinematics
}

/// Coarse pre-flag of clearly impossible single hops. Returns how many were flagged.
pub fn flag_anomalies(kinematics: &mut DeviceKinematics, config: &AnalysisConfig) -> usize {
    let max_speed_kmh = config.max_speed_kmh();
    let min_hours = config.min_movement_hours();
    let mut flagged = 0;

    for sample in kinematics.by_end.iter_mut().flatten() {
        sample.is_anomalous = sample.speed_kmh > max_speed_kmh
            || (sample.distance_km > config.min_jump_distance_km && sample.elapsed_hours < min_hours);
        if sample.is_anomalous {
            flagged += 1;
        }
    }

    flagged
}
