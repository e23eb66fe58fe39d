//! Hour-by-hour kinematic extrapolation of a storm track.
//!
//! This is a simplified model, not a meteorological forecast: an initial
//! velocity is estimated from the recent track, then advanced one hour at a
//! time with a poleward acceleration past a latitude threshold, a progressive
//! eastward turn, and a bounded sinusoidal wobble on the reported positions.
//! Everything is a pure function of its inputs.

use crate::error::StormError;
use crate::storm::record::{TRACK_TIME_FORMAT, TrackPoint, sort_track};
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Serialize, Serializer};

/// Number of trailing track points used to estimate the initial vector.
pub const DEFAULT_WINDOW: usize = 6;
/// Scales the per-step turning term added to `v_lon`.
pub const TURN_FACTOR: f64 = 0.002;
pub const TURN_STEP_SCALE: f64 = 0.1;
pub const WOBBLE_AMPLITUDE: f64 = 0.03;
/// Radians per projected hour.
pub const WOBBLE_FREQUENCY: f64 = 0.5;
/// Degrees north past which the recurvature acceleration applies.
pub const RECURVATURE_LATITUDE: f64 = 30.0;
pub const RECURVATURE_LAT_ACCEL: f64 = 0.001;
pub const RECURVATURE_LON_ACCEL: f64 = 0.005;
/// Longest projection accepted, in hourly steps (30 days).
pub const MAX_HORIZON_HOURS: u32 = 720;

/// Degrees per hour, anchored at the last known position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionVector {
    pub v_lat: f64,
    pub v_lon: f64,
    pub lat: f64,
    pub lon: f64,
    pub time: NaiveDateTime,
}

fn serialize_time<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format(TRACK_TIME_FORMAT).to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedPoint {
    pub step: u32,
    pub lat: f64,
    pub lon: f64,
    #[serde(serialize_with = "serialize_time")]
    pub time: NaiveDateTime,
}

fn sorted(history: &[TrackPoint]) -> Vec<TrackPoint> {
    let mut points = history.to_vec();
    sort_track(&mut points);
    points
}

fn elapsed_hours(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

fn vector_from_sorted(points: &[TrackPoint], window: usize) -> Result<MotionVector, StormError> {
    let Some(last) = points.last() else {
        return Err(StormError::InsufficientHistory { points: 0 });
    };
    let stationary = MotionVector {
        v_lat: 0.0,
        v_lon: 0.0,
        lat: last.lat,
        lon: last.lon,
        time: last.time,
    };
    if points.len() < 2 {
        return Ok(stationary);
    }

    let take = window.max(1).min(points.len());
    let first = &points[points.len() - take];
    let hours = elapsed_hours(first.time, last.time);
    if hours == 0.0 {
        return Ok(stationary);
    }

    Ok(MotionVector {
        v_lat: (last.lat - first.lat) / hours,
        v_lon: (last.lon - first.lon) / hours,
        ..stationary
    })
}

/// Estimate the initial motion from the last `window` points of the
/// time-sorted track.
///
/// A single point, or a window spanning zero elapsed time, yields a zero
/// vector at the last known position. An empty track is an error since there
/// is no position to anchor on.
pub fn estimate_vector(history: &[TrackPoint], window: usize) -> Result<MotionVector, StormError> {
    vector_from_sorted(&sorted(history), window)
}

pub fn project(history: &[TrackPoint], horizon_hours: u32) -> Result<Vec<ProjectedPoint>, StormError> {
    project_with_window(history, horizon_hours, DEFAULT_WINDOW)
}

/// Project `horizon_hours` positions, one per hour after the last observation.
pub fn project_with_window(
    history: &[TrackPoint],
    horizon_hours: u32,
    window: usize,
) -> Result<Vec<ProjectedPoint>, StormError> {
    if horizon_hours > MAX_HORIZON_HOURS {
        return Err(StormError::HorizonOutOfRange {
            requested: horizon_hours,
            max: MAX_HORIZON_HOURS,
        });
    }
    if history.len() < 2 {
        return Err(StormError::InsufficientHistory {
            points: history.len(),
        });
    }

    let vector = vector_from_sorted(&sorted(history), window)?;
    let (mut v_lat, mut v_lon) = (vector.v_lat, vector.v_lon);
    let (mut lat, mut lon) = (vector.lat, vector.lon);

    let mut out = Vec::new();
    for h in 1..=horizon_hours {
        let step = f64::from(h);

        if lat > RECURVATURE_LATITUDE {
            v_lon += RECURVATURE_LON_ACCEL;
            v_lat += RECURVATURE_LAT_ACCEL;
        }
        v_lon += TURN_FACTOR * step * TURN_STEP_SCALE;

        lat += v_lat;
        lon += v_lon;

        let noise_lat = (step * WOBBLE_FREQUENCY).sin() * WOBBLE_AMPLITUDE;
        let noise_lon = (step * WOBBLE_FREQUENCY).cos() * WOBBLE_AMPLITUDE;

        let time = TimeDelta::try_hours(i64::from(h))
            .and_then(|delta| vector.time.checked_add_signed(delta))
            .ok_or_else(|| {
                StormError::parse("projection", "horizon exceeds the representable time range")
            })?;

        out.push(ProjectedPoint {
            step: h,
            lat: lat + noise_lat,
            lon: lon + noise_lon,
            time,
        });
    }

    Ok(out)
}
