//! The pose track: time-indexed robot samples.
//!
//! Samples are kept sorted ascending by `t` at all times. Bulk loads sort
//! once; live appends only ever extend the tail, guarded by strict
//! monotonicity. Every query is O(log n) and total: an empty track yields
//! `None` rather than failing.
//!
//! # Interpolation
//!
//! ```text
//!   poses:   p[i]            t            p[i+1]
//!            |---------------*-------------|
//!   a = (t - t_i) / (t_{i+1} - t_i)      clamped to [0, 1]
//!   x, y, velocities, speeds: linear in a
//!   theta: shortest arc (never more than 180 degrees)
//! ```

use crate::geometry::{lerp, lerp_deg, normalize_deg};
use crate::record;
use serde::Serialize;
use serde_json::Value;

/// One robot sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    /// Timestamp in milliseconds
    pub t: f64,
    pub x: f64,
    pub y: f64,
    /// Heading in degrees, `[0, 360)`
    pub theta: f64,
    pub l_vel: Option<f64>,
    pub r_vel: Option<f64>,
    /// Unsigned wheel speed as recorded
    pub speed_raw: f64,
    /// `speed_raw` mapped into the configured band; derived
    pub speed_norm: f64,
}

impl Pose {
    /// A pose with no velocity information.
    pub fn new(t: f64, x: f64, y: f64, theta: f64) -> Self {
        Self {
            t,
            x,
            y,
            theta: normalize_deg(theta),
            l_vel: None,
            r_vel: None,
            speed_raw: 0.0,
            speed_norm: 0.0,
        }
    }

    /// Sets wheel velocities and derives `speed_raw` from them.
    pub fn with_wheels(mut self, l_vel: Option<f64>, r_vel: Option<f64>) -> Self {
        self.l_vel = l_vel;
        self.r_vel = r_vel;
        self.speed_raw = wheel_speed(l_vel, r_vel);
        self
    }

    /// Builds a pose from a loosely-typed bulk record.
    ///
    /// Requires numeric `x` and `y`; a missing `t` becomes 0. `speed` or
    /// `speed_raw` supply the raw speed, otherwise it is derived from the
    /// wheel velocities.
    pub fn from_record(value: &Value) -> Option<Pose> {
        let obj = value.as_object()?;
        let x = record::number_field(obj, &["x"])?;
        let y = record::number_field(obj, &["y"])?;
        let t = record::number_field(obj, &["t", "timestamp", "time", "ms"]).unwrap_or(0.0);
        let theta = record::number_field(obj, &["theta", "heading"]).unwrap_or(0.0);
        let l_vel = record::number_field(obj, &["l_vel"]);
        let r_vel = record::number_field(obj, &["r_vel"]);
        let mut pose = Pose::new(t, x, y, theta).with_wheels(l_vel, r_vel);
        if let Some(speed) = record::number_field(obj, &["speed", "speed_raw"]) {
            pose.speed_raw = speed;
        }
        Some(pose)
    }
}

/// Mean absolute wheel velocity; a missing wheel counts as 0.
pub fn wheel_speed(l_vel: Option<f64>, r_vel: Option<f64>) -> f64 {
    (l_vel.unwrap_or(0.0).abs() + r_vel.unwrap_or(0.0).abs()) / 2.0
}

fn lerp_opt(a: Option<f64>, b: Option<f64>, t: f64) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        _ => Some(lerp(a.unwrap_or(0.0), b.unwrap_or(0.0), t)),
    }
}

/// Blends two poses; `t` is the blend parameter, not a timestamp.
pub fn blend(p0: &Pose, p1: &Pose, a: f64) -> Pose {
    Pose {
        t: lerp(p0.t, p1.t, a),
        x: lerp(p0.x, p1.x, a),
        y: lerp(p0.y, p1.y, a),
        theta: lerp_deg(p0.theta, p1.theta, a),
        l_vel: lerp_opt(p0.l_vel, p1.l_vel, a),
        r_vel: lerp_opt(p0.r_vel, p1.r_vel, a),
        speed_raw: lerp(p0.speed_raw, p1.speed_raw, a),
        speed_norm: lerp(p0.speed_norm, p1.speed_norm, a),
    }
}

/// Result of a tolerance lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestSample {
    pub index: usize,
    /// |Δt| between the query and the sample
    pub dt: f64,
}

/// Sorted, time-indexed pose track.
#[derive(Debug, Clone, Default)]
pub struct PoseTimeline {
    poses: Vec<Pose>,
}

impl PoseTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a track from already-parsed poses, stable-sorting by time.
    pub fn from_poses(mut poses: Vec<Pose>) -> Self {
        poses.sort_by(|a, b| a.t.total_cmp(&b.t));
        Self { poses }
    }

    /// Replaces the track with the usable entries of `records`.
    ///
    /// Entries without numeric `x`/`y` are dropped. Returns the number kept.
    pub fn load_bulk(&mut self, records: &[Value]) -> usize {
        let poses: Vec<Pose> = records.iter().filter_map(Pose::from_record).collect();
        *self = Self::from_poses(poses);
        self.poses.len()
    }

    /// Appends a live sample.
    ///
    /// Rejected unless `pose.t` strictly exceeds the last sample's time.
    pub fn append_live(&mut self, pose: Pose) -> bool {
        if !pose.t.is_finite() {
            return false;
        }
        if let Some(last) = self.poses.last() {
            if pose.t <= last.t {
                return false;
            }
        }
        self.poses.push(pose);
        true
    }

    pub fn clear(&mut self) {
        self.poses.clear();
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub(crate) fn poses_mut(&mut self) -> &mut [Pose] {
        &mut self.poses
    }

    pub fn get(&self, index: usize) -> Option<&Pose> {
        self.poses.get(index)
    }

    pub fn first(&self) -> Option<&Pose> {
        self.poses.first()
    }

    pub fn last(&self) -> Option<&Pose> {
        self.poses.last()
    }

    /// `(first.t, last.t)`.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.first()?.t, self.last()?.t))
    }

    /// Greatest index whose time is `<= t`; duplicates resolve rightmost.
    ///
    /// `None` for an empty track or a query before the first sample.
    pub fn floor_index(&self, t: f64) -> Option<usize> {
        let upper = self.poses.partition_point(|p| p.t <= t);
        upper.checked_sub(1)
    }

    /// Pose at time `t`.
    ///
    /// Before the first sample the first sample's values are used; at or past
    /// the last sample the last sample is returned verbatim (no
    /// extrapolation). The returned pose carries the queried `t` except in
    /// the verbatim case.
    pub fn interpolate_at(&self, t: f64) -> Option<Pose> {
        let last_index = self.poses.len().checked_sub(1)?;
        let i = self.floor_index(t).unwrap_or(0);
        if i >= last_index {
            return Some(self.poses[last_index]);
        }
        let p0 = &self.poses[i];
        let p1 = &self.poses[i + 1];
        let denom = p1.t - p0.t;
        let a = if denom == 0.0 { 0.0 } else { ((t - p0.t) / denom).clamp(0.0, 1.0) };
        let mut pose = blend(p0, p1, a);
        pose.t = t;
        Some(pose)
    }

    /// Closest of the floor sample and its successor, if within `tol`.
    ///
    /// On a tie the earlier sample wins.
    pub fn nearest_within_tolerance(&self, t: f64, tol: f64) -> Option<NearestSample> {
        if self.poses.is_empty() {
            return None;
        }
        let i0 = self.floor_index(t).unwrap_or(0);
        let mut best: Option<NearestSample> = None;
        for index in [i0, i0 + 1] {
            let Some(pose) = self.poses.get(index) else { continue };
            let dt = (pose.t - t).abs();
            if best.map_or(true, |b| dt < b.dt) {
                best = Some(NearestSample { index, dt });
            }
        }
        best.filter(|b| b.dt <= tol)
    }

    /// Index of the sample nearest in time to `t` (no tolerance).
    pub fn nearest_index(&self, t: f64) -> Option<usize> {
        self.nearest_within_tolerance(t, f64::INFINITY).map(|n| n.index)
    }
}
