//! Raw speed → `[0, 1]` normalization.

use crate::config::SpeedConfig;
use crate::pose_timeline::{Pose, PoseTimeline};

/// Maps |speed_raw| linearly from `[min, max]` onto `[0, 1]`.
///
/// Stored `speed_norm` values are only as fresh as the last call to
/// [`SpeedNormalizer::recompute`]; change the band, then recompute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedNormalizer {
    min: f64,
    max: f64,
}

impl Default for SpeedNormalizer {
    fn default() -> Self {
        Self::from_config(&SpeedConfig::default())
    }
}

impl SpeedNormalizer {
    /// Builds a band. Non-finite bounds fall back to the defaults and an
    /// inverted band is swapped.
    pub fn new(min: f64, max: f64) -> Self {
        let defaults = SpeedConfig::default();
        let min = if min.is_finite() { min } else { defaults.min_speed };
        let max = if max.is_finite() { max } else { defaults.max_speed };
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    pub fn from_config(config: &SpeedConfig) -> Self {
        Self::new(config.min_speed, config.max_speed)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn normalize(&self, raw: f64) -> f64 {
        let span = self.max - self.min;
        let denom = if span == 0.0 { 1.0 } else { span };
        let v = if raw.is_finite() { raw.abs() } else { 0.0 };
        ((v - self.min) / denom).clamp(0.0, 1.0)
    }

    /// Sets `speed_norm` on a single pose.
    pub fn apply(&self, pose: &mut Pose) {
        pose.speed_norm = self.normalize(pose.speed_raw);
    }

    /// Full pass over the track.
    pub fn recompute(&self, timeline: &mut PoseTimeline) {
        for pose in timeline.poses_mut() {
            self.apply(pose);
        }
    }

    /// Normalized speed on a 0-100 display scale.
    pub fn display_percent(norm: f64) -> Option<f64> {
        norm.is_finite().then(|| norm.clamp(0.0, 1.0) * 100.0)
    }
}
