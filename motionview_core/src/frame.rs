//! Source units and the pose frame.
//!
//! Recorded tracks may use any length unit. The frame converts a stored pose
//! into field inches and applies the operator's x/y/theta offsets.

use crate::config::FrameConfig;
use crate::geometry::{normalize_deg, FieldBounds};
use crate::pose_timeline::Pose;
use serde::{Deserialize, Serialize};

/// Length unit of recorded coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    #[default]
    In,
    Cm,
    Ft,
    /// One 24-inch field tile
    Tiles,
}

impl LengthUnit {
    /// Multiplier into inches.
    pub fn to_inches(&self) -> f64 {
        match self {
            LengthUnit::In => 1.0,
            LengthUnit::Cm => 1.0 / 2.54,
            LengthUnit::Ft => 12.0,
            LengthUnit::Tiles => 24.0,
        }
    }

    /// Best guess from a free-form `meta.units` string. Defaults to inches.
    pub fn infer(text: &str) -> LengthUnit {
        let u = text.trim().to_lowercase();
        if u.is_empty() {
            LengthUnit::In
        } else if u.contains("tile") {
            LengthUnit::Tiles
        } else if u.contains("cm") || u.contains("cent") {
            LengthUnit::Cm
        } else if u == "ft" || u.contains("foot") || u.contains("feet") {
            LengthUnit::Ft
        } else {
            LengthUnit::In
        }
    }
}

/// Unit conversion plus operator offsets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseFrame {
    units: LengthUnit,
    offset_x: f64,
    offset_y: f64,
    offset_theta: f64,
}

impl PoseFrame {
    /// Builds a frame; offsets are given in source units and kept inside the field.
    pub fn new(config: &FrameConfig, bounds: &FieldBounds) -> Self {
        let mut frame = Self {
            units: config.units,
            ..Self::default()
        };
        frame.set_offsets(config.offset_x, config.offset_y, config.offset_theta, bounds);
        frame
    }

    pub fn units(&self) -> LengthUnit {
        self.units
    }

    /// Changes units, rescaling the stored offsets with them.
    pub fn set_units(&mut self, units: LengthUnit, bounds: &FieldBounds) {
        let factor = self.units.to_inches();
        let (ox, oy) = (self.offset_x / factor, self.offset_y / factor);
        self.units = units;
        self.set_offsets(ox, oy, self.offset_theta, bounds);
    }

    /// Sets offsets from source-unit values. X/Y are clamped to the field,
    /// theta is normalized.
    pub fn set_offsets(&mut self, x: f64, y: f64, theta: f64, bounds: &FieldBounds) {
        let sanitize = |v: f64| if v.is_finite() { v } else { 0.0 };
        let x = sanitize(x).clamp(bounds.min_x, bounds.max_x);
        let y = sanitize(y).clamp(bounds.min_y, bounds.max_y);
        let factor = self.units.to_inches();
        self.offset_x = x * factor;
        self.offset_y = y * factor;
        self.offset_theta = normalize_deg(theta);
    }

    /// Offsets in inches / degrees.
    pub fn offsets(&self) -> (f64, f64, f64) {
        (self.offset_x, self.offset_y, self.offset_theta)
    }

    /// Stored pose → display pose in field inches.
    pub fn apply(&self, pose: &Pose) -> Pose {
        let factor = self.units.to_inches();
        Pose {
            x: pose.x * factor + self.offset_x,
            y: pose.y * factor + self.offset_y,
            theta: normalize_deg(pose.theta + self.offset_theta),
            ..*pose
        }
    }

    /// True when `apply` is the identity.
    pub fn is_identity(&self) -> bool {
        self.units == LengthUnit::In
            && self.offset_x == 0.0
            && self.offset_y == 0.0
            && self.offset_theta == 0.0
    }
}
