//! Engine configuration.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only needs the keys it overrides.

use crate::error::EngineError;
use crate::frame::LengthUnit;
use crate::geometry::FieldBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// SECTIONS
// =============================================================================

/// Raw-speed band mapped onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub min_speed: f64,
    pub max_speed: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min_speed: 0.0,
            max_speed: 127.0, // full-scale motor command
        }
    }
}

/// Event-to-pose correlation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Maximum |Δt| for an exact (non-approximate) marker
    pub tolerance_ms: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self { tolerance_ms: 40.0 }
    }
}

/// Live ingestion and control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Pending line queue capacity; oldest lines are dropped beyond it
    pub queue_capacity: usize,
    /// Period of the integration step
    pub refresh_interval_ms: u64,
    /// Deadline for start/stop/kill requests
    pub control_timeout_ms: u64,
    /// Minimum spacing between user-initiated control actions
    pub action_cooldown_ms: u64,
    /// Move the selection to the newest sample after each integration
    pub follow_head: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 20_000,
            refresh_interval_ms: 500,
            control_timeout_ms: 5_000,
            action_cooldown_ms: 400,
            follow_head: true,
        }
    }
}

/// Planning document and editor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Maximum undo entries kept
    pub undo_depth: usize,
    /// Coordinate grid step in inches (0 = off)
    pub snap_step_in: f64,
    /// Heading step in degrees (0 = off)
    pub theta_snap_step_deg: f64,
    /// Keyboard nudge distance in inches
    pub move_step_in: f64,
    /// Nudge multiplier with the coarse modifier held
    pub coarse_move_multiplier: f64,
    /// Plan playback speed as a percentage of `speed.max_speed`
    pub speed_pct: f64,
    /// Waypoint pick radius in pixels
    pub hit_radius_px: f64,
    /// Distance from waypoint centre to its heading handle, in pixels
    pub heading_handle_px: f64,
    /// Heading handle pick radius in pixels
    pub heading_handle_radius_px: f64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            undo_depth: 80,
            snap_step_in: 0.0,
            theta_snap_step_deg: 0.0,
            move_step_in: 0.5,
            coarse_move_multiplier: 5.0,
            speed_pct: 50.0,
            hit_radius_px: 12.0,
            heading_handle_px: 36.0,
            heading_handle_radius_px: 6.0,
        }
    }
}

/// Viewport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub bounds: FieldBounds,
    /// Crop the viewport to a centred square before fitting
    pub square: bool,
    pub zoom_min: f64,
    pub zoom_max: f64,
    /// Pixels of field that must stay visible on every edge
    pub pan_margin_px: f64,
    /// Margin around the pose extents for fit-to-poses, in inches
    pub fit_margin_in: f64,
    /// Track hover/pick tolerance in pixels
    pub track_pick_px: f64,
    /// Initial field rotation in degrees (quantized)
    pub rotation_deg: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            bounds: FieldBounds::default(),
            square: true,
            zoom_min: 0.35,
            zoom_max: 12.0,
            pan_margin_px: 15.0,
            fit_margin_in: 6.0,
            track_pick_px: 26.0, // hover tolerance 14 + pad 12
            rotation_deg: 0.0,
        }
    }
}

/// How stored poses map onto the field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub units: LengthUnit,
    pub offset_x: f64,
    pub offset_y: f64,
    pub offset_theta: f64,
}

// =============================================================================
// ENGINE CONFIG
// =============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub speed: SpeedConfig,
    pub correlation: CorrelationConfig,
    pub ingest: IngestConfig,
    pub plan: PlanConfig,
    pub view: ViewConfig,
    pub frame: FrameConfig,
    /// Quiet period before a changed document is written
    pub save_debounce_ms: u64,
    /// Trajectory playback rate multiplier
    pub play_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed: SpeedConfig::default(),
            correlation: CorrelationConfig::default(),
            ingest: IngestConfig::default(),
            plan: PlanConfig::default(),
            view: ViewConfig::default(),
            frame: FrameConfig::default(),
            save_debounce_ms: 300,
            play_rate: 1.0,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON settings document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Rejects values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.ingest.queue_capacity == 0 {
            return Err(EngineError::InvalidConfig("ingest.queue_capacity must be > 0".into()));
        }
        if self.ingest.refresh_interval_ms == 0 {
            return Err(EngineError::InvalidConfig("ingest.refresh_interval_ms must be > 0".into()));
        }
        if self.plan.undo_depth == 0 {
            return Err(EngineError::InvalidConfig("plan.undo_depth must be > 0".into()));
        }
        let zoom_ok = self.view.zoom_min > 0.0 && self.view.zoom_min <= self.view.zoom_max;
        if !zoom_ok {
            return Err(EngineError::InvalidConfig(format!(
                "view zoom range [{}, {}] is empty",
                self.view.zoom_min, self.view.zoom_max
            )));
        }
        if self.correlation.tolerance_ms.is_nan() || self.correlation.tolerance_ms < 0.0 {
            return Err(EngineError::InvalidConfig("correlation.tolerance_ms must be >= 0".into()));
        }
        Ok(())
    }

    /// Plan playback speed in inches per second.
    pub fn plan_speed_in_per_sec(&self) -> f64 {
        let pct = if self.plan.speed_pct.is_finite() {
            self.plan.speed_pct.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let max = self.speed.min_speed.max(self.speed.max_speed);
        let max = if max.is_finite() { max } else { 0.0 };
        max * pct / 100.0
    }
}
