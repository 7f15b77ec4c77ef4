//! Synthetic robot that speaks the live line protocol.
//!
//! A differential-drive base wanders the field with noisy wheel commands and
//! reports itself the way the real streaming backend does: one `[DATA]` line
//! per sample and an occasional `[WATCH]` line stamped with a sample time.

use motionview_core::geometry::normalize_deg;
use motionview_core::FieldBounds;
use nalgebra::Vector2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Kinematics and reporting cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotConfig {
    /// Time between `[DATA]` lines
    pub sample_interval_ms: f64,
    /// Time between `[WATCH]` lines
    pub watch_interval_ms: f64,
    /// Wheel command the robot cruises at
    pub cruise_command: f64,
    /// Largest wheel command magnitude
    pub max_command: f64,
    /// Inches per second for one unit of wheel command
    pub in_per_sec_per_command: f64,
    pub track_width_in: f64,
    /// Standard deviation of per-sample wheel command noise
    pub command_noise_std: f64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 50.0,
            watch_interval_ms: 1_000.0,
            cruise_command: 60.0,
            max_command: 127.0,
            in_per_sec_per_command: 0.4,
            track_width_in: 12.0,
            command_noise_std: 4.0,
        }
    }
}

const WATCH_LABELS: &[&str] = &["battery", "intake", "lift"];

/// Keep-out band along the field walls, in inches.
const WALL_MARGIN_IN: f64 = 6.0;

/// Seeded differential-drive robot.
pub struct SimRobot {
    config: RobotConfig,
    bounds: FieldBounds,
    rng: ChaCha8Rng,
    /// `None` when the configured deviation is invalid
    noise: Option<Normal<f64>>,
    position: Vector2<f64>,
    /// Compass heading in degrees
    theta: f64,
    l_cmd: f64,
    r_cmd: f64,
    clock_ms: f64,
    pending_ms: f64,
    next_watch_ms: f64,
    samples: u64,
    watches: u64,
}

impl SimRobot {
    pub fn new(rng: ChaCha8Rng, bounds: FieldBounds, config: RobotConfig) -> Self {
        let noise = Normal::new(0.0, config.command_noise_std).ok();
        Self {
            config,
            bounds,
            rng,
            noise,
            position: Vector2::zeros(),
            theta: 0.0,
            l_cmd: config.cruise_command,
            r_cmd: config.cruise_command,
            clock_ms: 0.0,
            pending_ms: 0.0,
            next_watch_ms: config.watch_interval_ms,
            samples: 0,
            watches: 0,
        }
    }

    pub fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    pub fn position(&self) -> Vector2<f64> {
        self.position
    }

    /// `[DATA]` lines emitted so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// `[WATCH]` lines emitted so far.
    pub fn watches(&self) -> u64 {
        self.watches
    }

    /// Power cycle: the robot's clock starts again from zero.
    pub fn restart(&mut self) {
        self.clock_ms = 0.0;
        self.pending_ms = 0.0;
        self.next_watch_ms = self.config.watch_interval_ms;
    }

    /// Runs for `dt_ms` and returns the lines produced, in order.
    pub fn step(&mut self, dt_ms: f64) -> Vec<String> {
        let mut lines = Vec::new();
        self.pending_ms += dt_ms.max(0.0);
        while self.pending_ms >= self.config.sample_interval_ms {
            self.pending_ms -= self.config.sample_interval_ms;
            self.clock_ms += self.config.sample_interval_ms;
            self.drive(self.config.sample_interval_ms / 1000.0);
            lines.push(self.data_line());
            self.samples += 1;

            if self.clock_ms >= self.next_watch_ms {
                self.next_watch_ms += self.config.watch_interval_ms;
                lines.push(self.watch_line());
                self.watches += 1;
            }
        }
        lines
    }

    fn drive(&mut self, dt_s: f64) {
        let max = self.config.max_command;
        let cruise = self.config.cruise_command;
        let (dl, dr) = match self.noise {
            Some(noise) => (noise.sample(&mut self.rng), noise.sample(&mut self.rng)),
            None => (0.0, 0.0),
        };
        // Commands drift around cruise with a pull back toward it
        self.l_cmd += dl + (cruise - self.l_cmd) * 0.1;
        self.r_cmd += dr + (cruise - self.r_cmd) * 0.1;
        self.l_cmd = self.l_cmd.clamp(-max, max);
        self.r_cmd = self.r_cmd.clamp(-max, max);

        let v_l = self.l_cmd * self.config.in_per_sec_per_command;
        let v_r = self.r_cmd * self.config.in_per_sec_per_command;
        let v = (v_l + v_r) / 2.0;
        // Left faster than right turns clockwise, which is a positive compass turn
        let omega = (v_l - v_r) / self.config.track_width_in.max(1e-3);

        self.theta = normalize_deg(self.theta + omega.to_degrees() * dt_s);
        let heading = self.theta.to_radians();
        self.position += Vector2::new(heading.sin(), heading.cos()) * v * dt_s;

        let min = Vector2::new(self.bounds.min_x + WALL_MARGIN_IN, self.bounds.min_y + WALL_MARGIN_IN);
        let max = Vector2::new(self.bounds.max_x - WALL_MARGIN_IN, self.bounds.max_y - WALL_MARGIN_IN);
        let clamped = Vector2::new(
            self.position.x.clamp(min.x, max.x.max(min.x)),
            self.position.y.clamp(min.y, max.y.max(min.y)),
        );
        if clamped != self.position {
            self.position = clamped;
            self.theta = normalize_deg(self.theta + 180.0);
        }
    }

    fn data_line(&self) -> String {
        format!(
            "[DATA],{:.0},{:.3},{:.3},{:.2},{:.1},{:.1}",
            self.clock_ms, self.position.x, self.position.y, self.theta, self.l_cmd, self.r_cmd
        )
    }

    fn watch_line(&mut self) -> String {
        let label = WATCH_LABELS[(self.watches as usize) % WATCH_LABELS.len()];
        let level = if self.rng.gen_bool(0.1) { "WARN" } else { "INFO" };
        let value = self.rng.gen_range(0..100);
        format!("[WATCH],{:.0},{level},{label}:,{value}", self.clock_ms)
    }
}
