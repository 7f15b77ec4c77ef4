//! Frame-driven playback clocks and redraw coalescing.
//!
//! Neither clock owns a timer. The host calls `tick` once per frame with the
//! wall-clock delta and keeps doing so while [`TrajectoryPlayback::is_playing`]
//! (or the plan equivalent) holds.

use crate::planning::PlanningDocument;
use crate::pose_timeline::PoseTimeline;
use tracing::debug;

/// Coalesces redraw requests: any number per frame yield one redraw.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedrawRequest {
    pending: bool,
}

impl RedrawRequest {
    pub fn request(&mut self) {
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Consumes the pending flag; true at most once per batch of requests.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

/// Outcome of one trajectory tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrajectoryTick {
    /// Not playing, or nothing to play
    Idle,
    /// Time advanced; `index` is the floor sample at `time`
    Advanced { time: f64, index: usize },
    /// Reached the last sample and stopped
    Finished { time: f64, index: usize },
}

/// Time playback over the pose track.
#[derive(Debug, Clone)]
pub struct TrajectoryPlayback {
    playing: bool,
    /// Current time in ms
    time: f64,
    rate: f64,
}

impl TrajectoryPlayback {
    pub fn new(rate: f64) -> Self {
        Self {
            playing: false,
            time: 0.0,
            rate: sanitize_rate(rate),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = sanitize_rate(rate);
    }

    /// Starts from `start_time`. Needs at least two samples.
    pub fn play(&mut self, start_time: f64, timeline: &PoseTimeline) -> bool {
        if timeline.len() < 2 {
            return false;
        }
        self.time = start_time;
        self.playing = true;
        true
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Advances by `dt_ms` of wall-clock time scaled by the rate.
    pub fn tick(&mut self, dt_ms: f64, timeline: &PoseTimeline) -> TrajectoryTick {
        if !self.playing {
            return TrajectoryTick::Idle;
        }
        let Some((_, t_max)) = timeline.time_range() else {
            self.playing = false;
            return TrajectoryTick::Idle;
        };

        self.time += dt_ms.max(0.0) * self.rate;
        if self.time >= t_max {
            self.time = t_max;
            self.playing = false;
            debug!(time = t_max, "trajectory playback reached end");
            return TrajectoryTick::Finished {
                time: t_max,
                index: timeline.len() - 1,
            };
        }
        let index = timeline.floor_index(self.time).unwrap_or(0);
        TrajectoryTick::Advanced { time: self.time, index }
    }
}

/// Arc-length playback over the planned path.
#[derive(Debug, Clone)]
pub struct PlanPlayback {
    playing: bool,
    /// Inches per second at rate 1
    speed: f64,
    rate: f64,
}

impl PlanPlayback {
    pub fn new(speed_in_per_sec: f64, rate: f64) -> Self {
        Self {
            playing: false,
            speed: speed_in_per_sec.max(0.0),
            rate: sanitize_rate(rate),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed_in_per_sec: f64) {
        self.speed = if speed_in_per_sec.is_finite() { speed_in_per_sec.max(0.0) } else { 0.0 };
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = sanitize_rate(rate);
    }

    /// Starts playback, rewinding first when already at the end.
    pub fn play(&mut self, doc: &mut PlanningDocument) -> bool {
        if doc.len() < 2 {
            return false;
        }
        if doc.playback_distance() >= doc.total_length() {
            doc.set_playback_distance(0.0);
        }
        self.playing = true;
        true
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle(&mut self, doc: &mut PlanningDocument) -> bool {
        if self.playing {
            self.pause();
            false
        } else {
            self.play(doc)
        }
    }

    /// Advances the document's playback distance. Returns whether playback
    /// is still running.
    pub fn tick(&mut self, dt_ms: f64, doc: &mut PlanningDocument) -> bool {
        if !self.playing {
            return false;
        }
        let total = doc.total_length();
        let next = doc.playback_distance() + dt_ms.max(0.0) / 1000.0 * self.speed * self.rate;
        doc.set_playback_distance(next);
        if next >= total {
            self.playing = false;
        }
        self.playing
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        1.0
    }
}
