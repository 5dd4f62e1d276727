//! Frame clock feeding `delta_time` into each tick.
//!
//! ```ignore
//! let mut clock = FrameClock::new();
//! loop {
//!     let dt = clock.tick();
//!     runtime.tick(dt)?;
//! }
//! ```

use std::time::{Duration, Instant};

/// Longest step a single tick may take, in seconds.
///
/// A stalled window (dragging, minimised) would otherwise push every node
/// far past the boundary in one step.
pub const DEFAULT_MAX_DELTA: f32 = 0.1;

const FPS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
    delta_secs: f32,
    max_delta: f32,
    /// Fixed step for deterministic runs.
    fixed_delta: Option<f32>,
    paused: bool,
    frame_count: u64,
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            delta_secs: 0.0,
            max_delta: DEFAULT_MAX_DELTA,
            fixed_delta: None,
            paused: false,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
        }
    }

    /// Advance to now and return the delta for this tick.
    ///
    /// Returns 0 while paused. Otherwise the delta is clamped to
    /// `[0, max_delta]`.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let raw = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.delta_secs = if self.paused {
            0.0
        } else {
            self.fixed_delta.unwrap_or(raw).clamp(0.0, self.max_delta)
        };

        self.frame_count += 1;
        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= FPS_INTERVAL {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        self.delta_secs
    }

    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn set_max_delta(&mut self, max_delta: f32) {
        self.max_delta = max_delta.max(0.0);
    }

    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
