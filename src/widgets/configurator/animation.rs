//! Linear property tween driven by caller-supplied instants.

use std::time::{Duration, Instant};

/// Linear `from -> to` over `duration`, clamped at the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    from: f32,
    to: f32,
    duration: Duration,
    start: Instant,
    finished: bool,
}

impl Tween {
    pub fn new(from: f32, to: f32, duration: Duration, start: Instant) -> Self {
        Self {
            from,
            to,
            duration,
            start,
            finished: false,
        }
    }

    /// Progress in `[0, 1]` at `now`. Zero duration is complete immediately.
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn value_at(&self, now: Instant) -> f32 {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from + (self.to - self.from) * t
    }

    /// Advance to `now`: returns the value and whether the tween completed
    /// on this call. Completion is reported exactly once.
    pub fn advance(&mut self, now: Instant) -> (f32, bool) {
        let value = self.value_at(now);
        let done = !self.finished && self.progress(now) >= 1.0;
        if done {
            self.finished = true;
        }
        (value, done)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn end(&self) -> Instant {
        self.start + self.duration
    }
}
