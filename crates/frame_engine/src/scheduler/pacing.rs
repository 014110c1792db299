//! Update-cycle pacing

use std::time::{Duration, Instant};

/// Decides when the update thread requests a render and how long it sleeps
///
/// Cycles are scheduled against a running deadline, so the long-run cycle
/// rate matches the requested FPS regardless of how long single cycles take.
/// A cycle that overruns by more than a whole frame resynchronises the
/// deadline instead of bursting to catch up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    frame_delay: Duration,
    render_delay: u32,
    frames_skipped: u32,
    deadline: Option<Instant>,
}

impl FramePacer {
    /// Sleep is shortened by this margin to leave room for the render wait
    pub const SLEEP_MARGIN: Duration = Duration::from_millis(1);

    /// Create a pacer for `fps` cycles per second, rendering every `render_delay + 1` cycles
    pub fn new(fps: f32, render_delay: u32) -> Self {
        Self {
            frame_delay: frame_delay(fps),
            render_delay,
            frames_skipped: 0,
            deadline: None,
        }
    }

    /// Whether this cycle should request a render
    ///
    /// Returns true once every `render_delay + 1` calls.
    pub fn should_render(&mut self) -> bool {
        if self.frames_skipped >= self.render_delay {
            self.frames_skipped = 0;
            true
        } else {
            self.frames_skipped += 1;
            false
        }
    }

    /// How long to sleep at `now`, the end of this cycle's work
    pub fn sleep_for(&mut self, now: Instant) -> Option<Duration> {
        let deadline = match self.deadline {
            Some(previous) => previous + self.frame_delay,
            None => now + self.frame_delay,
        };

        if deadline + self.frame_delay < now {
            log::trace!("Update cycle overran by more than a frame, resynchronising");
            self.deadline = Some(now);
            return None;
        }
        self.deadline = Some(deadline);

        deadline
            .checked_duration_since(now)
            .and_then(|remaining| remaining.checked_sub(Self::SLEEP_MARGIN))
            .filter(|sleep| !sleep.is_zero())
    }

    /// Change the number of cycles skipped between renders
    pub fn set_render_delay(&mut self, render_delay: u32) {
        self.render_delay = render_delay;
        self.frames_skipped = self.frames_skipped.min(render_delay);
    }

    /// Change the requested rate and restart the deadline
    pub fn set_fps(&mut self, fps: f32) {
        self.frame_delay = frame_delay(fps);
        self.deadline = None;
    }

    /// Forget the running deadline, e.g. after the thread was paused
    pub fn reset(&mut self) {
        self.deadline = None;
        self.frames_skipped = 0;
    }

    /// Requested cycle duration
    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    /// Cycles skipped between renders
    pub fn render_delay(&self) -> u32 {
        self.render_delay
    }
}

fn frame_delay(fps: f32) -> Duration {
    if fps.is_finite() && fps > 0.0 {
        Duration::from_secs_f32(1.0 / fps)
    } else {
        log::warn!("Invalid requested fps {}, pacing at 1 fps", fps);
        Duration::from_secs(1)
    }
}
