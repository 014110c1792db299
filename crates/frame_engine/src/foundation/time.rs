//! Time management utilities

use std::time::{Duration, Instant};

/// Frame timing shared with every updateable during a tick
///
/// Overwritten once per update cycle by the update thread and read-only for
/// the objects advanced within that cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    /// Wall-clock duration of the previous cycle in milliseconds
    pub delay_ms: f32,
    /// Simulation step relative to the requested rate (1.0 when on target)
    pub delta_step: f32,
    /// Seconds per frame at the smoothed rate
    pub delta_secs: f32,
    /// Number of update cycles completed since the timing was reset
    pub frame_index: u64,
}

impl FrameTime {
    /// Timing state used before the first cycle and after a resume
    pub const fn zero() -> Self {
        Self {
            delay_ms: 0.0,
            delta_step: 0.0,
            delta_secs: 0.0,
            frame_index: 0,
        }
    }
}

/// Smoothed FPS measurement over roughly one second of cycles
///
/// Keeps a ring buffer of the last `requested_fps` instantaneous rates,
/// pre-filled with the requested rate so the first readings are stable.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    requested_fps: f32,
    samples: Vec<f32>,
    cursor: usize,
    current_fps: f32,
    frame_index: u64,
}

impl FpsMeter {
    /// Shortest cycle accepted as a sample, avoids dividing by zero
    const MIN_CYCLE_MS: f32 = 1.0;

    /// Create a meter for the given requested rate
    pub fn new(requested_fps: f32) -> Self {
        let len = Self::window_len(requested_fps);
        Self {
            requested_fps,
            samples: vec![requested_fps; len],
            cursor: 0,
            current_fps: requested_fps,
            frame_index: 0,
        }
    }

    fn window_len(requested_fps: f32) -> usize {
        // Saturating float-to-int cast, non-finite input lands on 1.
        (requested_fps.round() as usize).max(1)
    }

    /// Requested frame duration
    pub fn requested_frame_delay(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.requested_fps)
    }

    /// Requested update rate
    pub fn requested_fps(&self) -> f32 {
        self.requested_fps
    }

    /// Smoothed rate over the sample window
    pub fn current_fps(&self) -> f32 {
        self.current_fps
    }

    /// Number of samples in the window
    pub fn window(&self) -> usize {
        self.samples.len()
    }

    /// Record the duration of the previous cycle and return the smoothed rate
    pub fn sample(&mut self, last_cycle: Duration) -> f32 {
        let cycle_ms = (last_cycle.as_secs_f32() * 1000.0).max(Self::MIN_CYCLE_MS);
        self.samples[self.cursor] = 1000.0 / cycle_ms;
        self.cursor = (self.cursor + 1) % self.samples.len();

        let sum: f32 = self.samples.iter().sum();
        self.current_fps = sum / self.samples.len() as f32;
        self.current_fps
    }

    /// Sample the previous cycle and derive this cycle's frame timing
    pub fn tick(&mut self, last_cycle: Duration) -> FrameTime {
        let fps = self.sample(last_cycle);
        let frame = FrameTime {
            delay_ms: last_cycle.as_secs_f32() * 1000.0,
            delta_step: self.requested_fps / fps,
            delta_secs: 1.0 / fps,
            frame_index: self.frame_index,
        };
        self.frame_index += 1;
        frame
    }

    /// Restart measurement for a new requested rate
    pub fn reset(&mut self, requested_fps: f32) {
        *self = Self::new(requested_fps);
    }
}

/// Simple stopwatch for measuring elapsed time
pub struct Stopwatch {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    pub fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a new stopwatch and start it immediately
    pub fn start_new() -> Self {
        let mut stopwatch = Self::new();
        stopwatch.start();
        stopwatch
    }

    /// Start the stopwatch
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Stop the stopwatch and accumulate elapsed time
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        let running = self.start_time.map_or(Duration::ZERO, |start| start.elapsed());
        self.elapsed + running
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_window_spans_requested_rate() {
        assert_eq!(FpsMeter::new(30.0).window(), 30);
        assert_eq!(FpsMeter::new(0.2).window(), 1);
    }

    #[test]
    fn test_steady_rate_keeps_average() {
        let mut meter = FpsMeter::new(50.0);
        for _ in 0..100 {
            meter.sample(Duration::from_millis(20));
        }
        assert_relative_eq!(meter.current_fps(), 50.0, epsilon = 0.01);
    }

    #[test]
    fn test_slow_cycle_lowers_average() {
        let mut meter = FpsMeter::new(10.0);
        // One 200ms cycle in a window of ten 100ms cycles.
        let fps = meter.sample(Duration::from_millis(200));
        assert_relative_eq!(fps, (9.0 * 10.0 + 5.0) / 10.0, epsilon = 0.001);
    }

    #[test]
    fn test_zero_cycle_is_clamped() {
        let mut meter = FpsMeter::new(1.0);
        let fps = meter.sample(Duration::ZERO);
        assert_relative_eq!(fps, 1000.0, epsilon = 0.001);
    }

    #[test]
    fn test_tick_derives_frame_time() {
        let mut meter = FpsMeter::new(25.0);
        let first = meter.tick(Duration::from_millis(40));
        let second = meter.tick(Duration::from_millis(40));

        assert_eq!(first.frame_index, 0);
        assert_eq!(second.frame_index, 1);
        assert_relative_eq!(second.delay_ms, 40.0, epsilon = 0.001);
        assert_relative_eq!(second.delta_step, 1.0, epsilon = 0.001);
        assert_relative_eq!(second.delta_secs, 0.04, epsilon = 0.0001);
    }

    #[test]
    fn test_stopwatch_accumulates() {
        let mut stopwatch = Stopwatch::start_new();
        std::thread::sleep(Duration::from_millis(2));
        stopwatch.stop();
        let first = stopwatch.elapsed();
        assert!(first >= Duration::from_millis(2));
        assert_eq!(stopwatch.elapsed(), first);
    }
}
