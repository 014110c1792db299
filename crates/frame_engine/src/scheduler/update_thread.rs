//! # Update Thread
//!
//! Dedicated thread that drives the frame loop at the requested rate:
//!
//! 1. sample the previous cycle and publish this cycle's [`FrameTime`]
//! 2. run one update frame
//! 3. request a render every `render_delay + 1` cycles
//! 4. sleep until the cycle deadline, interruptible by `stop`
//! 5. wait for the render thread to finish the requested frame
//!
//! The next cycle never starts advancing objects before the frame requested
//! by the previous one was reported done, unless the thread is stopping.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::foundation::time::{FpsMeter, FrameTime, Stopwatch};
use crate::scheduler::pacing::FramePacer;
use crate::scheduler::signal::FrameSignal;

/// How often a blocked render wait re-checks whether the thread should stop
const RENDER_RECHECK: Duration = Duration::from_millis(10);

/// What the update thread drives
pub trait FrameSource: Send + Sync + 'static {
    /// Run one update frame with the published timing
    fn update_frame(&self, frame: FrameTime);

    /// Ask the surface for one render
    fn request_render(&self);

    /// Signal the render thread raises after each frame
    fn render_signal(&self) -> &FrameSignal;
}

/// Pacing settings shared between the engine handle and the update thread
///
/// Writes are picked up at the top of the next cycle.
#[derive(Debug)]
pub struct TimingSettings {
    requested_fps: AtomicU32,
    render_delay: AtomicU32,
    current_fps: AtomicU32,
}

impl TimingSettings {
    /// Create settings for `requested_fps`, rendering every `render_delay + 1` cycles
    pub fn new(requested_fps: f32, render_delay: u32) -> Self {
        Self {
            requested_fps: AtomicU32::new(requested_fps.to_bits()),
            render_delay: AtomicU32::new(render_delay),
            current_fps: AtomicU32::new(requested_fps.to_bits()),
        }
    }

    /// Requested update rate
    pub fn requested_fps(&self) -> f32 {
        f32::from_bits(self.requested_fps.load(Ordering::Acquire))
    }

    /// Change the requested update rate
    pub fn set_requested_fps(&self, fps: f32) {
        self.requested_fps.store(fps.to_bits(), Ordering::Release);
    }

    /// Cycles skipped between render requests
    pub fn render_delay(&self) -> u32 {
        self.render_delay.load(Ordering::Acquire)
    }

    /// Change the cycles skipped between render requests
    pub fn set_render_delay(&self, frames: u32) {
        self.render_delay.store(frames, Ordering::Release);
    }

    /// Smoothed measured update rate
    pub fn current_fps(&self) -> f32 {
        f32::from_bits(self.current_fps.load(Ordering::Acquire))
    }

    /// Publish a new measured rate
    pub fn publish_current_fps(&self, fps: f32) {
        self.current_fps.store(fps.to_bits(), Ordering::Release);
    }
}

/// Handle of the update thread
///
/// Starting an already running thread and stopping a stopped one are no-ops.
#[derive(Debug, Default)]
pub struct UpdateThread {
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl UpdateThread {
    /// Create a stopped handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the thread; returns false if it was already running
    pub fn start(&mut self, source: Arc<dyn FrameSource>, timing: Arc<TimingSettings>) -> std::io::Result<bool> {
        if self.is_alive() {
            log::debug!("Update thread already running");
            return Ok(false);
        }
        // Reap a thread that ended on its own.
        self.stop();

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("frame-update".to_string())
            .spawn(move || run_loop(source.as_ref(), &timing, &thread_running, &stop_rx))?;

        self.running = running;
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(true)
    }

    /// Stop the thread and wait for the in-progress cycle; returns false if it was not running
    ///
    /// Called from the update thread itself, e.g. by a queued task, this only
    /// requests the stop and the loop exits after the current cycle.
    pub fn stop(&mut self) -> bool {
        self.running.store(false, Ordering::Release);
        // Disconnecting wakes a sleeping loop at once.
        self.stop_tx = None;

        let Some(handle) = self.handle.take() else {
            return false;
        };

        if handle.thread().id() == thread::current().id() {
            log::debug!("Update thread stop requested from inside the loop");
            return true;
        }

        if handle.join().is_err() {
            log::error!("Update thread panicked");
        }
        true
    }

    /// Whether the thread is running
    pub fn is_alive(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for UpdateThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    source: &dyn FrameSource,
    timing: &TimingSettings,
    running: &AtomicBool,
    stop_rx: &channel::Receiver<()>,
) {
    let mut meter = FpsMeter::new(timing.requested_fps());
    let mut pacer = FramePacer::new(meter.requested_fps(), timing.render_delay());
    let mut last_cycle = meter.requested_frame_delay();
    log::info!("Update thread started at {} fps", meter.requested_fps());

    while running.load(Ordering::Acquire) {
        let cycle = Stopwatch::start_new();

        let fps = timing.requested_fps();
        if fps != meter.requested_fps() {
            log::debug!("Requested fps changed to {}", fps);
            meter.reset(fps);
            pacer.set_fps(fps);
            last_cycle = meter.requested_frame_delay();
        }
        pacer.set_render_delay(timing.render_delay());

        let frame = meter.tick(last_cycle);
        timing.publish_current_fps(meter.current_fps());
        source.update_frame(frame);

        if pacer.should_render() {
            source.render_signal().begin_frame();
            source.request_render();
        }

        if let Some(sleep) = pacer.sleep_for(Instant::now()) {
            match stop_rx.recv_timeout(sleep) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        source
            .render_signal()
            .wait_complete(RENDER_RECHECK, || running.load(Ordering::Acquire));
        last_cycle = cycle.elapsed();
    }

    log::info!("Update thread stopped");
}
