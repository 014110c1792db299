//! Render-complete signal between the update and render threads

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Flag the render thread raises when a requested frame is finished
///
/// The update thread clears it with [`FrameSignal::begin_frame`] before
/// requesting a render and then blocks in [`FrameSignal::wait_complete`]
/// instead of polling.
#[derive(Debug)]
pub struct FrameSignal {
    complete: Mutex<bool>,
    changed: Condvar,
}

impl FrameSignal {
    /// Create a signal in the completed state, so the first wait returns at once
    pub fn new() -> Self {
        Self {
            complete: Mutex::new(true),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A panicking render step must not wedge the update thread.
        self.complete.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a frame as requested but not drawn yet
    pub fn begin_frame(&self) {
        *self.lock() = false;
    }

    /// Mark the requested frame as drawn and wake the waiting thread
    pub fn complete(&self) {
        *self.lock() = true;
        self.changed.notify_all();
    }

    /// Check whether the last requested frame was drawn
    pub fn is_complete(&self) -> bool {
        *self.lock()
    }

    /// Block until the frame is complete or `keep_waiting` returns false
    ///
    /// `keep_waiting` is re-checked at least every `recheck`, so a stop
    /// request is noticed even if the render thread never answers. Returns
    /// whether the frame completed.
    pub fn wait_complete(&self, recheck: Duration, mut keep_waiting: impl FnMut() -> bool) -> bool {
        let mut complete = self.lock();
        while !*complete {
            if !keep_waiting() {
                return false;
            }
            complete = match self.changed.wait_timeout(complete, recheck) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Like [`FrameSignal::wait_complete`] with an overall deadline
    pub fn wait_complete_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.wait_complete(Duration::from_millis(1), || Instant::now() < deadline)
    }
}

impl Default for FrameSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes the borrowed signal when dropped
///
/// Held across the draw so the update thread is released on every exit
/// path, including early returns and panics.
#[must_use = "the frame completes as soon as the guard is dropped"]
pub struct CompletionGuard<'a> {
    signal: &'a FrameSignal,
}

impl<'a> CompletionGuard<'a> {
    /// Guard `signal` for the duration of a frame
    pub fn new(signal: &'a FrameSignal) -> Self {
        Self { signal }
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.signal.complete();
    }
}
