//! One-shot frame-time timer

use std::time::Duration;

use crate::scene::object::{UpdateContext, Updateable};
use crate::scheduler::queue::TaskQueues;

type TimerAction = Box<dyn FnOnce(&TaskQueues) + Send>;

/// Updateable that fires an action once after a delay of accumulated frame time
///
/// The delay advances by each cycle's `delay_ms`, so it stands still while the
/// update thread is stopped. After firing, the timer retires itself.
pub struct DelayTimer {
    delay_ms: f32,
    elapsed_ms: f32,
    action: Option<TimerAction>,
}

impl DelayTimer {
    /// Create a timer that runs `action` once `delay` has passed
    pub fn new(delay: Duration, action: impl FnOnce(&TaskQueues) + Send + 'static) -> Self {
        Self {
            delay_ms: delay.as_micros() as f32 / 1000.0,
            elapsed_ms: 0.0,
            action: Some(Box::new(action)),
        }
    }

    /// Configured delay
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f32(self.delay_ms / 1000.0)
    }

    /// Frame time accumulated so far
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f32(self.elapsed_ms / 1000.0)
    }

    /// Whether the action already ran
    pub fn is_done(&self) -> bool {
        self.action.is_none()
    }
}

impl Updateable for DelayTimer {
    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        if self.action.is_none() {
            ctx.mark_unused();
            return;
        }

        self.elapsed_ms += ctx.frame().delay_ms;
        if self.elapsed_ms > self.delay_ms {
            if let Some(action) = self.action.take() {
                action(ctx.queues());
            }
            ctx.mark_unused();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::time::FrameTime;
    use crate::scheduler::queue::DeferredQueue;

    fn frame(delay_ms: f32) -> FrameTime {
        FrameTime {
            delay_ms,
            ..FrameTime::zero()
        }
    }

    #[test]
    fn test_fires_once_after_delay() {
        let update = DeferredQueue::new("update");
        let gl = DeferredQueue::new("gl");
        let queues = TaskQueues::new(update.sender(), gl.sender());

        let mut timer = DelayTimer::new(Duration::from_millis(100), |queues| {
            queues.gl_queue_event(|backend| backend.draw_indexed(6));
        });

        let step = frame(40.0);
        for _ in 0..2 {
            let mut ctx = UpdateContext::new(&step, &queues);
            timer.update(&mut ctx);
            assert!(!ctx.is_retired());
        }
        assert_eq!(gl.len(), 0);

        // 120 ms accumulated, strictly past the delay.
        let mut ctx = UpdateContext::new(&step, &queues);
        timer.update(&mut ctx);
        assert!(ctx.is_retired());
        assert!(timer.is_done());
        assert_eq!(gl.len(), 1);

        let mut ctx = UpdateContext::new(&step, &queues);
        timer.update(&mut ctx);
        assert_eq!(gl.len(), 1);
    }

    #[test]
    fn test_exact_delay_does_not_fire() {
        let update = DeferredQueue::new("update");
        let gl = DeferredQueue::new("gl");
        let queues = TaskQueues::new(update.sender(), gl.sender());
        let mut timer = DelayTimer::new(Duration::from_millis(50), |queues| {
            queues.gl_queue_event(|_| {});
        });

        let step = frame(50.0);
        let mut ctx = UpdateContext::new(&step, &queues);
        timer.update(&mut ctx);
        assert!(!timer.is_done());
    }
}
