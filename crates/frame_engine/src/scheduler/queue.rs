//! Deferred task queues
//!
//! FIFO queues of one-shot tasks, filled from any thread and drained by the
//! thread that owns the queue: the update thread drains [`UpdateTask`]s at the
//! start of every cycle, the render thread drains [`GlTask`]s at the start of
//! every frame.
//!
//! A drain only runs the tasks that were queued when it started. Tasks queued
//! while the drain is running, including by the drained tasks themselves,
//! wait for the next drain.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::render::backend::GraphicsBackend;
use crate::scene::{DelayTimer, Scene};

/// Task run on the update thread with exclusive access to the scene
pub type UpdateTask = Box<dyn FnOnce(&mut Scene) + Send>;

/// Task run on the render thread with access to the graphics backend
pub type GlTask = Box<dyn FnOnce(&mut dyn GraphicsBackend) + Send>;

/// Cloneable producer side of a [`DeferredQueue`]
pub struct TaskSender<T> {
    tx: Sender<T>,
    name: &'static str,
}

impl<T> TaskSender<T> {
    /// Queue a task for the next drain
    pub fn push(&self, task: T) {
        if self.tx.send(task).is_err() {
            log::warn!("Dropping task for the {} queue, the queue no longer exists", self.name);
        }
    }

    /// Number of tasks waiting
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Check whether no task is waiting
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> Clone for TaskSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

/// Multi-producer FIFO drained by a single owning thread
pub struct DeferredQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    name: &'static str,
}

impl<T> DeferredQueue<T> {
    /// Create an empty queue; `name` appears in log output
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx, name }
    }

    /// Producer handle that can be moved to other threads
    pub fn sender(&self) -> TaskSender<T> {
        TaskSender {
            tx: self.tx.clone(),
            name: self.name,
        }
    }

    /// Queue a task for the next drain
    pub fn push(&self, task: T) {
        // The queue owns a receiver, so sending cannot fail.
        let _ = self.tx.send(task);
    }

    /// Run every task that was queued before this call, in FIFO order
    pub fn drain(&self, mut run: impl FnMut(T)) -> usize {
        let pending = self.rx.len();
        let mut executed = 0;
        while executed < pending {
            match self.rx.try_recv() {
                Ok(task) => {
                    run(task);
                    executed += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if executed > 0 {
            log::trace!("Drained {} tasks from the {} queue", executed, self.name);
        }
        executed
    }

    /// Drop every waiting task without running it
    pub fn clear(&self) -> usize {
        let dropped = self.rx.try_iter().count();
        if dropped > 0 {
            log::debug!("Cleared {} pending tasks from the {} queue", dropped, self.name);
        }
        dropped
    }

    /// Number of tasks waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check whether no task is waiting
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Producer handles for both deferred queues
#[derive(Clone)]
pub struct TaskQueues {
    update: TaskSender<UpdateTask>,
    gl: TaskSender<GlTask>,
}

impl TaskQueues {
    /// Bundle the producer handles of an update and a GL queue
    pub fn new(update: TaskSender<UpdateTask>, gl: TaskSender<GlTask>) -> Self {
        Self { update, gl }
    }

    /// Run `task` at the start of the next update cycle
    pub fn run_on_update_thread(&self, task: impl FnOnce(&mut Scene) + Send + 'static) {
        self.update.push(Box::new(task));
    }

    /// Run `task` on the update thread once `delay` of frame time has passed
    ///
    /// The delay is measured by a one-shot [`DelayTimer`] advanced with the
    /// scene, so it follows frame time rather than wall-clock time while the
    /// update thread is paused.
    pub fn run_on_update_thread_after(&self, delay: Duration, task: impl FnOnce(&mut Scene) + Send + 'static) {
        self.run_on_update_thread(move |scene| {
            scene.add_updateable(Box::new(DelayTimer::new(delay, move |queues| {
                queues.run_on_update_thread(task);
            })));
        });
    }

    /// Run `task` at the start of the next rendered frame
    pub fn gl_queue_event(&self, task: impl FnOnce(&mut dyn GraphicsBackend) + Send + 'static) {
        self.gl.push(Box::new(task));
    }

    /// Producer handle of the update queue
    pub fn update(&self) -> &TaskSender<UpdateTask> {
        &self.update
    }

    /// Producer handle of the GL queue
    pub fn gl(&self) -> &TaskSender<GlTask> {
        &self.gl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_drain_runs_in_fifo_order() {
        let queue: DeferredQueue<u32> = DeferredQueue::new("test");
        for i in 0..5 {
            queue.push(i);
        }

        let mut seen = Vec::new();
        assert_eq!(queue.drain(|task| seen.push(task)), 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_task_queued_during_drain_waits_for_next_drain() {
        type Task = Box<dyn FnOnce(&mut Vec<&'static str>) + Send>;
        let queue: Arc<DeferredQueue<Task>> = Arc::new(DeferredQueue::new("test"));
        let sender = queue.sender();

        let inner = sender.clone();
        sender.push(Box::new(move |log: &mut Vec<&'static str>| {
            log.push("first");
            inner.push(Box::new(|log: &mut Vec<&'static str>| log.push("second")));
        }));

        let mut cycle_one = Vec::new();
        queue.drain(|task| task(&mut cycle_one));
        assert_eq!(cycle_one, vec!["first"]);

        let mut cycle_two = Vec::new();
        queue.drain(|task| task(&mut cycle_two));
        assert_eq!(cycle_two, vec!["second"]);

        let mut cycle_three = Vec::new();
        assert_eq!(queue.drain(|task| task(&mut cycle_three)), 0);
    }

    #[test]
    fn test_senders_work_across_threads() {
        let queue: DeferredQueue<usize> = DeferredQueue::new("test");
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sender = queue.sender();
                std::thread::spawn(move || sender.push(i))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let seen = Mutex::new(Vec::new());
        queue.drain(|task| seen.lock().unwrap().push(task));
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_clear_drops_pending() {
        let queue: DeferredQueue<u8> = DeferredQueue::new("test");
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.drain(|_| panic!("cleared task ran")), 0);
    }
}
