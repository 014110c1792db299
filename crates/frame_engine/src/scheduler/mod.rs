//! Frame scheduling: deferred task queues, the render-complete signal,
//! cycle pacing and the update thread

pub mod pacing;
pub mod queue;
pub mod signal;
pub mod update_thread;

pub use pacing::FramePacer;
pub use queue::{DeferredQueue, GlTask, TaskQueues, TaskSender, UpdateTask};
pub use signal::{CompletionGuard, FrameSignal};
pub use update_thread::{FrameSource, TimingSettings, UpdateThread};
