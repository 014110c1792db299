//! Updateable and renderable object contracts
//!
//! Anything that takes part in the frame loop implements [`Updateable`].
//! Objects that also draw implement [`Renderable`]. The scene stores both
//! kinds behind [`ObjectKey`]s and owns their in-use flag: an object retires
//! itself with [`UpdateContext::mark_unused`], other code with
//! `Scene::mark_unused`.

use std::sync::Arc;

use slotmap::new_key_type;

use crate::foundation::time::FrameTime;
use crate::render::backend::GraphicsBackend;
use crate::render::shader::{ShaderHandle, ShaderProgram};
use crate::scene::camera::Camera;
use crate::scene::Scene;
use crate::scheduler::queue::TaskQueues;

new_key_type! {
    /// Stable handle of an object owned by the scene
    ///
    /// Keys stay valid while the scene grows and are never reused for a
    /// different object.
    pub struct ObjectKey;
}

/// Per-object view of the current update cycle
pub struct UpdateContext<'a> {
    frame: &'a FrameTime,
    queues: &'a TaskQueues,
    retired: bool,
}

impl<'a> UpdateContext<'a> {
    /// Create a context for one object's update
    pub fn new(frame: &'a FrameTime, queues: &'a TaskQueues) -> Self {
        Self {
            frame,
            queues,
            retired: false,
        }
    }

    /// Timing of the current cycle
    pub fn frame(&self) -> &FrameTime {
        self.frame
    }

    /// Deferred queues, for side effects on other threads
    pub fn queues(&self) -> &TaskQueues {
        self.queues
    }

    /// Run `task` with scene access at the start of the next update cycle
    pub fn run_on_update_thread(&self, task: impl FnOnce(&mut Scene) + Send + 'static) {
        self.queues.run_on_update_thread(task);
    }

    /// Run `task` on the render thread before the next frame
    pub fn gl_queue_event(&self, task: impl FnOnce(&mut dyn GraphicsBackend) + Send + 'static) {
        self.queues.gl_queue_event(task);
    }

    /// Retire the object being updated; it is removed and destroyed next cycle
    pub fn mark_unused(&mut self) {
        self.retired = true;
    }

    /// Whether the object retired itself during this update
    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

/// Per-object view of the frame being drawn
pub struct DrawContext<'a> {
    backend: &'a mut dyn GraphicsBackend,
    shader: &'a ShaderProgram,
    frame: &'a FrameTime,
}

impl<'a> DrawContext<'a> {
    /// Create a context for one renderable's draw
    pub fn new(backend: &'a mut dyn GraphicsBackend, shader: &'a ShaderProgram, frame: &'a FrameTime) -> Self {
        Self { backend, shader, frame }
    }

    /// The graphics backend, with the renderable's shader already bound
    pub fn backend(&mut self) -> &mut dyn GraphicsBackend {
        &mut *self.backend
    }

    /// The bound shader
    pub fn shader(&self) -> &ShaderProgram {
        self.shader
    }

    /// Timing of the update cycle this frame shows
    pub fn frame(&self) -> &FrameTime {
        self.frame
    }
}

/// Something advanced once per update cycle
pub trait Updateable: Send {
    /// Advance one tick; must not block
    fn update(&mut self, ctx: &mut UpdateContext<'_>);

    /// Release resources once the object leaves the scene
    ///
    /// Backend resources must be released on the render thread, typically
    /// through [`TaskQueues::gl_queue_event`].
    fn destroy(&mut self, _queues: &TaskQueues) {}
}

/// An updateable that also draws
pub trait Renderable: Updateable {
    /// Shader the renderable is batched under
    ///
    /// Read when the renderable is added to the frame batch. Changing it
    /// takes effect the next cycle the renderable is re-added.
    fn shader(&self) -> ShaderHandle;

    /// Camera the renderable is drawn with, shared with other renderables
    fn camera(&self) -> Option<&Arc<dyn Camera>> {
        None
    }

    /// Issue draw calls; only called on the render thread
    fn draw(&mut self, ctx: &mut DrawContext<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::queue::DeferredQueue;

    #[test]
    fn test_update_context_retire_flag() {
        let update = DeferredQueue::new("update");
        let gl = DeferredQueue::new("gl");
        let queues = TaskQueues::new(update.sender(), gl.sender());
        let frame = FrameTime::zero();

        let mut ctx = UpdateContext::new(&frame, &queues);
        assert!(!ctx.is_retired());
        ctx.mark_unused();
        ctx.mark_unused();
        assert!(ctx.is_retired());

        ctx.gl_queue_event(|backend| backend.draw_indexed(1));
        assert_eq!(gl.len(), 1);
        assert!(update.is_empty());
    }
}
