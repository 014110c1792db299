//! Render-thread side of the engine
//!
//! [`RenderDispatch`] owns the graphics backend and is driven by a
//! [`Surface`](crate::render::surface::Surface) on the render thread only.

use std::sync::Arc;

use crate::application::AppEvent;
use crate::engine::{lock, EngineError, EngineShared};
use crate::render::backend::{check_backend, BlendFunc, CapabilityFlags, ClearFlags, DepthFunc, GraphicsBackend};
use crate::render::batch::BatchStats;
use crate::scheduler::queue::GlTask;
use crate::scheduler::signal::CompletionGuard;

/// Statistics of one drawn frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// GL-queue tasks run before drawing
    pub gl_tasks: usize,
    /// Batched draw statistics
    pub batch: BatchStats,
    /// Backend errors found after the frame
    pub backend_errors: usize,
}

/// Executes surface callbacks against the engine
pub struct RenderDispatch {
    shared: Arc<EngineShared>,
    backend: Box<dyn GraphicsBackend>,
    frames_drawn: u64,
}

impl RenderDispatch {
    pub(crate) fn new(shared: Arc<EngineShared>, backend: Box<dyn GraphicsBackend>) -> Self {
        Self {
            shared,
            backend,
            frames_drawn: 0,
        }
    }

    /// Prepare global render state and let the application create its resources
    ///
    /// Starts the update thread afterwards when FPS rendering is enabled.
    pub fn on_surface_created(&mut self) -> Result<(), EngineError> {
        let backend = self.backend.as_mut();
        backend.set_clear_color(self.shared.config.clear_color);
        backend.enable(CapabilityFlags::DEPTH_TEST | CapabilityFlags::CULL_FACE | CapabilityFlags::BLEND);
        backend.disable(CapabilityFlags::DITHER);
        backend.set_blend_func(BlendFunc::Alpha);
        backend.set_depth_func(DepthFunc::LessEqual);

        {
            let mut scene = lock(&self.shared.scene);
            lock(&self.shared.app).on_create(&mut scene, backend)?;
            if scene.batch().is_stale(scene.shaders()) {
                scene.rebind_shader_collection();
            }
        }

        check_backend(backend, "surface created");
        self.shared.mark_surface_created();
        log::info!("Surface created");

        self.shared.start_update_thread()?;
        Ok(())
    }

    /// Follow a surface size change
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        log::debug!("Surface changed to {}x{}", width, height);
        self.shared.set_screen_size(width, height);
        self.backend.viewport(width, height);
        lock(&self.shared.app).on_event(AppEvent::SurfaceResized { width, height });
    }

    /// Draw one frame
    ///
    /// The render-complete signal is raised when this returns, including
    /// when a step panics.
    pub fn on_draw_frame(&mut self) -> FrameStats {
        let _complete = CompletionGuard::new(&self.shared.signal);
        let backend = self.backend.as_mut();
        let mut stats = FrameStats::default();

        backend.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
        stats.gl_tasks = self.shared.gl_queue.drain(|task| task(&mut *backend));

        {
            let mut scene = lock(&self.shared.scene);
            let mut app = lock(&self.shared.app);
            app.on_pre_draw(backend);
            stats.batch = scene.draw(backend);
            app.on_post_draw(backend);
        }

        stats.backend_errors = check_backend(backend, "draw frame");
        self.frames_drawn += 1;
        if self.shared.config.debug_mode {
            log::debug!(
                "Frame {}: {} renderables, {} programs, {} gl tasks",
                self.frames_drawn,
                stats.batch.renderables,
                stats.batch.programs_bound,
                stats.gl_tasks
            );
        }
        stats
    }

    /// Run a task handed directly to the surface
    pub fn run_event(&mut self, task: GlTask) {
        task(self.backend.as_mut());
    }

    /// Number of frames drawn so far
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// The graphics backend
    pub fn backend_mut(&mut self) -> &mut dyn GraphicsBackend {
        self.backend.as_mut()
    }
}
