//! Application trait and lifecycle hooks

use thiserror::Error;

use crate::foundation::time::FrameTime;
use crate::render::backend::GraphicsBackend;
use crate::scene::{Scene, SceneError};

/// Application lifecycle trait
///
/// Implement this trait to plug game logic into the engine. Hooks run on the
/// thread named in their documentation and must not block.
pub trait Application: Send {
    /// Set up shaders and initial objects
    ///
    /// Called on the render thread once the graphics surface exists, before
    /// the first frame is drawn.
    fn on_create(&mut self, scene: &mut Scene, backend: &mut dyn GraphicsBackend) -> Result<(), AppError>;

    /// Per-cycle game logic, called on the update thread after the
    /// pre-updateables and before every other object advances
    fn on_update(&mut self, _scene: &mut Scene, _frame: &FrameTime) {}

    /// Called on the render thread before the pre-drawables and the batch are drawn
    fn on_pre_draw(&mut self, _backend: &mut dyn GraphicsBackend) {}

    /// Called on the render thread after the batch and the post-drawables are drawn
    fn on_post_draw(&mut self, _backend: &mut dyn GraphicsBackend) {}

    /// Lifecycle and surface notifications
    fn on_event(&mut self, _event: AppEvent) {}

    /// Called once when the engine is destroyed, after every object was destroyed
    fn on_destroy(&mut self) {}
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Scene edit failed during setup
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Shader or other backend resource could not be prepared
    #[error("Resource error: {0}")]
    Resource(String),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

/// Application events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The drawing surface changed size
    SurfaceResized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },

    /// The application is moving to the background
    Paused,

    /// The application is back in the foreground
    Resumed,
}
