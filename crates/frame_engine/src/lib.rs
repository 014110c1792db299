//! # Frame Engine
//!
//! Core of a mobile-style 2D/3D game engine: a dual-threaded update/render
//! scheduler with shader-bucketed draw batching.
//!
//! ## Features
//!
//! - **Update thread**: advances every object at a requested FPS and paces
//!   render requests, waiting for each frame before the next cycle
//! - **Scene graph**: updateables, renderables and nested groups with a
//!   self-retiring in-use lifecycle
//! - **Draw batching**: renderables grouped by shader so each program is
//!   bound once per frame, in a stable order
//! - **Deferred queues**: one-shot tasks for the update and render threads,
//!   drained once per cycle
//! - **Headless backend**: the graphics API sits behind a trait, so the whole
//!   pipeline runs in tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//!
//! struct MyApp;
//!
//! impl Application for MyApp {
//!     fn on_create(&mut self, scene: &mut Scene, _backend: &mut dyn GraphicsBackend) -> Result<(), AppError> {
//!         scene.register_shader("sprites", ProgramId(1));
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::new(EngineConfig::default(), MyApp)?;
//!     let surface = std::sync::Arc::new(ManualSurface::new());
//!     engine.attach_surface(surface.clone());
//!
//!     let mut dispatch = engine.create_dispatch(Box::new(HeadlessBackend::new()));
//!     dispatch.on_surface_created()?;
//!     engine.update_frame();
//!     engine.handle().render();
//!     surface.render_pending(&mut dispatch);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Configuration
pub mod config;
pub mod core;

// Subsystems
pub mod foundation;
pub mod input;
pub mod render;
pub mod scene;
pub mod scheduler;

mod application;
mod engine;

#[cfg(test)]
mod engine_tests;

pub use application::{AppError, AppEvent, Application};
pub use crate::core::config::{ApplicationConfig, EngineConfig};
pub use engine::{Engine, EngineError, EngineHandle};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::Config,
        core::config::{ApplicationConfig, EngineConfig},
        foundation::time::FrameTime,
        input::{TouchEvent, TouchListener, TouchPhase},
        render::{
            backend::{GraphicsBackend, HeadlessBackend, ProgramId},
            dispatch::RenderDispatch,
            shader::ShaderHandle,
            surface::{ManualSurface, Surface, ThreadedSurface},
        },
        scene::{
            Camera, DelayTimer, DrawContext, FixedCamera, GroupOrder, ObjectKey, Renderable, Scene, SceneObject,
            UpdateContext, Updateable,
        },
        scheduler::TaskQueues,
        AppError, AppEvent, Application, Engine, EngineError, EngineHandle,
    };
}
