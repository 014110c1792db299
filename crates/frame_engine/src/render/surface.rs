//! Drawing surfaces
//!
//! A surface owns the render context. The engine only asks it to render and
//! to run tasks on its thread; when and where frames are drawn is up to the
//! implementation.
//!
//! - [`ThreadedSurface`]: dedicated render thread, renders only when dirty
//! - [`ManualSurface`]: records requests, the caller renders explicitly

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::engine::{lock, EngineError};
use crate::render::dispatch::{FrameStats, RenderDispatch};
use crate::scheduler::queue::GlTask;

/// Render target the engine drives
pub trait Surface: Send + Sync {
    /// Draw one frame as soon as possible; requests made before it is drawn coalesce
    fn request_render(&self);

    /// Run `task` on the render thread before the next frame, even if none is requested
    fn queue_event(&self, task: GlTask);
}

enum SurfaceCommand {
    Render,
    Event(GlTask),
    Resize(u32, u32),
    Shutdown,
}

/// Surface with its own render thread
///
/// The thread creates the surface state, then waits for commands. Commands
/// run in the order they were sent; any number of render requests pending
/// at the same time produce a single frame.
pub struct ThreadedSurface {
    tx: Sender<SurfaceCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedSurface {
    /// Spawn the render thread for `dispatch` with an initial size
    pub fn spawn(mut dispatch: RenderDispatch, width: u32, height: u32) -> Result<Self, EngineError> {
        let (tx, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("frame-render".to_string())
            .spawn(move || {
                if let Err(err) = dispatch.on_surface_created() {
                    log::error!("Surface setup failed: {}", err);
                }
                dispatch.on_surface_changed(width, height);
                render_loop(&mut dispatch, &rx);
            })
            .map_err(|err| EngineError::Thread("render", err))?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Forward a size change to the render thread
    pub fn resize(&self, width: u32, height: u32) {
        self.send(SurfaceCommand::Resize(width, height));
    }

    /// Stop the render thread after the commands already sent
    pub fn shutdown(&self) {
        let Some(handle) = lock(&self.handle).take() else {
            return;
        };
        self.send(SurfaceCommand::Shutdown);
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("Render thread panicked");
        }
    }

    fn send(&self, command: SurfaceCommand) {
        if self.tx.send(command).is_err() {
            log::warn!("Render thread is gone, dropping surface command");
        }
    }
}

impl Surface for ThreadedSurface {
    fn request_render(&self) {
        self.send(SurfaceCommand::Render);
    }

    fn queue_event(&self, task: GlTask) {
        self.send(SurfaceCommand::Event(task));
    }
}

impl Drop for ThreadedSurface {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render_loop(dispatch: &mut RenderDispatch, rx: &Receiver<SurfaceCommand>) {
    while let Ok(first) = rx.recv() {
        let mut dirty = false;
        let mut stop = false;

        for command in std::iter::once(first).chain(rx.try_iter()) {
            match command {
                SurfaceCommand::Render => dirty = true,
                SurfaceCommand::Event(task) => dispatch.run_event(task),
                SurfaceCommand::Resize(width, height) => dispatch.on_surface_changed(width, height),
                SurfaceCommand::Shutdown => {
                    stop = true;
                    break;
                }
            }
        }

        if dirty {
            dispatch.on_draw_frame();
        }
        if stop {
            break;
        }
    }
    log::info!("Render thread stopped after {} frames", dispatch.frames_drawn());
}

/// Surface rendered explicitly by its owner
///
/// Records render requests and queued events; [`ManualSurface::render_pending`]
/// plays them on the calling thread.
#[derive(Default)]
pub struct ManualSurface {
    requests: AtomicUsize,
    events: Mutex<Vec<GlTask>>,
}

impl ManualSurface {
    /// Create a surface with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Render requests made since the last [`ManualSurface::render_pending`]
    pub fn pending_requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }

    /// Run queued events, then draw one frame if any render was requested
    pub fn render_pending(&self, dispatch: &mut RenderDispatch) -> Option<FrameStats> {
        let events = std::mem::take(&mut *lock(&self.events));
        for task in events {
            dispatch.run_event(task);
        }

        if self.requests.swap(0, Ordering::AcqRel) > 0 {
            Some(dispatch.on_draw_frame())
        } else {
            None
        }
    }
}

impl Surface for ManualSurface {
    fn request_render(&self) {
        self.requests.fetch_add(1, Ordering::AcqRel);
    }

    fn queue_event(&self, task: GlTask) {
        lock(&self.events).push(task);
    }
}
