//! Core engine implementation
//!
//! One [`Engine`] owns everything a running application needs: the scene,
//! the deferred queues, the timing state, the update thread and a weak link
//! to the drawing surface. There is no process-wide state; every thread
//! reaches the engine through a cloned [`EngineHandle`].
//!
//! Lock order is scene before application. Nothing holds the scene lock
//! while waiting on another thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::application::{AppError, AppEvent, Application};
use crate::config::ConfigError;
use crate::core::config::EngineConfig;
use crate::foundation::time::{FpsMeter, FrameTime};
use crate::input::{TouchDispatcher, TouchEvent, TouchListener};
use crate::render::backend::{GraphicsBackend, ProgramId};
use crate::render::dispatch::RenderDispatch;
use crate::render::shader::ShaderHandle;
use crate::render::surface::Surface;
use crate::scene::{ObjectKey, Renderable, Scene, SceneError, SceneObject, Updateable};
use crate::scheduler::queue::{DeferredQueue, GlTask, TaskQueues, UpdateTask};
use crate::scheduler::signal::FrameSignal;
use crate::scheduler::update_thread::{FrameSource, TimingSettings, UpdateThread};

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the engine, its handles, the update thread and the render dispatch
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) scene: Mutex<Scene>,
    pub(crate) app: Mutex<Box<dyn Application>>,
    pub(crate) update_queue: DeferredQueue<UpdateTask>,
    pub(crate) gl_queue: DeferredQueue<GlTask>,
    pub(crate) queues: TaskQueues,
    pub(crate) signal: FrameSignal,
    pub(crate) timing: Arc<TimingSettings>,
    pub(crate) touch: Mutex<TouchDispatcher>,
    surface: RwLock<Option<Weak<dyn Surface>>>,
    surface_created: AtomicBool,
    fps_rendering: AtomicBool,
    update_thread: Mutex<UpdateThread>,
    frame_time: Mutex<FrameTime>,
    manual_meter: Mutex<FpsMeter>,
    screen: Mutex<(u32, u32)>,
    resume_epoch: AtomicU64,
    destroyed: AtomicBool,
}

impl EngineShared {
    fn surface(&self) -> Option<Arc<dyn Surface>> {
        let guard = self.surface.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn surface_created(&self) -> bool {
        self.surface_created.load(Ordering::Acquire)
    }

    pub(crate) fn mark_surface_created(&self) {
        self.surface_created.store(true, Ordering::Release);
    }

    pub(crate) fn set_screen_size(&self, width: u32, height: u32) {
        *lock(&self.screen) = (width, height);
        lock(&self.touch).set_screen_size(width, height);
    }

    pub(crate) fn screen_size(&self) -> (u32, u32) {
        *lock(&self.screen)
    }

    /// Start the update thread if FPS rendering is enabled and drawing is possible
    pub(crate) fn start_update_thread(self: &Arc<Self>) -> Result<bool, EngineError> {
        if !self.fps_rendering.load(Ordering::Acquire) || !self.surface_created() {
            return Ok(false);
        }
        let mut thread = lock(&self.update_thread);
        // `mark_destroyed` flips the flag under this lock.
        if self.destroyed.load(Ordering::Acquire) {
            return Ok(false);
        }
        let source: Arc<dyn FrameSource> = self.clone();
        thread
            .start(source, self.timing.clone())
            .map_err(|err| EngineError::Thread("update", err))
    }

    /// Set the destroyed flag; returns false if it was already set
    ///
    /// Once this returns, no update thread can start.
    fn mark_destroyed(&self) -> bool {
        let _thread = lock(&self.update_thread);
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    fn stop_update_thread(&self) -> bool {
        // Take the thread out so joining does not hold the lock.
        let mut thread = std::mem::take(&mut *lock(&self.update_thread));
        thread.stop()
    }

    fn is_update_thread_alive(&self) -> bool {
        lock(&self.update_thread).is_alive()
    }
}

impl FrameSource for EngineShared {
    fn update_frame(&self, frame: FrameTime) {
        *lock(&self.frame_time) = frame;

        let mut scene = lock(&self.scene);
        scene.begin_frame(frame);
        self.update_queue.drain(|task| task(&mut *scene));
        let pre = scene.advance_pre_updateables();
        lock(&self.app).on_update(&mut *scene, &frame);
        let stats = scene.advance();
        log::trace!(
            "Update frame {}: {} updated, {} batched, {} retired",
            frame.frame_index,
            pre.updated + stats.updated,
            stats.batched,
            pre.retired + stats.retired
        );
    }

    fn request_render(&self) {
        match self.surface() {
            Some(surface) => surface.request_render(),
            None => {
                // Nobody will draw; do not leave the update thread waiting.
                log::trace!("Render requested without a surface");
                self.signal.complete();
            }
        }
    }

    fn render_signal(&self) -> &FrameSignal {
        &self.signal
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Application hook failed
    #[error("Application error: {0}")]
    Application(#[from] AppError),

    /// Scene edit failed
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// A worker thread could not be spawned
    #[error("Failed to spawn {0} thread: {1}")]
    Thread(&'static str, #[source] std::io::Error),

    /// Requested FPS must be finite and positive
    #[error("Invalid requested fps {0}")]
    InvalidFps(f32),
}

/// Main engine struct
///
/// Exactly one instance exists per running application. Dropping it stops
/// the update thread and destroys every scene object.
pub struct Engine {
    shared: Arc<EngineShared>,
    surface: Option<Arc<dyn Surface>>,
}

impl Engine {
    /// Create an engine for `app`
    pub fn new(config: EngineConfig, app: impl Application + 'static) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!("Initializing engine at {} fps", config.requested_fps);

        let update_queue = DeferredQueue::new("update");
        let gl_queue = DeferredQueue::new("gl");
        let queues = TaskQueues::new(update_queue.sender(), gl_queue.sender());
        let scene = Scene::new(&config, queues.clone());

        let shared = Arc::new(EngineShared {
            scene: Mutex::new(scene),
            app: Mutex::new(Box::new(app)),
            update_queue,
            gl_queue,
            queues,
            signal: FrameSignal::new(),
            timing: Arc::new(TimingSettings::new(config.requested_fps, config.render_delay)),
            touch: Mutex::new(TouchDispatcher::new()),
            surface: RwLock::new(None),
            surface_created: AtomicBool::new(false),
            fps_rendering: AtomicBool::new(config.fps_rendering),
            update_thread: Mutex::new(UpdateThread::new()),
            frame_time: Mutex::new(FrameTime::zero()),
            manual_meter: Mutex::new(FpsMeter::new(config.requested_fps)),
            screen: Mutex::new((0, 0)),
            resume_epoch: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            config,
        });

        Ok(Self { shared, surface: None })
    }

    /// Cloneable handle usable from any thread
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: self.shared.clone(),
        }
    }

    /// Configuration the engine was created with
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Connect the surface that renders and runs GL tasks
    ///
    /// The engine keeps the surface alive; the shared state only holds a
    /// weak link because the surface in turn owns the render dispatch.
    pub fn attach_surface(&mut self, surface: Arc<dyn Surface>) {
        *self.shared.surface.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::downgrade(&surface));
        self.surface = Some(surface);
        log::debug!("Surface attached");
    }

    /// Render-thread side of the engine, owning the graphics backend
    pub fn create_dispatch(&self, backend: Box<dyn GraphicsBackend>) -> RenderDispatch {
        RenderDispatch::new(self.shared.clone(), backend)
    }

    /// Run one update frame on the calling thread at the requested rate
    ///
    /// Used when FPS rendering is off and by tests. Must not run while the
    /// update thread is alive.
    pub fn update_frame(&self) -> FrameTime {
        let frame = {
            let mut meter = lock(&self.shared.manual_meter);
            let requested = self.shared.timing.requested_fps();
            if requested != meter.requested_fps() {
                meter.reset(requested);
            }
            let delay = meter.requested_frame_delay();
            meter.tick(delay)
        };
        self.shared.update_frame(frame);
        frame
    }

    /// Come back to the foreground
    ///
    /// Resets frame timing, runs one update and requests a render so the
    /// screen is current, then starts the update thread after the
    /// configured resume delay.
    pub fn on_resume(&self) -> Result<(), EngineError> {
        let epoch = self.shared.resume_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        lock(&self.shared.app).on_event(AppEvent::Resumed);

        if !self.shared.surface_created() || !self.shared.fps_rendering.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.shared.is_update_thread_alive() {
            return Ok(());
        }

        *lock(&self.shared.manual_meter) = FpsMeter::new(self.shared.timing.requested_fps());
        self.shared.update_frame(FrameTime::zero());
        self.shared.signal.begin_frame();
        self.shared.request_render();

        let delay = Duration::from_millis(self.shared.config.resume_delay_ms);
        let weak = Arc::downgrade(&self.shared);
        thread::Builder::new()
            .name("frame-resume".to_string())
            .spawn(move || {
                thread::sleep(delay);
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                // A pause or a newer resume in the meantime wins.
                if shared.resume_epoch.load(Ordering::Acquire) != epoch {
                    return;
                }
                if let Err(err) = shared.start_update_thread() {
                    log::error!("Failed to restart update thread: {}", err);
                }
            })
            .map_err(|err| EngineError::Thread("resume", err))?;
        Ok(())
    }

    /// Go to the background: stop the update thread
    pub fn on_pause(&self) {
        self.shared.resume_epoch.fetch_add(1, Ordering::AcqRel);
        if self.shared.stop_update_thread() {
            log::debug!("Update thread stopped for pause");
        }
        lock(&self.shared.app).on_event(AppEvent::Paused);
    }

    /// Stop the update thread, destroy every object and drop pending work
    pub fn destroy(&mut self) {
        if !self.shared.mark_destroyed() {
            return;
        }
        log::info!("Destroying engine");

        self.shared.resume_epoch.fetch_add(1, Ordering::AcqRel);
        self.shared.stop_update_thread();

        {
            let mut scene = lock(&self.shared.scene);
            scene.destroy_all();
            let mut app = lock(&self.shared.app);
            app.on_destroy();
        }

        let dropped = self.shared.update_queue.clear() + self.shared.gl_queue.clear();
        if dropped > 0 {
            log::debug!("Dropped {} pending tasks", dropped);
        }
        self.shared.signal.complete();
        self.surface = None;
    }

    /// Whether [`Engine::destroy`] already ran
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Thread-safe view of the engine
///
/// Methods that edit the scene directly take the scene lock. They must not
/// be called from inside an update task or an object's `update`, which
/// already hold it; use the `&mut Scene` handed to the task instead.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<EngineShared>,
}

impl EngineHandle {
    // ---- Scene ----

    /// Run `f` with exclusive access to the scene
    pub fn with_scene<R>(&self, f: impl FnOnce(&mut Scene) -> R) -> R {
        let mut scene = lock(&self.shared.scene);
        f(&mut scene)
    }

    /// Add an updateable to the root pool
    pub fn add_updateable(&self, object: Box<dyn Updateable>) -> ObjectKey {
        self.with_scene(|scene| scene.add_updateable(object))
    }

    /// Add an updateable advanced before the application's update hook
    pub fn add_pre_updateable(&self, object: Box<dyn Updateable>) -> ObjectKey {
        self.with_scene(|scene| scene.add_pre_updateable(object))
    }

    /// Detach an updateable without destroying it; groups are refused
    pub fn remove_updateable(&self, key: ObjectKey) -> Result<SceneObject, EngineError> {
        Ok(self.with_scene(|scene| scene.remove_updateable(key))?)
    }

    /// Add a renderable to the drawables group
    pub fn add_drawable(&self, object: Box<dyn Renderable>) -> ObjectKey {
        self.with_scene(|scene| scene.add_drawable(object))
    }

    /// Add a renderable drawn before the batch
    pub fn add_pre_drawable(&self, object: Box<dyn Renderable>) -> ObjectKey {
        self.with_scene(|scene| scene.add_pre_drawable(object))
    }

    /// Add a renderable drawn after the batch
    pub fn add_post_drawable(&self, object: Box<dyn Renderable>) -> ObjectKey {
        self.with_scene(|scene| scene.add_post_drawable(object))
    }

    /// Add a renderable to the drawables group at the start of the next update cycle
    ///
    /// Safe from any thread, including from inside update tasks.
    pub fn add_drawable_safety(&self, object: Box<dyn Renderable>) {
        self.run_on_update_thread(move |scene| {
            scene.add_drawable(object);
        });
    }

    /// Put an existing renderable into the current frame's batch
    pub fn add_renderable(&self, key: ObjectKey) -> Result<(), EngineError> {
        Ok(self.with_scene(|scene| scene.add_renderable(key))?)
    }

    /// Detach a renderable from the scene and the batch without destroying it
    pub fn remove_renderable(&self, key: ObjectKey) -> Result<Box<dyn Renderable>, EngineError> {
        Ok(self.with_scene(|scene| scene.remove_drawable(key))?)
    }

    // ---- Shaders ----

    /// Register a batched shader
    pub fn register_shader(&self, name: impl Into<String>, program: ProgramId) -> ShaderHandle {
        self.with_scene(|scene| scene.register_shader(name, program))
    }

    /// Draw a shader's bucket before every other bucket
    pub fn push_shader_to_front(&self, handle: ShaderHandle) -> Result<(), EngineError> {
        Ok(self.with_scene(|scene| scene.push_shader_to_front(handle))?)
    }

    /// Rebuild shader buckets from the registry
    pub fn rebind_shader_collection(&self) {
        self.with_scene(Scene::rebind_shader_collection);
    }

    // ---- Deferred work ----

    /// Producer handles of both deferred queues
    pub fn queues(&self) -> &TaskQueues {
        &self.shared.queues
    }

    /// Run `task` with scene access at the start of the next update cycle
    pub fn run_on_update_thread(&self, task: impl FnOnce(&mut Scene) + Send + 'static) {
        self.shared.queues.run_on_update_thread(task);
    }

    /// Run `task` on the update thread after `delay` of frame time
    pub fn run_on_update_thread_after(&self, delay: Duration, task: impl FnOnce(&mut Scene) + Send + 'static) {
        self.shared.queues.run_on_update_thread_after(delay, task);
    }

    /// Run `task` on the render thread at the start of the next drawn frame
    pub fn gl_queue_event(&self, task: impl FnOnce(&mut dyn GraphicsBackend) + Send + 'static) {
        self.shared.queues.gl_queue_event(task);
    }

    /// Hand `task` to the surface's own event queue, independent of frames
    pub fn run_on_render_thread_immediately(&self, task: impl FnOnce(&mut dyn GraphicsBackend) + Send + 'static) {
        match self.shared.surface() {
            Some(surface) => surface.queue_event(Box::new(task)),
            None => {
                log::warn!("No surface attached, deferring render task to the next frame");
                self.gl_queue_event(task);
            }
        }
    }

    // ---- Timing ----

    /// Change the requested update rate; applied at the next cycle
    pub fn set_requested_fps(&self, fps: f32) -> Result<(), EngineError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(EngineError::InvalidFps(fps));
        }
        self.shared.timing.set_requested_fps(fps);
        Ok(())
    }

    /// Requested update rate
    pub fn requested_fps(&self) -> f32 {
        self.shared.timing.requested_fps()
    }

    /// Smoothed measured update rate
    pub fn current_fps(&self) -> f32 {
        self.shared.timing.current_fps()
    }

    /// Cycles skipped between render requests
    pub fn set_render_delay(&self, frames: u32) {
        self.shared.timing.set_render_delay(frames);
    }

    /// Timing of the latest update cycle
    pub fn frame_time(&self) -> FrameTime {
        *lock(&self.shared.frame_time)
    }

    // ---- FPS rendering ----

    /// Enable or disable the update thread, starting or stopping it as needed
    pub fn use_fps_rendering(&self, enabled: bool) -> Result<(), EngineError> {
        self.shared.fps_rendering.store(enabled, Ordering::Release);
        if enabled {
            self.shared.start_update_thread()?;
        } else {
            self.shared.stop_update_thread();
        }
        Ok(())
    }

    /// Start the update thread; returns false if it could not or did not need to start
    pub fn start_fps_rendering(&self) -> Result<bool, EngineError> {
        self.shared.start_update_thread()
    }

    /// Stop the update thread; returns false if it was not running
    pub fn stop_fps_rendering(&self) -> bool {
        self.shared.stop_update_thread()
    }

    /// Whether the update thread is running
    pub fn is_fps_rendering(&self) -> bool {
        self.shared.is_update_thread_alive()
    }

    /// Request one render
    pub fn render(&self) {
        self.shared.signal.begin_frame();
        self.shared.request_render();
    }

    /// Last known surface size
    pub fn screen_size(&self) -> (u32, u32) {
        self.shared.screen_size()
    }

    // ---- Input ----

    /// Route touch events to `listener`
    pub fn set_touch_listener(&self, listener: Box<dyn TouchListener>) {
        lock(&self.shared.touch).set_listener(listener);
    }

    /// Override the point touch coordinates are measured from; kept across resizes
    pub fn set_touch_modifier(&self, x: f32, y: f32) {
        lock(&self.shared.touch).set_modifier(x, y);
    }

    /// Go back to measuring touch coordinates from the screen centre
    pub fn reset_touch_modifier(&self) {
        lock(&self.shared.touch).reset_modifier();
    }

    /// Point touch coordinates are measured from
    pub fn touch_modifier(&self) -> (f32, f32) {
        lock(&self.shared.touch).modifier()
    }

    /// Forward a platform touch event; returns false without a listener
    pub fn dispatch_touch(&self, event: TouchEvent) -> bool {
        lock(&self.shared.touch).dispatch(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    impl Application for Idle {
        fn on_create(&mut self, _scene: &mut Scene, _backend: &mut dyn GraphicsBackend) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn ready_engine() -> Engine {
        let engine = Engine::new(EngineConfig::default().with_fps_rendering(true), Idle).unwrap();
        engine.shared.mark_surface_created();
        engine
    }

    #[test]
    fn test_blocked_start_sees_destroy() {
        let engine = ready_engine();
        let shared = engine.shared.clone();

        // The starter passes its early checks and waits for the thread slot.
        let slot = lock(&shared.update_thread);
        let starter = {
            let shared = shared.clone();
            thread::spawn(move || shared.start_update_thread())
        };
        thread::sleep(Duration::from_millis(20));
        shared.destroyed.store(true, Ordering::Release);
        drop(slot);

        assert!(!starter.join().unwrap().unwrap());
        assert!(!shared.is_update_thread_alive());
    }

    #[test]
    fn test_destroy_waits_for_thread_slot() {
        let engine = ready_engine();
        let shared = engine.shared.clone();

        let slot = lock(&shared.update_thread);
        let destroyer = {
            let shared = shared.clone();
            thread::spawn(move || shared.mark_destroyed())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!engine.is_destroyed());
        drop(slot);

        assert!(destroyer.join().unwrap());
        assert!(engine.is_destroyed());
        assert!(!shared.mark_destroyed());

        let handle = engine.handle();
        assert!(!handle.start_fps_rendering().unwrap());
        handle.use_fps_rendering(true).unwrap();
        assert!(!handle.is_fps_rendering());
    }

    #[test]
    fn test_start_after_destroy_is_refused() {
        let mut engine = ready_engine();
        let handle = engine.handle();
        assert!(handle.start_fps_rendering().unwrap());
        assert!(handle.is_fps_rendering());

        engine.destroy();
        assert!(!handle.is_fps_rendering());
        assert!(!handle.start_fps_rendering().unwrap());
        assert!(!handle.is_fps_rendering());
    }
}
