//! Whole-pipeline tests: engine, scene, queues, dispatch and surfaces

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::application::{AppError, AppEvent, Application};
use crate::core::config::EngineConfig;
use crate::engine::Engine;
use crate::foundation::time::FrameTime;
use crate::input::{TouchEvent, TouchListener, TouchPhase};
use crate::render::backend::{
    BackendCommand, BackendError, BlendFunc, CapabilityFlags, ClearFlags, CommandLog, DepthFunc, GraphicsBackend,
    HeadlessBackend, ProgramId,
};
use crate::render::dispatch::RenderDispatch;
use crate::render::shader::ShaderHandle;
use crate::render::surface::{ManualSurface, ThreadedSurface};
use crate::scene::{DrawContext, ObjectKey, Renderable, Scene, UpdateContext, Updateable};
use crate::scheduler::queue::TaskQueues;

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct Sprite {
    name: &'static str,
    shader: ShaderHandle,
    log: Log,
}

impl Updateable for Sprite {
    fn update(&mut self, _ctx: &mut UpdateContext<'_>) {}
}

impl Renderable for Sprite {
    fn shader(&self) -> ShaderHandle {
        self.shader
    }

    fn draw(&mut self, ctx: &mut DrawContext<'_>) {
        push(&self.log, format!("draw {}", self.name));
        ctx.backend().draw_indexed(6);
    }
}

struct Ticker {
    updates: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl Updateable for Ticker {
    fn update(&mut self, _ctx: &mut UpdateContext<'_>) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&mut self, _queues: &TaskQueues) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Registers two shaders and three sprites, recording every hook
struct TestApp {
    log: Log,
    shaders: Arc<Mutex<Vec<ShaderHandle>>>,
}

impl Application for TestApp {
    fn on_create(&mut self, scene: &mut Scene, _backend: &mut dyn GraphicsBackend) -> Result<(), AppError> {
        let first = scene.register_shader("first", ProgramId(1));
        let second = scene.register_shader("second", ProgramId(2));
        for (name, shader) in [("b0", second), ("a0", first), ("b1", second)] {
            scene.add_drawable(Box::new(Sprite {
                name,
                shader,
                log: self.log.clone(),
            }));
        }
        *self.shaders.lock().unwrap() = vec![first, second];
        push(&self.log, "create");
        Ok(())
    }

    fn on_update(&mut self, _scene: &mut Scene, frame: &FrameTime) {
        push(&self.log, format!("update {}", frame.frame_index));
    }

    fn on_pre_draw(&mut self, _backend: &mut dyn GraphicsBackend) {
        push(&self.log, "pre");
    }

    fn on_post_draw(&mut self, _backend: &mut dyn GraphicsBackend) {
        push(&self.log, "post");
    }

    fn on_event(&mut self, event: AppEvent) {
        push(&self.log, format!("{event:?}"));
    }

    fn on_destroy(&mut self) {
        push(&self.log, "destroy");
    }
}

struct Harness {
    engine: Engine,
    surface: Arc<ManualSurface>,
    dispatch: RenderDispatch,
    commands: CommandLog,
    log: Log,
    shaders: Arc<Mutex<Vec<ShaderHandle>>>,
}

impl Harness {
    fn new(config: EngineConfig) -> Self {
        let log = Log::default();
        let shaders = Arc::new(Mutex::new(Vec::new()));
        let app = TestApp {
            log: log.clone(),
            shaders: shaders.clone(),
        };

        let mut engine = Engine::new(config, app).unwrap();
        let surface = Arc::new(ManualSurface::new());
        engine.attach_surface(surface.clone());

        let commands = CommandLog::new();
        let dispatch = engine.create_dispatch(Box::new(HeadlessBackend::with_log(commands.clone())));

        Self {
            engine,
            surface,
            dispatch,
            commands,
            log,
            shaders,
        }
    }

    fn created(config: EngineConfig) -> Self {
        let mut harness = Self::new(config);
        harness.dispatch.on_surface_created().unwrap();
        harness.dispatch.on_surface_changed(800, 600);
        harness.commands.clear();
        harness
    }

    fn shader(&self, index: usize) -> ShaderHandle {
        self.shaders.lock().unwrap()[index]
    }

    /// One manual update cycle followed by the requested frame
    fn cycle(&mut self) {
        self.engine.update_frame();
        self.engine.handle().render();
        self.surface.render_pending(&mut self.dispatch);
    }

    fn draws(&self) -> Vec<String> {
        entries(&self.log).into_iter().filter(|entry| entry.starts_with("draw")).collect()
    }
}

#[test]
fn test_surface_created_sets_render_state() {
    let mut harness = Harness::new(EngineConfig::default().with_clear_color([0.1, 0.2, 0.3, 1.0]));
    harness.dispatch.on_surface_created().unwrap();

    assert_eq!(
        harness.commands.commands(),
        vec![
            BackendCommand::ClearColor([0.1, 0.2, 0.3, 1.0]),
            BackendCommand::Enable(CapabilityFlags::DEPTH_TEST | CapabilityFlags::CULL_FACE | CapabilityFlags::BLEND),
            BackendCommand::Disable(CapabilityFlags::DITHER),
            BackendCommand::BlendFunc(BlendFunc::Alpha),
            BackendCommand::DepthFunc(DepthFunc::LessEqual),
        ]
    );
    assert_eq!(entries(&harness.log), vec!["create"]);

    harness.dispatch.on_surface_changed(640, 480);
    assert_eq!(harness.engine.handle().screen_size(), (640, 480));
    assert!(harness
        .commands
        .commands()
        .contains(&BackendCommand::Viewport { width: 640, height: 480 }));
}

#[test]
fn test_frame_draws_batch_between_hooks() {
    let mut harness = Harness::created(EngineConfig::default());
    harness.cycle();

    let log = entries(&harness.log);
    let tail: Vec<&str> = log.iter().skip_while(|entry| *entry != "pre").map(String::as_str).collect();
    assert_eq!(tail, vec!["pre", "draw a0", "draw b0", "draw b1", "post"]);

    let commands = harness.commands.commands();
    assert_eq!(commands[0], BackendCommand::Clear(ClearFlags::COLOR | ClearFlags::DEPTH));
    assert_eq!(harness.commands.programs_bound(), vec![ProgramId(1), ProgramId(2)]);
    assert_eq!(harness.commands.draw_calls(), 3);
}

#[test]
fn test_layers_run_around_batch_and_update_hook() {
    struct Early(Log);
    impl Updateable for Early {
        fn update(&mut self, _ctx: &mut UpdateContext<'_>) {
            push(&self.0, "early");
        }
    }

    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    let (first, second) = (harness.shader(0), harness.shader(1));
    handle.add_pre_updateable(Box::new(Early(harness.log.clone())));
    handle.add_post_drawable(Box::new(Sprite {
        name: "overlay",
        shader: first,
        log: harness.log.clone(),
    }));
    handle.add_pre_drawable(Box::new(Sprite {
        name: "background",
        shader: second,
        log: harness.log.clone(),
    }));
    harness.cycle();

    let log = entries(&harness.log);
    let early = log.iter().position(|entry| entry == "early");
    let update = log.iter().position(|entry| entry.starts_with("update"));
    assert!(early.is_some() && early < update, "log: {log:?}");

    let tail: Vec<&str> = log.iter().skip_while(|entry| *entry != "pre").map(String::as_str).collect();
    assert_eq!(
        tail,
        vec!["pre", "draw background", "draw a0", "draw b0", "draw b1", "draw overlay", "post"]
    );
    assert_eq!(
        harness.commands.programs_bound(),
        vec![ProgramId(2), ProgramId(1), ProgramId(2), ProgramId(1)]
    );
    assert_eq!(harness.commands.draw_calls(), 5);
}

#[test]
fn test_frame_without_render_request_draws_nothing() {
    let mut harness = Harness::created(EngineConfig::default());
    harness.engine.update_frame();

    assert!(harness.surface.render_pending(&mut harness.dispatch).is_none());
    assert!(harness.commands.commands().is_empty());
}

#[test]
fn test_each_frame_redraws_from_a_fresh_batch() {
    let mut harness = Harness::created(EngineConfig::default());
    for _ in 0..3 {
        harness.cycle();
    }
    assert_eq!(harness.draws().len(), 9);
    assert_eq!(harness.commands.draw_calls(), 9);
}

#[test]
fn test_gl_task_runs_before_draw_exactly_once() {
    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    handle.gl_queue_event(|backend| backend.draw_indexed(99));

    harness.cycle();
    let commands = harness.commands.commands();
    assert_eq!(commands[0], BackendCommand::Clear(ClearFlags::COLOR | ClearFlags::DEPTH));
    assert_eq!(commands[1], BackendCommand::DrawIndexed(99));

    harness.cycle();
    assert_eq!(harness.commands.count(|command| *command == BackendCommand::DrawIndexed(99)), 1);
}

#[test]
fn test_update_task_enqueued_while_draining_waits_a_cycle() {
    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    let log = harness.log.clone();

    let inner_log = log.clone();
    handle.run_on_update_thread(move |scene| {
        push(&inner_log, "first");
        let second_log = inner_log.clone();
        scene.queues().run_on_update_thread(move |_| push(&second_log, "second"));
    });

    harness.engine.update_frame();
    harness.engine.update_frame();
    harness.engine.update_frame();

    let order: Vec<String> = entries(&log)
        .into_iter()
        .filter(|entry| entry.starts_with("update") || entry == "first" || entry == "second")
        .collect();
    assert_eq!(order, vec!["first", "update 0", "second", "update 1", "update 2"]);
}

#[test]
fn test_marked_unused_object_is_never_advanced_again() {
    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    let updates = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let key = handle.add_updateable(Box::new(Ticker {
        updates: updates.clone(),
        destroyed: destroyed.clone(),
    }));

    harness.cycle();
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    handle.with_scene(|scene| scene.mark_unused(key)).unwrap();
    for _ in 0..3 {
        harness.cycle();
    }

    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(!handle.with_scene(|scene| scene.contains(key)));
}

#[test]
fn test_delayed_update_task_follows_frame_time() {
    let harness = Harness::created(EngineConfig::default().with_requested_fps(30.0));
    let handle = harness.engine.handle();
    let fired = Arc::new(AtomicUsize::new(0));

    let flag = fired.clone();
    handle.run_on_update_thread_after(Duration::from_millis(100), move |_| {
        flag.fetch_add(1, Ordering::SeqCst);
    });

    // Roughly 33 ms of frame time per cycle.
    for _ in 0..2 {
        harness.engine.update_frame();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    for _ in 0..6 {
        harness.engine.update_frame();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shader_reorder_between_frames() {
    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();

    harness.engine.update_frame();
    handle.push_shader_to_front(harness.shader(1)).unwrap();
    handle.render();
    harness.surface.render_pending(&mut harness.dispatch);

    assert_eq!(harness.draws(), vec!["draw b0", "draw b1", "draw a0"]);
    assert_eq!(harness.commands.programs_bound(), vec![ProgramId(2), ProgramId(1)]);
}

#[test]
fn test_removed_renderable_is_not_drawn() {
    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    let first = harness.shader(0);

    let key: ObjectKey = handle.add_drawable(Box::new(Sprite {
        name: "extra",
        shader: first,
        log: harness.log.clone(),
    }));
    harness.engine.update_frame();
    let removed = handle.remove_renderable(key).unwrap();
    assert_eq!(removed.shader(), first);

    handle.render();
    harness.surface.render_pending(&mut harness.dispatch);
    assert!(!harness.draws().contains(&"draw extra".to_string()));
    assert_eq!(harness.draws().len(), 3);
}

#[test]
fn test_render_thread_task_runs_without_frame() {
    let mut harness = Harness::created(EngineConfig::default());
    harness
        .engine
        .handle()
        .run_on_render_thread_immediately(|backend| backend.viewport(1, 1));

    assert!(harness.surface.render_pending(&mut harness.dispatch).is_none());
    assert_eq!(
        harness.commands.commands(),
        vec![BackendCommand::Viewport { width: 1, height: 1 }]
    );
}

#[test]
fn test_backend_errors_are_counted_not_fatal() {
    let mut harness = Harness::created(EngineConfig::default());
    harness.commands.inject_error(BackendError::InvalidOperation);

    harness.engine.update_frame();
    harness.engine.handle().render();
    let stats = harness.surface.render_pending(&mut harness.dispatch).unwrap();

    assert_eq!(stats.backend_errors, 1);
    assert_eq!(stats.batch.renderables, 3);
}

#[test]
fn test_touch_coordinates_follow_surface_size() {
    struct Recorder(Arc<Mutex<Vec<(f32, f32)>>>);
    impl TouchListener for Recorder {
        fn on_touch_down(&mut self, _pointer_id: u32, x: f32, y: f32) {
            self.0.lock().unwrap().push((x, y));
        }
    }

    let harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    let seen = Arc::new(Mutex::new(Vec::new()));
    handle.set_touch_listener(Box::new(Recorder(seen.clone())));

    assert!(handle.dispatch_touch(TouchEvent::new(0, 500.0, 200.0, TouchPhase::Down)));
    assert_eq!(*seen.lock().unwrap(), vec![(100.0, 100.0)]);
}

#[test]
fn test_touch_modifier_kept_across_surface_change() {
    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    assert_eq!(handle.touch_modifier(), (400.0, 300.0));

    handle.set_touch_modifier(0.0, 0.0);
    harness.dispatch.on_surface_changed(1024, 768);
    assert_eq!(handle.touch_modifier(), (0.0, 0.0));

    handle.reset_touch_modifier();
    assert_eq!(handle.touch_modifier(), (512.0, 384.0));
}

#[test]
fn test_destroy_runs_every_destroy_hook_once() {
    let mut harness = Harness::created(EngineConfig::default());
    let handle = harness.engine.handle();
    let destroyed = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        handle.add_updateable(Box::new(Ticker {
            updates: Arc::default(),
            destroyed: destroyed.clone(),
        }));
    }
    handle.run_on_update_thread(|_| panic!("pending task ran after destroy"));

    harness.engine.destroy();
    harness.engine.destroy();

    assert!(harness.engine.is_destroyed());
    assert_eq!(destroyed.load(Ordering::SeqCst), 3);
    assert_eq!(entries(&harness.log).iter().filter(|entry| *entry == "destroy").count(), 1);
    assert!(handle.with_scene(|scene| scene.is_empty()));
    assert!(!handle.start_fps_rendering().unwrap());
}

#[test]
fn test_invalid_fps_rejected() {
    let harness = Harness::new(EngineConfig::default());
    let handle = harness.engine.handle();
    assert!(handle.set_requested_fps(0.0).is_err());
    assert!(handle.set_requested_fps(f32::INFINITY).is_err());
    handle.set_requested_fps(60.0).unwrap();
    assert_eq!(handle.requested_fps(), 60.0);

    assert!(Engine::new(EngineConfig::default().with_requested_fps(-1.0), NoopApp).is_err());
}

struct NoopApp;

impl Application for NoopApp {
    fn on_create(&mut self, _scene: &mut Scene, _backend: &mut dyn GraphicsBackend) -> Result<(), AppError> {
        Ok(())
    }
}

/// Pumps manual renders until `done` holds or the timeout passes
fn pump_until(harness: &mut Harness, timeout: Duration, mut done: impl FnMut(&Harness) -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        harness.surface.render_pending(&mut harness.dispatch);
        if done(harness) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn test_update_thread_pause_and_resume() {
    let config = EngineConfig::default()
        .with_requested_fps(120.0)
        .with_fps_rendering(true)
        .with_resume_delay_ms(10);
    let mut harness = Harness::created(config);
    let handle = harness.engine.handle();
    assert!(handle.is_fps_rendering());

    assert!(pump_until(&mut harness, Duration::from_secs(2), |h| h.dispatch.frames_drawn() >= 5));

    harness.engine.on_pause();
    assert!(!handle.is_fps_rendering());
    let drawn = harness.dispatch.frames_drawn();
    harness.surface.render_pending(&mut harness.dispatch);
    std::thread::sleep(Duration::from_millis(30));
    assert!(harness.surface.render_pending(&mut harness.dispatch).is_none());
    assert!(harness.dispatch.frames_drawn() <= drawn + 1);

    harness.engine.on_resume().unwrap();
    assert!(harness.surface.pending_requests() >= 1);
    assert!(pump_until(&mut harness, Duration::from_secs(2), |h| h.engine.handle().is_fps_rendering()));
    let resumed = harness.dispatch.frames_drawn();
    assert!(pump_until(&mut harness, Duration::from_secs(2), |h| h.dispatch.frames_drawn() >= resumed + 3));

    let events = entries(&harness.log);
    assert!(events.contains(&"Paused".to_string()));
    assert!(events.contains(&"Resumed".to_string()));

    harness.engine.destroy();
    assert!(!handle.is_fps_rendering());
}

#[test]
fn test_threaded_surface_end_to_end() {
    let log = Log::default();
    let app = TestApp {
        log: log.clone(),
        shaders: Arc::default(),
    };
    let config = EngineConfig::default().with_requested_fps(100.0).with_fps_rendering(true);
    let mut engine = Engine::new(config, app).unwrap();
    let handle = engine.handle();

    let commands = CommandLog::new();
    let dispatch = engine.create_dispatch(Box::new(HeadlessBackend::with_log(commands.clone())));
    let surface = Arc::new(ThreadedSurface::spawn(dispatch, 320, 240).unwrap());
    engine.attach_surface(surface.clone());

    let deadline = Instant::now() + Duration::from_secs(2);
    while commands.draw_calls() < 30 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(commands.draw_calls() >= 30, "draw calls: {}", commands.draw_calls());
    assert!(handle.is_fps_rendering());
    assert!(handle.current_fps() > 0.0);
    assert_eq!(handle.screen_size(), (320, 240));

    engine.destroy();
    drop(surface);
    assert!(!handle.is_fps_rendering());
    assert_eq!(entries(&log).iter().filter(|entry| *entry == "destroy").count(), 1);
}
