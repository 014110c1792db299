//! Orbit demo application
//!
//! Runs the engine headlessly: a ring of sprites orbits the origin on the
//! update thread while a render thread draws them into a recording backend.
//! Settings come from `orbit_demo.toml` when present.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use frame_engine::prelude::*;
use frame_engine::render::backend::{CommandLog, TextureId};
use nalgebra::{Matrix4, Vector3};

const CONFIG_PATH: &str = "orbit_demo.toml";
const SPRITE_COUNT: usize = 12;
const RUN_TIME: Duration = Duration::from_secs(3);

#[derive(thiserror::Error, Debug)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] frame_engine::config::ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Sprite circling the origin at a fixed radius
struct Orbiter {
    shader: ShaderHandle,
    texture: TextureId,
    camera: Arc<dyn Camera>,
    radius: f32,
    angle: f32,
    speed: f32,
}

impl Orbiter {
    fn model(&self) -> Matrix4<f32> {
        let (sin, cos) = self.angle.sin_cos();
        Matrix4::new_translation(&Vector3::new(cos * self.radius, sin * self.radius, 0.0))
    }
}

impl Updateable for Orbiter {
    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.angle = (self.angle + self.speed * ctx.frame().delta_step) % TAU;
    }
}

impl Renderable for Orbiter {
    fn shader(&self) -> ShaderHandle {
        self.shader
    }

    fn camera(&self) -> Option<&Arc<dyn Camera>> {
        Some(&self.camera)
    }

    fn draw(&mut self, ctx: &mut DrawContext<'_>) {
        let mvp = self.camera.view_projection() * self.model();
        log::trace!("Orbiter at ({:.2}, {:.2})", mvp[(0, 3)], mvp[(1, 3)]);
        let backend = ctx.backend();
        backend.bind_texture(0, self.texture);
        backend.draw_indexed(6);
    }
}

/// Overlay bar drawn after the sprites, sized by the smoothed frame step
struct FpsBar {
    shader: ShaderHandle,
    width: f32,
}

impl Updateable for FpsBar {
    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.width = (self.width * 0.9 + ctx.frame().delta_step * 0.1).min(4.0);
    }
}

impl Renderable for FpsBar {
    fn shader(&self) -> ShaderHandle {
        self.shader
    }

    fn draw(&mut self, ctx: &mut DrawContext<'_>) {
        log::trace!("Fps bar width {:.2}", self.width);
        ctx.backend().draw_indexed(6);
    }
}

/// Toggles the camera zoom every 60 frames
struct Zoomer {
    camera: Arc<FixedCamera>,
    zoomed: bool,
}

impl Updateable for Zoomer {
    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        if ctx.frame().frame_index % 60 != 0 {
            return;
        }
        self.zoomed = !self.zoomed;
        let scale = if self.zoomed { 0.5 } else { 1.0 };
        self.camera.set_transform(Matrix4::new_scaling(scale));
    }
}

struct OrbitApp {
    camera: Arc<FixedCamera>,
}

impl Application for OrbitApp {
    fn on_create(&mut self, scene: &mut Scene, _backend: &mut dyn GraphicsBackend) -> Result<(), AppError> {
        let sprites = scene.register_shader("sprites", ProgramId(1));
        let glow = scene.register_shader("glow", ProgramId(2));
        let overlay = scene.register_unbatched_shader("overlay", ProgramId(3));

        let camera: Arc<dyn Camera> = self.camera.clone();
        for index in 0..SPRITE_COUNT {
            let shader = if index % 3 == 0 { glow } else { sprites };
            scene.add_drawable(Box::new(Orbiter {
                shader,
                texture: TextureId(index as u32 % 4),
                camera: camera.clone(),
                radius: 1.0 + (index % 4) as f32 * 0.5,
                angle: index as f32 / SPRITE_COUNT as f32 * TAU,
                speed: 0.02,
            }));
        }

        scene.add_post_drawable(Box::new(FpsBar {
            shader: overlay,
            width: 1.0,
        }));

        let controllers = scene.add_group(GroupOrder::Unordered);
        scene.add_to_group(
            controllers,
            SceneObject::Updateable(Box::new(Zoomer {
                camera: self.camera.clone(),
                zoomed: false,
            })),
        )?;

        scene.add_updateable(Box::new(DelayTimer::new(Duration::from_secs(1), |_| {
            log::info!("One second of frame time elapsed");
        })));

        log::info!("Created {} orbiters", SPRITE_COUNT);
        Ok(())
    }

    fn on_event(&mut self, event: AppEvent) {
        log::info!("Application event: {:?}", event);
    }

    fn on_destroy(&mut self) {
        log::info!("Orbit demo destroyed");
    }
}

struct TouchLogger;

impl TouchListener for TouchLogger {
    fn on_touch_down(&mut self, pointer_id: u32, x: f32, y: f32) {
        log::info!("Pointer {} down at ({:.1}, {:.1})", pointer_id, x, y);
    }
}

/// Log at `level` unless `RUST_LOG` says otherwise
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    if let Err(err) = env_logger::Builder::from_env(env).format_timestamp_millis().try_init() {
        eprintln!("Logging already initialised: {err}");
    }
}

fn run() -> Result<(), DemoError> {
    let mut config = ApplicationConfig::load_or_default(CONFIG_PATH)?;
    config.validate()?;
    init_logging(&config.engine.log_level);
    config.engine.fps_rendering = true;
    log::info!("Starting {}", config.name);

    let app = OrbitApp {
        camera: Arc::new(FixedCamera::default()),
    };
    let mut engine = Engine::new(config.engine, app)?;
    let handle = engine.handle();
    handle.set_touch_listener(Box::new(TouchLogger));

    let commands = CommandLog::new();
    let dispatch = engine.create_dispatch(Box::new(HeadlessBackend::with_log(commands.clone())));
    let surface = Arc::new(ThreadedSurface::spawn(dispatch, 800, 600)?);
    engine.attach_surface(surface.clone());

    std::thread::sleep(RUN_TIME / 2);
    handle.dispatch_touch(TouchEvent::new(0, 400.0, 300.0, TouchPhase::Down));

    engine.on_pause();
    std::thread::sleep(Duration::from_millis(200));
    engine.on_resume()?;
    std::thread::sleep(RUN_TIME / 2);

    log::info!(
        "Ran at {:.1} fps: {} draw calls, {} program binds",
        handle.current_fps(),
        commands.draw_calls(),
        commands.programs_bound().len()
    );

    engine.destroy();
    surface.shutdown();
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        log::error!("Orbit demo failed: {}", err);
        eprintln!("Orbit demo failed: {err}");
        std::process::exit(1);
    }
}
