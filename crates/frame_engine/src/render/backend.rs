//! Backend abstraction traits for the rendering system
//!
//! The scheduling core never talks to a GPU API directly. It issues clear,
//! bind and draw commands to a [`GraphicsBackend`], which a platform layer
//! implements on top of its real graphics driver. [`HeadlessBackend`] records
//! those commands instead, for tests and for running without a display.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use bitflags::bitflags;
use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Linked shader program identifier as known by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProgramId(pub u32);

/// Texture object identifier as known by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureId(pub u32);

bitflags! {
    /// Buffers cleared at the start of a frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Colour attachment
        const COLOR = 1 << 0;
        /// Depth attachment
        const DEPTH = 1 << 1;
    }
}

bitflags! {
    /// Global pipeline capabilities toggled on surface creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapabilityFlags: u32 {
        /// Depth testing
        const DEPTH_TEST = 1 << 0;
        /// Back-face culling
        const CULL_FACE = 1 << 1;
        /// Alpha blending
        const BLEND = 1 << 2;
        /// Colour dithering
        const DITHER = 1 << 3;
    }
}

/// Depth comparison used by the depth test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFunc {
    /// Pass when the incoming depth is smaller
    Less,
    /// Pass when the incoming depth is smaller or equal
    LessEqual,
    /// Always pass
    Always,
}

/// Blend equation factors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFunc {
    /// `SRC_ALPHA, ONE_MINUS_SRC_ALPHA`
    Alpha,
    /// `ONE, ONE`
    Additive,
}

/// Errors reported by the graphics backend's error query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// An enum argument was out of range
    #[error("invalid enum")]
    InvalidEnum,

    /// A numeric argument was out of range
    #[error("invalid value")]
    InvalidValue,

    /// The operation is not allowed in the current state
    #[error("invalid operation")]
    InvalidOperation,

    /// The bound framebuffer is incomplete
    #[error("invalid framebuffer operation")]
    InvalidFramebufferOperation,

    /// The driver ran out of memory
    #[error("out of memory")]
    OutOfMemory,

    /// Driver specific error code
    #[error("backend error code {0:#x}")]
    Code(u32),
}

/// Command interface the render dispatch drives
///
/// Every method must only be called from the render context that owns the
/// backend. Errors are not returned per call; they accumulate in the
/// backend and are collected through [`GraphicsBackend::take_error`].
pub trait GraphicsBackend: Send {
    /// Clear the selected buffers
    fn clear(&mut self, flags: ClearFlags);

    /// Set the colour used by colour clears
    fn set_clear_color(&mut self, color: [f32; 4]);

    /// Enable global capabilities
    fn enable(&mut self, capabilities: CapabilityFlags);

    /// Disable global capabilities
    fn disable(&mut self, capabilities: CapabilityFlags);

    /// Select the blend equation
    fn set_blend_func(&mut self, func: BlendFunc);

    /// Select the depth comparison
    fn set_depth_func(&mut self, func: DepthFunc);

    /// Make `program` the active shader program
    fn use_program(&mut self, program: ProgramId);

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    /// Issue an indexed draw of `count` indices
    fn draw_indexed(&mut self, count: u32);

    /// Set the viewport rectangle
    fn viewport(&mut self, width: u32, height: u32);

    /// Pop the oldest pending error, if any
    fn take_error(&mut self) -> Option<BackendError>;
}

/// Drain and log every pending backend error
///
/// Backend errors never abort a frame; this returns how many were found so
/// callers can keep statistics.
pub fn check_backend(backend: &mut dyn GraphicsBackend, tag: &str) -> usize {
    let mut count = 0;
    while let Some(error) = backend.take_error() {
        log::error!("[{}] graphics backend error: {}", tag, error);
        count += 1;
    }
    count
}

/// A single recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    /// `clear`
    Clear(ClearFlags),
    /// `set_clear_color`
    ClearColor([f32; 4]),
    /// `enable`
    Enable(CapabilityFlags),
    /// `disable`
    Disable(CapabilityFlags),
    /// `set_blend_func`
    BlendFunc(BlendFunc),
    /// `set_depth_func`
    DepthFunc(DepthFunc),
    /// `use_program`
    UseProgram(ProgramId),
    /// `bind_texture`
    BindTexture {
        /// Texture unit
        unit: u32,
        /// Bound texture
        texture: TextureId,
    },
    /// `draw_indexed`
    DrawIndexed(u32),
    /// `viewport`
    Viewport {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
}

#[derive(Debug, Default)]
struct LogState {
    commands: Vec<BackendCommand>,
    pending_errors: VecDeque<BackendError>,
}

/// Shared, cloneable view of the commands a [`HeadlessBackend`] received
///
/// The backend itself moves to the render context; the log stays with the
/// caller for inspection.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    state: Arc<Mutex<LogState>>,
}

impl CommandLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LogState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn record(&self, command: BackendCommand) {
        self.with_state(|state| state.commands.push(command));
    }

    /// Copy of every command recorded so far
    pub fn commands(&self) -> Vec<BackendCommand> {
        self.with_state(|state| state.commands.clone())
    }

    /// Number of recorded commands matching `predicate`
    pub fn count(&self, predicate: impl Fn(&BackendCommand) -> bool) -> usize {
        self.with_state(|state| state.commands.iter().filter(|command| predicate(command)).count())
    }

    /// Number of recorded `draw_indexed` calls
    pub fn draw_calls(&self) -> usize {
        self.count(|command| matches!(command, BackendCommand::DrawIndexed(_)))
    }

    /// Programs bound, in order
    pub fn programs_bound(&self) -> Vec<ProgramId> {
        self.with_state(|state| {
            state
                .commands
                .iter()
                .filter_map(|command| match command {
                    BackendCommand::UseProgram(program) => Some(*program),
                    _ => None,
                })
                .collect()
        })
    }

    /// Forget every recorded command
    pub fn clear(&self) {
        self.with_state(|state| state.commands.clear());
    }

    /// Queue an error to be returned by the next error query
    pub fn inject_error(&self, error: BackendError) {
        self.with_state(|state| state.pending_errors.push_back(error));
    }
}

/// Graphics backend that records commands instead of executing them
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    log: CommandLog,
}

impl HeadlessBackend {
    /// Create a backend with a fresh command log
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend recording into an existing log
    pub fn with_log(log: CommandLog) -> Self {
        Self { log }
    }

    /// The command log this backend records into
    pub fn log(&self) -> &CommandLog {
        &self.log
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn clear(&mut self, flags: ClearFlags) {
        self.log.record(BackendCommand::Clear(flags));
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.log.record(BackendCommand::ClearColor(color));
    }

    fn enable(&mut self, capabilities: CapabilityFlags) {
        self.log.record(BackendCommand::Enable(capabilities));
    }

    fn disable(&mut self, capabilities: CapabilityFlags) {
        self.log.record(BackendCommand::Disable(capabilities));
    }

    fn set_blend_func(&mut self, func: BlendFunc) {
        self.log.record(BackendCommand::BlendFunc(func));
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.log.record(BackendCommand::DepthFunc(func));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.log.record(BackendCommand::UseProgram(program));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.log.record(BackendCommand::BindTexture { unit, texture });
    }

    fn draw_indexed(&mut self, count: u32) {
        self.log.record(BackendCommand::DrawIndexed(count));
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.log.record(BackendCommand::Viewport { width, height });
    }

    fn take_error(&mut self) -> Option<BackendError> {
        self.log.with_state(|state| state.pending_errors.pop_front())
    }
}
