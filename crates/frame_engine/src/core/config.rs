//! # Engine Configuration
//!
//! Scheduling, batching and logging settings for a running engine instance.
//! The structures here are plain serde types so they can be stored next to an
//! application as TOML or RON through the [`Config`] trait.
//!
//! ## Configuration Categories
//!
//! - **Engine Config**: update rate, render delay, collection capacities, logging
//! - **Application Config**: application name plus the engine section

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Engine Configuration
///
/// Core scheduling behaviour. `requested_fps` drives the update thread,
/// `render_delay` decides how many update cycles pass between two render
/// requests (0 renders every cycle, 1 renders every other cycle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
    /// Update cycles per second requested from the update thread
    pub requested_fps: f32,
    /// Number of skipped render requests between two rendered cycles
    pub render_delay: u32,
    /// Start the update thread automatically once the surface is created
    pub fps_rendering: bool,
    /// Colour the render target is cleared to at the start of every frame
    pub clear_color: [f32; 4],
    /// Initial capacity of updateable collections
    pub updateable_capacity: usize,
    /// Initial capacity of the shader registry
    pub shader_capacity: usize,
    /// Default initial capacity of a shader bucket
    pub bucket_capacity: usize,
    /// Delay before the update thread restarts after a resume
    pub resume_delay_ms: u64,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
            requested_fps: 30.0,
            render_delay: 0,
            fps_rendering: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            updateable_capacity: 4096,
            shader_capacity: 32,
            bucket_capacity: 1024,
            resume_delay_ms: 1000,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable debug mode
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Set the requested update rate
    pub fn with_requested_fps(mut self, fps: f32) -> Self {
        self.requested_fps = fps;
        self
    }

    /// Set the number of update cycles skipped between renders
    pub fn with_render_delay(mut self, frames: u32) -> Self {
        self.render_delay = frames;
        self
    }

    /// Start the update thread as soon as the surface exists
    pub fn with_fps_rendering(mut self, enabled: bool) -> Self {
        self.fps_rendering = enabled;
        self
    }

    /// Set the clear colour
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the delay before the update thread restarts after a resume
    pub fn with_resume_delay_ms(mut self, delay: u64) -> Self {
        self.resume_delay_ms = delay;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.requested_fps.is_finite() || self.requested_fps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "requested_fps must be a positive number, got {}",
                self.requested_fps
            )));
        }

        if self.updateable_capacity == 0 || self.shader_capacity == 0 || self.bucket_capacity == 0 {
            return Err(ConfigError::Invalid("collection capacities must be at least 1".to_string()));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration applications load from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name, used in log output
    pub name: String,
    /// Engine core configuration
    pub engine: EngineConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }
        self.engine.validate()
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

impl Config for ApplicationConfig {}
