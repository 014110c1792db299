//! # Core Engine Module
//!
//! Shared configuration types used by every subsystem.

pub mod config;

pub use config::{
    ApplicationConfig,
    EngineConfig,
    Config,
    ConfigError,
};
