//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Collections with explicit ordering guarantees
//! - Frame timing and FPS measurement
//! - Logging utilities

pub mod collections;
pub mod time;
pub mod logging;
