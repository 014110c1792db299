//! Camera abstraction
//!
//! Projection math lives outside the engine. Renderables only need a shared
//! producer of the combined view-projection transform.

use std::sync::RwLock;

use nalgebra::Matrix4;

/// Shared producer of a view-projection transform
pub trait Camera: Send + Sync {
    /// Combined view-projection matrix
    fn view_projection(&self) -> Matrix4<f32>;
}

/// Camera with an externally set transform
#[derive(Debug)]
pub struct FixedCamera {
    transform: RwLock<Matrix4<f32>>,
}

impl FixedCamera {
    /// Create a camera with the given transform
    pub fn new(transform: Matrix4<f32>) -> Self {
        Self {
            transform: RwLock::new(transform),
        }
    }

    /// Replace the transform; renderables see it on their next draw
    pub fn set_transform(&self, transform: Matrix4<f32>) {
        match self.transform.write() {
            Ok(mut guard) => *guard = transform,
            Err(poisoned) => *poisoned.into_inner() = transform,
        }
    }
}

impl Default for FixedCamera {
    fn default() -> Self {
        Self::new(Matrix4::identity())
    }
}

impl Camera for FixedCamera {
    fn view_projection(&self) -> Matrix4<f32> {
        match self.transform.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
