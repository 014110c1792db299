//! Scene objects and the scene graph that advances them

pub mod camera;
pub mod graph;
pub mod object;
pub mod timer;

pub use camera::{Camera, FixedCamera};
pub use graph::{AdvanceStats, Group, GroupOrder, Scene, SceneError, SceneObject, SceneResult};
pub use object::{DrawContext, ObjectKey, Renderable, UpdateContext, Updateable};
pub use timer::DelayTimer;
