//! Rendering: backend abstraction, shader registry, draw batching and the
//! render-thread dispatch that ties them to a surface

pub mod backend;
pub mod batch;
pub mod dispatch;
pub mod shader;
pub mod surface;

pub use backend::{GraphicsBackend, HeadlessBackend, ProgramId, TextureId};
pub use batch::{BatchStats, DrawCollection, ShaderCollection, SwapCollection};
pub use dispatch::{FrameStats, RenderDispatch};
pub use shader::{ShaderHandle, ShaderProgram, ShaderRegistry};
pub use surface::{ManualSurface, Surface, ThreadedSurface};
