// VIEW: Rendering and graphics
pub mod render;
pub mod gpu_init;

pub use render::{CameraResources, PipelineResources, RenderState, SceneDrawables};
pub use gpu_init::{GpuContext, GpuInitError};
