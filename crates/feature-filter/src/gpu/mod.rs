//! wgpu side of the filter: device context, per-material pipelines, per-mesh
//! buffers, and an offscreen renderer that draws a set of tile meshes.

pub mod buffers;
pub mod context;
pub mod pipeline;
pub mod renderer;
pub mod types;

pub use context::GpuContext;
pub use pipeline::{CachedPipeline, PipelineCache, COLOR_FORMAT, DEPTH_FORMAT};
pub use renderer::{coverage, SceneRenderer};
pub use types::MeshUniform;
