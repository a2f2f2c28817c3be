//! wgpu side of the renderer.
//!
//! - `context` owns the wgpu instance, device and surface, and reconfigures
//!   the swapchain on resize or loss.
//! - `geometry` holds the static full-viewport quad.
//! - `pipeline` links the silk GLSL pair into a render pipeline with one
//!   uniform bind group and additive blending.
//! - `uniforms` mirrors the fragment program's uniform block and owns the
//!   config-to-uniform diffing. It has no wgpu dependency so the CPU
//!   reference and the tests can use it without a device.
//! - `state` glues everything together behind the `RenderBackend` trait.

mod context;
mod geometry;
mod pipeline;
mod state;
mod uniforms;

pub use geometry::{QuadVertex, QUAD_VERTICES};
pub use state::GpuSurface;
pub use uniforms::{FieldUniforms, UniformStore};
