//! Renderer crate for silkwall, a procedural silk wallpaper.
//!
//! The crate paints an animated fractal value-noise field with a fixed GLSL
//! program. The overall flow is:
//!
//! ```text
//!   CLI / silkwall
//!          │ RendererConfig
//!          ▼
//!   WindowRuntime::spawn ──▶ winit event loop ──▶ FrameScheduler ──▶ FrameToken
//!          │ update_config(RenderConfig)                              │
//!          ▼                                                          ▼
//!   SurfaceHost::update_config ──▶ UniformStore ◀── FrameClock ◀── SurfaceHost::frame
//!                                       │
//!                                       └─▶ RenderBackend::draw ──▶ GpuSurface (wgpu)
//! ```
//!
//! `SurfaceHost` owns the lifecycle (mount, frame, resize, unmount) and talks
//! to the GPU only through the [`RenderBackend`] trait. The [`field`] module
//! evaluates the same math on the CPU for still export and tests.

pub mod color;
pub mod compile;
pub mod field;
pub mod gpu;
pub mod host;
pub mod runtime;
pub mod types;
mod window;

pub use color::{hex_to_rgb, resolve_color, InvalidColorError, DEFAULT_COLOR};
pub use compile::{ProgramSource, SILK_PROGRAM};
pub use field::export_png;
pub use gpu::{FieldUniforms, GpuSurface, UniformStore};
pub use host::{
    DrawError, FrameOutcome, HostPhase, MountOutcome, RenderBackend, ResourceCounts, SurfaceHost,
};
pub use runtime::{
    FrameClock, FrameRateCap, FrameSample, FrameScheduler, FrameToken, RenderPolicy, SubscriberId,
    Subscription, SOFTWARE_FPS_CAP,
};
pub use types::{
    ConfigDelta, FieldParams, GpuPowerPreference, RenderConfig, RendererConfig, SurfaceSize,
    DEFAULT_LAYER_OPACITY,
};
pub use window::WindowRuntime;
