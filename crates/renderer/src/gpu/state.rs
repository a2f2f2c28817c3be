use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use winit::window::Window;

use crate::compile::ProgramSource;
use crate::host::{DrawError, RenderBackend, ResourceCounts};
use crate::types::{sanitize_layer_opacity, AdapterProfile, GpuPowerPreference, SurfaceSize};

use super::context::GpuContext;
use super::geometry::{self, QUAD_VERTICES};
use super::pipeline::FieldProgram;
use super::uniforms::FieldUniforms;

const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(16);

/// wgpu-backed [`RenderBackend`] drawing into a winit window.
pub struct GpuSurface {
    // Field order matters: the surface inside `context` must drop before the window.
    context: GpuContext,
    source: ProgramSource,
    quad: Option<wgpu::Buffer>,
    program: Option<FieldProgram>,
    backdrop: [f32; 3],
    layer_opacity: f32,
    frame_budget: Duration,
    frames_since_stats: u32,
    last_stats: Instant,
    frames_drawn: u64,
    window: Arc<Window>,
}

impl GpuSurface {
    pub fn new(
        window: Arc<Window>,
        source: ProgramSource,
        backdrop: [f32; 3],
        layer_opacity: f32,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self> {
        let size = window.inner_size();
        let context = GpuContext::new(
            window.as_ref(),
            SurfaceSize::new(size.width, size.height),
            gpu_power,
        )
        .context("failed to initialise GPU surface")?;

        Ok(Self {
            context,
            source,
            quad: None,
            program: None,
            backdrop,
            layer_opacity: sanitize_layer_opacity(layer_opacity),
            frame_budget: DEFAULT_FRAME_BUDGET,
            frames_since_stats: 0,
            last_stats: Instant::now(),
            frames_drawn: 0,
            window,
        })
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    /// Surface acquisition slower than `budget` is reported as a warning.
    pub fn set_frame_budget(&mut self, budget: Duration) {
        self.frame_budget = budget;
    }

    fn acquire_frame(&mut self) -> Result<wgpu::SurfaceTexture, DrawError> {
        let started = Instant::now();
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(DrawError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(DrawError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(DrawError::OutOfMemory),
            Err(other) => return Err(DrawError::Unavailable(other.to_string())),
        };

        let waited = started.elapsed();
        if waited > self.frame_budget {
            warn!(
                "acquiring frame took {}ms, which is over the frame budget of {}ms",
                waited.as_millis(),
                self.frame_budget.as_millis(),
            );
        }
        Ok(frame)
    }

    fn submit(
        &mut self,
        fallback: Option<[f32; 3]>,
        uniforms: Option<&FieldUniforms>,
    ) -> Result<(), DrawError> {
        let frame = self.acquire_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let draw = match (uniforms, self.program.as_ref(), self.quad.as_ref()) {
            (Some(uniforms), Some(program), Some(quad)) => {
                program.write_uniforms(&self.context.queue, uniforms);
                Some((program, quad))
            }
            _ => None,
        };

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("silk frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("silk pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame_clear(self.backdrop, fallback)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some((program, quad)) = draw {
                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(0, &program.bind_group, &[]);
                pass.set_vertex_buffer(0, quad.slice(..));
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
            }
        }
        self.context.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();

        self.record_stats(uniforms.map(|u| u.u_time));
        Ok(())
    }

    fn record_stats(&mut self, time: Option<f32>) {
        self.frames_drawn += 1;
        self.frames_since_stats += 1;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_stats);
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames_since_stats as f32 / elapsed.as_secs_f32();
            debug!(
                fps = fps.round(),
                frame_index = self.frames_drawn,
                time = time.unwrap_or_default(),
                "render stats"
            );
            self.frames_since_stats = 0;
            self.last_stats = now;
        }
    }
}

impl RenderBackend for GpuSurface {
    fn acquire(&mut self, size: SurfaceSize) -> Result<()> {
        self.context.resize(size);
        if self.quad.is_none() {
            self.quad = Some(geometry::create_quad_buffer(&self.context.device));
        }
        if self.program.is_none() {
            let program =
                FieldProgram::new(&self.context.device, self.context.surface_format, &self.source)?;
            debug!(fingerprint = program.fingerprint, "silk program linked");
            self.program = Some(program);
        }
        Ok(())
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.context.resize(size);
    }

    fn draw(&mut self, uniforms: &FieldUniforms) -> Result<(), DrawError> {
        if self.program.is_none() || self.quad.is_none() {
            return Err(DrawError::Unavailable("program not acquired".to_string()));
        }
        let mut frame = *uniforms;
        frame.u_layer_opacity = self.layer_opacity;
        self.submit(None, Some(&frame))
    }

    fn draw_fallback(&mut self, color: [f32; 3]) -> Result<(), DrawError> {
        self.submit(Some(color), None)
    }

    fn release(&mut self) {
        if let Some(program) = self.program.take() {
            program.uniform_buffer.destroy();
        }
        if let Some(quad) = self.quad.take() {
            quad.destroy();
        }
    }

    fn resources(&self) -> ResourceCounts {
        ResourceCounts {
            programs: usize::from(self.program.is_some()),
            buffers: usize::from(self.program.is_some()) + usize::from(self.quad.is_some()),
        }
    }
}

/// Clear colour of one frame: the fallback tint when given, else the backdrop.
fn frame_clear(backdrop: [f32; 3], fallback: Option<[f32; 3]>) -> wgpu::Color {
    let [r, g, b] = fallback.unwrap_or(backdrop);
    wgpu::Color {
        r: f64::from(r),
        g: f64::from(g),
        b: f64::from(b),
        a: 1.0,
    }
}
