//! CPU transcription of the silk fragment program.
//!
//! Every function here mirrors its GLSL twin in `compile.rs` operation for
//! operation in `f32`, so properties proven on the CPU (ranges, determinism,
//! continuity) describe what the GPU paints. The module also backs still
//! export, which rasterises a frame without touching a GPU.

use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::info;

use crate::gpu::FieldUniforms;
use crate::types::{sanitize_layer_opacity, FieldParams, RenderConfig, SurfaceSize};

/// Number of fractal octaves accumulated per sample.
pub const OCTAVES: usize = 4;
/// Fixed rotation applied to the sample point between octaves, in radians.
pub const OCTAVE_ROTATION: f32 = 0.5;
/// Lattice density of the first octave across the unit square.
pub const LATTICE_SCALE: f32 = 8.0;

/// Output of one field evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    /// Post-smoothstep, intensity-scaled noise in `[0, 1]`.
    pub intensity: f32,
    /// Straight (non-premultiplied) colour.
    pub color: [f32; 3],
    /// Within `[0.1, 0.3]`, times the layer opacity.
    pub alpha: f32,
}

impl FieldSample {
    /// Multiplier applied to the base colour before the white blend.
    pub fn brightness(&self) -> f32 {
        0.3 + 0.7 * self.intensity
    }
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// `mat2(c, -s, s, c) * p` with GLSL's column-major constructor.
pub fn rotate(p: [f32; 2], angle: f32) -> [f32; 2] {
    let (s, c) = angle.sin_cos();
    [c * p[0] + s * p[1], -s * p[0] + c * p[1]]
}

/// Sine hash of a lattice point, in `[0, 1)`.
pub fn random(p: [f32; 2]) -> f32 {
    let dot = p[0] * 12.9898 + p[1] * 78.233;
    fract(dot.sin() * 43758.547)
}

/// Smoothstep-weighted bilinear blend of the hash at the four surrounding corners.
pub fn noise(p: [f32; 2]) -> f32 {
    let i = [p[0].floor(), p[1].floor()];
    let f = [fract(p[0]), fract(p[1])];

    let a = random(i);
    let b = random([i[0] + 1.0, i[1]]);
    let c = random([i[0], i[1] + 1.0]);
    let d = random([i[0] + 1.0, i[1] + 1.0]);

    let u = [
        f[0] * f[0] * (3.0 - 2.0 * f[0]),
        f[1] * f[1] * (3.0 - 2.0 * f[1]),
    ];

    mix(a, b, u[0]) + (c - a) * u[1] * (1.0 - u[0]) + (d - b) * u[0] * u[1]
}

/// Raw octave sum before contrast shaping; bounded by `1 + 1/2 + 1/4 + 1/8`.
pub fn fbm(mut pos: [f32; 2]) -> f32 {
    let mut n = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    for _ in 0..OCTAVES {
        n += noise([pos[0] * frequency, pos[1] * frequency]) * amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
        pos = rotate(pos, OCTAVE_ROTATION);
    }
    n
}

/// Maps a `[0, 1]` plane coordinate to the animated lattice position.
pub fn lattice_position(uv: [f32; 2], uniforms: &FieldUniforms) -> [f32; 2] {
    let scale = uniforms.u_scale;
    let st = [(uv[0] - 0.5) * scale + 0.5, (uv[1] - 0.5) * scale + 0.5];
    let centred = rotate([st[0] - 0.5, st[1] - 0.5], uniforms.u_rotation);
    let st = [centred[0] + 0.5, centred[1] + 0.5];

    let t = uniforms.u_time * uniforms.u_speed * 0.1;
    let drift = t * 0.5;
    [st[0] * LATTICE_SCALE + drift, st[1] * LATTICE_SCALE + drift]
}

/// Evaluates the field at a plane coordinate (`(0, 0)` bottom-left).
pub fn sample(uv: [f32; 2], uniforms: &FieldUniforms) -> FieldSample {
    let n = fbm(lattice_position(uv, uniforms));
    let n = (smoothstep(0.2, 0.8, n) * uniforms.u_noise_intensity).clamp(0.0, 1.0);

    let brightness = 0.3 + n * 0.7;
    let white = n * 0.1;
    let color = uniforms
        .u_color
        .map(|channel| mix(channel * brightness, 1.0, white));

    FieldSample {
        intensity: n,
        color,
        alpha: (0.1 + n * 0.2) * uniforms.u_layer_opacity,
    }
}

/// Evaluates the field at the centre of a pixel (row 0 at the top).
///
/// The uniform resolution is clamped to 1x1 before normalising, so a
/// collapsed surface still yields finite coordinates.
pub fn sample_pixel(x: u32, y: u32, uniforms: &FieldUniforms) -> FieldSample {
    let width = uniforms.u_resolution[0].max(1.0);
    let height = uniforms.u_resolution[1].max(1.0);
    let uv = [
        (x as f32 + 0.5) / width,
        1.0 - (y as f32 + 0.5) / height,
    ];
    sample(uv, uniforms)
}

/// Rasterises one frame composited additively over `backdrop`, like the GPU pass.
pub fn render_image(uniforms: &FieldUniforms, size: SurfaceSize, backdrop: [f32; 3]) -> RgbaImage {
    let size = size.clamped();
    let mut frame = *uniforms;
    frame.set_resolution(size);

    RgbaImage::from_fn(size.width, size.height, |x, y| {
        let sample = sample_pixel(x, y, &frame);
        let mut pixel = [0u8; 4];
        for channel in 0..3 {
            let value = backdrop[channel] + sample.color[channel] * sample.alpha;
            pixel[channel] = to_byte(value);
        }
        pixel[3] = 255;
        Rgba(pixel)
    })
}

/// Renders `config` at `time` seconds without a GPU and writes a PNG to `path`.
pub fn export_png(
    path: &Path,
    config: &RenderConfig,
    time: f32,
    size: SurfaceSize,
    backdrop: [f32; 3],
    layer_opacity: f32,
) -> Result<()> {
    let mut uniforms = FieldUniforms::from_params(&FieldParams::resolve(config), size);
    uniforms.u_time = if time.is_finite() { time.max(0.0) } else { 0.0 };
    uniforms.u_layer_opacity = sanitize_layer_opacity(layer_opacity);
    let image = render_image(&uniforms, size, backdrop);
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write still frame to {}", path.display()))?;
    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        time = uniforms.u_time,
        "still frame exported"
    );
    Ok(())
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
