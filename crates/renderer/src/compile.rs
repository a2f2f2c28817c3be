use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use wgpu::naga::ShaderStage;

/// Versioned vertex/fragment pair for the silk field.
///
/// The sources are compile-time constants. Editing either string is a source
/// change and must bump `revision`; parameter changes only ever touch the
/// uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSource {
    pub revision: u32,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

impl ProgramSource {
    /// Stable-within-process identity of the source text, used to key links.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.revision.hash(&mut hasher);
        self.vertex.hash(&mut hasher);
        self.fragment.hash(&mut hasher);
        hasher.finish()
    }
}

pub const SILK_PROGRAM: ProgramSource = ProgramSource {
    revision: 2,
    vertex: VERTEX_SHADER_GLSL,
    fragment: FRAGMENT_SHADER_GLSL,
};

pub(crate) fn compile_vertex_shader(
    device: &wgpu::Device,
    program: &ProgramSource,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("silk quad vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(program.vertex),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    program: &ProgramSource,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("silk field fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(program.fragment),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Quad vertex shader: passes the plane's UV straight through.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_uv;

layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Fractal value-noise flow field.
///
/// The uniform block layout must match `FieldUniforms` in `gpu/uniforms.rs`,
/// and the math must stay in step with the CPU reference in `field.rs`.
const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform FieldParams {
    vec3 u_color;
    float u_time;
    vec2 u_resolution;
    float u_speed;
    float u_scale;
    float u_noise_intensity;
    float u_rotation;
    float u_layer_opacity;
} params;

float silk_random(vec2 st) {
    return fract(sin(dot(st, vec2(12.9898, 78.233))) * 43758.5453123);
}

float silk_noise(vec2 st) {
    vec2 i = floor(st);
    vec2 f = fract(st);

    float a = silk_random(i);
    float b = silk_random(i + vec2(1.0, 0.0));
    float c = silk_random(i + vec2(0.0, 1.0));
    float d = silk_random(i + vec2(1.0, 1.0));

    vec2 u = f * f * (vec2(3.0) - 2.0 * f);

    return mix(a, b, u.x) + (c - a) * u.y * (1.0 - u.x) + (d - b) * u.x * u.y;
}

mat2 silk_rotate(float angle) {
    float c = cos(angle);
    float s = sin(angle);
    return mat2(c, -s, s, c);
}

void main() {
    vec2 st = v_uv;
    st = (st - vec2(0.5)) * params.u_scale + vec2(0.5);
    st = silk_rotate(params.u_rotation) * (st - vec2(0.5)) + vec2(0.5);

    float t = params.u_time * params.u_speed * 0.1;

    vec2 pos = st * 8.0;
    pos += vec2(t * 0.5);

    float n = 0.0;
    float amplitude = 1.0;
    float frequency = 1.0;

    for (int i = 0; i < 4; i++) {
        n += silk_noise(pos * frequency) * amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
        pos = silk_rotate(0.5) * pos;
    }

    n = smoothstep(0.2, 0.8, n);
    n = clamp(n * params.u_noise_intensity, 0.0, 1.0);

    vec3 color = params.u_color * (0.3 + n * 0.7);
    color = mix(color, vec3(1.0), n * 0.1);

    float alpha = (0.1 + n * 0.2) * params.u_layer_opacity;

    out_color = vec4(color, alpha);
}
";
