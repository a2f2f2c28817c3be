use tracing::warn;

use crate::color::{resolve_color, DEFAULT_COLOR};
use crate::runtime::RenderPolicy;

pub const DEFAULT_SPEED: f32 = 3.0;
pub const DEFAULT_SCALE: f32 = 1.2;
pub const DEFAULT_NOISE_INTENSITY: f32 = 1.8;
pub const DEFAULT_ROTATION: f32 = 0.0;
/// Full-strength layer. `0.3` reproduces a layer dimmed to 30% by its container.
pub const DEFAULT_LAYER_OPACITY: f32 = 1.0;

/// Caller-facing parameters of the silk field.
///
/// Values are taken as given; out-of-range numbers and malformed colours are
/// repaired when they are converted into [`FieldParams`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Animation rate. Zero freezes the motion term.
    pub speed: f32,
    /// Spatial frequency of the pattern; must be positive.
    pub scale: f32,
    /// Base tint as a `#RRGGBB` string.
    pub color: String,
    /// Contrast/opacity driver; must be non-negative.
    pub noise_intensity: f32,
    /// Rotation of the pattern in radians.
    pub rotation: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SPEED,
            scale: DEFAULT_SCALE,
            color: DEFAULT_COLOR.to_string(),
            noise_intensity: DEFAULT_NOISE_INTENSITY,
            rotation: DEFAULT_ROTATION,
        }
    }
}

impl RenderConfig {
    /// Field-by-field comparison against `next`; only differing fields are set.
    pub fn diff(&self, next: &RenderConfig) -> ConfigDelta {
        fn changed(a: f32, b: f32) -> Option<f32> {
            (a.to_bits() != b.to_bits()).then_some(b)
        }

        ConfigDelta {
            speed: changed(self.speed, next.speed),
            scale: changed(self.scale, next.scale),
            color: (self.color != next.color).then(|| next.color.clone()),
            noise_intensity: changed(self.noise_intensity, next.noise_intensity),
            rotation: changed(self.rotation, next.rotation),
        }
    }
}

/// Minimal set of field updates between two [`RenderConfig`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDelta {
    pub speed: Option<f32>,
    pub scale: Option<f32>,
    pub color: Option<String>,
    pub noise_intensity: Option<f32>,
    pub rotation: Option<f32>,
}

impl ConfigDelta {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fields that differ.
    pub fn len(&self) -> usize {
        [
            self.speed.is_some(),
            self.scale.is_some(),
            self.color.is_some(),
            self.noise_intensity.is_some(),
            self.rotation.is_some(),
        ]
        .into_iter()
        .filter(|changed| *changed)
        .count()
    }
}

pub fn sanitize_speed(value: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(speed = value, "speed must be finite and >= 0; freezing motion");
        0.0
    }
}

pub fn sanitize_scale(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        warn!(scale = value, fallback = DEFAULT_SCALE, "scale must be > 0; using default");
        DEFAULT_SCALE
    }
}

pub fn sanitize_noise_intensity(value: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(noise_intensity = value, "noise intensity must be >= 0; using 0");
        0.0
    }
}

pub fn sanitize_rotation(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        warn!(rotation = value, "rotation must be finite; using 0");
        0.0
    }
}

pub fn sanitize_layer_opacity(value: f32) -> f32 {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        value
    } else if value.is_finite() {
        warn!(opacity = value, "layer opacity must be within [0, 1]; clamping");
        value.clamp(0.0, 1.0)
    } else {
        warn!(opacity = value, "layer opacity must be finite; using 1");
        DEFAULT_LAYER_OPACITY
    }
}

/// GPU-ready counterpart of [`RenderConfig`]: RGB triple, clamped scalars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldParams {
    pub speed: f32,
    pub scale: f32,
    pub color: [f32; 3],
    pub noise_intensity: f32,
    pub rotation: f32,
}

impl FieldParams {
    pub fn resolve(config: &RenderConfig) -> Self {
        Self {
            speed: sanitize_speed(config.speed),
            scale: sanitize_scale(config.scale),
            color: resolve_color(&config.color),
            noise_intensity: sanitize_noise_intensity(config.noise_intensity),
            rotation: sanitize_rotation(config.rotation),
        }
    }
}

/// Drawable size in physical pixels as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size with both dimensions raised to at least one pixel.
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }
}

/// GPU adapter preference handed to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Summary of the adapter chosen at mount time.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Immutable start-up options for the window runtime.
///
/// `RendererConfig` mirrors CLI flags; the live field parameters travel in
/// [`RenderConfig`] and can change after start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Window title.
    pub title: String,
    /// Field parameters applied at mount.
    pub field: RenderConfig,
    /// Animate continuously or evaluate a single timestamp.
    pub policy: RenderPolicy,
    /// Clear colour painted before the additive field pass.
    pub backdrop: String,
    /// Multiplier on the field's alpha, dimming the whole layer.
    pub layer_opacity: f32,
    /// Place the window below other windows without decorations.
    pub background: bool,
    /// Adapter power preference.
    pub gpu_power: GpuPowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1920, 1080),
            title: "silkwall".to_string(),
            field: RenderConfig::default(),
            policy: RenderPolicy::default(),
            backdrop: "#000000".to_string(),
            layer_opacity: DEFAULT_LAYER_OPACITY,
            background: false,
            gpu_power: GpuPowerPreference::default(),
        }
    }
}
