use bytemuck::{Pod, Zeroable};

use crate::color::resolve_color;
use crate::types::{
    sanitize_noise_intensity, sanitize_rotation, sanitize_scale, sanitize_speed, FieldParams,
    RenderConfig, SurfaceSize, DEFAULT_LAYER_OPACITY,
};

/// Host mirror of the `FieldParams` std140 block in the fragment program.
///
/// `vec3 u_color` is followed directly by `u_time`, which std140 packs into
/// the vec3's trailing lane. The block is rounded up to 48 bytes.
///
/// `u_layer_opacity` dims the whole layer. It is a surface setting owned by
/// the backend rather than part of [`RenderConfig`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FieldUniforms {
    pub u_color: [f32; 3],
    pub u_time: f32,
    pub u_resolution: [f32; 2],
    pub u_speed: f32,
    pub u_scale: f32,
    pub u_noise_intensity: f32,
    pub u_rotation: f32,
    pub u_layer_opacity: f32,
    pub _padding: f32,
}

impl FieldUniforms {
    pub fn from_params(params: &FieldParams, size: SurfaceSize) -> Self {
        let mut uniforms = Self {
            u_color: params.color,
            u_time: 0.0,
            u_resolution: [1.0, 1.0],
            u_speed: params.speed,
            u_scale: params.scale,
            u_noise_intensity: params.noise_intensity,
            u_rotation: params.rotation,
            u_layer_opacity: DEFAULT_LAYER_OPACITY,
            _padding: 0.0,
        };
        uniforms.set_resolution(size);
        uniforms
    }

    pub fn set_resolution(&mut self, size: SurfaceSize) {
        let size = size.clamped();
        self.u_resolution = [size.width as f32, size.height as f32];
    }
}

/// Named uniform slots of the current program plus the config they came from.
///
/// Writes go through here so a config change touches only the slots whose
/// inputs actually differ. The GPU side uploads [`UniformStore::uniforms`]
/// once per frame.
#[derive(Debug, Clone)]
pub struct UniformStore {
    config: RenderConfig,
    uniforms: FieldUniforms,
}

impl UniformStore {
    pub fn from_config(config: &RenderConfig, size: SurfaceSize) -> Self {
        Self {
            config: config.clone(),
            uniforms: FieldUniforms::from_params(&FieldParams::resolve(config), size),
        }
    }

    /// Applies `next` and returns how many slots were rewritten.
    pub fn apply_config(&mut self, next: &RenderConfig) -> usize {
        let delta = self.config.diff(next);
        if delta.is_empty() {
            return 0;
        }

        if let Some(speed) = delta.speed {
            self.uniforms.u_speed = sanitize_speed(speed);
        }
        if let Some(scale) = delta.scale {
            self.uniforms.u_scale = sanitize_scale(scale);
        }
        if let Some(color) = delta.color.as_deref() {
            self.uniforms.u_color = resolve_color(color);
        }
        if let Some(intensity) = delta.noise_intensity {
            self.uniforms.u_noise_intensity = sanitize_noise_intensity(intensity);
        }
        if let Some(rotation) = delta.rotation {
            self.uniforms.u_rotation = sanitize_rotation(rotation);
        }

        self.config = next.clone();
        delta.len()
    }

    pub fn set_resolution(&mut self, size: SurfaceSize) {
        self.uniforms.set_resolution(size);
    }

    /// Stores the frame timestamp; earlier values than the current one are ignored.
    pub fn set_time(&mut self, seconds: f32) {
        if seconds.is_finite() && seconds > self.uniforms.u_time {
            self.uniforms.u_time = seconds;
        }
    }

    pub fn uniforms(&self) -> &FieldUniforms {
        &self.uniforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(offset_of!(FieldUniforms, u_color), 0);
        assert_eq!(offset_of!(FieldUniforms, u_time), 12);
        assert_eq!(offset_of!(FieldUniforms, u_resolution), 16);
        assert_eq!(offset_of!(FieldUniforms, u_speed), 24);
        assert_eq!(offset_of!(FieldUniforms, u_scale), 28);
        assert_eq!(offset_of!(FieldUniforms, u_noise_intensity), 32);
        assert_eq!(offset_of!(FieldUniforms, u_rotation), 36);
        assert_eq!(offset_of!(FieldUniforms, u_layer_opacity), 40);
        assert_eq!(size_of::<FieldUniforms>(), 48);
    }

    #[test]
    fn initial_store_reflects_config() {
        let store = UniformStore::from_config(&RenderConfig::default(), SurfaceSize::new(640, 480));
        let uniforms = store.uniforms();
        assert_eq!(uniforms.u_resolution, [640.0, 480.0]);
        assert_eq!(uniforms.u_speed, 3.0);
        assert_eq!(uniforms.u_scale, 1.2);
        assert_eq!(uniforms.u_noise_intensity, 1.8);
        assert_eq!(uniforms.u_time, 0.0);
        assert_eq!(uniforms.u_layer_opacity, 1.0);
    }

    #[test]
    fn unchanged_config_writes_nothing() {
        let config = RenderConfig::default();
        let mut store = UniformStore::from_config(&config, SurfaceSize::new(10, 10));
        assert_eq!(store.apply_config(&config), 0);
    }

    #[test]
    fn changed_fields_are_the_only_writes() {
        let config = RenderConfig::default();
        let mut store = UniformStore::from_config(&config, SurfaceSize::new(10, 10));
        let next = RenderConfig {
            color: "#ff0000".into(),
            ..config
        };
        assert_eq!(store.apply_config(&next), 1);
        assert_eq!(store.uniforms().u_color, [1.0, 0.0, 0.0]);
        assert_eq!(store.uniforms().u_speed, 3.0);
        assert_eq!(store.apply_config(&next), 0);
    }

    #[test]
    fn invalid_updates_are_repaired() {
        let mut store =
            UniformStore::from_config(&RenderConfig::default(), SurfaceSize::new(10, 10));
        let next = RenderConfig {
            speed: -4.0,
            scale: -1.0,
            color: "blue".into(),
            ..RenderConfig::default()
        };
        assert_eq!(store.apply_config(&next), 3);
        let uniforms = store.uniforms();
        assert_eq!(uniforms.u_speed, 0.0);
        assert_eq!(uniforms.u_scale, 1.2);
        assert!(uniforms.u_color.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn resolution_never_collapses() {
        let mut store = UniformStore::from_config(&RenderConfig::default(), SurfaceSize::new(0, 0));
        assert_eq!(store.uniforms().u_resolution, [1.0, 1.0]);
        store.set_resolution(SurfaceSize::new(1920, 0));
        assert_eq!(store.uniforms().u_resolution, [1920.0, 1.0]);
    }

    #[test]
    fn time_is_monotonic() {
        let mut store =
            UniformStore::from_config(&RenderConfig::default(), SurfaceSize::new(10, 10));
        store.set_time(2.0);
        store.set_time(1.0);
        store.set_time(f32::NAN);
        assert_eq!(store.uniforms().u_time, 2.0);
        store.set_time(2.5);
        assert_eq!(store.uniforms().u_time, 2.5);
    }
}
