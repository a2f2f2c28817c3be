//! Merges command-line flags with the configuration file.
//!
//! Precedence is always flag, then file, then the renderer default.

use anyhow::{Context, Result};
use silk_renderer::{
    FrameRateCap, RenderConfig, RenderPolicy, RendererConfig, DEFAULT_LAYER_OPACITY,
};
use silkconfig::SilkConfig;

use crate::cli::RunArgs;

pub const DEFAULT_SURFACE_SIZE: (u32, u32) = (1920, 1080);
pub const DEFAULT_BACKDROP: &str = "#000000";

pub fn field_config(args: &RunArgs, file: &SilkConfig) -> RenderConfig {
    let defaults = RenderConfig::default();
    let field = &file.field;
    RenderConfig {
        speed: pick(args.speed, field.speed, defaults.speed),
        scale: pick(args.scale, field.scale, defaults.scale),
        color: args
            .color
            .clone()
            .or_else(|| field.color.clone())
            .unwrap_or(defaults.color),
        noise_intensity: pick(
            args.noise_intensity,
            field.noise_intensity,
            defaults.noise_intensity,
        ),
        rotation: pick(args.rotation, field.rotation, defaults.rotation),
    }
}

pub fn render_policy(args: &RunArgs, file: &SilkConfig) -> RenderPolicy {
    if args.still || args.still_time.is_some() {
        return RenderPolicy::Still {
            time: args.still_time.unwrap_or(0.0),
        };
    }
    let requested = args.fps.or(file.surface.fps.map(|fps| fps as f32));
    RenderPolicy::Animate {
        cap: FrameRateCap::from_request(requested),
    }
}

pub fn layer_opacity(args: &RunArgs, file: &SilkConfig) -> f32 {
    pick(args.opacity, file.surface.opacity, DEFAULT_LAYER_OPACITY)
}

pub fn backdrop(args: &RunArgs, file: &SilkConfig) -> String {
    args.backdrop
        .clone()
        .or_else(|| file.surface.backdrop.clone())
        .unwrap_or_else(|| DEFAULT_BACKDROP.to_string())
}

pub fn surface_size(args: &RunArgs) -> Result<(u32, u32)> {
    match args.size.as_deref() {
        Some(spec) => parse_surface_size(spec)
            .with_context(|| format!("invalid --size value '{spec}'")),
        None => Ok(DEFAULT_SURFACE_SIZE),
    }
}

pub fn renderer_config(args: &RunArgs, file: &SilkConfig) -> Result<RendererConfig> {
    Ok(RendererConfig {
        surface_size: surface_size(args)?,
        field: field_config(args, file),
        policy: render_policy(args, file),
        backdrop: backdrop(args, file),
        layer_opacity: layer_opacity(args, file),
        background: args.background,
        gpu_power: args.gpu_power,
        ..RendererConfig::default()
    })
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let (width, height) = spec
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

fn pick(flag: Option<f32>, file: Option<f64>, default: f32) -> f32 {
    flag.or(file.map(|value| value as f32)).unwrap_or(default)
}
