use std::path::PathBuf;

use clap::{Parser, Subcommand};
use silk_renderer::GpuPowerPreference;

#[derive(Parser, Debug)]
#[command(
    name = "silkwall",
    author,
    version,
    about = "Animated silk-noise background renderer",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file to read instead of the one in the config directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Animation rate; 0 freezes the motion.
    #[arg(long, value_name = "SPEED", allow_negative_numbers = true)]
    pub speed: Option<f32>,

    /// Spatial frequency of the pattern (must be > 0).
    #[arg(long, value_name = "SCALE", allow_negative_numbers = true)]
    pub scale: Option<f32>,

    /// Base tint as `#RRGGBB`.
    #[arg(long, value_name = "HEX")]
    pub color: Option<String>,

    /// Contrast and opacity driver (must be >= 0).
    #[arg(long, value_name = "INTENSITY", allow_negative_numbers = true)]
    pub noise_intensity: Option<f32>,

    /// Pattern rotation in radians.
    #[arg(long, value_name = "RADIANS", allow_negative_numbers = true)]
    pub rotation: Option<f32>,

    /// Window size, or export resolution with `--export` (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Optional FPS cap (0=uncapped, also on software rasterisers).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Render a single still frame instead of animating.
    #[arg(long)]
    pub still: bool,

    /// Timestamp in seconds for still rendering and `--export` (default 0); implies `--still`.
    #[arg(long, value_name = "SECONDS")]
    pub still_time: Option<f32>,

    /// Render one frame on the CPU, write it as PNG and exit without opening a window.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Undecorated window kept below all other windows.
    #[arg(long)]
    pub background: bool,

    /// Colour painted beneath the field (`#RRGGBB`).
    #[arg(long, value_name = "HEX")]
    pub backdrop: Option<String>,

    /// Opacity of the whole field layer in [0, 1] (e.g. 0.3 for a subdued background).
    #[arg(long, value_name = "OPACITY")]
    pub opacity: Option<f32>,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_gpu_power, default_value = "low")]
    pub gpu_power: GpuPowerPreference,

    /// Do not reload the configuration file when it changes.
    #[arg(long)]
    pub no_watch: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or create the configuration file.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration file path.
    Where,
    /// Write a configuration file populated with the defaults.
    Init(ConfigInitArgs),
}

#[derive(Parser, Debug, Default)]
pub struct ConfigInitArgs {
    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        other => Err(format!("invalid GPU power preference '{other}'; use low or high")),
    }
}
