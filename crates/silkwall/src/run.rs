use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use silk_renderer::{export_png, resolve_color, SurfaceSize, WindowRuntime};
use silkconfig::SilkConfig;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bindings;
use crate::cli::{Cli, Command, ConfigAction, RunArgs};
use crate::paths::resolve_config_file;
use crate::watch::{load_config, ConfigWatcher, Wake};

const DEFAULT_LOG_FILTER: &str =
    "warn,silkwall=info,silk_renderer=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,winit=error";

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Some(Command::Config(command)) => {
            let path = resolve_config_file(cli.run.config.as_deref())?;
            match command.action {
                ConfigAction::Where => {
                    println!("{}", path.display());
                    Ok(())
                }
                ConfigAction::Init(args) => init_config(&path, args.force),
            }
        }
        None => run_renderer(cli.run),
    }
}

fn initialise_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = SilkConfig::template().to_toml_string()?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote configuration file");
    println!("{}", path.display());
    Ok(())
}

fn run_renderer(args: RunArgs) -> Result<()> {
    let config_path = resolve_config_file(args.config.as_deref())?;
    let file_config = match load_config(&config_path)? {
        Some(config) => {
            info!(path = %config_path.display(), "loaded configuration");
            config
        }
        None if args.config.is_some() => {
            bail!("configuration file {} not found", config_path.display())
        }
        None => {
            debug!(path = %config_path.display(), "no configuration file; using defaults");
            SilkConfig::default()
        }
    };

    if let Some(target) = args.export.as_deref() {
        return export_still(&args, &file_config, target);
    }

    let renderer_config = bindings::renderer_config(&args, &file_config)?;
    let mut current = renderer_config.field.clone();
    let runtime = WindowRuntime::spawn(renderer_config)?;

    if args.no_watch {
        return runtime.join();
    }

    let watcher = match ConfigWatcher::new(config_path) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "live reload disabled");
            return runtime.join();
        }
    };
    let mut surface = file_config.surface;
    debug!(path = %watcher.path().display(), settle = ?surface.reload_interval, "watching configuration");

    while watcher.wait(runtime.closed(), surface.reload_interval) == Wake::Changed {
        let Some(next_file) = watcher.reload() else {
            continue;
        };
        if next_file.surface.backdrop != surface.backdrop
            || next_file.surface.fps != surface.fps
            || next_file.surface.opacity != surface.opacity
        {
            warn!("surface settings changed; backdrop, fps and opacity apply after a restart");
        }
        surface = next_file.surface.clone();

        let next = bindings::field_config(&args, &next_file);
        if next == current {
            continue;
        }
        if let Err(err) = runtime.update_config(next.clone()) {
            debug!(error = %err, "window closed before the update was delivered");
            break;
        }
        current = next;
    }

    runtime.join()
}

fn export_still(args: &RunArgs, file: &SilkConfig, target: &Path) -> Result<()> {
    let (width, height) = bindings::surface_size(args)?;
    let field = bindings::field_config(args, file);
    let backdrop = resolve_color(&bindings::backdrop(args, file));
    let time = args.still_time.unwrap_or(0.0);
    let opacity = bindings::layer_opacity(args, file);
    export_png(
        target,
        &field,
        time,
        SurfaceSize::new(width, height),
        backdrop,
        opacity,
    )
}
