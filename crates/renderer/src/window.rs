use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, trace, warn};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::window::{WindowBuilder, WindowLevel};

use crate::color::resolve_color;
use crate::compile::SILK_PROGRAM;
use crate::gpu::GpuSurface;
use crate::host::{DrawError, FrameOutcome, SurfaceHost};
use crate::runtime::{FrameClock, FrameRateCap, FrameScheduler, RenderPolicy};
use crate::types::{RenderConfig, RendererConfig, SurfaceSize};

const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(16);

#[derive(Debug, Clone)]
enum WindowCommand {
    Update(RenderConfig),
    Shutdown,
}

/// Handle to the window thread that hosts one silk surface.
pub struct WindowRuntime {
    proxy: EventLoopProxy<WindowCommand>,
    join_handle: Option<JoinHandle<Result<()>>>,
    closed: Receiver<()>,
}

impl WindowRuntime {
    /// Opens the window on its own thread and returns once the GPU surface
    /// exists. A program that fails to build still returns `Ok`; the window
    /// then shows a solid fallback colour.
    pub fn spawn(config: RendererConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let (closed_tx, closed) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("silkwall-window".into())
            .spawn(move || {
                // Disconnects `closed` when the thread returns, whichever way it exits.
                let _closed = closed_tx;
                run_window_thread(config, ready_tx)
            })
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            join_handle: Some(handle),
            closed,
        })
    }

    /// Queues a parameter change; it is applied between two frames.
    pub fn update_config(&self, config: RenderConfig) -> Result<()> {
        self.proxy
            .send_event(WindowCommand::Update(config))
            .map_err(|_| anyhow!("window has already closed"))
    }

    /// Disconnects once the event loop has exited, e.g. because the window
    /// was closed. Nothing is ever sent on it; select on it to wake promptly.
    pub fn closed(&self) -> &Receiver<()> {
        &self.closed
    }

    /// Waits for the window to close on its own.
    pub fn join(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(
    config: RendererConfig,
    ready_tx: Sender<Result<EventLoopProxy<WindowCommand>, anyhow::Error>>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let proxy = event_loop.create_proxy();

    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let mut window_builder = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(window_size);
    if config.background {
        window_builder = window_builder
            .with_decorations(false)
            .with_window_level(WindowLevel::AlwaysOnBottom);
    }
    let window = match window_builder.build(&event_loop) {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let message = format!("failed to create window: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let backdrop = resolve_color(&config.backdrop);
    let mut gpu = match GpuSurface::new(
        window.clone(),
        SILK_PROGRAM,
        backdrop,
        config.layer_opacity,
        config.gpu_power,
    ) {
        Ok(gpu) => gpu,
        Err(err) => {
            let wrapped = anyhow!("failed to initialise window renderer: {err:#}");
            let message = wrapped.to_string();
            let _ = ready_tx.send(Err(anyhow!(message)));
            return Err(wrapped);
        }
    };

    let profile = gpu.adapter_profile().clone();
    let policy = config.policy.for_adapter(profile.is_software());
    if policy != config.policy {
        if let RenderPolicy::Animate {
            cap: FrameRateCap::Fps(cap),
        } = policy
        {
            warn!(
                adapter = %profile.name,
                backend = ?profile.backend,
                cap,
                "software rasterizer detected; capping to {} FPS (override with --fps)",
                cap
            );
        }
    }
    gpu.set_frame_budget(
        policy
            .target_fps()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps))
            .unwrap_or(DEFAULT_FRAME_BUDGET),
    );

    let mut scheduler = FrameScheduler::new(&policy);
    let mut host = SurfaceHost::new(gpu, FrameClock::for_policy(&policy));
    let size = window.inner_size();
    let outcome = host.mount(
        &config.field,
        SurfaceSize::new(size.width, size.height),
        &mut scheduler,
    );
    if !host.wants_continuous_frames() {
        scheduler.set_continuous(false);
    }
    info!(
        adapter = %profile.name,
        backend = ?profile.backend,
        ?policy,
        ?outcome,
        "window renderer ready"
    );
    window.request_redraw();

    let _ = ready_tx.send(Ok(proxy));

    let window_id = window.id();
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(command) => match command {
            WindowCommand::Update(next) => {
                let writes = host.update_config(&next);
                if writes > 0 {
                    info!(writes, "applied configuration update");
                }
                scheduler.invalidate();
            }
            WindowCommand::Shutdown => {
                host.unmount(&mut scheduler);
                elwt.exit();
            }
        },
        Event::WindowEvent { window_id: id, event } if id == window_id => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                host.unmount(&mut scheduler);
                elwt.exit();
            }
            WindowEvent::Resized(new_size) => {
                host.resize(SurfaceSize::new(new_size.width, new_size.height));
                scheduler.invalidate();
                window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                let Some(id) = host.subscriber() else {
                    return;
                };
                let now = Instant::now();
                let Some(token) = scheduler.issue_redraw(id, now) else {
                    return;
                };
                match host.frame(&token) {
                    FrameOutcome::Drawn(sample) => {
                        trace!(
                            frame_index = sample.frame_index,
                            time = sample.seconds,
                            "frame presented"
                        );
                        scheduler.mark_rendered(now);
                    }
                    FrameOutcome::FallbackDrawn => scheduler.mark_rendered(now),
                    FrameOutcome::Dropped(DrawError::SurfaceLost) => {
                        debug!("surface reconfigured; redrawing");
                        scheduler.invalidate();
                    }
                    FrameOutcome::Dropped(DrawError::OutOfMemory) => {
                        error!("surface out of memory; closing window");
                        host.unmount(&mut scheduler);
                        elwt.exit();
                    }
                    FrameOutcome::Dropped(err) => {
                        warn!(error = %err, "frame dropped");
                        scheduler.mark_rendered(now);
                    }
                    FrameOutcome::Skipped => {}
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            let due = host
                .subscriber()
                .and_then(|id| scheduler.issue(id, now))
                .is_some();
            if due {
                trace!("scheduler: issuing redraw now");
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if let Some(deadline) = scheduler.next_deadline(now) {
                let ms = deadline.saturating_duration_since(now).as_millis();
                trace!(deadline_ms = ms, "scheduler: waiting until next frame");
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            } else {
                trace!("scheduler: idle (no redraw requested)");
                elwt.set_control_flow(ControlFlow::Wait);
            }
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}
