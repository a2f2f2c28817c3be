//! Lifecycle of one renderer instance on one drawable surface.
//!
//! ```text
//! Uninitialized --mount ok--> Mounted --unmount--> Unmounted --mount--> ...
//!       |                                ^
//!       +--mount fails--> Fallback ------+
//! ```
//!
//! The host never touches wgpu directly. It drives a [`RenderBackend`], which
//! owns the GPU objects, and keeps the CPU-side [`UniformStore`] and
//! [`FrameClock`] in step with it.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::color::resolve_color;
use crate::gpu::{FieldUniforms, UniformStore};
use crate::runtime::{
    FrameClock, FrameSample, FrameScheduler, FrameToken, SubscriberId, Subscription,
};
use crate::types::{RenderConfig, SurfaceSize};

/// Live GPU objects held by a backend, for leak accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub programs: usize,
    pub buffers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    #[error("surface lost or outdated; reconfigured, frame dropped")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("GPU out of memory")]
    OutOfMemory,
    #[error("backend cannot draw: {0}")]
    Unavailable(String),
}

/// GPU side of a [`SurfaceHost`].
///
/// `acquire` allocates the quad geometry and builds the program; it is the
/// only place where expensive work happens. `release` must return the
/// backend to its pre-`acquire` resource counts and must be safe to call
/// more than once.
pub trait RenderBackend {
    fn acquire(&mut self, size: SurfaceSize) -> Result<()>;
    fn resize(&mut self, size: SurfaceSize);
    fn draw(&mut self, uniforms: &FieldUniforms) -> Result<(), DrawError>;
    /// Paints a flat colour without the program.
    fn draw_fallback(&mut self, color: [f32; 3]) -> Result<(), DrawError>;
    fn release(&mut self);
    fn resources(&self) -> ResourceCounts;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    Uninitialized,
    Mounted,
    /// Program build failed; the surface shows a solid colour.
    Fallback,
    Unmounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Animated,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Drawn(FrameSample),
    FallbackDrawn,
    /// The backend could not present; nothing is retried.
    Dropped(DrawError),
    /// Token was stale or the host is not mounted.
    Skipped,
}

/// Multiplier applied to the base colour for the non-animated fallback.
const FALLBACK_BRIGHTNESS: f32 = 0.3;

pub struct SurfaceHost<B: RenderBackend> {
    backend: B,
    phase: HostPhase,
    config: RenderConfig,
    store: Option<UniformStore>,
    clock: FrameClock,
    size: SurfaceSize,
    subscription: Option<Subscription>,
}

impl<B: RenderBackend> SurfaceHost<B> {
    pub fn new(backend: B, clock: FrameClock) -> Self {
        Self {
            backend,
            phase: HostPhase::Uninitialized,
            config: RenderConfig::default(),
            store: None,
            clock,
            size: SurfaceSize::new(1, 1),
            subscription: None,
        }
    }

    pub fn mount(
        &mut self,
        config: &RenderConfig,
        size: SurfaceSize,
        scheduler: &mut FrameScheduler,
    ) -> MountOutcome {
        match self.phase {
            HostPhase::Mounted => return MountOutcome::Animated,
            HostPhase::Fallback => return MountOutcome::Fallback,
            HostPhase::Uninitialized | HostPhase::Unmounted => {}
        }

        self.config = config.clone();
        self.size = size.clamped();
        self.clock.reset();
        self.subscription = Some(scheduler.register());

        match self.backend.acquire(self.size) {
            Ok(()) => {
                self.store = Some(UniformStore::from_config(config, self.size));
                self.phase = HostPhase::Mounted;
                info!(
                    width = self.size.width,
                    height = self.size.height,
                    "silk surface mounted"
                );
                MountOutcome::Animated
            }
            Err(err) => {
                warn!(error = ?err, "silk program unavailable; showing solid fallback");
                self.backend.release();
                self.store = None;
                self.phase = HostPhase::Fallback;
                MountOutcome::Fallback
            }
        }
    }

    /// Handles one scheduler tick: advance time, write it, issue one draw.
    pub fn frame(&mut self, token: &FrameToken) -> FrameOutcome {
        if self.subscriber() != Some(token.subscriber) {
            return FrameOutcome::Skipped;
        }

        match self.phase {
            HostPhase::Mounted => {
                let Some(store) = self.store.as_mut() else {
                    return FrameOutcome::Skipped;
                };
                let sample = self.clock.advance(token);
                store.set_time(sample.seconds);
                match self.backend.draw(store.uniforms()) {
                    Ok(()) => FrameOutcome::Drawn(sample),
                    Err(err) => {
                        debug!(error = %err, frame_index = sample.frame_index, "frame dropped");
                        FrameOutcome::Dropped(err)
                    }
                }
            }
            HostPhase::Fallback => {
                let color = self.fallback_color();
                match self.backend.draw_fallback(color) {
                    Ok(()) => FrameOutcome::FallbackDrawn,
                    Err(err) => FrameOutcome::Dropped(err),
                }
            }
            HostPhase::Uninitialized | HostPhase::Unmounted => FrameOutcome::Skipped,
        }
    }

    /// Applies a new configuration between frames; returns the uniform writes made.
    pub fn update_config(&mut self, config: &RenderConfig) -> usize {
        let writes = match self.store.as_mut() {
            Some(store) => store.apply_config(config),
            None => 0,
        };
        self.config = config.clone();
        if writes > 0 {
            debug!(writes, "uniforms updated from config");
        }
        writes
    }

    /// Records the new drawable size, clamped to at least 1x1.
    pub fn resize(&mut self, size: SurfaceSize) {
        let size = size.clamped();
        if size == self.size {
            return;
        }
        self.size = size;
        if let Some(store) = self.store.as_mut() {
            store.set_resolution(size);
        }
        if matches!(self.phase, HostPhase::Mounted | HostPhase::Fallback) {
            self.backend.resize(size);
        }
    }

    /// Deregisters from `scheduler`, then releases every GPU resource.
    pub fn unmount(&mut self, scheduler: &mut FrameScheduler) {
        if let Some(subscription) = self.subscription.take() {
            scheduler.deregister(subscription.id());
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if matches!(self.phase, HostPhase::Mounted | HostPhase::Fallback) {
            self.backend.release();
            self.store = None;
            self.phase = HostPhase::Unmounted;
            info!("silk surface unmounted");
        }
    }

    /// Scheduler registration held while mounted or in fallback.
    pub fn subscriber(&self) -> Option<SubscriberId> {
        self.subscription.as_ref().map(Subscription::id)
    }

    pub fn phase(&self) -> HostPhase {
        self.phase
    }

    /// True while the field animates; fallback and unmounted hosts only redraw on demand.
    pub fn wants_continuous_frames(&self) -> bool {
        self.phase == HostPhase::Mounted
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn uniforms(&self) -> Option<&FieldUniforms> {
        self.store.as_ref().map(UniformStore::uniforms)
    }

    pub fn resources(&self) -> ResourceCounts {
        self.backend.resources()
    }

    pub fn fallback_color(&self) -> [f32; 3] {
        resolve_color(&self.config.color).map(|channel| channel * FALLBACK_BRIGHTNESS)
    }
}

impl<B: RenderBackend> Drop for SurfaceHost<B> {
    fn drop(&mut self) {
        // Dropping the subscription is enough for a scheduler that outlives
        // the host to stop counting it.
        self.subscription = None;
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use anyhow::anyhow;

    use super::*;
    use crate::runtime::RenderPolicy;

    #[derive(Default)]
    struct Ledger {
        programs: usize,
        buffers: usize,
        draws: Vec<FieldUniforms>,
        fallbacks: Vec<[f32; 3]>,
        resizes: Vec<SurfaceSize>,
        releases: usize,
    }

    struct MockBackend {
        ledger: Rc<RefCell<Ledger>>,
        fail_acquire: bool,
        next_draw_error: Option<DrawError>,
    }

    impl MockBackend {
        fn new() -> (Self, Rc<RefCell<Ledger>>) {
            let ledger = Rc::new(RefCell::new(Ledger::default()));
            let backend = Self {
                ledger: Rc::clone(&ledger),
                fail_acquire: false,
                next_draw_error: None,
            };
            (backend, ledger)
        }
    }

    impl RenderBackend for MockBackend {
        fn acquire(&mut self, _size: SurfaceSize) -> Result<()> {
            let mut ledger = self.ledger.borrow_mut();
            // Geometry is allocated before the program is linked.
            ledger.buffers += 2;
            if self.fail_acquire {
                return Err(anyhow!("program link failed"));
            }
            ledger.programs += 1;
            Ok(())
        }

        fn resize(&mut self, size: SurfaceSize) {
            self.ledger.borrow_mut().resizes.push(size);
        }

        fn draw(&mut self, uniforms: &FieldUniforms) -> Result<(), DrawError> {
            if let Some(err) = self.next_draw_error.take() {
                return Err(err);
            }
            self.ledger.borrow_mut().draws.push(*uniforms);
            Ok(())
        }

        fn draw_fallback(&mut self, color: [f32; 3]) -> Result<(), DrawError> {
            self.ledger.borrow_mut().fallbacks.push(color);
            Ok(())
        }

        fn release(&mut self) {
            let mut ledger = self.ledger.borrow_mut();
            ledger.programs = 0;
            ledger.buffers = 0;
            ledger.releases += 1;
        }

        fn resources(&self) -> ResourceCounts {
            let ledger = self.ledger.borrow();
            ResourceCounts {
                programs: ledger.programs,
                buffers: ledger.buffers,
            }
        }
    }

    fn tick(
        host: &mut SurfaceHost<MockBackend>,
        scheduler: &mut FrameScheduler,
        id: SubscriberId,
        at: Instant,
    ) -> FrameOutcome {
        let token = FrameToken {
            subscriber: id,
            issued_at: at,
        };
        let outcome = host.frame(&token);
        scheduler.mark_rendered(at);
        outcome
    }

    fn mounted() -> (SurfaceHost<MockBackend>, Rc<RefCell<Ledger>>, FrameScheduler) {
        let (backend, ledger) = MockBackend::new();
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        let mut host = SurfaceHost::new(backend, FrameClock::running());
        let outcome = host.mount(
            &RenderConfig::default(),
            SurfaceSize::new(800, 600),
            &mut scheduler,
        );
        assert_eq!(outcome, MountOutcome::Animated);
        (host, ledger, scheduler)
    }

    fn subscriber(host: &SurfaceHost<MockBackend>) -> SubscriberId {
        host.subscriber().unwrap()
    }

    #[test]
    fn mount_unmount_cycles_do_not_leak() {
        let (backend, ledger) = MockBackend::new();
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        let mut host = SurfaceHost::new(backend, FrameClock::running());
        let baseline = host.resources();

        for _ in 0..3 {
            host.mount(&RenderConfig::default(), SurfaceSize::new(64, 64), &mut scheduler);
            assert_eq!(host.resources().programs, 1);
            host.unmount(&mut scheduler);
            assert_eq!(host.resources(), baseline);
            assert!(!scheduler.has_subscribers());
        }
        assert_eq!(ledger.borrow().releases, 3);
        assert_eq!(host.phase(), HostPhase::Unmounted);
    }

    #[test]
    fn frames_draw_once_with_non_decreasing_time() {
        let (mut host, ledger, mut scheduler) = mounted();
        let id = subscriber(&host);
        let start = Instant::now();

        for step in 0..5u64 {
            let at = start + Duration::from_millis(16 * step);
            assert!(matches!(
                tick(&mut host, &mut scheduler, id, at),
                FrameOutcome::Drawn(_)
            ));
        }

        let ledger = ledger.borrow();
        assert_eq!(ledger.draws.len(), 5);
        assert_eq!(ledger.draws[0].u_time, 0.0);
        assert!(ledger.draws.windows(2).all(|w| w[0].u_time <= w[1].u_time));
    }

    #[test]
    fn frame_after_unmount_is_harmless() {
        let (mut host, ledger, mut scheduler) = mounted();
        let id = subscriber(&host);
        let token = scheduler.issue(id, Instant::now()).unwrap();

        host.unmount(&mut scheduler);
        assert_eq!(host.frame(&token), FrameOutcome::Skipped);
        assert!(ledger.borrow().draws.is_empty());
        assert_eq!(host.resources(), ResourceCounts::default());
    }

    #[test]
    fn resize_to_one_pixel_is_clamped() {
        let (mut host, ledger, mut scheduler) = mounted();
        let id = subscriber(&host);
        host.resize(SurfaceSize::new(1, 1));
        assert_eq!(host.uniforms().unwrap().u_resolution, [1.0, 1.0]);

        host.resize(SurfaceSize::new(0, 0));
        assert_eq!(host.size(), SurfaceSize::new(1, 1));
        assert!(matches!(
            tick(&mut host, &mut scheduler, id, Instant::now()),
            FrameOutcome::Drawn(_)
        ));
        assert_eq!(ledger.borrow().resizes, vec![SurfaceSize::new(1, 1)]);
    }

    #[test]
    fn frozen_speed_still_applies_colour_and_resize() {
        let (mut host, ledger, mut scheduler) = mounted();
        let id = subscriber(&host);
        let frozen = RenderConfig {
            speed: 0.0,
            ..RenderConfig::default()
        };
        assert_eq!(host.update_config(&frozen), 1);

        let start = Instant::now();
        tick(&mut host, &mut scheduler, id, start);

        let recoloured = RenderConfig {
            color: "#ff0000".into(),
            ..frozen
        };
        assert_eq!(host.update_config(&recoloured), 1);
        host.resize(SurfaceSize::new(320, 200));
        tick(&mut host, &mut scheduler, id, start + Duration::from_secs(3));

        let ledger = ledger.borrow();
        let last = ledger.draws.last().unwrap();
        assert_eq!(last.u_speed, 0.0);
        assert_eq!(last.u_color, [1.0, 0.0, 0.0]);
        assert_eq!(last.u_resolution, [320.0, 200.0]);
    }

    #[test]
    fn failed_program_build_falls_back_without_leaking() {
        let (mut backend, ledger) = MockBackend::new();
        backend.fail_acquire = true;
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        let mut host = SurfaceHost::new(backend, FrameClock::running());

        let outcome = host.mount(&RenderConfig::default(), SurfaceSize::new(64, 64), &mut scheduler);
        assert_eq!(outcome, MountOutcome::Fallback);
        assert_eq!(host.phase(), HostPhase::Fallback);
        assert!(!host.wants_continuous_frames());
        assert_eq!(host.resources(), ResourceCounts::default());

        let id = subscriber(&host);
        assert_eq!(
            tick(&mut host, &mut scheduler, id, Instant::now()),
            FrameOutcome::FallbackDrawn
        );
        assert_eq!(ledger.borrow().fallbacks, vec![host.fallback_color()]);

        host.unmount(&mut scheduler);
        assert_eq!(host.phase(), HostPhase::Unmounted);
    }

    #[test]
    fn draw_errors_drop_the_frame() {
        let (mut host, ledger, mut scheduler) = mounted();
        let id = subscriber(&host);
        host.backend.next_draw_error = Some(DrawError::Timeout);
        let start = Instant::now();
        assert_eq!(
            tick(&mut host, &mut scheduler, id, start),
            FrameOutcome::Dropped(DrawError::Timeout)
        );
        assert!(matches!(
            tick(&mut host, &mut scheduler, id, start + Duration::from_millis(16)),
            FrameOutcome::Drawn(_)
        ));
        assert_eq!(ledger.borrow().draws.len(), 1);
    }

    #[test]
    fn dropping_a_mounted_host_releases_resources() {
        let (host, ledger, _scheduler) = mounted();
        assert_eq!(ledger.borrow().programs, 1);
        drop(host);
        assert_eq!(ledger.borrow().programs, 0);
        assert_eq!(ledger.borrow().buffers, 0);
    }

    #[test]
    fn dropped_host_leaves_no_subscriber_behind() {
        let (host, _ledger, scheduler) = mounted();
        let id = subscriber(&host);
        assert!(scheduler.is_registered(id));

        drop(host);
        let now = Instant::now();
        assert!(!scheduler.is_registered(id));
        assert!(!scheduler.has_subscribers());
        assert!(!scheduler.ready_for_frame(now));
    }

    #[test]
    fn end_to_end_first_frame_uses_requested_parameters() {
        let (backend, ledger) = MockBackend::new();
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        let mut host = SurfaceHost::new(backend, FrameClock::running());
        let config = RenderConfig {
            speed: 3.0,
            scale: 1.2,
            color: "#3b82f6".into(),
            noise_intensity: 1.8,
            rotation: 0.0,
        };
        host.mount(&config, SurfaceSize::new(800, 600), &mut scheduler);
        let id = subscriber(&host);
        tick(&mut host, &mut scheduler, id, Instant::now());

        let ledger = ledger.borrow();
        let first = ledger.draws[0];
        assert_eq!(first.u_time, 0.0);
        assert_eq!(first.u_resolution, [800.0, 600.0]);
        for (x, y) in [(0, 0), (400, 300), (799, 599)] {
            let sample = crate::field::sample_pixel(x, y, &first);
            assert!(sample.alpha >= 0.1 && sample.alpha <= 0.3);
        }
    }
}
