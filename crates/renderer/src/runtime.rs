use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Frame-rate cap requested for an animating surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FrameRateCap {
    /// Nothing requested; software rasterisers are throttled.
    #[default]
    Auto,
    /// Explicitly uncapped, even on a software rasteriser.
    Uncapped,
    Fps(f32),
}

/// Cap applied on software adapters when the caller asked for nothing.
pub const SOFTWARE_FPS_CAP: f32 = 15.0;

impl FrameRateCap {
    /// `None` leaves the choice to the renderer; zero or less means uncapped.
    pub fn from_request(fps: Option<f32>) -> Self {
        match fps {
            None => Self::Auto,
            Some(fps) if fps.is_finite() && fps > 0.0 => Self::Fps(fps),
            Some(_) => Self::Uncapped,
        }
    }

    pub fn fps(self) -> Option<f32> {
        match self {
            Self::Fps(fps) => Some(fps),
            Self::Auto | Self::Uncapped => None,
        }
    }
}

/// High-level behaviour requested by the caller.
///
/// The render policy decides whether frames animate continuously or whether a
/// single timestamp is evaluated and then only redrawn when something changes.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPolicy {
    /// Run the render loop continuously, optionally clamping the frame rate.
    Animate { cap: FrameRateCap },
    /// Evaluate the field at a fixed timestamp (seconds).
    Still { time: f32 },
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self::Animate {
            cap: FrameRateCap::Auto,
        }
    }
}

impl RenderPolicy {
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Animate { .. })
    }

    pub fn target_fps(&self) -> Option<f32> {
        match self {
            Self::Animate { cap } => cap.fps(),
            Self::Still { .. } => None,
        }
    }

    /// Throttles an unset cap to [`SOFTWARE_FPS_CAP`] on software adapters.
    pub fn for_adapter(&self, is_software: bool) -> Self {
        match self {
            Self::Animate {
                cap: FrameRateCap::Auto,
            } if is_software => Self::Animate {
                cap: FrameRateCap::Fps(SOFTWARE_FPS_CAP),
            },
            other => other.clone(),
        }
    }
}

/// Identity handed out by [`FrameScheduler::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Registration returned by [`FrameScheduler::register`].
///
/// The scheduler only counts the subscriber while this value is alive, so a
/// holder that is dropped without calling `deregister` stops receiving frames.
#[derive(Debug)]
#[must_use = "the subscriber is forgotten as soon as the subscription is dropped"]
pub struct Subscription {
    id: SubscriberId,
    _alive: Arc<()>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

/// One scheduler callback invocation. Consumed by the draw that it triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameToken {
    pub subscriber: SubscriberId,
    pub issued_at: Instant,
}

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    /// Seconds since the first frame, or the fixed still time.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClockMode {
    Running,
    Fixed(f32),
}

/// Monotonic time source advanced once per rendered frame.
#[derive(Debug, Clone)]
pub struct FrameClock {
    mode: ClockMode,
    origin: Option<Instant>,
    last_seconds: f32,
    frame_index: u64,
}

impl FrameClock {
    /// Clock anchored at the first token it sees.
    pub fn running() -> Self {
        Self::with_mode(ClockMode::Running)
    }

    /// Clock that always reports `seconds`; non-finite or negative input reads as zero.
    pub fn fixed(seconds: f32) -> Self {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        Self::with_mode(ClockMode::Fixed(seconds))
    }

    pub fn for_policy(policy: &RenderPolicy) -> Self {
        match policy {
            RenderPolicy::Animate { .. } => Self::running(),
            RenderPolicy::Still { time } => Self::fixed(*time),
        }
    }

    fn with_mode(mode: ClockMode) -> Self {
        Self {
            mode,
            origin: None,
            last_seconds: 0.0,
            frame_index: 0,
        }
    }

    /// Forgets the first-frame anchor so the next frame reads as time zero.
    pub fn reset(&mut self) {
        self.origin = None;
        self.last_seconds = 0.0;
        self.frame_index = 0;
    }

    pub fn advance(&mut self, token: &FrameToken) -> FrameSample {
        let seconds = match self.mode {
            ClockMode::Fixed(seconds) => seconds,
            ClockMode::Running => {
                let origin = *self.origin.get_or_insert(token.issued_at);
                let elapsed = token.issued_at.saturating_duration_since(origin);
                elapsed.as_secs_f32().max(self.last_seconds)
            }
        };
        self.last_seconds = seconds;

        let sample = FrameSample {
            seconds,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.saturating_add(1);
        sample
    }

}

/// Per-refresh callback registry of the host.
///
/// Continuous policies issue a token whenever the frame interval has elapsed;
/// still policies only after [`FrameScheduler::invalidate`]. A late tick
/// produces a single frame: missed intervals are dropped, never queued.
#[derive(Debug)]
pub struct FrameScheduler {
    next_id: u64,
    subscribers: Vec<(SubscriberId, Weak<()>)>,
    continuous: bool,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
    dirty: bool,
}

impl FrameScheduler {
    pub fn new(policy: &RenderPolicy) -> Self {
        let mut scheduler = Self {
            next_id: 0,
            subscribers: Vec::new(),
            continuous: policy.is_continuous(),
            frame_interval: None,
            last_frame: None,
            dirty: true,
        };
        scheduler.set_target_fps(policy.target_fps());
        scheduler
    }

    /// Caps the issue rate; `None` or a non-positive value removes the cap.
    pub fn set_target_fps(&mut self, fps: Option<f32>) {
        self.frame_interval = fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));
    }

    /// Switches between interval-driven and invalidation-driven issuing.
    pub fn set_continuous(&mut self, continuous: bool) {
        self.continuous = continuous;
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn target_fps(&self) -> Option<f32> {
        self.frame_interval.map(|interval| 1.0 / interval.as_secs_f32())
    }

    pub fn register(&mut self) -> Subscription {
        self.prune();
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        let alive = Arc::new(());
        self.subscribers.push((id, Arc::downgrade(&alive)));
        self.dirty = true;
        Subscription { id, _alive: alive }
    }

    /// Returns false when `id` was not registered or its subscription is gone.
    pub fn deregister(&mut self, id: SubscriberId) -> bool {
        let found = self.is_registered(id);
        self.subscribers.retain(|(subscriber, _)| *subscriber != id);
        self.prune();
        found
    }

    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.subscribers
            .iter()
            .any(|(subscriber, alive)| *subscriber == id && alive.strong_count() > 0)
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscribers
            .iter()
            .any(|(_, alive)| alive.strong_count() > 0)
    }

    fn prune(&mut self) {
        self.subscribers.retain(|(_, alive)| alive.strong_count() > 0);
    }

    /// Requests a redraw even when the policy is not continuous.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        if !self.has_subscribers() {
            return false;
        }
        if !self.continuous {
            return self.dirty;
        }
        match (self.last_frame, self.frame_interval) {
            (Some(last), Some(interval)) => self.dirty || now >= last + interval,
            _ => true,
        }
    }

    /// Instant at which the next frame becomes due, or `None` when idle.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if !self.has_subscribers() {
            return None;
        }
        if self.dirty {
            return Some(now);
        }
        if !self.continuous {
            return None;
        }
        match (self.last_frame, self.frame_interval) {
            (Some(last), Some(interval)) => Some((last + interval).max(now)),
            _ => Some(now),
        }
    }

    pub fn issue(&self, id: SubscriberId, now: Instant) -> Option<FrameToken> {
        (self.is_registered(id) && self.ready_for_frame(now)).then_some(FrameToken {
            subscriber: id,
            issued_at: now,
        })
    }

    /// Token for a redraw the windowing system asked for (exposure, damage),
    /// issued regardless of cadence.
    pub fn issue_redraw(&self, id: SubscriberId, now: Instant) -> Option<FrameToken> {
        self.is_registered(id).then_some(FrameToken {
            subscriber: id,
            issued_at: now,
        })
    }

    pub fn mark_rendered(&mut self, now: Instant) {
        self.last_frame = Some(now);
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(issued_at: Instant) -> FrameToken {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        FrameToken {
            subscriber: scheduler.register().id(),
            issued_at,
        }
    }

    #[test]
    fn running_clock_starts_at_zero_and_never_goes_back() {
        let start = Instant::now();
        let mut clock = FrameClock::running();
        let first = clock.advance(&token(start + Duration::from_millis(500)));
        assert_eq!(first.seconds, 0.0);
        assert_eq!(first.frame_index, 0);

        let second = clock.advance(&token(start + Duration::from_millis(1500)));
        assert!((second.seconds - 1.0).abs() < 1e-4);
        assert_eq!(second.frame_index, 1);

        // A token issued before the anchor must not rewind time.
        let stale = clock.advance(&token(start));
        assert!(stale.seconds >= second.seconds);
        assert_eq!(stale.frame_index, 2);
    }

    #[test]
    fn fixed_clock_reports_its_time() {
        let mut clock = FrameClock::for_policy(&RenderPolicy::Still { time: 4.5 });
        let now = Instant::now();
        assert_eq!(clock.advance(&token(now)).seconds, 4.5);
        assert_eq!(clock.advance(&token(now + Duration::from_secs(9))).seconds, 4.5);
        assert_eq!(FrameClock::fixed(f32::NAN).advance(&token(now)).seconds, 0.0);
        assert_eq!(FrameClock::fixed(-2.0).advance(&token(now)).seconds, 0.0);
    }

    #[test]
    fn reset_clock_reanchors() {
        let start = Instant::now();
        let mut clock = FrameClock::running();
        clock.advance(&token(start));
        clock.advance(&token(start + Duration::from_secs(2)));
        clock.reset();
        let sample = clock.advance(&token(start + Duration::from_secs(5)));
        assert_eq!(sample.seconds, 0.0);
        assert_eq!(sample.frame_index, 0);
    }

    #[test]
    fn tokens_only_go_to_registered_subscribers() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        let subscription = scheduler.register();
        let id = subscription.id();
        let now = Instant::now();
        assert_eq!(scheduler.issue(id, now).map(|t| t.subscriber), Some(id));

        assert!(scheduler.deregister(id));
        assert!(!scheduler.deregister(id));
        assert!(scheduler.issue(id, now).is_none());
        assert_eq!(scheduler.next_deadline(now), None);
    }

    #[test]
    fn capped_scheduler_drops_missed_intervals() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::Animate {
            cap: FrameRateCap::Fps(10.0),
        });
        let subscription = scheduler.register();
        let id = subscription.id();
        let start = Instant::now();
        scheduler.mark_rendered(start);

        assert!(scheduler.issue(id, start + Duration::from_millis(50)).is_none());
        assert_eq!(
            scheduler.next_deadline(start + Duration::from_millis(50)),
            Some(start + Duration::from_millis(100))
        );

        // Half a second late: one frame, then the cadence restarts from it.
        let late = start + Duration::from_millis(500);
        assert!(scheduler.issue(id, late).is_some());
        scheduler.mark_rendered(late);
        assert!(scheduler.issue(id, late + Duration::from_millis(10)).is_none());
    }

    #[test]
    fn still_policy_only_draws_when_invalidated() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::Still { time: 0.0 });
        let subscription = scheduler.register();
        let id = subscription.id();
        let now = Instant::now();
        assert!(scheduler.issue(id, now).is_some());
        scheduler.mark_rendered(now);

        assert!(scheduler.issue(id, now + Duration::from_secs(1)).is_none());
        assert_eq!(scheduler.next_deadline(now), None);

        scheduler.invalidate();
        assert!(scheduler.issue(id, now + Duration::from_secs(2)).is_some());
    }

    #[test]
    fn redraws_ignore_cadence_but_not_registration() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::Still { time: 1.0 });
        let subscription = scheduler.register();
        let id = subscription.id();
        let now = Instant::now();
        scheduler.mark_rendered(now);
        assert!(scheduler.issue(id, now).is_none());
        assert!(scheduler.issue_redraw(id, now).is_some());

        scheduler.deregister(id);
        assert!(scheduler.issue_redraw(id, now).is_none());
    }

    #[test]
    fn non_positive_fps_removes_cap() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::Animate {
            cap: FrameRateCap::from_request(Some(0.0)),
        });
        assert_eq!(scheduler.target_fps(), None);
        scheduler.set_target_fps(Some(15.0));
        assert!((scheduler.target_fps().unwrap_or_default() - 15.0).abs() < 1e-3);
    }

    #[test]
    fn dropped_subscription_stops_frames() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        let subscription = scheduler.register();
        let id = subscription.id();
        let now = Instant::now();
        assert!(scheduler.ready_for_frame(now));

        drop(subscription);
        assert!(!scheduler.is_registered(id));
        assert!(!scheduler.has_subscribers());
        assert!(!scheduler.ready_for_frame(now));
        assert_eq!(scheduler.next_deadline(now), None);
        assert!(scheduler.issue_redraw(id, now).is_none());
        assert!(!scheduler.deregister(id));
    }

    #[test]
    fn explicit_uncapped_survives_software_adapters() {
        let auto = RenderPolicy::Animate {
            cap: FrameRateCap::from_request(None),
        };
        assert_eq!(
            auto.for_adapter(true).target_fps(),
            Some(SOFTWARE_FPS_CAP)
        );
        assert_eq!(auto.for_adapter(false), auto);

        let uncapped = RenderPolicy::Animate {
            cap: FrameRateCap::from_request(Some(0.0)),
        };
        assert_eq!(uncapped.for_adapter(true), uncapped);
        assert_eq!(uncapped.for_adapter(true).target_fps(), None);

        let capped = RenderPolicy::Animate {
            cap: FrameRateCap::from_request(Some(30.0)),
        };
        assert_eq!(capped.for_adapter(true).target_fps(), Some(30.0));

        let still = RenderPolicy::Still { time: 1.0 };
        assert_eq!(still.for_adapter(true), still);
    }
}
