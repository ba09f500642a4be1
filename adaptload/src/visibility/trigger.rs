//! Visibility Trigger: decides when loading of a watched element should begin.
//!
//! Two independent paths can fire a watch. Firing is terminal: once
//! `is_visible` becomes true it stays true, even if the element later leaves
//! the viewport.
//!
//! ```text
//! intersection:    ratio(element, viewport grown by margin(network)) >= threshold
//! scroll velocity: every sample interval, |Δscroll_y| > velocity threshold
//!                  AND 0 <= element.top - viewport.bottom <= look-ahead
//! ```
//!
//! Elements that mount already inside the viewport fire on the first
//! evaluation, which happens synchronously inside [`VisibilityTrigger::watch`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use super::geometry::{intersection_ratio, Rect, Viewport};
use super::viewport::{ViewportEvent, ViewportHub};
use crate::environment::{EnvironmentProfile, NetworkClass};
use crate::scheduler::SharedScheduler;
use crate::subscription::Subscription;

// =============================================================================
// Defaults
// =============================================================================

/// Intersection margin on a slow network (px).
pub const DEFAULT_MARGIN_SLOW_PX: f64 = 20.0;

/// Intersection margin on a medium network (px).
pub const DEFAULT_MARGIN_MEDIUM_PX: f64 = 50.0;

/// Intersection margin on a fast network (px).
pub const DEFAULT_MARGIN_FAST_PX: f64 = 100.0;

/// Fraction of the element that must intersect.
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.1;

/// Scroll sampling cadence (ms).
pub const DEFAULT_SCROLL_SAMPLE_MS: u64 = 100;

/// Scroll distance per sample that counts as fast scrolling (px).
pub const DEFAULT_VELOCITY_THRESHOLD_PX: f64 = 50.0;

/// How far below the viewport a fast scroll anticipates (px).
pub const DEFAULT_LOOK_AHEAD_PX: f64 = 200.0;

/// Visibility trigger tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityConfig {
    pub margin_slow_px: f64,
    pub margin_medium_px: f64,
    pub margin_fast_px: f64,
    /// Minimum intersecting fraction of the element (0.0 - 1.0).
    pub threshold: f64,
    pub scroll_sample_interval: Duration,
    pub velocity_threshold_px: f64,
    pub look_ahead_px: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            margin_slow_px: DEFAULT_MARGIN_SLOW_PX,
            margin_medium_px: DEFAULT_MARGIN_MEDIUM_PX,
            margin_fast_px: DEFAULT_MARGIN_FAST_PX,
            threshold: DEFAULT_VISIBILITY_THRESHOLD,
            scroll_sample_interval: Duration::from_millis(DEFAULT_SCROLL_SAMPLE_MS),
            velocity_threshold_px: DEFAULT_VELOCITY_THRESHOLD_PX,
            look_ahead_px: DEFAULT_LOOK_AHEAD_PX,
        }
    }
}

impl VisibilityConfig {
    /// Viewport margin for the given network class. Shrinks as the network worsens.
    pub fn intersection_margin(&self, network: NetworkClass) -> f64 {
        match network {
            NetworkClass::Slow => self.margin_slow_px,
            NetworkClass::Medium => self.margin_medium_px,
            NetworkClass::Fast => self.margin_fast_px,
        }
    }
}

// =============================================================================
// Watch State
// =============================================================================

/// Visibility of one watched element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibilityState {
    pub is_visible: bool,
    pub has_ever_been_visible: bool,
}

/// Which path fired the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Intersection,
    ScrollVelocity,
}

/// Source of an element's current document-space rectangle.
///
/// Called on every viewport event, so implementations should be cheap.
pub trait ElementHandle: Send + Sync {
    fn bounding_rect(&self) -> Rect;
}

impl ElementHandle for Rect {
    fn bounding_rect(&self) -> Rect {
        *self
    }
}

impl<F> ElementHandle for F
where
    F: Fn() -> Rect + Send + Sync,
{
    fn bounding_rect(&self) -> Rect {
        self()
    }
}

#[derive(Debug, Clone, Copy)]
struct ScrollSample {
    at: Instant,
    scroll_y: f64,
}

struct WatchInner {
    element: Arc<dyn ElementHandle>,
    margin: f64,
    config: VisibilityConfig,
    scheduler: SharedScheduler,
    state: watch::Sender<VisibilityState>,
    fired: Mutex<Option<TriggerReason>>,
    last_sample: Mutex<Option<ScrollSample>>,
    subscription: Mutex<Option<Subscription>>,
}

impl WatchInner {
    fn evaluate(&self, viewport: &Viewport) {
        if self.fired.lock().is_some() {
            return;
        }

        let rect = self.element.bounding_rect();
        let ratio = intersection_ratio(&rect, viewport, self.margin);
        if ratio > 0.0 && ratio >= self.config.threshold {
            self.fire(TriggerReason::Intersection, ratio);
            return;
        }

        if self.fast_scroll_toward(&rect, viewport) {
            self.fire(TriggerReason::ScrollVelocity, ratio);
        }
    }

    /// Sample scroll velocity; true when scrolling fast toward the element.
    fn fast_scroll_toward(&self, rect: &Rect, viewport: &Viewport) -> bool {
        let now = self.scheduler.now();
        let mut last = self.last_sample.lock();

        let previous = match *last {
            None => {
                *last = Some(ScrollSample {
                    at: now,
                    scroll_y: viewport.scroll_y,
                });
                return false;
            }
            Some(sample) => sample,
        };

        if now.duration_since(previous.at) < self.config.scroll_sample_interval {
            return false;
        }

        *last = Some(ScrollSample {
            at: now,
            scroll_y: viewport.scroll_y,
        });

        let velocity = (viewport.scroll_y - previous.scroll_y).abs();
        let distance_below = rect.top() - viewport.bottom();

        velocity > self.config.velocity_threshold_px
            && distance_below >= 0.0
            && distance_below <= self.config.look_ahead_px
    }

    fn fire(&self, reason: TriggerReason, ratio: f64) {
        {
            let mut fired = self.fired.lock();
            if fired.is_some() {
                return;
            }
            *fired = Some(reason);
        }

        tracing::debug!(reason = ?reason, ratio = format!("{:.2}", ratio), "Visibility trigger fired");

        self.state.send_replace(VisibilityState {
            is_visible: true,
            has_ever_been_visible: true,
        });

        // Fired watches stop observing.
        let subscription = self.subscription.lock().take();
        drop(subscription);
    }
}

/// Handle to one watched element.
///
/// Dropping the watch stops observation.
pub struct VisibilityWatch {
    inner: Arc<WatchInner>,
    receiver: watch::Receiver<VisibilityState>,
}

impl VisibilityWatch {
    /// Current visibility.
    pub fn state(&self) -> VisibilityState {
        *self.receiver.borrow()
    }

    pub fn is_visible(&self) -> bool {
        self.state().is_visible
    }

    /// Which path fired, if any.
    pub fn reason(&self) -> Option<TriggerReason> {
        *self.inner.fired.lock()
    }

    /// Stream of visibility updates.
    pub fn subscribe(&self) -> watch::Receiver<VisibilityState> {
        self.receiver.clone()
    }

    /// Viewport margin in effect for this watch.
    pub fn margin(&self) -> f64 {
        self.inner.margin
    }

    /// Resolve once the element has become visible.
    pub async fn visible(&mut self) {
        // The sender lives in `inner`, which this watch keeps alive, so the
        // channel cannot close while we wait.
        let _ = self.receiver.wait_for(|state| state.is_visible).await;
    }

    /// True while still subscribed to viewport events.
    pub fn is_observing(&self) -> bool {
        self.inner.subscription.lock().is_some()
    }
}

impl Drop for VisibilityWatch {
    fn drop(&mut self) {
        let subscription = self.inner.subscription.lock().take();
        drop(subscription);
    }
}

impl fmt::Debug for VisibilityWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilityWatch")
            .field("state", &self.state())
            .field("margin", &self.inner.margin)
            .field("reason", &self.reason())
            .finish()
    }
}

// =============================================================================
// Trigger
// =============================================================================

/// Creates visibility watches against a shared viewport hub.
#[derive(Clone)]
pub struct VisibilityTrigger {
    hub: Arc<ViewportHub>,
    scheduler: SharedScheduler,
    config: VisibilityConfig,
}

impl VisibilityTrigger {
    pub fn new(hub: Arc<ViewportHub>, scheduler: SharedScheduler, config: VisibilityConfig) -> Self {
        Self {
            hub,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<ViewportHub> {
        &self.hub
    }

    /// Start watching `element`, with the margin chosen from `profile`.
    pub fn watch(&self, element: Arc<dyn ElementHandle>, profile: EnvironmentProfile) -> VisibilityWatch {
        let (sender, receiver) = watch::channel(VisibilityState::default());
        let inner = Arc::new(WatchInner {
            element,
            margin: self.config.intersection_margin(profile.network),
            config: self.config.clone(),
            scheduler: Arc::clone(&self.scheduler),
            state: sender,
            fired: Mutex::new(None),
            last_sample: Mutex::new(None),
            subscription: Mutex::new(None),
        });

        // First observation: elements already on screen fire immediately.
        inner.evaluate(&self.hub.current());

        if inner.fired.lock().is_none() {
            let observer = Arc::downgrade(&inner);
            let subscription = self.hub.subscribe(move |event: &ViewportEvent| {
                if let Some(inner) = observer.upgrade() {
                    inner.evaluate(&event.viewport);
                }
            });
            *inner.subscription.lock() = Some(subscription);
        }

        VisibilityWatch { inner, receiver }
    }
}

impl fmt::Debug for VisibilityTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilityTrigger")
            .field("hub", &self.hub)
            .field("config", &self.config)
            .finish()
    }
}
