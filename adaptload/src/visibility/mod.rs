//! Viewport- and scroll-based load triggering.
//!
//! The host reports viewport changes to a [`ViewportHub`]; a
//! [`VisibilityTrigger`] turns each watched element into a
//! [`VisibilityWatch`] that fires once, either when the element intersects the
//! (network-adjusted) viewport or when the user scrolls quickly toward it.
//! This module never performs loads itself; the loader consumes the watch.

mod geometry;
mod trigger;
mod viewport;

pub use geometry::{intersection_ratio, Rect, Viewport};
pub use trigger::{
    ElementHandle, TriggerReason, VisibilityConfig, VisibilityState, VisibilityTrigger,
    VisibilityWatch, DEFAULT_LOOK_AHEAD_PX, DEFAULT_MARGIN_FAST_PX, DEFAULT_MARGIN_MEDIUM_PX,
    DEFAULT_MARGIN_SLOW_PX, DEFAULT_SCROLL_SAMPLE_MS, DEFAULT_VELOCITY_THRESHOLD_PX,
    DEFAULT_VISIBILITY_THRESHOLD,
};
pub use viewport::{ViewportEvent, ViewportEventKind, ViewportHub};
