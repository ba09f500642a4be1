//! Viewport event source.
//!
//! The host forwards scroll, resize and layout notifications to a
//! [`ViewportHub`]; watchers subscribe and receive the current [`Viewport`]
//! on every event.

use std::fmt;

use parking_lot::RwLock;

use super::geometry::Viewport;
use crate::subscription::{Listeners, Subscription};

/// What the host reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportEventKind {
    Scroll,
    Resize,
    /// Content moved without the viewport changing (images loaded, etc.).
    Layout,
}

/// A viewport notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportEvent {
    pub kind: ViewportEventKind,
    pub viewport: Viewport,
}

/// Broadcasts viewport events to subscribed watchers.
pub struct ViewportHub {
    current: RwLock<Viewport>,
    listeners: Listeners<ViewportEvent>,
}

impl ViewportHub {
    pub fn new(initial: Viewport) -> Self {
        Self {
            current: RwLock::new(initial),
            listeners: Listeners::new(),
        }
    }

    /// The most recently reported viewport.
    pub fn current(&self) -> Viewport {
        *self.current.read()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ViewportEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Number of active watchers.
    pub fn watcher_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn scrolled(&self, viewport: Viewport) {
        self.publish(ViewportEventKind::Scroll, viewport);
    }

    pub fn resized(&self, viewport: Viewport) {
        self.publish(ViewportEventKind::Resize, viewport);
    }

    /// Re-evaluate watchers against the current viewport.
    pub fn layout_changed(&self) {
        let viewport = self.current();
        self.publish(ViewportEventKind::Layout, viewport);
    }

    fn publish(&self, kind: ViewportEventKind, viewport: Viewport) {
        *self.current.write() = viewport;
        self.listeners.emit(&ViewportEvent { kind, viewport });
    }
}

impl Default for ViewportHub {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl fmt::Debug for ViewportHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewportHub")
            .field("current", &*self.current.read())
            .field("watchers", &self.listeners.len())
            .finish()
    }
}
