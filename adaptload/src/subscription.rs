//! Callback registration with unsubscribe handles.
//!
//! Every observer in the core (network-change notifications, viewport
//! scroll/resize events, budget re-selection) registers through
//! [`Listeners::subscribe`] and receives a [`Subscription`]. Dropping the
//! subscription or calling [`Subscription::unsubscribe`] removes the callback.
//!
//! Callbacks are invoked outside the registry lock, so a callback may
//! unsubscribe itself (or others) while an emission is in progress.
//!
//! # Example
//!
//! ```
//! use adaptload::subscription::Listeners;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let listeners: Listeners<u32> = Listeners::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&seen);
//! let subscription = listeners.subscribe(move |v| {
//!     counter.fetch_add(*v as usize, Ordering::SeqCst);
//! });
//!
//! listeners.emit(&2);
//! subscription.unsubscribe();
//! listeners.emit(&5);
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerSet<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// A registry of callbacks invoked with a shared value.
pub struct Listeners<T> {
    set: Arc<Mutex<ListenerSet<T>>>,
}

impl<T: 'static> Listeners<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            set: Arc::new(Mutex::new(ListenerSet {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Register a callback. It stays registered until the returned
    /// subscription is dropped or unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut set = self.set.lock();
            let id = set.next_id;
            set.next_id += 1;
            set.callbacks.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<ListenerSet<T>>> = Arc::downgrade(&self.set);
        Subscription::new(move || {
            if let Some(set) = weak.upgrade() {
                set.lock().callbacks.retain(|(cb_id, _)| *cb_id != id);
            }
        })
    }

    /// Invoke every registered callback with `value`.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .set
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.set.lock().callbacks.len()
    }

    /// Returns true if no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.set.lock().callbacks.len())
            .finish()
    }
}

/// Handle that keeps a callback registered.
///
/// Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
