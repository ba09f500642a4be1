//! Deduplicating two-tier preload queue with a single worker.
//!
//! # Ordering
//!
//! Urgent entries (critical, high) are prepended ahead of everything queued,
//! keeping the order of their batch; normal and low entries are appended.
//!
//! ```text
//! enqueue([a, b], normal)  ──►  [a, b]
//! enqueue([c, d], high)    ──►  [c, d, a, b]
//! enqueue([e], low)        ──►  [c, d, a, b, e]
//! ```
//!
//! # Processing
//!
//! One worker task drains the queue one id at a time, sleeping a short yield
//! interval between items. Every processed id, successful or not, moves to the
//! completed set; the queue never retries. The worker exits when the queue is
//! empty and is respawned by the next `enqueue`.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::LoadError;
use crate::loader::Priority;
use crate::scheduler::{BoxFuture, SharedScheduler};
use crate::telemetry::{action, category, LoaderMetrics, LogEvent, SharedEventSink};

/// Default pause between consecutive preloads (10ms).
pub const DEFAULT_YIELD_INTERVAL_MS: u64 = 10;

/// Preload queue tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadConfig {
    /// Pause between consecutive items.
    pub yield_interval: Duration,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            yield_interval: Duration::from_millis(DEFAULT_YIELD_INTERVAL_MS),
        }
    }
}

/// Warms a resource in the background.
pub trait Preloader: Send + Sync {
    fn preload(&self, id: &str) -> BoxFuture<'static, Result<(), LoadError>>;
}

/// Adapter turning an async closure into a [`Preloader`].
pub struct PreloadFn<F>(F);

impl<F, Fut> Preloader for PreloadFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), LoadError>> + Send + 'static,
{
    fn preload(&self, id: &str) -> BoxFuture<'static, Result<(), LoadError>> {
        (self.0)(id.to_string()).boxed()
    }
}

/// Wrap an async closure as a shared preloader.
pub fn preload_fn<F, Fut>(f: F) -> Arc<dyn Preloader>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), LoadError>> + Send + 'static,
{
    Arc::new(PreloadFn(f))
}

/// Preloader that succeeds immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreloader;

impl Preloader for NoopPreloader {
    fn preload(&self, _id: &str) -> BoxFuture<'static, Result<(), LoadError>> {
        async { Ok::<(), LoadError>(()) }.boxed()
    }
}

/// A queued resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadQueueEntry {
    pub resource_id: String,
    pub priority: Priority,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<PreloadQueueEntry>,
    /// Ids in `pending`.
    queued: HashSet<String>,
    completed: HashSet<String>,
    in_flight: Option<String>,
    /// Epoch the in-flight item was started under.
    in_flight_epoch: u64,
    /// Bumped by `clear()`; an item started under an older epoch is not recorded.
    epoch: u64,
    worker_running: bool,
}

struct QueueInner {
    config: PreloadConfig,
    preloader: Arc<dyn Preloader>,
    scheduler: SharedScheduler,
    sink: SharedEventSink,
    metrics: Arc<LoaderMetrics>,
    state: Mutex<QueueState>,
    idle: Notify,
    shutdown: CancellationToken,
}

/// Background preload queue.
#[derive(Clone)]
pub struct PreloadQueue {
    inner: Arc<QueueInner>,
}

impl PreloadQueue {
    pub fn new(
        config: PreloadConfig,
        preloader: Arc<dyn Preloader>,
        scheduler: SharedScheduler,
        sink: SharedEventSink,
        metrics: Arc<LoaderMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                preloader,
                scheduler,
                sink,
                metrics,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queue `ids` for preloading. Returns how many were actually added.
    ///
    /// Ids already queued, in flight, or completed are skipped. Must be called
    /// from within a Tokio runtime for processing to start; otherwise entries
    /// wait for the next call that is.
    pub fn enqueue<I, S>(&self, ids: I, priority: Priority) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.inner.state.lock();

        let mut batch = Vec::new();
        for id in ids {
            let id = id.into();
            let known = state.queued.contains(&id)
                || state.completed.contains(&id)
                || (state.in_flight.as_deref() == Some(id.as_str())
                    && state.in_flight_epoch == state.epoch);
            if known {
                tracing::trace!(resource = %id, "Preload skipped, already known");
                continue;
            }
            state.queued.insert(id.clone());
            batch.push(PreloadQueueEntry {
                resource_id: id,
                priority,
            });
        }

        let added = batch.len();
        if priority.is_urgent() {
            for entry in batch.into_iter().rev() {
                state.pending.push_front(entry);
            }
        } else {
            state.pending.extend(batch);
        }

        if added > 0 {
            tracing::debug!(
                added,
                priority = %priority,
                pending = state.pending.len(),
                "Preloads enqueued"
            );
        }

        if !state.worker_running && !state.pending.is_empty() && !self.inner.shutdown.is_cancelled()
        {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    state.worker_running = true;
                    runtime.spawn(run_worker(Arc::clone(&self.inner)));
                }
                Err(_) => {
                    tracing::warn!("Preload queue used outside a Tokio runtime, deferring");
                }
            }
        }
        added
    }

    /// True once `id` has been processed, successfully or not.
    pub fn is_preloaded(&self, id: &str) -> bool {
        self.inner.state.lock().completed.contains(id)
    }

    /// Drop pending entries and forget completed ones.
    ///
    /// An item already in flight runs to completion but is not recorded, and
    /// its id may be enqueued again right away.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.queued.clear();
        state.completed.clear();
        state.epoch += 1;
        tracing::debug!(dropped, "Preload queue cleared");
    }

    /// Number of entries waiting (excluding the one in flight).
    pub fn len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().pending.is_empty()
    }

    /// Waiting ids in processing order.
    pub fn pending(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .pending
            .iter()
            .map(|entry| entry.resource_id.clone())
            .collect()
    }

    pub fn in_flight(&self) -> Option<String> {
        self.inner.state.lock().in_flight.clone()
    }

    /// Wait until the worker has drained the queue.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.inner.state.lock().worker_running {
                return;
            }
            notified.await;
        }
    }

    /// Stop processing. The in-flight preload is abandoned.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl fmt::Debug for PreloadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PreloadQueue")
            .field("pending", &state.pending.len())
            .field("completed", &state.completed.len())
            .field("in_flight", &state.in_flight)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Worker
// =============================================================================

async fn run_worker(inner: Arc<QueueInner>) {
    loop {
        let next = {
            let mut state = inner.state.lock();
            match state.pending.pop_front() {
                Some(entry) if !inner.shutdown.is_cancelled() => {
                    state.queued.remove(&entry.resource_id);
                    state.in_flight = Some(entry.resource_id.clone());
                    state.in_flight_epoch = state.epoch;
                    Some((entry, state.epoch))
                }
                _ => {
                    state.worker_running = false;
                    state.in_flight = None;
                    None
                }
            }
        };
        let Some((entry, epoch)) = next else {
            inner.idle.notify_waiters();
            return;
        };

        // A panicking preloader counts as a failed preload; the worker survives.
        let preload = AssertUnwindSafe(async {
            inner.preloader.preload(&entry.resource_id).await
        })
        .catch_unwind();
        let result = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => None,
            result = preload => Some(result.unwrap_or_else(|_| {
                Err(LoadError::Content("preloader panicked".to_string()))
            })),
        };

        let more = {
            let mut state = inner.state.lock();
            state.in_flight = None;
            if result.is_some() && state.epoch == epoch {
                state.completed.insert(entry.resource_id.clone());
            }
            !state.pending.is_empty()
        };

        match result {
            Some(Ok(())) => {
                inner.metrics.preload_completed(true);
                tracing::debug!(resource = %entry.resource_id, "Preloaded");
                inner.sink.emit(
                    LogEvent::new(category::PRELOAD, action::PRELOADED)
                        .with("resource", entry.resource_id.clone())
                        .with("priority", entry.priority.as_str())
                        .tag(entry.priority.as_str()),
                );
            }
            Some(Err(e)) => {
                inner.metrics.preload_completed(false);
                tracing::debug!(resource = %entry.resource_id, error = %e, "Preload failed");
            }
            None => {
                tracing::debug!(resource = %entry.resource_id, "Preload abandoned on shutdown");
            }
        }

        if more {
            inner.scheduler.sleep(inner.config.yield_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TokioScheduler;
    use crate::telemetry::MemorySink;
    use proptest::prelude::*;

    struct Recording {
        calls: Mutex<Vec<String>>,
        delay: Duration,
        fail: HashSet<String>,
    }

    impl Recording {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                delay,
                fail: HashSet::new(),
            })
        }

        fn failing(delay: Duration, ids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                delay,
                fail: ids.iter().map(|s| s.to_string()).collect(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl Preloader for Recording {
        fn preload(&self, id: &str) -> BoxFuture<'static, Result<(), LoadError>> {
            self.calls.lock().push(id.to_string());
            let delay = self.delay;
            let fail = self.fail.contains(id);
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                if fail {
                    Err(LoadError::Network("unreachable".into()))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn queue(preloader: Arc<dyn Preloader>) -> (PreloadQueue, Arc<MemorySink>, Arc<LoaderMetrics>) {
        let sink = Arc::new(MemorySink::new());
        let metrics = Arc::new(LoaderMetrics::new());
        let queue = PreloadQueue::new(
            PreloadConfig::default(),
            preloader,
            Arc::new(TokioScheduler),
            Arc::clone(&sink) as SharedEventSink,
            Arc::clone(&metrics),
        );
        (queue, sink, metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_prepends() {
        let recording = Recording::new(Duration::from_millis(50));
        let (queue, _, _) = queue(recording.clone());

        queue.enqueue(["a", "b"], Priority::Normal);
        queue.enqueue(["c", "d"], Priority::High);
        queue.enqueue(["e"], Priority::Low);
        assert_eq!(queue.pending(), vec!["c", "d", "a", "b", "e"]);

        queue.wait_idle().await;
        assert_eq!(recording.calls(), vec!["c", "d", "a", "b", "e"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_ignored() {
        let recording = Recording::new(Duration::from_millis(5));
        let (queue, _, _) = queue(recording.clone());

        assert_eq!(queue.enqueue(["a", "a", "b"], Priority::Normal), 2);
        assert_eq!(queue.enqueue(["b"], Priority::High), 0);
        assert_eq!(queue.len(), 2);

        queue.wait_idle().await;
        assert_eq!(queue.enqueue(vec!["a".to_string()], Priority::Critical), 0);
        assert_eq!(recording.calls(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_not_requeued() {
        let recording = Recording::new(Duration::from_millis(100));
        let (queue, _, _) = queue(recording.clone());

        queue.enqueue(["a"], Priority::Normal);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.in_flight().as_deref(), Some("a"));
        assert_eq!(queue.enqueue(["a"], Priority::High), 0);

        queue.wait_idle().await;
        assert_eq!(recording.calls(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_preload_still_completed() {
        let recording = Recording::failing(Duration::from_millis(5), &["bad"]);
        let (queue, sink, metrics) = queue(recording.clone());

        queue.enqueue(["bad", "good"], Priority::Normal);
        queue.wait_idle().await;

        assert!(queue.is_preloaded("bad"));
        assert!(queue.is_preloaded("good"));
        assert_eq!(sink.count(category::PRELOAD, action::PRELOADED), 1);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.preloads_completed, 1);
        assert_eq!(snapshot.preloads_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_preloaded_false_before_processing() {
        let recording = Recording::new(Duration::from_millis(100));
        let (queue, _, _) = queue(recording);

        queue.enqueue(["a"], Priority::Normal);
        assert!(!queue.is_preloaded("a"));
        queue.wait_idle().await;
        assert!(queue.is_preloaded("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_yield_between_items() {
        let recording = Recording::new(Duration::ZERO);
        let (queue, _, _) = queue(recording);
        let start = tokio::time::Instant::now();

        queue.enqueue(["a", "b", "c"], Priority::Normal);
        queue.wait_idle().await;

        assert_eq!(start.elapsed(), Duration::from_millis(2 * DEFAULT_YIELD_INTERVAL_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_pending_and_in_flight_result() {
        let recording = Recording::new(Duration::from_millis(100));
        let (queue, _, _) = queue(recording.clone());

        queue.enqueue(["slow", "next"], Priority::Normal);
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.clear();
        assert!(queue.is_empty());

        queue.wait_idle().await;
        assert_eq!(recording.calls(), vec!["slow"]);
        assert!(!queue.is_preloaded("slow"));
        assert!(!queue.is_preloaded("next"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_allows_requeue_of_in_flight_id() {
        let recording = Recording::new(Duration::from_millis(100));
        let (queue, _, _) = queue(recording.clone());

        queue.enqueue(["a"], Priority::Normal);
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.clear();

        assert_eq!(queue.enqueue(["a"], Priority::Normal), 1);
        assert_eq!(queue.pending(), vec!["a"]);
        assert_eq!(queue.enqueue(["a"], Priority::High), 0);

        queue.wait_idle().await;
        assert_eq!(recording.calls(), vec!["a", "a"]);
        assert!(queue.is_preloaded("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_preloader_counts_as_failure() {
        let (queue, _, metrics) = queue(preload_fn(|id: String| async move {
            if id == "boom" {
                panic!("preloader bug");
            }
            Ok::<(), LoadError>(())
        }));

        queue.enqueue(["boom", "after"], Priority::Normal);
        queue.wait_idle().await;

        assert!(queue.is_preloaded("boom"));
        assert!(queue.is_preloaded("after"));
        assert_eq!(metrics.snapshot().preloads_failed, 1);

        queue.enqueue(["later"], Priority::Normal);
        queue.wait_idle().await;
        assert!(queue.is_preloaded("later"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_allows_requeue() {
        let recording = Recording::new(Duration::ZERO);
        let (queue, _, _) = queue(recording.clone());

        queue.enqueue(["a"], Priority::Normal);
        queue.wait_idle().await;
        queue.clear();

        assert_eq!(queue.enqueue(["a"], Priority::Normal), 1);
        queue.wait_idle().await;
        assert_eq!(recording.calls(), vec!["a", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_restarts_after_idle() {
        let recording = Recording::new(Duration::ZERO);
        let (queue, _, _) = queue(recording.clone());

        queue.enqueue(["a"], Priority::Normal);
        queue.wait_idle().await;
        queue.enqueue(["b"], Priority::Normal);
        queue.wait_idle().await;
        assert_eq!(recording.calls(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_processing() {
        let recording = Recording::new(Duration::from_millis(100));
        let (queue, _, _) = queue(recording.clone());

        queue.enqueue(["a", "b"], Priority::Normal);
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.shutdown();
        queue.wait_idle().await;

        assert_eq!(recording.calls(), vec!["a"]);
        assert!(!queue.is_preloaded("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_preloader() {
        let (queue, _, _) = queue(preload_fn(|id: String| async move {
            if id.starts_with("ok") {
                Ok(())
            } else {
                Err(LoadError::Content(id))
            }
        }));
        queue.enqueue(["ok-1", "nope"], Priority::Normal);
        queue.wait_idle().await;
        assert!(queue.is_preloaded("ok-1"));
        assert!(queue.is_preloaded("nope"));
    }

    proptest! {
        #[test]
        fn prop_pending_never_has_duplicates(
            batches in prop::collection::vec(
                (prop::collection::vec("[a-e]", 0..6), 0u8..4),
                0..10,
            )
        ) {
            // No runtime: nothing is processed, so all entries stay pending.
            let (queue, _, _) = queue(Arc::new(NoopPreloader));
            for (ids, p) in batches {
                let priority = match p {
                    0 => Priority::Low,
                    1 => Priority::Normal,
                    2 => Priority::High,
                    _ => Priority::Critical,
                };
                queue.enqueue(ids, priority);
            }
            let pending = queue.pending();
            let unique: HashSet<_> = pending.iter().collect();
            prop_assert_eq!(unique.len(), pending.len());
        }
    }
}
