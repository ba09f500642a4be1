//! Adaptive Loader: executes loads with stagger, timeout and retry.
//!
//! Each registered resource gets a [`ResourceHandle`]. Starting a load spawns
//! a task that drives the resource through its state machine:
//!
//! 1. Optionally wait for a [`VisibilityWatch`] to fire (`Idle -> Triggered`)
//! 2. On every entry to `Loading`, wait the stagger delay for the current
//!    environment profile (skipped for critical resources)
//! 3. Race the host's load function against the per-attempt timeout
//! 4. On failure, back off exponentially and retry until the ceiling
//! 5. On `Loaded` or `Failed`, hand one [`LoadTiming`] to the timing observer
//!
//! # Cancellation
//!
//! Dropping (or disposing) the handle cancels the registration's
//! [`CancellationToken`]. Every wait in the task races that token, so no
//! stagger or backoff timer survives a dispose and no status update is
//! published afterwards.
//!
//! # Example
//!
//! ```ignore
//! let handle = loader.register("hero-image", Priority::High);
//! let task = handle.load(|| async { fetch_hero().await })?;
//!
//! let mut status = task.status();
//! while status.changed().await.is_ok() {
//!     render(*status.borrow());
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::policy::{RetryPolicy, StaggerPolicy};
use super::resource::{LoadState, LoadableResource, Priority, ResourceStatus};
use crate::budget::{LoadTiming, SharedTimingObserver};
use crate::environment::ConditionOracle;
use crate::error::LoadError;
use crate::scheduler::{with_deadline, Deadline, SharedScheduler};
use crate::telemetry::{action, category, LoaderMetrics, LogEvent, SharedEventSink};
use crate::visibility::VisibilityWatch;

/// Default per-attempt timeout (10s).
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 10_000;

/// Loads slower than this are reported to the sink (3s).
pub const DEFAULT_SLOW_LOAD_MS: u64 = 3000;

/// Adaptive loader tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    pub retry: RetryPolicy,
    pub stagger: StaggerPolicy,
    /// Timeout applied to each attempt independently.
    pub attempt_timeout: Duration,
    /// Duration above which a successful load is reported as slow.
    pub slow_load_threshold: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            stagger: StaggerPolicy::default(),
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            slow_load_threshold: Duration::from_millis(DEFAULT_SLOW_LOAD_MS),
        }
    }
}

/// Final result of a load task.
#[derive(Debug, PartialEq)]
pub enum LoadOutcome<T> {
    Loaded(T),
    /// Retry ceiling exhausted (or a non-transient error). Never retried
    /// again unless the host registers the resource anew.
    Failed { attempts: u32, error: LoadError },
    /// The registration was disposed before a terminal state.
    Cancelled,
}

impl<T> LoadOutcome<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadOutcome::Failed { .. })
    }

    pub fn into_content(self) -> Option<T> {
        match self {
            LoadOutcome::Loaded(content) => Some(content),
            _ => None,
        }
    }
}

/// A running load.
#[derive(Debug)]
pub struct LoadTask<T> {
    status: watch::Receiver<ResourceStatus>,
    join: JoinHandle<LoadOutcome<T>>,
}

impl<T> LoadTask<T> {
    /// Stream of `{state, retry_count}` updates.
    pub fn status(&self) -> watch::Receiver<ResourceStatus> {
        self.status.clone()
    }

    /// Wait for the task to finish.
    pub async fn outcome(self) -> LoadOutcome<T> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => LoadOutcome::Cancelled,
            Err(e) => LoadOutcome::Failed {
                attempts: 0,
                error: LoadError::Content(format!("load task panicked: {}", e)),
            },
        }
    }
}

// =============================================================================
// Loader
// =============================================================================

struct Registration {
    generation: u64,
    cancel: CancellationToken,
}

struct LoaderShared {
    config: LoaderConfig,
    oracle: Arc<ConditionOracle>,
    scheduler: SharedScheduler,
    timings: SharedTimingObserver,
    sink: SharedEventSink,
    metrics: Arc<LoaderMetrics>,
    registry: DashMap<String, Registration>,
    next_generation: AtomicU64,
}

/// Registers resources and runs their loads.
#[derive(Clone)]
pub struct AdaptiveLoader {
    shared: Arc<LoaderShared>,
}

impl AdaptiveLoader {
    pub fn new(
        config: LoaderConfig,
        oracle: Arc<ConditionOracle>,
        scheduler: SharedScheduler,
        timings: SharedTimingObserver,
        sink: SharedEventSink,
        metrics: Arc<LoaderMetrics>,
    ) -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                config,
                oracle,
                scheduler,
                timings,
                sink,
                metrics,
                registry: DashMap::new(),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    /// Register interest in a resource (host mount).
    ///
    /// Registering an id that is still registered disposes the previous
    /// registration first; this is how a host retries after `Failed`.
    pub fn register(&self, id: impl Into<String>, priority: Priority) -> ResourceHandle {
        let id = id.into();
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let previous = self.shared.registry.insert(
            id.clone(),
            Registration {
                generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(resource = %id, "Re-registered, disposing previous registration");
            previous.cancel.cancel();
        }

        let (sender, receiver) = watch::channel(ResourceStatus::idle());
        ResourceHandle {
            id,
            priority,
            generation,
            cancel,
            sender: Mutex::new(Some(sender)),
            receiver,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.shared.registry.contains_key(id)
    }

    /// Number of live registrations.
    pub fn registered_count(&self) -> usize {
        self.shared.registry.len()
    }
}

impl fmt::Debug for AdaptiveLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveLoader")
            .field("config", &self.shared.config)
            .field("registered", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Resource Handle
// =============================================================================

/// A host's registration of one resource. Dropping it disposes the resource.
pub struct ResourceHandle {
    id: String,
    priority: Priority,
    generation: u64,
    cancel: CancellationToken,
    sender: Mutex<Option<watch::Sender<ResourceStatus>>>,
    receiver: watch::Receiver<ResourceStatus>,
    shared: Arc<LoaderShared>,
}

impl ResourceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Latest status.
    pub fn status(&self) -> ResourceStatus {
        *self.receiver.borrow()
    }

    /// Stream of status updates.
    pub fn subscribe(&self) -> watch::Receiver<ResourceStatus> {
        self.receiver.clone()
    }

    /// True once a load has been started on this handle.
    pub fn is_started(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Start loading immediately.
    pub fn load<F, Fut, T>(&self, perform: F) -> Result<LoadTask<T>, LoadError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
        T: Send + 'static,
    {
        self.start(None, perform)
    }

    /// Start loading once `visibility` fires.
    pub fn load_when_visible<F, Fut, T>(
        &self,
        visibility: VisibilityWatch,
        perform: F,
    ) -> Result<LoadTask<T>, LoadError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
        T: Send + 'static,
    {
        self.start(Some(visibility), perform)
    }

    /// Unmount: cancel pending work and remove the registration.
    pub fn dispose(self) {
        drop(self);
    }

    fn start<F, Fut, T>(
        &self,
        visibility: Option<VisibilityWatch>,
        perform: F,
    ) -> Result<LoadTask<T>, LoadError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut slot = self.sender.lock();
        if slot.is_none() {
            return Err(LoadError::AlreadyStarted {
                id: self.id.clone(),
            });
        }
        // The handle stays unstarted when there is nothing to run on.
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LoadError::NoRuntime {
            id: self.id.clone(),
        })?;
        let Some(sender) = slot.take() else {
            return Err(LoadError::AlreadyStarted {
                id: self.id.clone(),
            });
        };
        drop(slot);

        let run = LoadRun {
            resource: LoadableResource::new(self.id.clone(), self.priority),
            cancel: self.cancel.clone(),
            status: sender,
            shared: Arc::clone(&self.shared),
        };
        let join = runtime.spawn(run.drive(visibility, perform));

        Ok(LoadTask {
            status: self.receiver.clone(),
            join,
        })
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        let generation = self.generation;
        self.shared
            .registry
            .remove_if(&self.id, |_, registration| registration.generation == generation);
        tracing::trace!(resource = %self.id, "Resource disposed");
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("status", &self.status())
            .finish()
    }
}

// =============================================================================
// Load Run
// =============================================================================

/// State owned by one spawned load task.
struct LoadRun {
    resource: LoadableResource,
    cancel: CancellationToken,
    status: watch::Sender<ResourceStatus>,
    shared: Arc<LoaderShared>,
}

impl LoadRun {
    async fn drive<F, Fut, T>(
        mut self,
        visibility: Option<VisibilityWatch>,
        mut perform: F,
    ) -> LoadOutcome<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(mut watch) = visibility {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(),
                _ = watch.visible() => {}
            }
        }

        self.advance(LoadState::Triggered);
        self.shared.metrics.load_started();

        let timeout = self.shared.config.attempt_timeout;
        let ceiling = self.shared.config.retry.retry_ceiling;

        loop {
            self.advance(LoadState::Loading);

            let profile = self.shared.oracle.current_profile();
            let stagger = self
                .shared
                .config
                .stagger
                .delay_for(&profile, self.resource.priority());
            if !stagger.is_zero() {
                tracing::trace!(
                    resource = %self.resource.id(),
                    stagger_ms = stagger.as_millis() as u64,
                    network = %profile.network,
                    "Staggering load"
                );
                if !self.pause(stagger).await {
                    return self.cancelled();
                }
            }

            let attempt = {
                let scheduler = Arc::clone(&self.shared.scheduler);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return self.cancelled(),
                    result = with_deadline(scheduler.as_ref(), timeout, perform()) => result,
                }
            };

            let error = match attempt {
                Deadline::Completed(Ok(content)) => {
                    self.advance(LoadState::Loaded);
                    self.finish(None);
                    return LoadOutcome::Loaded(content);
                }
                Deadline::Completed(Err(error)) => error,
                Deadline::Elapsed => LoadError::Timeout(timeout),
            };

            let failed = self.resource.record_failure(ceiling);
            if error.is_transient() && self.shared.config.retry.allows_retry(failed) {
                self.advance(LoadState::Retrying);
                let delay = self
                    .shared
                    .config
                    .retry
                    .jittered_delay(failed - 1, &mut rand::rng());
                self.report_retry(failed, delay, &error);
                if !self.pause(delay).await {
                    return self.cancelled();
                }
            } else {
                self.advance(LoadState::Failed);
                self.finish(Some(&error));
                return LoadOutcome::Failed {
                    attempts: failed,
                    error,
                };
            }
        }
    }

    /// Apply a transition and publish it, unless cancelled.
    fn advance(&mut self, next: LoadState) {
        if self.cancel.is_cancelled() {
            return;
        }
        let now = self.shared.scheduler.now();
        if let Err(e) = self.resource.transition(next, now) {
            tracing::error!(resource = %self.resource.id(), error = %e, "Rejected state transition");
            return;
        }
        self.status.send_replace(self.resource.status());
    }

    /// Sleep for `delay`; false if cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        let sleep = self.shared.scheduler.sleep(delay);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = sleep => true,
        }
    }

    fn cancelled<T>(&self) -> LoadOutcome<T> {
        self.shared.metrics.load_cancelled();
        tracing::debug!(
            resource = %self.resource.id(),
            state = %self.resource.state(),
            "Load cancelled"
        );
        LoadOutcome::Cancelled
    }

    fn report_retry(&self, failed: u32, delay: Duration, error: &LoadError) {
        self.shared.metrics.retry_scheduled();
        tracing::debug!(
            resource = %self.resource.id(),
            attempt = failed,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying load"
        );
        self.shared.sink.emit(
            LogEvent::new(category::LOADER, action::RETRY)
                .with("resource", self.resource.id())
                .with("attempt", failed)
                .with("delay_ms", delay.as_millis() as u64)
                .with("error", error.to_string())
                .tag(self.resource.priority().as_str()),
        );
    }

    /// Emit the terminal timing sample and events.
    fn finish(&self, error: Option<&LoadError>) {
        let finished_at = self.resource.finished_at().unwrap_or_else(|| self.shared.scheduler.now());
        let started_at = self.resource.started_at().unwrap_or(finished_at);
        let timing = LoadTiming {
            resource_id: self.resource.id().to_string(),
            priority: self.resource.priority(),
            started_at,
            finished_at,
            attempt: self.resource.attempt(),
            final_state: self.resource.state(),
        };
        let duration = timing.duration();

        match error {
            None => {
                self.shared.metrics.load_succeeded();
                tracing::debug!(
                    resource = %timing.resource_id,
                    duration_ms = duration.as_millis() as u64,
                    attempt = timing.attempt,
                    "Resource loaded"
                );
                if duration > self.shared.config.slow_load_threshold {
                    self.shared.metrics.slow_load();
                    self.shared.sink.emit(
                        LogEvent::new(category::LOADER, action::SLOW_LOAD)
                            .with("resource", timing.resource_id.clone())
                            .with("duration_ms", duration.as_millis() as u64)
                            .with("attempt", timing.attempt)
                            .tag(timing.priority.as_str()),
                    );
                }
            }
            Some(error) => {
                self.shared.metrics.load_failed();
                tracing::warn!(
                    resource = %timing.resource_id,
                    attempts = timing.attempt,
                    error = %error,
                    "Resource failed"
                );
                self.shared.sink.emit(
                    LogEvent::new(category::LOADER, action::FAILURE)
                        .with("resource", timing.resource_id.clone())
                        .with("attempts", timing.attempt)
                        .with("error", error.to_string())
                        .with("duration_ms", duration.as_millis() as u64)
                        .tag(timing.priority.as_str()),
                );
            }
        }

        self.shared.timings.record_load(timing);
    }
}
