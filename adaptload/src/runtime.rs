//! Composition root for the adaptive loading core.
//!
//! [`AdaptiveRuntime`] owns one instance of every component and wires them
//! in dependency order:
//!
//! 1. Condition oracle (from the capability provider)
//! 2. Budget evaluator, following the oracle's profile
//! 3. Adaptive loader, reporting timings to the evaluator
//! 4. Preload queue
//! 5. Viewport hub and visibility trigger
//! 6. Optional memory sampler task
//!
//! Hosts build one runtime at startup and pass it (or its parts) to the
//! components that need it; tests build a fresh runtime per case.
//!
//! # Example
//!
//! ```ignore
//! use adaptload::{AdaptiveRuntime, FixedCapabilities, Priority};
//! use std::sync::Arc;
//!
//! let runtime = AdaptiveRuntime::builder()
//!     .capabilities(Arc::new(FixedCapabilities::medium()))
//!     .build();
//!
//! let handle = runtime.register("hero", Priority::High);
//! let task = handle.load(|| async { fetch("hero").await })?;
//! println!("score: {}", runtime.score());
//! runtime.shutdown().await;
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::budget::{spawn_memory_sampler, BudgetEvaluator, MemoryProbe, SharedTimingObserver};
use crate::config::ConfigFile;
use crate::environment::{CapabilityProvider, ConditionOracle, EnvironmentProfile, SystemCapabilities};
use crate::loader::{AdaptiveLoader, Priority, ResourceHandle};
use crate::preload::{NoopPreloader, PreloadQueue, Preloader};
use crate::scheduler::{SharedScheduler, TokioScheduler};
use crate::subscription::Subscription;
use crate::telemetry::{LoaderMetrics, SharedEventSink, TelemetrySnapshot, TracingSink};
use crate::visibility::{ElementHandle, Viewport, ViewportHub, VisibilityTrigger, VisibilityWatch};

/// Builder for [`AdaptiveRuntime`].
///
/// Every collaborator has a production default: system capabilities, the
/// Tokio scheduler, a tracing sink and a no-op preloader.
pub struct RuntimeBuilder {
    config: ConfigFile,
    capabilities: Option<Arc<dyn CapabilityProvider>>,
    scheduler: Option<SharedScheduler>,
    sink: Option<SharedEventSink>,
    preloader: Option<Arc<dyn Preloader>>,
    memory_probe: Option<Arc<dyn MemoryProbe>>,
    viewport: Viewport,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: ConfigFile::default(),
            capabilities: None,
            scheduler: None,
            sink: None,
            preloader: None,
            memory_probe: None,
            viewport: Viewport::default(),
        }
    }

    pub fn config(mut self, config: ConfigFile) -> Self {
        self.config = config;
        self
    }

    pub fn capabilities(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.capabilities = Some(provider);
        self
    }

    pub fn scheduler(mut self, scheduler: SharedScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn preloader(mut self, preloader: Arc<dyn Preloader>) -> Self {
        self.preloader = Some(preloader);
        self
    }

    /// Sample memory periodically with `probe`.
    pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = Some(probe);
        self
    }

    /// Viewport before the host's first report.
    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Wire everything together.
    ///
    /// The memory sampler only starts when called from within a Tokio
    /// runtime.
    pub fn build(self) -> AdaptiveRuntime {
        let config = self.config;
        let capabilities = self
            .capabilities
            .unwrap_or_else(|| Arc::new(SystemCapabilities::new()) as Arc<dyn CapabilityProvider>);
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler) as SharedScheduler);
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink) as SharedEventSink);
        let preloader = self
            .preloader
            .unwrap_or_else(|| Arc::new(NoopPreloader) as Arc<dyn Preloader>);
        let metrics = Arc::new(LoaderMetrics::new());

        let oracle = Arc::new(ConditionOracle::new(capabilities));

        let evaluator = Arc::new(BudgetEvaluator::from_config(
            &config.budget,
            Arc::clone(&scheduler),
            Arc::clone(&sink),
            Arc::clone(&metrics),
        ));
        let budget_follow = evaluator.follow(&oracle);

        let loader = AdaptiveLoader::new(
            config.loader.clone(),
            Arc::clone(&oracle),
            Arc::clone(&scheduler),
            Arc::clone(&evaluator) as SharedTimingObserver,
            Arc::clone(&sink),
            Arc::clone(&metrics),
        );

        let preload = PreloadQueue::new(
            config.preload.clone(),
            preloader,
            Arc::clone(&scheduler),
            Arc::clone(&sink),
            Arc::clone(&metrics),
        );

        let hub = Arc::new(ViewportHub::new(self.viewport));
        let trigger = VisibilityTrigger::new(
            Arc::clone(&hub),
            Arc::clone(&scheduler),
            config.visibility.clone(),
        );

        let shutdown = CancellationToken::new();
        let sampler = match (self.memory_probe, tokio::runtime::Handle::try_current()) {
            (Some(probe), Ok(_)) => Some(spawn_memory_sampler(
                Arc::clone(&evaluator),
                probe,
                Arc::clone(&scheduler),
                config.budget.memory_sample_interval,
                shutdown.child_token(),
            )),
            (Some(_), Err(_)) => {
                tracing::warn!("No Tokio runtime, memory sampling disabled");
                None
            }
            (None, _) => None,
        };

        tracing::info!(profile = %oracle.current_profile(), "Adaptive runtime started");

        AdaptiveRuntime {
            config,
            oracle,
            evaluator,
            loader,
            preload,
            hub,
            trigger,
            metrics,
            shutdown,
            sampler: Mutex::new(sampler),
            _budget_follow: budget_follow,
        }
    }
}

/// All components of the loading core, wired together.
pub struct AdaptiveRuntime {
    config: ConfigFile,
    oracle: Arc<ConditionOracle>,
    evaluator: Arc<BudgetEvaluator>,
    loader: AdaptiveLoader,
    preload: PreloadQueue,
    hub: Arc<ViewportHub>,
    trigger: VisibilityTrigger,
    metrics: Arc<LoaderMetrics>,
    shutdown: CancellationToken,
    sampler: Mutex<Option<JoinHandle<()>>>,
    _budget_follow: Subscription,
}

impl AdaptiveRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn profile(&self) -> EnvironmentProfile {
        self.oracle.current_profile()
    }

    pub fn oracle(&self) -> &Arc<ConditionOracle> {
        &self.oracle
    }

    pub fn evaluator(&self) -> &Arc<BudgetEvaluator> {
        &self.evaluator
    }

    pub fn loader(&self) -> &AdaptiveLoader {
        &self.loader
    }

    pub fn preload(&self) -> &PreloadQueue {
        &self.preload
    }

    pub fn viewport(&self) -> &Arc<ViewportHub> {
        &self.hub
    }

    pub fn trigger(&self) -> &VisibilityTrigger {
        &self.trigger
    }

    /// Register a resource with the loader (host mount).
    pub fn register(&self, id: impl Into<String>, priority: Priority) -> ResourceHandle {
        self.loader.register(id, priority)
    }

    /// Watch an element using the current environment profile.
    pub fn watch(&self, element: Arc<dyn ElementHandle>) -> VisibilityWatch {
        self.trigger.watch(element, self.oracle.current_profile())
    }

    /// Rolling performance score over the configured window.
    pub fn score(&self) -> u32 {
        self.evaluator.score(self.config.budget.score_window)
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    /// Stop background tasks (memory sampler, preload worker).
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.preload.shutdown();
        let sampler = self.sampler.lock().take();
        if let Some(handle) = sampler {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Memory sampler ended abnormally");
            }
        }
        tracing::info!("Adaptive runtime stopped");
    }
}

impl Drop for AdaptiveRuntime {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for AdaptiveRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveRuntime")
            .field("profile", &self.oracle.current_profile())
            .field("loader", &self.loader)
            .field("preload", &self.preload)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{FixedMemoryProbe, MetricKey, PerformanceSample};
    use crate::environment::{FixedCapabilities, NetworkClass};
    use crate::error::LoadError;
    use crate::telemetry::MemorySink;
    use crate::visibility::Rect;
    use std::time::Duration;

    fn runtime(caps: FixedCapabilities) -> AdaptiveRuntime {
        AdaptiveRuntime::builder()
            .capabilities(Arc::new(caps))
            .sink(Arc::new(MemorySink::new()))
            .viewport(Viewport::new(1280.0, 800.0))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_follows_profile() {
        let runtime = runtime(FixedCapabilities::slow());
        assert_eq!(runtime.profile().network, NetworkClass::Slow);
        assert_eq!(
            runtime
                .evaluator()
                .active_budget()
                .ceiling(MetricKey::FirstContentfulPaint),
            Some(3000.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_feeds_evaluator() {
        let runtime = runtime(FixedCapabilities::fast());
        let handle = runtime.register("hero", Priority::High);
        let task = handle
            .load(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, LoadError>(())
            })
            .unwrap();
        assert!(task.outcome().await.is_loaded());

        assert_eq!(runtime.evaluator().load_samples().len(), 1);
        assert_eq!(runtime.telemetry().loads_succeeded, 1);
        assert_eq!(runtime.score(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_reflects_violations() {
        let runtime = runtime(FixedCapabilities::fast());
        runtime.evaluator().observe(PerformanceSample::LayoutShift {
            value: 0.25,
            had_recent_input: false,
        });
        assert_eq!(runtime.score(), 90);
        assert_eq!(runtime.telemetry().budget_violations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_element_loads() {
        let runtime = runtime(FixedCapabilities::fast());
        let handle = runtime.register("card", Priority::Normal);
        let watch = runtime.watch(Arc::new(Rect::new(0.0, 10.0, 100.0, 100.0)));
        let task = handle
            .load_when_visible(watch, || async { Ok::<_, LoadError>(7) })
            .unwrap();
        assert_eq!(task.outcome().await.into_content(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_sampler_stops_on_shutdown() {
        let runtime = AdaptiveRuntime::builder()
            .capabilities(Arc::new(FixedCapabilities::fast()))
            .sink(Arc::new(MemorySink::new()))
            .memory_probe(Arc::new(FixedMemoryProbe(10 * 1024 * 1024)))
            .build();

        tokio::time::sleep(Duration::from_secs(12)).await;
        runtime.shutdown().await;
        assert!(runtime.evaluator().violations().is_empty());
        assert_eq!(runtime.score(), 100);
    }
}
