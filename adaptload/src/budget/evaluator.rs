//! Budget evaluator: checks observations against the active budget and keeps
//! a rolling performance score.
//!
//! # Score
//!
//! ```text
//! score(window) = max(0, 100 - Σ penalty(v) for v in violations within window)
//! ```
//!
//! Penalties are fixed per severity (low 5, medium 10, high 15, critical 25),
//! so a burst of recent critical violations dominates the score. Violations
//! older than the retention window are pruned whenever one is recorded or the
//! score is computed.
//!
//! # Active Budget
//!
//! The active table is an `Arc<BudgetTable>` swapped wholesale when the
//! environment profile changes; readers holding the previous table keep a
//! consistent view until they drop it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::memory::DEFAULT_MEMORY_SAMPLE_INTERVAL_MS;
use super::samples::{bytes_to_kb, bytes_to_mb, LoadTiming, PerformanceSample, TimingObserver};
use super::severity::{BudgetCheck, Violation};
use super::table::{BudgetTable, BudgetTables, MetricKey};
use crate::environment::{ConditionOracle, EnvironmentProfile};
use crate::scheduler::SharedScheduler;
use crate::subscription::Subscription;
use crate::telemetry::{action, category, LoaderMetrics, LogEvent, SharedEventSink};

/// Score with no violations.
pub const MAX_SCORE: u32 = 100;

/// Default trailing window for [`BudgetEvaluator::current_score`] (60s).
pub const DEFAULT_SCORE_WINDOW_MS: u64 = 60_000;

/// Default age after which violations are pruned (60s).
pub const DEFAULT_VIOLATION_RETENTION_MS: u64 = 60_000;

/// Default number of load timings kept for diagnostics.
pub const DEFAULT_LOAD_HISTORY: usize = 256;

/// Budget evaluator tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetConfig {
    pub tables: BudgetTables,
    /// Trailing window used by [`BudgetEvaluator::current_score`].
    pub score_window: Duration,
    /// Violations older than this are pruned.
    pub retention: Duration,
    /// Interval of the memory sampler task.
    pub memory_sample_interval: Duration,
    /// Load timings kept for diagnostics.
    pub load_history: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            tables: BudgetTables::default(),
            score_window: Duration::from_millis(DEFAULT_SCORE_WINDOW_MS),
            retention: Duration::from_millis(DEFAULT_VIOLATION_RETENTION_MS),
            memory_sample_interval: Duration::from_millis(DEFAULT_MEMORY_SAMPLE_INTERVAL_MS),
            load_history: DEFAULT_LOAD_HISTORY,
        }
    }
}

#[derive(Debug, Default)]
struct EvaluatorState {
    violations: VecDeque<Violation>,
    load_samples: VecDeque<LoadTiming>,
    /// Session-wide; never reset mid-session.
    cumulative_layout_shift: f64,
    transferred_bytes: u64,
}

/// Checks metrics against the budget for the current environment.
///
/// # Thread Safety
///
/// All methods take `&self`; state is behind `parking_lot` locks that are
/// never held across an await or a sink call.
pub struct BudgetEvaluator {
    tables: BudgetTables,
    active: RwLock<Arc<BudgetTable>>,
    profile: RwLock<EnvironmentProfile>,
    state: Mutex<EvaluatorState>,
    scheduler: SharedScheduler,
    sink: SharedEventSink,
    metrics: Arc<LoaderMetrics>,
    retention: Duration,
    load_history: usize,
}

impl BudgetEvaluator {
    /// Create an evaluator with the budget for the default profile active.
    pub fn new(
        tables: BudgetTables,
        scheduler: SharedScheduler,
        sink: SharedEventSink,
        metrics: Arc<LoaderMetrics>,
    ) -> Self {
        let profile = EnvironmentProfile::default();
        let active = Arc::new(tables.resolve(&profile));
        Self {
            tables,
            active: RwLock::new(active),
            profile: RwLock::new(profile),
            state: Mutex::new(EvaluatorState::default()),
            scheduler,
            sink,
            metrics,
            retention: Duration::from_millis(DEFAULT_VIOLATION_RETENTION_MS),
            load_history: DEFAULT_LOAD_HISTORY,
        }
    }

    /// Create an evaluator from a [`BudgetConfig`].
    pub fn from_config(
        config: &BudgetConfig,
        scheduler: SharedScheduler,
        sink: SharedEventSink,
        metrics: Arc<LoaderMetrics>,
    ) -> Self {
        Self::new(config.tables.clone(), scheduler, sink, metrics)
            .with_retention(config.retention)
            .with_load_history(config.load_history)
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_load_history(mut self, capacity: usize) -> Self {
        self.load_history = capacity;
        self
    }

    pub fn tables(&self) -> &BudgetTables {
        &self.tables
    }

    /// Apply the oracle's current profile now and on every change.
    ///
    /// The subscription holds only a weak reference to the evaluator.
    pub fn follow(self: &Arc<Self>, oracle: &ConditionOracle) -> Subscription {
        self.apply_profile(oracle.current_profile());
        let weak: Weak<Self> = Arc::downgrade(self);
        oracle.on_change(move |profile| {
            if let Some(evaluator) = weak.upgrade() {
                evaluator.apply_profile(*profile);
            }
        })
    }

    /// Replace the active budget with the table for `profile`.
    pub fn apply_profile(&self, profile: EnvironmentProfile) {
        let table = Arc::new(self.tables.resolve(&profile));
        *self.active.write() = table;
        *self.profile.write() = profile;
        tracing::debug!(profile = %profile, "Active budget replaced");
    }

    pub fn active_budget(&self) -> Arc<BudgetTable> {
        Arc::clone(&self.active.read())
    }

    pub fn profile(&self) -> EnvironmentProfile {
        *self.profile.read()
    }

    /// Check `value` against the active ceiling for `metric`. No side effects.
    pub fn check(&self, metric: MetricKey, value: f64) -> BudgetCheck {
        match self.active.read().ceiling(metric) {
            Some(ceiling) => BudgetCheck::evaluate(value, ceiling),
            None => BudgetCheck::unbudgeted(),
        }
    }

    /// Check `value` and record a violation if it exceeds the budget.
    pub fn record(&self, metric: MetricKey, value: f64) -> BudgetCheck {
        let active = self.active_budget();
        let Some(ceiling) = active.ceiling(metric) else {
            return BudgetCheck::unbudgeted();
        };
        let check = BudgetCheck::evaluate(value, ceiling);
        let Some(severity) = check.severity else {
            return check;
        };

        let now = self.scheduler.now();
        {
            let mut state = self.state.lock();
            state.violations.push_back(Violation {
                metric,
                actual: value,
                ceiling,
                severity,
                timestamp: now,
            });
            prune(&mut state.violations, now, self.retention);
        }

        self.metrics.budget_violation();
        tracing::debug!(
            metric = %metric,
            actual = value,
            ceiling,
            severity = %severity,
            "Budget violation"
        );
        self.sink.emit(
            LogEvent::new(category::BUDGET, action::VIOLATION)
                .with("metric", metric.as_str())
                .with("actual", value)
                .with("ceiling", ceiling)
                .with("severity", severity.as_str())
                .with("percentage_of_ceiling", check.percentage_of_ceiling)
                .tag(self.profile().network.as_str()),
        );
        check
    }

    /// Feed one host observation.
    ///
    /// Layout shifts and transfer sizes accumulate for the session; the
    /// running total is what gets checked. Returns `None` for observations
    /// that are ignored (layout shifts right after input).
    pub fn observe(&self, sample: PerformanceSample) -> Option<BudgetCheck> {
        let metric = sample.metric();
        let value = match sample {
            PerformanceSample::FirstContentfulPaint(ms)
            | PerformanceSample::LargestContentfulPaint(ms)
            | PerformanceSample::TimeToInteractive(ms) => ms,
            PerformanceSample::FirstInput { delay_ms } => delay_ms,
            PerformanceSample::LayoutShift {
                had_recent_input: true,
                ..
            } => return None,
            PerformanceSample::LayoutShift { value, .. } => {
                let mut state = self.state.lock();
                state.cumulative_layout_shift += value;
                state.cumulative_layout_shift
            }
            PerformanceSample::Memory { used_bytes } => bytes_to_mb(used_bytes),
            PerformanceSample::Transfer { bytes } => {
                let mut state = self.state.lock();
                state.transferred_bytes = state.transferred_bytes.saturating_add(bytes);
                bytes_to_kb(state.transferred_bytes)
            }
        };
        Some(self.record(metric, value))
    }

    /// Recorded violations still within retention, oldest first.
    pub fn violations(&self) -> Vec<Violation> {
        self.state.lock().violations.iter().cloned().collect()
    }

    /// Rolling score over the trailing `window`, 0 to 100.
    pub fn score(&self, window: Duration) -> u32 {
        let now = self.scheduler.now();
        let mut state = self.state.lock();
        prune(&mut state.violations, now, self.retention);
        let penalty: u32 = state
            .violations
            .iter()
            .filter(|v| now.saturating_duration_since(v.timestamp) <= window)
            .map(|v| v.severity.penalty())
            .sum();
        MAX_SCORE.saturating_sub(penalty)
    }

    /// Score over the default window.
    pub fn current_score(&self) -> u32 {
        self.score(Duration::from_millis(DEFAULT_SCORE_WINDOW_MS))
    }

    /// Most recent load timings, oldest first.
    pub fn load_samples(&self) -> Vec<LoadTiming> {
        self.state.lock().load_samples.iter().cloned().collect()
    }

    pub fn cumulative_layout_shift(&self) -> f64 {
        self.state.lock().cumulative_layout_shift
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.state.lock().transferred_bytes
    }
}

impl TimingObserver for BudgetEvaluator {
    fn record_load(&self, timing: LoadTiming) {
        let duration_ms = timing.duration().as_secs_f64() * 1000.0;
        {
            let mut state = self.state.lock();
            if self.load_history > 0 {
                if state.load_samples.len() >= self.load_history {
                    state.load_samples.pop_front();
                }
                state.load_samples.push_back(timing);
            }
        }
        self.record(MetricKey::ResourceLoadTime, duration_ms);
    }
}

impl fmt::Debug for BudgetEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetEvaluator")
            .field("profile", &*self.profile.read())
            .field("violations", &self.state.lock().violations.len())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

fn prune(violations: &mut VecDeque<Violation>, now: tokio::time::Instant, retention: Duration) {
    while let Some(oldest) = violations.front() {
        if now.saturating_duration_since(oldest.timestamp) > retention {
            violations.pop_front();
        } else {
            break;
        }
    }
}
