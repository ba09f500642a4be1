//! Performance budgets and the rolling score.
//!
//! The [`BudgetEvaluator`] owns one active [`BudgetTable`], resolved from
//! [`BudgetTables`] for the current environment profile. Observations arrive
//! from three places:
//!
//! ```text
//! host (paint, input, layout shift, transfer) ──┐
//! memory sampler task ──────────────────────────┼──► BudgetEvaluator ──► violations ──► score()
//! AdaptiveLoader (LoadTiming) ──────────────────┘            │
//!                                                            └──► EventSink / LoaderMetrics
//! ```
//!
//! Violations are informational; nothing in the loading path blocks on them.

mod evaluator;
mod memory;
mod samples;
mod severity;
mod table;

pub use evaluator::{
    BudgetConfig, BudgetEvaluator, DEFAULT_LOAD_HISTORY, DEFAULT_SCORE_WINDOW_MS,
    DEFAULT_VIOLATION_RETENTION_MS, MAX_SCORE,
};
pub use memory::{
    spawn_memory_sampler, FixedMemoryProbe, MemoryProbe, ProcMemoryProbe,
    DEFAULT_MEMORY_SAMPLE_INTERVAL_MS,
};
pub use samples::{LoadTiming, PerformanceSample, SharedTimingObserver, TimingObserver};
pub use severity::{
    BudgetCheck, Severity, Violation, HIGH_MAX_OVER_PCT, LOW_MAX_OVER_PCT, MEDIUM_MAX_OVER_PCT,
};
pub use table::{BudgetTable, BudgetTables, MetricKey};
