//! Lock-free counters for the loading core.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::TelemetrySnapshot;

/// Counters updated by the loader, preload queue and budget evaluator.
///
/// All updates are relaxed atomic increments; read a consistent-enough view
/// with [`LoaderMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct LoaderMetrics {
    loads_started: AtomicU64,
    loads_succeeded: AtomicU64,
    loads_failed: AtomicU64,
    loads_cancelled: AtomicU64,
    retries: AtomicU64,
    slow_loads: AtomicU64,
    preloads_completed: AtomicU64,
    preloads_failed: AtomicU64,
    budget_violations: AtomicU64,
}

impl LoaderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_started(&self) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_succeeded(&self) {
        self.loads_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_failed(&self) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_cancelled(&self) {
        self.loads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slow_load(&self) {
        self.slow_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn preload_completed(&self, success: bool) {
        self.preloads_completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.preloads_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn budget_violation(&self) {
        self.budget_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_succeeded: self.loads_succeeded.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            loads_cancelled: self.loads_cancelled.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            slow_loads: self.slow_loads.load(Ordering::Relaxed),
            preloads_completed: self.preloads_completed.load(Ordering::Relaxed),
            preloads_failed: self.preloads_failed.load(Ordering::Relaxed),
            budget_violations: self.budget_violations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_metrics_are_zero() {
        let snapshot = LoaderMetrics::new().snapshot();
        assert_eq!(snapshot, TelemetrySnapshot::default());
    }

    #[test]
    fn test_counters_increment() {
        let metrics = LoaderMetrics::new();
        metrics.load_started();
        metrics.load_started();
        metrics.load_succeeded();
        metrics.load_failed();
        metrics.retry_scheduled();
        metrics.preload_completed(true);
        metrics.preload_completed(false);
        metrics.budget_violation();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.loads_started, 2);
        assert_eq!(snapshot.loads_succeeded, 1);
        assert_eq!(snapshot.loads_failed, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.preloads_completed, 2);
        assert_eq!(snapshot.preloads_failed, 1);
        assert_eq!(snapshot.budget_violations, 1);
    }

    #[test]
    fn test_thread_safe_counting() {
        let metrics = Arc::new(LoaderMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..250 {
                        m.load_started();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().loads_started, 1000);
    }
}
