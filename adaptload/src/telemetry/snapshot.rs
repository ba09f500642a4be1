//! Point-in-time view of the loader counters.

use std::fmt;

use serde::Serialize;

/// Copy of [`LoaderMetrics`](super::LoaderMetrics) counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub loads_started: u64,
    pub loads_succeeded: u64,
    pub loads_failed: u64,
    pub loads_cancelled: u64,
    pub retries: u64,
    pub slow_loads: u64,
    pub preloads_completed: u64,
    pub preloads_failed: u64,
    pub budget_violations: u64,
}

impl TelemetrySnapshot {
    /// Loads that reached a terminal state.
    pub fn loads_finished(&self) -> u64 {
        self.loads_succeeded + self.loads_failed
    }

    /// Fraction of finished loads that succeeded, or `None` before any finished.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.loads_finished();
        if finished == 0 {
            None
        } else {
            Some(self.loads_succeeded as f64 / finished as f64)
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Loads:      {} started, {} loaded, {} failed, {} cancelled",
            self.loads_started, self.loads_succeeded, self.loads_failed, self.loads_cancelled
        )?;
        writeln!(f, "Retries:    {} ({} slow loads)", self.retries, self.slow_loads)?;
        writeln!(
            f,
            "Preloads:   {} completed, {} failed",
            self.preloads_completed, self.preloads_failed
        )?;
        write!(f, "Violations: {}", self.budget_violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let snapshot = TelemetrySnapshot {
            loads_succeeded: 3,
            loads_failed: 1,
            ..Default::default()
        };
        assert_eq!(snapshot.loads_finished(), 4);
        assert_eq!(snapshot.success_rate(), Some(0.75));
        assert_eq!(TelemetrySnapshot::default().success_rate(), None);
    }

    #[test]
    fn test_display_mentions_counters() {
        let snapshot = TelemetrySnapshot {
            loads_started: 5,
            retries: 2,
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.contains("5 started"));
        assert!(text.contains("Retries:    2"));
    }
}
