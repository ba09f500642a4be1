//! Observations fed to the budget evaluator.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::table::MetricKey;
use crate::loader::{LoadState, Priority};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_KB: f64 = 1024.0;

/// One performance observation reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerformanceSample {
    /// First contentful paint, ms since navigation start.
    FirstContentfulPaint(f64),
    /// Largest contentful paint, ms since navigation start.
    LargestContentfulPaint(f64),
    /// Delay between the first input and its handler, ms.
    FirstInput { delay_ms: f64 },
    /// A layout-shift entry. Shifts right after user input are expected and
    /// do not count.
    LayoutShift { value: f64, had_recent_input: bool },
    /// Time to interactive, ms since navigation start.
    TimeToInteractive(f64),
    /// Current memory use.
    Memory { used_bytes: u64 },
    /// A navigation or resource transfer.
    Transfer { bytes: u64 },
}

impl PerformanceSample {
    /// Metric this sample is checked against.
    pub fn metric(&self) -> MetricKey {
        match self {
            PerformanceSample::FirstContentfulPaint(_) => MetricKey::FirstContentfulPaint,
            PerformanceSample::LargestContentfulPaint(_) => MetricKey::LargestContentfulPaint,
            PerformanceSample::FirstInput { .. } => MetricKey::FirstInputDelay,
            PerformanceSample::LayoutShift { .. } => MetricKey::CumulativeLayoutShift,
            PerformanceSample::TimeToInteractive(_) => MetricKey::TimeToInteractive,
            PerformanceSample::Memory { .. } => MetricKey::MemoryUsage,
            PerformanceSample::Transfer { .. } => MetricKey::TransferSize,
        }
    }
}

pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

pub(crate) fn bytes_to_kb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_KB
}

/// Timing of one resource load that reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTiming {
    pub resource_id: String,
    pub priority: Priority,
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Failed attempts before the terminal state.
    pub attempt: u32,
    /// `Loaded` or `Failed`.
    pub final_state: LoadState,
}

impl LoadTiming {
    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

/// Receives terminal load timings from the loader.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; load tasks report from whichever
/// runtime worker they finish on.
pub trait TimingObserver: Send + Sync {
    /// Record one terminal load.
    fn record_load(&self, timing: LoadTiming);
}

/// Shared timing observer.
pub type SharedTimingObserver = Arc<dyn TimingObserver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_metric_mapping() {
        assert_eq!(
            PerformanceSample::LayoutShift {
                value: 0.1,
                had_recent_input: false
            }
            .metric(),
            MetricKey::CumulativeLayoutShift
        );
        assert_eq!(
            PerformanceSample::Transfer { bytes: 10 }.metric(),
            MetricKey::TransferSize
        );
        assert_eq!(
            PerformanceSample::FirstInput { delay_ms: 12.0 }.metric(),
            MetricKey::FirstInputDelay
        );
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(bytes_to_mb(64 * 1024 * 1024), 64.0);
        assert_eq!(bytes_to_kb(2048), 2.0);
    }

    #[test]
    fn test_load_timing_duration() {
        let start = Instant::now();
        let timing = LoadTiming {
            resource_id: "a".into(),
            priority: Priority::Normal,
            started_at: start,
            finished_at: start + Duration::from_millis(250),
            attempt: 1,
            final_state: LoadState::Loaded,
        };
        assert_eq!(timing.duration(), Duration::from_millis(250));
    }
}
