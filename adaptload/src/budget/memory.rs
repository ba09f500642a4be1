//! Periodic memory sampling.
//!
//! A sampler task reads a [`MemoryProbe`] on a fixed interval and feeds the
//! result to the evaluator as [`PerformanceSample::Memory`]. The task stops
//! when its cancellation token fires.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::evaluator::BudgetEvaluator;
use super::samples::PerformanceSample;
use crate::environment::{ProbeError, ProbeResult};
use crate::scheduler::SharedScheduler;

/// Default interval between memory samples (5s).
pub const DEFAULT_MEMORY_SAMPLE_INTERVAL_MS: u64 = 5000;

/// Source of "memory in use" readings.
pub trait MemoryProbe: Send + Sync + fmt::Debug {
    fn used_bytes(&self) -> ProbeResult<u64>;
}

/// Resident set size of the current process, from `/proc/self/status`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMemoryProbe;

impl MemoryProbe for ProcMemoryProbe {
    fn used_bytes(&self) -> ProbeResult<u64> {
        let status = std::fs::read_to_string("/proc/self/status").map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProbeError::Unsupported,
            _ => ProbeError::Failed(e.to_string()),
        })?;
        parse_vm_rss(&status)
    }
}

/// Extract `VmRSS` (reported in kB) as bytes.
fn parse_vm_rss(status: &str) -> ProbeResult<u64> {
    let line = status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .ok_or(ProbeError::Unsupported)?;
    let kb = line
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| ProbeError::Failed(format!("malformed line '{}'", line)))?;
    Ok(kb * 1024)
}

/// Fixed reading, for tests and simulations.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryProbe(pub u64);

impl MemoryProbe for FixedMemoryProbe {
    fn used_bytes(&self) -> ProbeResult<u64> {
        Ok(self.0)
    }
}

/// Spawn a task that samples `probe` every `interval` until `cancel` fires.
///
/// A failing probe is logged once per failure and skipped; the sampler keeps
/// running.
pub fn spawn_memory_sampler(
    evaluator: Arc<BudgetEvaluator>,
    probe: Arc<dyn MemoryProbe>,
    scheduler: SharedScheduler,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Memory sampler started");
        loop {
            match probe.used_bytes() {
                Ok(used_bytes) => {
                    evaluator.observe(PerformanceSample::Memory { used_bytes });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Memory probe unavailable");
                }
            }

            let tick = scheduler.sleep(interval);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tick => {}
            }
        }
        tracing::debug!("Memory sampler stopped");
    })
}
