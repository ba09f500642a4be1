//! Injectable clock and timer abstraction.
//!
//! Backoff, stagger, per-attempt timeouts, scroll sampling and violation
//! windows all read time through a [`Scheduler`]. The production
//! implementation is [`TokioScheduler`], which uses Tokio's time driver; tests
//! run under `#[tokio::test(start_paused = true)]` and advance virtual time
//! instead of waiting on the wall clock.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

pub use futures::future::BoxFuture;

/// Source of time and delays.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single scheduler is shared by
/// every component of a runtime.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Future that completes after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Shared scheduler handle.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Scheduler backed by the Tokio time driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Outcome of racing a future against a deadline.
#[derive(Debug, PartialEq, Eq)]
pub enum Deadline<T> {
    /// The future finished first.
    Completed(T),
    /// The deadline elapsed first; the future was dropped.
    Elapsed,
}

/// Run `future` with a timeout measured by `scheduler`.
pub async fn with_deadline<F>(
    scheduler: &dyn Scheduler,
    timeout: Duration,
    future: F,
) -> Deadline<F::Output>
where
    F: Future,
{
    let timer = scheduler.sleep(timeout);
    tokio::select! {
        biased;
        output = future => Deadline::Completed(output),
        _ = timer => Deadline::Elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_sleep_advances_virtual_time() {
        let scheduler = TokioScheduler;
        let start = scheduler.now();

        scheduler.sleep(Duration::from_millis(1500)).await;

        assert!(scheduler.now().duration_since(start) >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_completes() {
        let scheduler = TokioScheduler;
        let result = with_deadline(&scheduler, Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            7
        })
        .await;

        assert_eq!(result, Deadline::Completed(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_elapses() {
        let scheduler = TokioScheduler;
        let start = scheduler.now();
        let result = with_deadline(&scheduler, Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            7
        })
        .await;

        assert_eq!(result, Deadline::Elapsed);
        assert!(scheduler.now().duration_since(start) < Duration::from_secs(2));
    }
}
