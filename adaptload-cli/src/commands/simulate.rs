//! `simulate` command: drive a full runtime through a synthetic session.
//!
//! The session runs on a paused Tokio clock, so backoff, stagger and timeouts
//! take no wall-clock time. Every resource gets a scripted sequence of attempt
//! outcomes drawn up front from a seeded RNG, which makes runs reproducible
//! with `--seed`.
//!
//! ```text
//! resources ──► AdaptiveRuntime::register ──► load(scripted attempts)
//! preloads  ──► PreloadQueue::enqueue ──► wait_idle
//!                                   │
//!                                   ▼
//!                 telemetry + budget score report
//! ```

use std::sync::Arc;
use std::time::Duration;

use adaptload::budget::PerformanceSample;
use adaptload::preload::preload_fn;
use adaptload::telemetry::MemorySink;
use adaptload::{AdaptiveRuntime, ConfigFile, LoadError, LoadOutcome, Priority};
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tokio::time::Instant;

use super::common::{simulated, DeviceArg, NetworkArg};
use crate::error::CliError;

/// Every n-th resource is marked high priority.
const HIGH_PRIORITY_EVERY: usize = 5;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Simulated network class
    #[arg(long, value_enum, default_value = "medium")]
    pub network: NetworkArg,

    /// Simulated device class
    #[arg(long, value_enum, default_value = "normal")]
    pub device: DeviceArg,

    /// Number of resources to load
    #[arg(long, default_value_t = 20)]
    pub resources: usize,

    /// Number of resources to preload
    #[arg(long, default_value_t = 5)]
    pub preloads: usize,

    /// Probability that a single attempt fails
    #[arg(long, default_value_t = 0.2, value_parser = parse_rate)]
    pub failure_rate: f64,

    /// Mean latency of one attempt in milliseconds
    #[arg(long, default_value_t = 400)]
    pub latency_ms: u64,

    /// RNG seed for a reproducible session
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the report as JSON, including every emitted event
    #[arg(long)]
    pub json: bool,
}

/// Scripted outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Attempt {
    latency: Duration,
    fails: bool,
}

/// Attempt script for one resource: enough entries to cover every retry.
fn script(rng: &mut impl Rng, attempts: usize, failure_rate: f64, latency_ms: u64) -> Vec<Attempt> {
    (0..attempts)
        .map(|_| {
            // Uniform in [latency/2, latency*3/2].
            let jitter = rng.random_range(0..=latency_ms);
            Attempt {
                latency: Duration::from_millis(latency_ms / 2 + jitter),
                fails: rng.random_bool(failure_rate),
            }
        })
        .collect()
}

fn priority_for(index: usize) -> Priority {
    match index {
        0 => Priority::Critical,
        i if i % HIGH_PRIORITY_EVERY == 0 => Priority::High,
        _ => Priority::Normal,
    }
}

/// Counts of load outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    loaded: usize,
    failed: usize,
    cancelled: usize,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, config: ConfigFile) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(simulate(args, config))
}

async fn simulate(args: SimulateArgs, config: ConfigFile) -> Result<(), CliError> {
    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);
    let attempts_per_resource = config.loader.retry.retry_ceiling.max(1) as usize;

    let sink = Arc::new(MemorySink::new());
    let preload_latency = Duration::from_millis(args.latency_ms);
    let runtime = AdaptiveRuntime::builder()
        .config(config)
        .capabilities(Arc::new(simulated(args.network, args.device, false)))
        .sink(sink.clone())
        .preloader(preload_fn(move |_id: String| async move {
            tokio::time::sleep(preload_latency).await;
            Ok::<_, LoadError>(())
        }))
        .build();

    tracing::info!(
        seed,
        profile = %runtime.profile(),
        resources = args.resources,
        "Starting simulated session"
    );

    let start = Instant::now();
    let mut handles = Vec::with_capacity(args.resources);
    let mut tasks = Vec::with_capacity(args.resources);
    for index in 0..args.resources {
        let handle = runtime.register(format!("resource-{}", index), priority_for(index));
        let mut attempts = script(
            &mut rng,
            attempts_per_resource,
            args.failure_rate,
            args.latency_ms,
        )
        .into_iter();

        let task = handle
            .load(move || {
                let attempt = attempts.next();
                async move {
                    let Some(attempt) = attempt else {
                        return Err(LoadError::Network("script exhausted".into()));
                    };
                    tokio::time::sleep(attempt.latency).await;
                    if attempt.fails {
                        Err(LoadError::Network("simulated failure".into()))
                    } else {
                        Ok(attempt.latency)
                    }
                }
            })
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        handles.push(handle);
        tasks.push(task);
    }

    let preloads: Vec<String> = (0..args.preloads).map(|i| format!("preload-{}", i)).collect();
    runtime.preload().enqueue(preloads, Priority::Low);

    let mut tally = Tally::default();
    for (index, task) in tasks.into_iter().enumerate() {
        match task.outcome().await {
            LoadOutcome::Loaded(_) => {
                tally.loaded += 1;
                if index == 0 {
                    // The critical resource stands in for first paint.
                    let paint = start.elapsed().as_secs_f64() * 1000.0;
                    runtime
                        .evaluator()
                        .observe(PerformanceSample::FirstContentfulPaint(paint));
                }
            }
            LoadOutcome::Failed { .. } => tally.failed += 1,
            LoadOutcome::Cancelled => tally.cancelled += 1,
        }
    }
    runtime.preload().wait_idle().await;
    let elapsed = start.elapsed();

    let telemetry = runtime.telemetry();
    let score = runtime.score();
    let violations = runtime.evaluator().violations();
    drop(handles);
    runtime.shutdown().await;

    if args.json {
        let violations: Vec<serde_json::Value> = violations
            .iter()
            .map(|v| {
                json!({
                    "metric": v.metric,
                    "actual": v.actual,
                    "ceiling": v.ceiling,
                    "severity": v.severity,
                })
            })
            .collect();
        let output = json!({
            "seed": seed,
            "profile": runtime.profile(),
            "elapsed_ms": elapsed.as_millis() as u64,
            "loaded": tally.loaded,
            "failed": tally.failed,
            "cancelled": tally.cancelled,
            "telemetry": telemetry,
            "score": score,
            "violations": violations,
            "events": sink.events(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Simulated session (seed {})", seed);
    println!("  Profile:  {}", runtime.profile());
    println!("  Duration: {:.1}s (virtual)", elapsed.as_secs_f64());
    println!(
        "  Outcome:  {} loaded, {} failed, {} cancelled",
        tally.loaded, tally.failed, tally.cancelled
    );
    println!();
    println!("{}", telemetry);
    println!();
    println!("Performance score: {}", score);
    for violation in &violations {
        println!(
            "  {} {}: {:.1} over ceiling {} {}",
            violation.severity,
            violation.metric,
            violation.actual,
            violation.ceiling,
            violation.metric.unit()
        );
    }
    Ok(())
}

fn parse_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("invalid rate '{}': {}", s, e))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("rate must be between 0 and 1, got {}", rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(failure_rate: f64) -> SimulateArgs {
        SimulateArgs {
            network: NetworkArg::Slow,
            device: DeviceArg::Normal,
            resources: 8,
            preloads: 3,
            failure_rate,
            latency_ms: 200,
            seed: Some(7),
            json: false,
        }
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("0.25"), Ok(0.25));
        assert!(parse_rate("1.5").is_err());
        assert!(parse_rate("-0.1").is_err());
        assert!(parse_rate("often").is_err());
    }

    #[test]
    fn test_priority_for() {
        assert_eq!(priority_for(0), Priority::Critical);
        assert_eq!(priority_for(5), Priority::High);
        assert_eq!(priority_for(3), Priority::Normal);
    }

    #[test]
    fn test_script_is_reproducible() {
        let a = script(&mut StdRng::seed_from_u64(42), 3, 0.5, 100);
        let b = script(&mut StdRng::seed_from_u64(42), 3, 0.5, 100);
        assert_eq!(a, b);
        assert!(a
            .iter()
            .all(|attempt| attempt.latency >= Duration::from_millis(50)
                && attempt.latency <= Duration::from_millis(150)));
    }

    #[test]
    fn test_script_failure_rate_extremes() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(script(&mut rng, 10, 0.0, 100).iter().all(|a| !a.fails));
        assert!(script(&mut rng, 10, 1.0, 100).iter().all(|a| a.fails));
    }

    #[test]
    fn test_simulation_without_failures() {
        let result = run(args(0.0), ConfigFile::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_simulation_with_every_attempt_failing() {
        let result = run(args(1.0), ConfigFile::default());
        assert!(result.is_ok());
    }
}
