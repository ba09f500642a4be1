//! Adaptload - adaptive resource loading and performance budgets
//!
//! This library decides when a deferred resource should start loading, how
//! aggressively to retry it, how thresholds adapt to the device and network,
//! and whether observed performance stays within a declared budget.
//!
//! # Components
//!
//! ```text
//!                    ┌────────────────────┐
//!                    │  ConditionOracle   │  EnvironmentProfile
//!                    └─────────┬──────────┘
//!          ┌───────────────────┼────────────────────┐
//!          ▼                   ▼                    ▼
//! ┌──────────────────┐ ┌───────────────┐  ┌──────────────────┐
//! │VisibilityTrigger │─►│AdaptiveLoader │──►│ BudgetEvaluator  │──► score()
//! └──────────────────┘ └───────────────┘  └──────────────────┘
//!                                                   ▲
//! ┌──────────────────┐                              │
//! │  PreloadQueue    │   host observations ─────────┘
//! └──────────────────┘
//! ```
//!
//! [`AdaptiveRuntime`] wires all of them together; each component can also be
//! constructed on its own.

pub mod budget;
pub mod config;
pub mod environment;
pub mod error;
pub mod loader;
pub mod logging;
pub mod preload;
pub mod runtime;
pub mod scheduler;
pub mod subscription;
pub mod telemetry;
pub mod visibility;

pub use budget::{BudgetEvaluator, BudgetTable, MetricKey, PerformanceSample, Severity};
pub use config::ConfigFile;
pub use environment::{
    CapabilityProvider, ConditionOracle, EnvironmentProfile, FixedCapabilities,
    SystemCapabilities,
};
pub use error::{ConfigError, LoadError};
pub use loader::{AdaptiveLoader, LoadOutcome, LoadState, Priority, ResourceHandle};
pub use preload::PreloadQueue;
pub use runtime::{AdaptiveRuntime, RuntimeBuilder};
pub use scheduler::{Scheduler, TokioScheduler};
pub use telemetry::{EventSink, LogEvent, TelemetrySnapshot};
pub use visibility::{Rect, Viewport, ViewportHub, VisibilityTrigger};
