//! Telemetry for the loading core.
//!
//! Two channels leave the core:
//!
//! ```text
//! Loader / Preload / Budget ──► LoaderMetrics ──► TelemetrySnapshot ──► diagnostics view
//!                           └─► EventSink (LogEvent) ──► host observability
//! ```
//!
//! Counters are lock-free atomics; events are structured and forwarded to
//! whatever sink the host injected.

mod metrics;
mod sink;
mod snapshot;

pub use metrics::LoaderMetrics;
pub use sink::{
    action, category, EventSink, LogEvent, MemorySink, NullSink, SharedEventSink, TracingSink,
};
pub use snapshot::TelemetrySnapshot;
