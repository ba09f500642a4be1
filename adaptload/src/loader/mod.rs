//! Adaptive resource loading.
//!
//! The loader decides how a load runs once it has been triggered: an
//! environment-scaled stagger before each attempt, a per-attempt timeout, and
//! capped exponential backoff between attempts.
//!
//! ```text
//! Idle ──► Triggered ──► Loading ──► Loaded
//!                          │ ▲
//!                 failure  ▼ │ backoff elapsed
//!                        Retrying
//!                          │
//!                          └── ceiling reached ──► Failed
//! ```

mod adaptive;
mod policy;
mod resource;

pub use adaptive::{
    AdaptiveLoader, LoadOutcome, LoadTask, LoaderConfig, ResourceHandle,
    DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_SLOW_LOAD_MS,
};
pub use policy::{
    RetryPolicy, StaggerPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_RATIO,
    DEFAULT_MAX_DELAY_MS, DEFAULT_RETRY_CEILING, DEFAULT_STAGGER_MEDIUM_MS,
    DEFAULT_STAGGER_SLOW_MS,
};
pub use resource::{LoadState, LoadableResource, Priority, ResourceStatus};
