//! Opportunistic background preloading.
//!
//! Unlike the adaptive loader, preloading never blocks the user and never
//! retries: a failed preload is simply marked done, and the resource is loaded
//! on demand later if it is actually needed.

mod queue;

pub use queue::{
    preload_fn, NoopPreloader, PreloadConfig, PreloadFn, PreloadQueue, PreloadQueueEntry,
    Preloader, DEFAULT_YIELD_INTERVAL_MS,
};
