//! Retry and stagger policies for the adaptive loader.
//!
//! # Policy Types
//!
//! - [`RetryPolicy`]: capped exponential backoff with optional jitter
//! - [`StaggerPolicy`]: artificial pre-load delay scaled by network class
//!
//! All values are tunable defaults, not contracts.
//!
//! # Example
//!
//! ```
//! use adaptload::loader::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.backoff_delay(0), Duration::from_millis(1000));
//! assert_eq!(policy.backoff_delay(3), Duration::from_millis(8000));
//! assert_eq!(policy.backoff_delay(4), Duration::from_millis(10000));
//! ```

use std::time::Duration;

use rand::Rng;

use super::resource::Priority;
use crate::environment::{EnvironmentProfile, NetworkClass};

// =============================================================================
// Retry Policy Constants
// =============================================================================

/// Default base delay for exponential backoff (1s).
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default maximum backoff delay (10s).
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Default number of failed attempts after which a resource fails.
pub const DEFAULT_RETRY_CEILING: u32 = 3;

/// Default jitter, as a fraction of the nominal delay.
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

// =============================================================================
// Stagger Constants
// =============================================================================

/// Default stagger before a load on a medium network (ms).
pub const DEFAULT_STAGGER_MEDIUM_MS: u64 = 150;

/// Default stagger before a load on a slow network (ms).
pub const DEFAULT_STAGGER_SLOW_MS: u64 = 500;

/// How a load handles transient failures.
///
/// The delay before retry `n` (0-based) is `min(base * 2^n, max)`. Jitter, if
/// enabled, adds a random `0..=jitter_ratio * delay` on top, so the actual
/// wait is never shorter than the nominal delay.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Failed attempts after which the resource is `Failed`.
    pub retry_ceiling: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Additive jitter as a fraction of the delay (0.0 disables).
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_ceiling: DEFAULT_RETRY_CEILING,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with the default base and cap.
    pub fn exponential(retry_ceiling: u32) -> Self {
        Self {
            retry_ceiling,
            ..Default::default()
        }
    }

    /// Disable jitter.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_ratio = 0.0;
        self
    }

    /// Nominal delay before retry `n` (0-based): `min(base * 2^n, max)`.
    pub fn backoff_delay(&self, n: u32) -> Duration {
        let factor = 2u32.checked_pow(n).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry `n` with jitter applied.
    pub fn jittered_delay<R: Rng + ?Sized>(&self, n: u32, rng: &mut R) -> Duration {
        let nominal = self.backoff_delay(n);
        if self.jitter_ratio <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let spread = nominal.mul_f64(self.jitter_ratio);
        nominal + spread.mul_f64(rng.random::<f64>())
    }

    /// True while another attempt is allowed after `failed_attempts` failures.
    pub fn allows_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.retry_ceiling
    }
}

/// Artificial delay inserted before each load attempt on degraded networks.
///
/// Spreads out bursts of simultaneous loads on constrained links. Critical
/// resources never wait.
#[derive(Clone, Debug, PartialEq)]
pub struct StaggerPolicy {
    pub medium: Duration,
    pub slow: Duration,
}

impl Default for StaggerPolicy {
    fn default() -> Self {
        Self {
            medium: Duration::from_millis(DEFAULT_STAGGER_MEDIUM_MS),
            slow: Duration::from_millis(DEFAULT_STAGGER_SLOW_MS),
        }
    }
}

impl StaggerPolicy {
    /// No stagger on any network.
    pub fn none() -> Self {
        Self {
            medium: Duration::ZERO,
            slow: Duration::ZERO,
        }
    }

    /// Delay before an attempt for a resource of `priority` under `profile`.
    pub fn delay_for(&self, profile: &EnvironmentProfile, priority: Priority) -> Duration {
        if priority == Priority::Critical {
            return Duration::ZERO;
        }
        match profile.network {
            NetworkClass::Fast => Duration::ZERO,
            NetworkClass::Medium => self.medium,
            NetworkClass::Slow => self.slow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::DeviceClass;
    use proptest::prelude::*;

    fn profile(network: NetworkClass) -> EnvironmentProfile {
        EnvironmentProfile::new(network, DeviceClass::Normal, false)
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_ceiling, DEFAULT_RETRY_CEILING);
        assert_eq!(policy.base_delay, Duration::from_millis(DEFAULT_BASE_DELAY_MS));
        assert_eq!(policy.max_delay, Duration::from_millis(DEFAULT_MAX_DELAY_MS));
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..7).map(|n| policy.backoff_delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000, 10000, 10000]);
    }

    #[test]
    fn test_backoff_huge_attempt_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(64), policy.max_delay);
        assert_eq!(policy.backoff_delay(u32::MAX), policy.max_delay);
    }

    #[test]
    fn test_jitter_never_shortens_delay() {
        let policy = RetryPolicy::default();
        let mut rng = rand::rng();
        for n in 0..5 {
            let nominal = policy.backoff_delay(n);
            let jittered = policy.jittered_delay(n, &mut rng);
            assert!(jittered >= nominal);
            assert!(jittered <= nominal + nominal.mul_f64(policy.jitter_ratio));
        }
    }

    #[test]
    fn test_without_jitter_is_exact() {
        let policy = RetryPolicy::default().without_jitter();
        let mut rng = rand::rng();
        assert_eq!(policy.jittered_delay(2, &mut rng), Duration::from_millis(4000));
    }

    #[test]
    fn test_allows_retry() {
        let policy = RetryPolicy::exponential(3);
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn test_stagger_by_network() {
        let stagger = StaggerPolicy::default();
        assert_eq!(stagger.delay_for(&profile(NetworkClass::Fast), Priority::Normal), Duration::ZERO);
        assert_eq!(
            stagger.delay_for(&profile(NetworkClass::Medium), Priority::Normal),
            Duration::from_millis(DEFAULT_STAGGER_MEDIUM_MS)
        );
        assert_eq!(
            stagger.delay_for(&profile(NetworkClass::Slow), Priority::Low),
            Duration::from_millis(DEFAULT_STAGGER_SLOW_MS)
        );
    }

    #[test]
    fn test_critical_skips_stagger() {
        let stagger = StaggerPolicy::default();
        assert_eq!(stagger.delay_for(&profile(NetworkClass::Slow), Priority::Critical), Duration::ZERO);
    }

    #[test]
    fn test_stagger_grows_as_network_worsens() {
        let stagger = StaggerPolicy::default();
        let fast = stagger.delay_for(&profile(NetworkClass::Fast), Priority::High);
        let medium = stagger.delay_for(&profile(NetworkClass::Medium), Priority::High);
        let slow = stagger.delay_for(&profile(NetworkClass::Slow), Priority::High);
        assert!(fast < medium && medium < slow);
    }

    proptest! {
        #[test]
        fn prop_backoff_matches_formula(base_ms in 1u64..5_000, max_ms in 1u64..60_000, n in 0u32..20) {
            let policy = RetryPolicy {
                retry_ceiling: 3,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
                jitter_ratio: 0.0,
            };
            let expected = (base_ms as u128 * (1u128 << n)).min(max_ms as u128);
            prop_assert_eq!(policy.backoff_delay(n).as_millis(), expected);
        }

        #[test]
        fn prop_backoff_is_monotonic(n in 0u32..40) {
            let policy = RetryPolicy::default();
            prop_assert!(policy.backoff_delay(n) <= policy.backoff_delay(n + 1));
        }
    }
}
