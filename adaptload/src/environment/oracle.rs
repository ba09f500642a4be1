//! Condition Oracle: derives the environment profile from capability probes.
//!
//! # Derivation
//!
//! Each axis is evaluated independently; first matching rule wins.
//!
//! ```text
//! network: save-data OR effective type in {slow-2g, 2g}  -> slow
//!          effective type 3g                              -> medium
//!          any other reported network                     -> fast
//!          network probe absent/failed                    -> medium
//!
//! device:  memory < 2GB OR cores < 2                      -> low-end
//!          >= 2 of {graphics, background sync, storage}
//!             reported as missing                         -> low-end
//!          otherwise                                      -> normal
//! ```
//!
//! A probe that is unsupported or fails counts as "signal absent": it never
//! matches a rule, so the axis falls through to its default. The oracle itself
//! never fails and never blocks.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::capabilities::{CapabilityProvider, ProbeResult};
use super::profile::{DeviceClass, EffectiveType, EnvironmentProfile, NetworkClass};
use crate::subscription::{Listeners, Subscription};

/// Memory (GB) below which a device is low-end.
pub const LOW_END_MEMORY_GB: f64 = 2.0;

/// Logical core count below which a device is low-end.
pub const LOW_END_CORES: u32 = 2;

/// Number of simultaneously missing features that marks a device low-end.
pub const LOW_END_MISSING_FEATURES: usize = 2;

/// Derive a profile from the given provider.
pub fn classify(provider: &dyn CapabilityProvider) -> EnvironmentProfile {
    let (network, save_data) = classify_network(provider);
    let device = classify_device(provider);
    EnvironmentProfile::new(network, device, save_data)
}

fn classify_network(provider: &dyn CapabilityProvider) -> (NetworkClass, bool) {
    let info = match provider.network() {
        Ok(info) => info,
        Err(e) => {
            tracing::trace!(error = %e, "Network probe absent, defaulting to medium");
            return (NetworkClass::Medium, false);
        }
    };

    let class = if info.save_data
        || matches!(
            info.effective_type,
            Some(EffectiveType::Slow2g) | Some(EffectiveType::TwoG)
        ) {
        NetworkClass::Slow
    } else if info.effective_type == Some(EffectiveType::ThreeG) {
        NetworkClass::Medium
    } else {
        NetworkClass::Fast
    };

    (class, info.save_data)
}

fn classify_device(provider: &dyn CapabilityProvider) -> DeviceClass {
    if let Ok(memory) = provider.device_memory_gb() {
        if memory < LOW_END_MEMORY_GB {
            return DeviceClass::LowEnd;
        }
    }

    if let Ok(cores) = provider.logical_cores() {
        if cores < LOW_END_CORES {
            return DeviceClass::LowEnd;
        }
    }

    let features: [ProbeResult<bool>; 3] = [
        provider.accelerated_graphics(),
        provider.background_sync(),
        provider.structured_storage(),
    ];
    let missing = features.iter().filter(|f| matches!(f, Ok(false))).count();
    if missing >= LOW_END_MISSING_FEATURES {
        return DeviceClass::LowEnd;
    }

    DeviceClass::Normal
}

/// Holds the current environment profile and notifies on change.
///
/// The host calls [`ConditionOracle::network_changed`] or
/// [`ConditionOracle::resized`] when the platform reports a change; the oracle
/// re-probes and, if the derived profile differs, replaces it and notifies
/// subscribers.
///
/// # Example
///
/// ```
/// use adaptload::environment::{ConditionOracle, FixedCapabilities, NetworkClass};
/// use std::sync::Arc;
///
/// let oracle = ConditionOracle::new(Arc::new(FixedCapabilities::slow()));
/// assert_eq!(oracle.current_profile().network, NetworkClass::Slow);
/// ```
pub struct ConditionOracle {
    provider: Arc<dyn CapabilityProvider>,
    current: RwLock<EnvironmentProfile>,
    listeners: Listeners<EnvironmentProfile>,
}

impl ConditionOracle {
    /// Create an oracle and derive the initial profile.
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        let initial = classify(provider.as_ref());
        tracing::debug!(profile = %initial, "Initial environment profile");
        Self {
            provider,
            current: RwLock::new(initial),
            listeners: Listeners::new(),
        }
    }

    /// The current profile.
    pub fn current_profile(&self) -> EnvironmentProfile {
        *self.current.read()
    }

    /// Register a change callback. The callback receives the new profile.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&EnvironmentProfile) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Re-probe and publish if the profile changed.
    ///
    /// Returns `true` if the profile changed.
    pub fn refresh(&self) -> bool {
        let next = classify(self.provider.as_ref());
        {
            let mut current = self.current.write();
            if *current == next {
                return false;
            }
            tracing::info!(from = %*current, to = %next, "Environment profile changed");
            *current = next;
        }
        self.listeners.emit(&next);
        true
    }

    /// Platform reported a network change.
    pub fn network_changed(&self) -> bool {
        self.refresh()
    }

    /// Platform reported a resize.
    pub fn resized(&self) -> bool {
        self.refresh()
    }
}

impl fmt::Debug for ConditionOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionOracle")
            .field("current", &*self.current.read())
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}
