//! Device and network conditions.
//!
//! The [`ConditionOracle`] turns capability probes into an
//! [`EnvironmentProfile`], the single piece of state shared by the visibility
//! trigger, the loader's stagger policy and the budget evaluator.
//!
//! # Module Structure
//!
//! ```text
//! environment/
//! ├── mod.rs           # This file - module exports
//! ├── profile.rs       # NetworkClass, DeviceClass, EnvironmentProfile
//! ├── capabilities.rs  # CapabilityProvider trait, System/Fixed providers
//! └── oracle.rs        # Derivation rules and change notification
//! ```

mod capabilities;
mod oracle;
mod profile;

pub use capabilities::{
    CapabilityProvider, FixedCapabilities, NetworkInfo, ProbeError, ProbeResult,
    SystemCapabilities,
};
pub use oracle::{classify, ConditionOracle, LOW_END_CORES, LOW_END_MEMORY_GB};
pub use profile::{DeviceClass, EffectiveType, EnvironmentProfile, NetworkClass};
