//! Capability probes behind a provider trait.
//!
//! The Condition Oracle never touches platform APIs directly; it asks a
//! [`CapabilityProvider`]. Each probe returns a [`ProbeResult`] so that an
//! unsupported API and a probe that fails at runtime are both visible to the
//! oracle, which treats either as "signal absent".
//!
//! # Implementors
//!
//! - [`SystemCapabilities`] - reads the host (memory, cores, GPU nodes,
//!   data directory) plus an optional configured network hint
//! - [`FixedCapabilities`] - fixed values, for deterministic tests and the
//!   simulator

use std::path::Path;

use thiserror::Error;

use super::profile::EffectiveType;

/// Why a probe produced no value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The platform does not expose this signal.
    #[error("capability not supported on this platform")]
    Unsupported,

    /// The probe exists but failed while reading.
    #[error("capability probe failed: {0}")]
    Failed(String),
}

/// Result type for capability probes.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Network information snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NetworkInfo {
    /// Effective connection type, if the platform reports one.
    pub effective_type: Option<EffectiveType>,
    /// User has asked for reduced data usage.
    pub save_data: bool,
}

impl NetworkInfo {
    pub fn new(effective_type: EffectiveType) -> Self {
        Self {
            effective_type: Some(effective_type),
            save_data: false,
        }
    }

    pub fn with_save_data(mut self, save_data: bool) -> Self {
        self.save_data = save_data;
        self
    }
}

/// Reads device and network signals.
///
/// Probes must not block for long; the oracle calls them on every change
/// notification.
pub trait CapabilityProvider: Send + Sync {
    /// Connection information.
    fn network(&self) -> ProbeResult<NetworkInfo>;

    /// Available device memory in gigabytes.
    fn device_memory_gb(&self) -> ProbeResult<f64>;

    /// Number of logical cores.
    fn logical_cores(&self) -> ProbeResult<u32>;

    /// Whether accelerated graphics is available.
    fn accelerated_graphics(&self) -> ProbeResult<bool>;

    /// Whether background synchronization is available.
    fn background_sync(&self) -> ProbeResult<bool>;

    /// Whether structured local storage is available.
    fn structured_storage(&self) -> ProbeResult<bool>;
}

// =============================================================================
// Fixed Capabilities
// =============================================================================

/// Capability provider returning fixed values.
///
/// `None` fields report [`ProbeError::Unsupported`]. Use [`Self::failing`] to
/// make every probe fail, which exercises the oracle's fallback path.
#[derive(Debug, Clone, Default)]
pub struct FixedCapabilities {
    pub network: Option<NetworkInfo>,
    pub device_memory_gb: Option<f64>,
    pub logical_cores: Option<u32>,
    pub accelerated_graphics: Option<bool>,
    pub background_sync: Option<bool>,
    pub structured_storage: Option<bool>,
    failing: bool,
}

impl FixedCapabilities {
    /// A capable device on a 4g connection.
    pub fn fast() -> Self {
        Self {
            network: Some(NetworkInfo::new(EffectiveType::FourG)),
            device_memory_gb: Some(8.0),
            logical_cores: Some(8),
            accelerated_graphics: Some(true),
            background_sync: Some(true),
            structured_storage: Some(true),
            failing: false,
        }
    }

    /// A capable device on a 3g connection.
    pub fn medium() -> Self {
        Self::fast().with_network(NetworkInfo::new(EffectiveType::ThreeG))
    }

    /// A capable device on a 2g connection.
    pub fn slow() -> Self {
        Self::fast().with_network(NetworkInfo::new(EffectiveType::TwoG))
    }

    /// Every probe fails at runtime.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_network(mut self, network: NetworkInfo) -> Self {
        self.network = Some(network);
        self
    }

    pub fn without_network(mut self) -> Self {
        self.network = None;
        self
    }

    pub fn with_memory_gb(mut self, gb: f64) -> Self {
        self.device_memory_gb = Some(gb);
        self
    }

    pub fn with_cores(mut self, cores: u32) -> Self {
        self.logical_cores = Some(cores);
        self
    }

    pub fn with_features(mut self, graphics: bool, background_sync: bool, storage: bool) -> Self {
        self.accelerated_graphics = Some(graphics);
        self.background_sync = Some(background_sync);
        self.structured_storage = Some(storage);
        self
    }

    fn read<T: Copy>(&self, value: Option<T>) -> ProbeResult<T> {
        if self.failing {
            return Err(ProbeError::Failed("probe threw".to_string()));
        }
        value.ok_or(ProbeError::Unsupported)
    }
}

impl CapabilityProvider for FixedCapabilities {
    fn network(&self) -> ProbeResult<NetworkInfo> {
        self.read(self.network)
    }

    fn device_memory_gb(&self) -> ProbeResult<f64> {
        self.read(self.device_memory_gb)
    }

    fn logical_cores(&self) -> ProbeResult<u32> {
        self.read(self.logical_cores)
    }

    fn accelerated_graphics(&self) -> ProbeResult<bool> {
        self.read(self.accelerated_graphics)
    }

    fn background_sync(&self) -> ProbeResult<bool> {
        self.read(self.background_sync)
    }

    fn structured_storage(&self) -> ProbeResult<bool> {
        self.read(self.structured_storage)
    }
}

// =============================================================================
// System Capabilities
// =============================================================================

/// Path to the kernel memory summary.
const MEMINFO_PATH: &str = "/proc/meminfo";

/// Directory holding DRM render nodes.
const DRI_PATH: &str = "/dev/dri";

/// Capability provider reading the host system.
///
/// There is no portable way to learn the connection type from the host, so
/// the network probe reports the configured hint, or `Unsupported` without
/// one (which the oracle maps to a medium network).
#[derive(Debug, Clone, Default)]
pub struct SystemCapabilities {
    network_hint: Option<NetworkInfo>,
}

impl SystemCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `network` from the network probe.
    pub fn with_network_hint(mut self, network: NetworkInfo) -> Self {
        self.network_hint = Some(network);
        self
    }
}

impl CapabilityProvider for SystemCapabilities {
    fn network(&self) -> ProbeResult<NetworkInfo> {
        self.network_hint.ok_or(ProbeError::Unsupported)
    }

    fn device_memory_gb(&self) -> ProbeResult<f64> {
        if !cfg!(target_os = "linux") {
            return Err(ProbeError::Unsupported);
        }
        let contents = std::fs::read_to_string(MEMINFO_PATH)
            .map_err(|e| ProbeError::Failed(format!("{}: {}", MEMINFO_PATH, e)))?;
        parse_mem_available_gb(&contents)
            .ok_or_else(|| ProbeError::Failed("MemAvailable not reported".to_string()))
    }

    fn logical_cores(&self) -> ProbeResult<u32> {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .map_err(|e| ProbeError::Failed(e.to_string()))
    }

    fn accelerated_graphics(&self) -> ProbeResult<bool> {
        if !cfg!(target_os = "linux") {
            return Err(ProbeError::Unsupported);
        }
        Ok(Path::new(DRI_PATH).is_dir())
    }

    fn background_sync(&self) -> ProbeResult<bool> {
        Err(ProbeError::Unsupported)
    }

    fn structured_storage(&self) -> ProbeResult<bool> {
        Ok(dirs::data_dir().is_some())
    }
}

/// Extract `MemAvailable` from `/proc/meminfo` contents, in gigabytes.
fn parse_mem_available_gb(meminfo: &str) -> Option<f64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_unsupported_fields() {
        let caps = FixedCapabilities::default();
        assert_eq!(caps.network(), Err(ProbeError::Unsupported));
        assert_eq!(caps.logical_cores(), Err(ProbeError::Unsupported));
    }

    #[test]
    fn test_fixed_failing_probes() {
        let caps = FixedCapabilities::failing();
        assert!(matches!(caps.device_memory_gb(), Err(ProbeError::Failed(_))));
        assert!(matches!(caps.background_sync(), Err(ProbeError::Failed(_))));
    }

    #[test]
    fn test_fixed_presets() {
        assert_eq!(
            FixedCapabilities::slow().network().map(|n| n.effective_type),
            Ok(Some(EffectiveType::TwoG))
        );
        assert_eq!(FixedCapabilities::fast().logical_cores(), Ok(8));
    }

    #[test]
    fn test_parse_mem_available() {
        let meminfo = "MemTotal:       16384000 kB\nMemFree:         1000 kB\nMemAvailable:    2097152 kB\n";
        let gb = parse_mem_available_gb(meminfo).unwrap();
        assert!((gb - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_mem_available_missing() {
        assert!(parse_mem_available_gb("MemTotal: 100 kB\n").is_none());
    }

    #[test]
    fn test_system_network_hint() {
        let caps = SystemCapabilities::new();
        assert_eq!(caps.network(), Err(ProbeError::Unsupported));

        let caps = caps.with_network_hint(NetworkInfo::new(EffectiveType::ThreeG));
        assert_eq!(
            caps.network().map(|n| n.effective_type),
            Ok(Some(EffectiveType::ThreeG))
        );
    }

    #[test]
    fn test_system_cores_reported() {
        let caps = SystemCapabilities::new();
        assert!(caps.logical_cores().map(|c| c >= 1).unwrap_or(true));
    }
}
