//! Common types and utilities shared across CLI commands.

use std::path::Path;
use std::sync::Arc;

use adaptload::environment::{
    CapabilityProvider, DeviceClass, EffectiveType, FixedCapabilities, NetworkClass, NetworkInfo,
    SystemCapabilities,
};
use adaptload::ConfigFile;
use clap::{Args, ValueEnum};

use crate::error::CliError;

/// Memory reported for a simulated low-end device (GB).
const LOW_END_MEMORY_GB: f64 = 1.0;

/// Cores reported for a simulated low-end device.
const LOW_END_CORES: u32 = 2;

/// Network class selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum NetworkArg {
    /// 4g-class connection
    Fast,
    /// 3g-class connection
    Medium,
    /// 2g or slow-2g connection
    Slow,
}

impl NetworkArg {
    pub fn effective_type(self) -> EffectiveType {
        match self {
            NetworkArg::Fast => EffectiveType::FourG,
            NetworkArg::Medium => EffectiveType::ThreeG,
            NetworkArg::Slow => EffectiveType::TwoG,
        }
    }
}

impl From<NetworkArg> for NetworkClass {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Fast => NetworkClass::Fast,
            NetworkArg::Medium => NetworkClass::Medium,
            NetworkArg::Slow => NetworkClass::Slow,
        }
    }
}

/// Device class selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DeviceArg {
    /// A capable device
    Normal,
    /// Little memory, few cores
    LowEnd,
}

impl From<DeviceArg> for DeviceClass {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Normal => DeviceClass::Normal,
            DeviceArg::LowEnd => DeviceClass::LowEnd,
        }
    }
}

/// Environment overrides accepted by several commands.
#[derive(Debug, Clone, Args)]
pub struct EnvironmentArgs {
    /// Network class (probed from the host if omitted)
    #[arg(long, value_enum)]
    pub network: Option<NetworkArg>,

    /// Device class (probed from the host if omitted)
    #[arg(long, value_enum)]
    pub device: Option<DeviceArg>,

    /// Report the data-saver preference as enabled
    #[arg(long)]
    pub save_data: bool,
}

impl EnvironmentArgs {
    /// Capability provider for these arguments.
    ///
    /// A device override switches to fixed capabilities; otherwise the host is
    /// probed, with the network override applied as a hint.
    pub fn provider(&self) -> Arc<dyn CapabilityProvider> {
        let network = self
            .network
            .map(|n| NetworkInfo::new(n.effective_type()).with_save_data(self.save_data));

        match self.device {
            Some(device) => Arc::new(simulated(
                self.network.unwrap_or(NetworkArg::Medium),
                device,
                self.save_data,
            )),
            None => {
                let system = SystemCapabilities::new();
                match network {
                    Some(info) => Arc::new(system.with_network_hint(info)),
                    None => Arc::new(system),
                }
            }
        }
    }
}

/// Fixed capabilities describing a simulated host.
pub fn simulated(network: NetworkArg, device: DeviceArg, save_data: bool) -> FixedCapabilities {
    let preset = match network {
        NetworkArg::Fast => FixedCapabilities::fast(),
        NetworkArg::Medium => FixedCapabilities::medium(),
        NetworkArg::Slow => FixedCapabilities::slow(),
    };
    let preset =
        preset.with_network(NetworkInfo::new(network.effective_type()).with_save_data(save_data));
    match device {
        DeviceArg::Normal => preset,
        DeviceArg::LowEnd => preset
            .with_memory_gb(LOW_END_MEMORY_GB)
            .with_cores(LOW_END_CORES),
    }
}

/// Load configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptload::environment::classify;

    #[test]
    fn test_simulated_presets_classify_as_requested() {
        for network in [NetworkArg::Fast, NetworkArg::Medium, NetworkArg::Slow] {
            for device in [DeviceArg::Normal, DeviceArg::LowEnd] {
                let profile = classify(&simulated(network, device, false));
                assert_eq!(profile.network, NetworkClass::from(network));
                assert_eq!(profile.device, DeviceClass::from(device));
            }
        }
    }

    #[test]
    fn test_save_data_is_reported() {
        let profile = classify(&simulated(NetworkArg::Fast, DeviceArg::Normal, true));
        assert!(profile.save_data);
    }

    #[test]
    fn test_load_config_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("absent.ini")));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
