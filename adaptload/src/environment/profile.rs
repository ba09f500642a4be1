//! Environment profile types.
//!
//! An [`EnvironmentProfile`] is the coarse classification of the current
//! network and device that every other component scales its thresholds by.
//! It is `Copy` and always replaced as a whole, so consumers never observe a
//! partially updated profile.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Coarse network speed class.
///
/// Ordered from worst to best, so `NetworkClass::Slow < NetworkClass::Fast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkClass {
    Slow,
    Medium,
    Fast,
}

impl NetworkClass {
    /// All classes, worst first.
    pub const ALL: [NetworkClass; 3] = [
        NetworkClass::Slow,
        NetworkClass::Medium,
        NetworkClass::Fast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkClass::Slow => "slow",
            NetworkClass::Medium => "medium",
            NetworkClass::Fast => "fast",
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Ok(NetworkClass::Slow),
            "medium" => Ok(NetworkClass::Medium),
            "fast" => Ok(NetworkClass::Fast),
            other => Err(format!("unknown network class '{}'", other)),
        }
    }
}

/// Coarse device capability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    LowEnd,
    Normal,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 2] = [DeviceClass::LowEnd, DeviceClass::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::LowEnd => "low-end",
            DeviceClass::Normal => "normal",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low-end" | "low_end" | "lowend" => Ok(DeviceClass::LowEnd),
            "normal" => Ok(DeviceClass::Normal),
            other => Err(format!("unknown device class '{}'", other)),
        }
    }
}

/// Effective connection type as reported by the platform.
///
/// The two slowest tiers (`Slow2g`, `TwoG`) classify as a slow network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectiveType {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
}

impl EffectiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveType::Slow2g => "slow-2g",
            EffectiveType::TwoG => "2g",
            EffectiveType::ThreeG => "3g",
            EffectiveType::FourG => "4g",
        }
    }
}

impl fmt::Display for EffectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow-2g" => Ok(EffectiveType::Slow2g),
            "2g" => Ok(EffectiveType::TwoG),
            "3g" => Ok(EffectiveType::ThreeG),
            "4g" => Ok(EffectiveType::FourG),
            other => Err(format!("unknown effective connection type '{}'", other)),
        }
    }
}

/// Derived classification of the current network and device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EnvironmentProfile {
    pub network: NetworkClass,
    pub device: DeviceClass,
    pub save_data: bool,
}

impl EnvironmentProfile {
    pub fn new(network: NetworkClass, device: DeviceClass, save_data: bool) -> Self {
        Self {
            network,
            device,
            save_data,
        }
    }

    /// True when the network is anything but fast.
    pub fn is_degraded(&self) -> bool {
        self.network != NetworkClass::Fast
    }

    pub fn is_low_end(&self) -> bool {
        self.device == DeviceClass::LowEnd
    }
}

impl Default for EnvironmentProfile {
    /// The profile used when no signal is available: medium network, normal device.
    fn default() -> Self {
        Self::new(NetworkClass::Medium, DeviceClass::Normal, false)
    }
}

impl fmt::Display for EnvironmentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.device)?;
        if self.save_data {
            write!(f, " (save-data)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_class_ordering() {
        assert!(NetworkClass::Slow < NetworkClass::Medium);
        assert!(NetworkClass::Medium < NetworkClass::Fast);
    }

    #[test]
    fn test_network_class_parse() {
        assert_eq!("SLOW".parse::<NetworkClass>(), Ok(NetworkClass::Slow));
        assert_eq!(" fast ".parse::<NetworkClass>(), Ok(NetworkClass::Fast));
        assert!("turbo".parse::<NetworkClass>().is_err());
    }

    #[test]
    fn test_device_class_parse() {
        assert_eq!("low-end".parse::<DeviceClass>(), Ok(DeviceClass::LowEnd));
        assert_eq!("low_end".parse::<DeviceClass>(), Ok(DeviceClass::LowEnd));
        assert_eq!("normal".parse::<DeviceClass>(), Ok(DeviceClass::Normal));
    }

    #[test]
    fn test_effective_type_parse() {
        assert_eq!("slow-2g".parse::<EffectiveType>(), Ok(EffectiveType::Slow2g));
        assert_eq!("4G".parse::<EffectiveType>(), Ok(EffectiveType::FourG));
        assert!("5g".parse::<EffectiveType>().is_err());
    }

    #[test]
    fn test_default_profile() {
        let profile = EnvironmentProfile::default();
        assert_eq!(profile.network, NetworkClass::Medium);
        assert_eq!(profile.device, DeviceClass::Normal);
        assert!(!profile.save_data);
        assert!(profile.is_degraded());
    }

    #[test]
    fn test_profile_display() {
        let profile = EnvironmentProfile::new(NetworkClass::Slow, DeviceClass::LowEnd, true);
        assert_eq!(profile.to_string(), "slow/low-end (save-data)");
    }
}
