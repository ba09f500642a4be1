//! Budget tables: per-metric ceilings keyed by environment.
//!
//! Resolution for a profile starts from the default table, overlays the
//! device-class table, then the network-class table. Network overrides win
//! when both specify the same metric.
//!
//! ```text
//! default ──► + device[low-end] ──► + network[slow] ──► active table
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::environment::{DeviceClass, EnvironmentProfile, NetworkClass};

/// A measured quantity with a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    /// First contentful paint (ms).
    FirstContentfulPaint,
    /// Largest contentful paint (ms).
    LargestContentfulPaint,
    /// First input delay (ms).
    FirstInputDelay,
    /// Cumulative layout shift (unitless).
    CumulativeLayoutShift,
    /// Time to interactive (ms).
    TimeToInteractive,
    /// Memory in use (MB).
    MemoryUsage,
    /// Accumulated transfer size (KB).
    TransferSize,
    /// Duration of a single resource load (ms).
    ResourceLoadTime,
}

impl MetricKey {
    pub const ALL: [MetricKey; 8] = [
        MetricKey::FirstContentfulPaint,
        MetricKey::LargestContentfulPaint,
        MetricKey::FirstInputDelay,
        MetricKey::CumulativeLayoutShift,
        MetricKey::TimeToInteractive,
        MetricKey::MemoryUsage,
        MetricKey::TransferSize,
        MetricKey::ResourceLoadTime,
    ];

    /// Key used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::FirstContentfulPaint => "fcp",
            MetricKey::LargestContentfulPaint => "lcp",
            MetricKey::FirstInputDelay => "fid",
            MetricKey::CumulativeLayoutShift => "cls",
            MetricKey::TimeToInteractive => "tti",
            MetricKey::MemoryUsage => "memory_mb",
            MetricKey::TransferSize => "transfer_kb",
            MetricKey::ResourceLoadTime => "resource_load_ms",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKey::CumulativeLayoutShift => "",
            MetricKey::MemoryUsage => "MB",
            MetricKey::TransferSize => "KB",
            _ => "ms",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        MetricKey::ALL
            .into_iter()
            .find(|metric| metric.as_str() == key)
            .ok_or_else(|| format!("unknown metric '{}'", s.trim()))
    }
}

/// Mapping from metric to ceiling.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetTable {
    ceilings: BTreeMap<MetricKey, f64>,
}

impl BudgetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, metric: MetricKey, ceiling: f64) -> Self {
        self.ceilings.insert(metric, ceiling);
        self
    }

    pub fn set(&mut self, metric: MetricKey, ceiling: f64) {
        self.ceilings.insert(metric, ceiling);
    }

    pub fn ceiling(&self, metric: MetricKey) -> Option<f64> {
        self.ceilings.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, f64)> + '_ {
        self.ceilings.iter().map(|(metric, ceiling)| (*metric, *ceiling))
    }

    pub fn len(&self) -> usize {
        self.ceilings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ceilings.is_empty()
    }

    /// A copy of `self` with every ceiling in `overrides` replacing ours.
    pub fn overlay(&self, overrides: &BudgetTable) -> BudgetTable {
        let mut merged = self.clone();
        merged
            .ceilings
            .extend(overrides.ceilings.iter().map(|(k, v)| (*k, *v)));
        merged
    }
}

impl FromIterator<(MetricKey, f64)> for BudgetTable {
    fn from_iter<I: IntoIterator<Item = (MetricKey, f64)>>(iter: I) -> Self {
        Self {
            ceilings: iter.into_iter().collect(),
        }
    }
}

/// All budget tables known to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetTables {
    pub default: BudgetTable,
    pub network: HashMap<NetworkClass, BudgetTable>,
    pub device: HashMap<DeviceClass, BudgetTable>,
}

impl Default for BudgetTables {
    fn default() -> Self {
        use MetricKey::*;

        let default = BudgetTable::new()
            .with(FirstContentfulPaint, 1800.0)
            .with(LargestContentfulPaint, 2500.0)
            .with(FirstInputDelay, 100.0)
            .with(CumulativeLayoutShift, 0.1)
            .with(TimeToInteractive, 3800.0)
            .with(MemoryUsage, 50.0)
            .with(TransferSize, 1600.0)
            .with(ResourceLoadTime, 3000.0);

        let slow = BudgetTable::new()
            .with(FirstContentfulPaint, 3000.0)
            .with(LargestContentfulPaint, 4000.0)
            .with(TimeToInteractive, 7300.0)
            .with(TransferSize, 500.0)
            .with(ResourceLoadTime, 8000.0);

        let medium = BudgetTable::new()
            .with(FirstContentfulPaint, 2400.0)
            .with(LargestContentfulPaint, 3200.0)
            .with(TimeToInteractive, 5000.0)
            .with(TransferSize, 1000.0)
            .with(ResourceLoadTime, 5000.0);

        let low_end = BudgetTable::new()
            .with(MemoryUsage, 30.0)
            .with(TimeToInteractive, 6000.0)
            .with(FirstInputDelay, 200.0);

        Self {
            default,
            network: HashMap::from([(NetworkClass::Slow, slow), (NetworkClass::Medium, medium)]),
            device: HashMap::from([(DeviceClass::LowEnd, low_end)]),
        }
    }
}

impl BudgetTables {
    /// Only the default table, no overrides.
    pub fn flat(default: BudgetTable) -> Self {
        Self {
            default,
            network: HashMap::new(),
            device: HashMap::new(),
        }
    }

    /// The full table for `profile`.
    pub fn resolve(&self, profile: &EnvironmentProfile) -> BudgetTable {
        let mut table = self.default.clone();
        if let Some(device) = self.device.get(&profile.device) {
            table = table.overlay(device);
        }
        if let Some(network) = self.network.get(&profile.network) {
            table = table.overlay(network);
        }
        table
    }
}
