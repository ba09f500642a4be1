//! INI configuration.
//!
//! Every setting has a default; a file only needs the keys it changes.
//!
//! ```ini
//! [loader]
//! retry_ceiling = 3
//! base_delay_ms = 1000
//! max_delay_ms = 10000
//! jitter_ratio = 0.1
//! stagger_medium_ms = 150
//! stagger_slow_ms = 500
//! attempt_timeout_ms = 10000
//! slow_load_ms = 3000
//!
//! [visibility]
//! margin_slow_px = 20
//! margin_medium_px = 50
//! margin_fast_px = 100
//! threshold = 0.1
//! scroll_sample_ms = 100
//! velocity_threshold_px = 50
//! look_ahead_px = 200
//!
//! [preload]
//! yield_interval_ms = 10
//!
//! [budget]
//! score_window_ms = 60000
//! retention_ms = 60000
//! memory_sample_ms = 5000
//! load_history = 256
//!
//! [budget.default]
//! fcp = 1800
//! cls = 0.1
//!
//! [budget.network.slow]
//! fcp = 3000
//!
//! [budget.device.low-end]
//! memory_mb = 30
//!
//! [logging]
//! level = info
//! directory = /var/log/adaptload
//! file_name = adaptload.log
//! ansi = true
//! ```
//!
//! Budget sections overlay the built-in tables: a key in
//! `[budget.network.slow]` replaces only that metric of the slow table.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use crate::budget::{BudgetConfig, BudgetTable, MetricKey};
use crate::environment::{DeviceClass, NetworkClass};
use crate::error::ConfigError;
use crate::loader::LoaderConfig;
use crate::logging::LoggingConfig;
use crate::preload::PreloadConfig;
use crate::visibility::VisibilityConfig;

/// Directory under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "adaptload";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

const BUDGET_DEFAULT_SECTION: &str = "budget.default";
const BUDGET_NETWORK_PREFIX: &str = "budget.network.";
const BUDGET_DEVICE_PREFIX: &str = "budget.device.";

/// `<config_dir>/adaptload/config.ini`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// All runtime settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub loader: LoaderConfig,
    pub visibility: VisibilityConfig,
    pub preload: PreloadConfig,
    pub budget: BudgetConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini_str(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse INI text.
    pub fn from_ini_str(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        for (name, props) in ini.iter() {
            let Some(name) = name else {
                if !props.is_empty() {
                    tracing::warn!("Ignoring keys outside of any section");
                }
                continue;
            };
            let section = Section { name, props };
            match name {
                "loader" => section.apply_loader(&mut config.loader)?,
                "visibility" => section.apply_visibility(&mut config.visibility)?,
                "preload" => section.apply_preload(&mut config.preload)?,
                "budget" => section.apply_budget(&mut config.budget)?,
                "logging" => section.apply_logging(&mut config.logging)?,
                BUDGET_DEFAULT_SECTION => section.apply_ceilings(&mut config.budget.tables.default)?,
                _ => {
                    if let Some(class) = name.strip_prefix(BUDGET_NETWORK_PREFIX) {
                        let network = NetworkClass::from_str(class)
                            .map_err(|reason| section.invalid("", class, reason))?;
                        let table = config.budget.tables.network.entry(network).or_default();
                        section.apply_ceilings(table)?;
                    } else if let Some(class) = name.strip_prefix(BUDGET_DEVICE_PREFIX) {
                        let device = DeviceClass::from_str(class)
                            .map_err(|reason| section.invalid("", class, reason))?;
                        let table = config.budget.tables.device.entry(device).or_default();
                        section.apply_ceilings(table)?;
                    } else {
                        tracing::warn!(section = name, "Ignoring unknown config section");
                    }
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks.
    fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.loader.retry;
        if retry.base_delay > retry.max_delay {
            return Err(ConfigError::InvalidValue {
                section: "loader".into(),
                key: "base_delay_ms".into(),
                value: retry.base_delay.as_millis().to_string(),
                reason: "must not exceed max_delay_ms".into(),
            });
        }
        let v = &self.visibility;
        if v.margin_slow_px >= v.margin_medium_px {
            return Err(ConfigError::InvalidValue {
                section: "visibility".into(),
                key: "margin_slow_px".into(),
                value: v.margin_slow_px.to_string(),
                reason: "must be smaller than margin_medium_px".into(),
            });
        }
        if v.margin_medium_px >= v.margin_fast_px {
            return Err(ConfigError::InvalidValue {
                section: "visibility".into(),
                key: "margin_medium_px".into(),
                value: v.margin_medium_px.to_string(),
                reason: "must be smaller than margin_fast_px".into(),
            });
        }
        let b = &self.budget;
        if b.score_window > b.retention {
            return Err(ConfigError::InvalidValue {
                section: "budget".into(),
                key: "score_window_ms".into(),
                value: b.score_window.as_millis().to_string(),
                reason: "must not exceed retention_ms".into(),
            });
        }
        Ok(())
    }

    /// Render as INI, including every default.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        let l = &self.loader;
        ini.with_section(Some("loader"))
            .set("retry_ceiling", l.retry.retry_ceiling.to_string())
            .set("base_delay_ms", millis(l.retry.base_delay))
            .set("max_delay_ms", millis(l.retry.max_delay))
            .set("jitter_ratio", l.retry.jitter_ratio.to_string())
            .set("stagger_medium_ms", millis(l.stagger.medium))
            .set("stagger_slow_ms", millis(l.stagger.slow))
            .set("attempt_timeout_ms", millis(l.attempt_timeout))
            .set("slow_load_ms", millis(l.slow_load_threshold));

        let v = &self.visibility;
        ini.with_section(Some("visibility"))
            .set("margin_slow_px", v.margin_slow_px.to_string())
            .set("margin_medium_px", v.margin_medium_px.to_string())
            .set("margin_fast_px", v.margin_fast_px.to_string())
            .set("threshold", v.threshold.to_string())
            .set("scroll_sample_ms", millis(v.scroll_sample_interval))
            .set("velocity_threshold_px", v.velocity_threshold_px.to_string())
            .set("look_ahead_px", v.look_ahead_px.to_string());

        ini.with_section(Some("preload"))
            .set("yield_interval_ms", millis(self.preload.yield_interval));

        let b = &self.budget;
        ini.with_section(Some("budget"))
            .set("score_window_ms", millis(b.score_window))
            .set("retention_ms", millis(b.retention))
            .set("memory_sample_ms", millis(b.memory_sample_interval))
            .set("load_history", b.load_history.to_string());

        write_table(&mut ini, BUDGET_DEFAULT_SECTION.to_string(), &b.tables.default);
        for network in NetworkClass::ALL {
            if let Some(table) = b.tables.network.get(&network) {
                write_table(&mut ini, format!("{}{}", BUDGET_NETWORK_PREFIX, network), table);
            }
        }
        for device in [DeviceClass::LowEnd, DeviceClass::Normal] {
            if let Some(table) = b.tables.device.get(&device) {
                write_table(&mut ini, format!("{}{}", BUDGET_DEVICE_PREFIX, device), table);
            }
        }

        let g = &self.logging;
        ini.with_section(Some("logging"))
            .set("level", g.level.clone())
            .set("file_name", g.file_name.clone())
            .set("ansi", g.ansi.to_string());
        if let Some(directory) = &g.directory {
            ini.set_to(
                Some("logging"),
                "directory".to_string(),
                directory.display().to_string(),
            );
        }
        ini
    }
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}

fn write_table(ini: &mut Ini, section: String, table: &BudgetTable) {
    for (metric, ceiling) in table.iter() {
        ini.set_to(
            Some(section.as_str()),
            metric.as_str().to_string(),
            ceiling.to_string(),
        );
    }
}

// =============================================================================
// Section Parsing
// =============================================================================

struct Section<'a> {
    name: &'a str,
    props: &'a Properties,
}

impl Section<'_> {
    fn invalid(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn parse<T: FromStr>(&self, key: &str, value: &str) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| self.invalid(key, value, e.to_string()))
    }

    fn non_negative(&self, key: &str, value: &str) -> Result<f64, ConfigError> {
        let parsed: f64 = self.parse(key, value)?;
        if !parsed.is_finite() || parsed < 0.0 {
            return Err(self.invalid(key, value, "must be a non-negative number"));
        }
        Ok(parsed)
    }

    fn millis(&self, key: &str, value: &str) -> Result<Duration, ConfigError> {
        self.parse::<u64>(key, value).map(Duration::from_millis)
    }

    fn unknown(&self, key: &str) {
        tracing::warn!(section = self.name, key, "Ignoring unknown config key");
    }

    fn apply_loader(&self, loader: &mut LoaderConfig) -> Result<(), ConfigError> {
        for (key, value) in self.props.iter() {
            match key {
                "retry_ceiling" => loader.retry.retry_ceiling = self.parse(key, value)?,
                "base_delay_ms" => loader.retry.base_delay = self.millis(key, value)?,
                "max_delay_ms" => loader.retry.max_delay = self.millis(key, value)?,
                "jitter_ratio" => {
                    let ratio = self.non_negative(key, value)?;
                    if ratio > 1.0 {
                        return Err(self.invalid(key, value, "must be between 0 and 1"));
                    }
                    loader.retry.jitter_ratio = ratio;
                }
                "stagger_medium_ms" => loader.stagger.medium = self.millis(key, value)?,
                "stagger_slow_ms" => loader.stagger.slow = self.millis(key, value)?,
                "attempt_timeout_ms" => {
                    let timeout = self.millis(key, value)?;
                    if timeout.is_zero() {
                        return Err(self.invalid(key, value, "must be greater than 0"));
                    }
                    loader.attempt_timeout = timeout;
                }
                "slow_load_ms" => loader.slow_load_threshold = self.millis(key, value)?,
                _ => self.unknown(key),
            }
        }
        Ok(())
    }

    fn apply_visibility(&self, visibility: &mut VisibilityConfig) -> Result<(), ConfigError> {
        for (key, value) in self.props.iter() {
            match key {
                "margin_slow_px" => visibility.margin_slow_px = self.non_negative(key, value)?,
                "margin_medium_px" => visibility.margin_medium_px = self.non_negative(key, value)?,
                "margin_fast_px" => visibility.margin_fast_px = self.non_negative(key, value)?,
                "threshold" => {
                    let threshold = self.non_negative(key, value)?;
                    if threshold > 1.0 {
                        return Err(self.invalid(key, value, "must be between 0 and 1"));
                    }
                    visibility.threshold = threshold;
                }
                "scroll_sample_ms" => {
                    let interval = self.millis(key, value)?;
                    if interval.is_zero() {
                        return Err(self.invalid(key, value, "must be greater than 0"));
                    }
                    visibility.scroll_sample_interval = interval;
                }
                "velocity_threshold_px" => {
                    visibility.velocity_threshold_px = self.non_negative(key, value)?
                }
                "look_ahead_px" => visibility.look_ahead_px = self.non_negative(key, value)?,
                _ => self.unknown(key),
            }
        }
        Ok(())
    }

    fn apply_preload(&self, preload: &mut PreloadConfig) -> Result<(), ConfigError> {
        for (key, value) in self.props.iter() {
            match key {
                "yield_interval_ms" => preload.yield_interval = self.millis(key, value)?,
                _ => self.unknown(key),
            }
        }
        Ok(())
    }

    fn apply_budget(&self, budget: &mut BudgetConfig) -> Result<(), ConfigError> {
        for (key, value) in self.props.iter() {
            match key {
                "score_window_ms" => budget.score_window = self.millis(key, value)?,
                "retention_ms" => budget.retention = self.millis(key, value)?,
                "memory_sample_ms" => {
                    let interval = self.millis(key, value)?;
                    if interval.is_zero() {
                        return Err(self.invalid(key, value, "must be greater than 0"));
                    }
                    budget.memory_sample_interval = interval;
                }
                "load_history" => budget.load_history = self.parse(key, value)?,
                _ => self.unknown(key),
            }
        }
        Ok(())
    }

    /// Metric keys are strict: an unknown metric is an error.
    fn apply_ceilings(&self, table: &mut BudgetTable) -> Result<(), ConfigError> {
        for (key, value) in self.props.iter() {
            let metric = MetricKey::from_str(key).map_err(|reason| self.invalid(key, value, reason))?;
            let ceiling = self.non_negative(key, value)?;
            if ceiling == 0.0 {
                return Err(self.invalid(key, value, "ceiling must be greater than 0"));
            }
            table.set(metric, ceiling);
        }
        Ok(())
    }

    fn apply_logging(&self, logging: &mut LoggingConfig) -> Result<(), ConfigError> {
        for (key, value) in self.props.iter() {
            match key {
                "level" => logging.level = value.trim().to_string(),
                "directory" => {
                    let trimmed = value.trim();
                    logging.directory = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
                }
                "file_name" => logging.file_name = value.trim().to_string(),
                "ansi" => logging.ansi = self.parse(key, value)?,
                _ => self.unknown(key),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_yields_defaults() {
        assert_eq!(ConfigFile::from_ini_str("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_loader_section() {
        let config = ConfigFile::from_ini_str(
            "[loader]\nretry_ceiling = 5\nbase_delay_ms = 250\nstagger_slow_ms = 800\n",
        )
        .unwrap();
        assert_eq!(config.loader.retry.retry_ceiling, 5);
        assert_eq!(config.loader.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.loader.stagger.slow, Duration::from_millis(800));
        assert_eq!(config.loader.stagger.medium, LoaderConfig::default().stagger.medium);
    }

    #[test]
    fn test_budget_overlay_sections() {
        let config = ConfigFile::from_ini_str(
            "[budget.default]\ncls = 0.2\n\n[budget.network.slow]\nfcp = 3500\n\n[budget.device.normal]\nmemory_mb = 80\n",
        )
        .unwrap();
        let tables = &config.budget.tables;
        assert_eq!(tables.default.ceiling(MetricKey::CumulativeLayoutShift), Some(0.2));
        assert_eq!(tables.default.ceiling(MetricKey::FirstContentfulPaint), Some(1800.0));

        let slow = &tables.network[&NetworkClass::Slow];
        assert_eq!(slow.ceiling(MetricKey::FirstContentfulPaint), Some(3500.0));
        assert_eq!(slow.ceiling(MetricKey::LargestContentfulPaint), Some(4000.0));

        assert_eq!(
            tables.device[&DeviceClass::Normal].ceiling(MetricKey::MemoryUsage),
            Some(80.0)
        );
    }

    #[test]
    fn test_unknown_metric_rejected_with_context() {
        let err = ConfigError::to_string(
            &ConfigFile::from_ini_str("[budget.default]\nfps = 60\n").unwrap_err(),
        );
        assert!(err.contains("budget.default"));
        assert!(err.contains("fps"));
    }

    #[test]
    fn test_unknown_network_class_rejected() {
        let err = ConfigFile::from_ini_str("[budget.network.5g]\nfcp = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_bad_number_rejected() {
        let err = ConfigFile::from_ini_str("[loader]\nmax_delay_ms = soon\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "loader");
                assert_eq!(key, "max_delay_ms");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_jitter_ratio_range() {
        assert!(ConfigFile::from_ini_str("[loader]\njitter_ratio = 1.5\n").is_err());
        assert!(ConfigFile::from_ini_str("[loader]\njitter_ratio = 0\n").is_ok());
    }

    #[test]
    fn test_base_delay_above_max_rejected() {
        let err = ConfigFile::from_ini_str("[loader]\nbase_delay_ms = 20000\n").unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn test_inverted_margins_rejected() {
        assert!(ConfigFile::from_ini_str("[visibility]\nmargin_slow_px = 500\n").is_err());
    }

    #[test]
    fn test_equal_margins_rejected_naming_key() {
        let err = ConfigFile::from_ini_str(
            "[visibility]\nmargin_slow_px = 50\nmargin_medium_px = 50\nmargin_fast_px = 50\n",
        )
        .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "margin_slow_px"),
            other => panic!("unexpected error: {other}"),
        }

        let err = ConfigFile::from_ini_str("[visibility]\nmargin_fast_px = 50\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "margin_medium_px"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_score_window_beyond_retention_rejected() {
        let err = ConfigFile::from_ini_str("[budget]\nscore_window_ms = 120000\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "budget");
                assert_eq!(key, "score_window_ms");
            }
            other => panic!("unexpected error: {other}"),
        }
        let config = ConfigFile::from_ini_str(
            "[budget]\nscore_window_ms = 120000\nretention_ms = 120000\n",
        )
        .unwrap();
        assert_eq!(config.budget.score_window, config.budget.retention);
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        assert!(ConfigFile::from_ini_str("[budget.default]\nfid = 0\n").is_err());
    }

    #[test]
    fn test_unknown_keys_and_sections_ignored() {
        let config = ConfigFile::from_ini_str("[loader]\nturbo = yes\n\n[extras]\na = b\n").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_logging_section() {
        let config = ConfigFile::from_ini_str(
            "[logging]\nlevel = debug\ndirectory = /tmp/adaptload-logs\nansi = false\n",
        )
        .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory, Some(PathBuf::from("/tmp/adaptload-logs")));
        assert!(!config.logging.ansi);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[preload]\nyield_interval_ms = 25").unwrap();
        let config = ConfigFile::load_from(file.path()).unwrap();
        assert_eq!(config.preload.yield_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigFile::load_from(&dir.path().join("nope.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_rendered_defaults_parse_back() {
        let defaults = ConfigFile::default();
        let mut buf = Vec::new();
        defaults.to_ini().write_to(&mut buf).unwrap();
        let parsed = ConfigFile::from_ini_str(&String::from_utf8(buf).unwrap()).unwrap();
        assert_eq!(parsed, defaults);
    }
}
