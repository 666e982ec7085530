//! config.rs
//! Engine configuration: `<working_root>/seaice.toml`, then `SEAICE_*`
//! environment overrides.

use crate::store::{DateRange, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "seaice.toml";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Leading timestamps averaged for the anomaly baseline.
    pub baseline_window: usize,
    pub default_region: String,
    pub default_scenario: String,
    pub default_date_range: DateRange,
    /// Timestamps per rolling-trend window.
    pub rolling_window: usize,
    pub debounce_ms: u64,
    pub max_delay_ms: u64,
    /// Filter states kept for undo.
    pub history_limit: usize,
    #[serde(skip)]
    pub working_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_window: 30,
            default_region: "nh".to_string(),
            default_scenario: "ssp126".to_string(),
            default_date_range: DateRange { start: ymd(1850, 1, 1), end: ymd(2100, 12, 31) },
            rolling_window: 10,
            debounce_ms: 150,
            max_delay_ms: 1000,
            history_limit: 64,
            working_root: PathBuf::from("."),
        }
    }
}

fn ymd(y: i32, m: u32, d: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }
    pub fn max_delay(&self) -> Duration { Duration::from_millis(self.max_delay_ms) }

    pub fn path_in(working_root: &Path) -> PathBuf { working_root.join(CONFIG_FILE) }

    /// Reads the config file under `working_root` if there is one, applies the
    /// process environment, and validates the result.
    pub fn load(working_root: &Path) -> Result<Self, ConfigError> {
        Self::load_with(working_root, |key| std::env::var(key).ok())
    }

    /// [`EngineConfig::load`] with an explicit variable lookup.
    pub fn load_with<F>(working_root: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = Self::path_in(working_root);
        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| ConfigError::Read { path: path.clone(), reason: e.to_string() })?;
            toml::from_str::<EngineConfig>(&contents)
                .map_err(|e| ConfigError::Parse { path: path.clone(), reason: e.to_string() })?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            EngineConfig::default()
        };
        config.working_root = working_root.to_path_buf();
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Applies `SEAICE_*` overrides. Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = get("SEAICE_DEFAULT_REGION") {
            self.default_region = raw;
        }
        if let Some(raw) = get("SEAICE_DEFAULT_SCENARIO") {
            self.default_scenario = raw;
        }
        if let Some(raw) = get("SEAICE_DEFAULT_DATE_RANGE") {
            match parse_range(&raw) {
                Some(range) => self.default_date_range = range,
                None => tracing::warn!("invalid SEAICE_DEFAULT_DATE_RANGE, ignoring: expected START..END, got {raw}"),
            }
        }
        override_number(&get, "SEAICE_BASELINE_WINDOW", &mut self.baseline_window);
        override_number(&get, "SEAICE_ROLLING_WINDOW", &mut self.rolling_window);
        override_number(&get, "SEAICE_DEBOUNCE_MS", &mut self.debounce_ms);
        override_number(&get, "SEAICE_MAX_DELAY_MS", &mut self.max_delay_ms);
        override_number(&get, "SEAICE_HISTORY_LIMIT", &mut self.history_limit);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baseline_window == 0 {
            return Err(ConfigError::Invalid { field: "baseline_window", reason: "must be at least 1".into() });
        }
        if self.rolling_window == 0 {
            return Err(ConfigError::Invalid { field: "rolling_window", reason: "must be at least 1".into() });
        }
        if self.default_date_range.is_inverted() {
            return Err(ConfigError::Invalid {
                field: "default_date_range",
                reason: format!("start {} is after end {}", self.default_date_range.start, self.default_date_range.end),
            });
        }
        if self.max_delay_ms < self.debounce_ms {
            return Err(ConfigError::Invalid {
                field: "max_delay_ms",
                reason: format!("{} is shorter than debounce_ms {}", self.max_delay_ms, self.debounce_ms),
            });
        }
        Ok(())
    }
}

fn override_number<T, G>(get: &G, key: &str, slot: &mut T)
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(err) => tracing::warn!("invalid {key}, ignoring: {err}"),
        }
    }
}

fn parse_range(raw: &str) -> Option<DateRange> {
    let (start, end) = raw.split_once("..")?;
    let start = start.trim().parse::<NaiveDate>().ok()?;
    let end = end.trim().parse::<NaiveDate>().ok()?;
    Some(DateRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = EngineConfig::load_with(dir.path(), env(&[])).unwrap();
        assert_eq!(cfg.baseline_window, 30);
        assert_eq!(cfg.working_root, dir.path());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            EngineConfig::path_in(dir.path()),
            "baseline_window = 12\ndefault_region = \"sh\"\n\n[default_date_range]\nstart = \"1979-01-01\"\nend = \"2020-12-01\"\n",
        )
        .unwrap();

        let cfg = EngineConfig::load_with(
            dir.path(),
            env(&[("SEAICE_BASELINE_WINDOW", "24"), ("SEAICE_DEBOUNCE_MS", "soon")]),
        )
        .unwrap();

        assert_eq!(cfg.baseline_window, 24);
        assert_eq!(cfg.default_region, "sh");
        assert_eq!(cfg.default_date_range.start, ymd(1979, 1, 1));
        // Bad override ignored.
        assert_eq!(cfg.debounce_ms, 150);
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(EngineConfig::path_in(dir.path()), "colour = \"blue\"\n").unwrap();
        let err = EngineConfig::load_with(dir.path(), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = EngineConfig::load_with(dir.path(), env(&[("SEAICE_MAX_DELAY_MS", "10")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_delay_ms", .. }));

        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(env(&[("SEAICE_DEFAULT_DATE_RANGE", "2000-01-01..1990-01-01")]));
        assert!(cfg.validate().is_err());
    }
}
