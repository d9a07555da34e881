//! Viewer configuration (JSON). Every section has defaults, so a partial file is fine.

use crate::error::{ConfigError, Error, Result};
use crate::registry::SortState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "PROCVIEW_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Keep processes whose architecture could not be read
    pub include_inaccessible: bool,
    /// Initial ordering
    pub sort: SortState,
    pub watch: WatchConfig,
    pub output: OutputConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchSource {
    /// OS instrumentation events (WMI); Windows only
    Instrumentation,
    /// Snapshot diff on an interval
    Polling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub source: WatchSource,
    /// Polling source interval (milliseconds)
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// One JSON object per line instead of a table
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: WatchSource::Instrumentation,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ViewerConfig {
    /// `$PROCVIEW_CONFIG_PATH`, else `<config dir>/procview/config.json`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .map(|d| d.join("procview").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    /// Missing file: defaults. Unreadable or malformed file: error.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let wrap = |source: ConfigError| Error::Config {
            path: path.display().to_string(),
            source,
        };
        let data = std::fs::read_to_string(path).map_err(|e| wrap(e.into()))?;
        serde_json::from_str(&data).map_err(|e| wrap(e.into()))
    }

    /// Like [`try_load`](Self::try_load) but falls back to defaults on any error.
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SortAttribute, SortDirection};
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let c = ViewerConfig::load(Path::new("nonexistent-procview.json"));
        assert!(!c.include_inaccessible);
        assert!(!c.watch.enabled);
        assert_eq!(c.sort, SortState::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"sort":{{"attribute":"integrity_level","direction":"descending"}},"watch":{{"enabled":true,"source":"polling"}}}}"#
        )
        .unwrap();
        let c = ViewerConfig::try_load(f.path()).unwrap();
        assert_eq!(c.sort.attribute, SortAttribute::IntegrityLevel);
        assert_eq!(c.sort.direction, SortDirection::Descending);
        assert_eq!(c.watch.source, WatchSource::Polling);
        assert_eq!(c.watch.poll_interval_ms, 1000);
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{ not json").unwrap();
        assert!(matches!(ViewerConfig::try_load(f.path()), Err(Error::Config { .. })));
        assert!(!ViewerConfig::load(f.path()).watch.enabled);
    }
}
