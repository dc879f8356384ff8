//! Engine configuration.
//!
//! Every section and field has a default, so an empty file (or no file) is valid.

use crate::binding::DEFAULT_MIN_REFRESH_INTERVAL;
use crate::events::{DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_LISTENERS};
use crate::grid::{DEFAULT_COLUMNS, SurfaceBounds};
use crate::storage::DEFAULT_AUTOSAVE_INTERVAL_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default undo depth of an editing session.
pub const DEFAULT_UNDO_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("invalid TOML: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Grid surface geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub columns: u32,
    /// Pixel height of one grid row.
    pub row_height: f64,
    /// Pixel width of the whole surface.
    pub width: f64,
    /// Pixel gap between cells.
    pub margin: f64,
    pub max_rows: Option<u32>,
    /// Pull items up into free space when laying out the surface.
    pub vertical_compact: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            row_height: 80.0,
            width: 1200.0,
            margin: 8.0,
            max_rows: None,
            vertical_compact: false,
        }
    }
}

impl SurfaceConfig {
    pub fn bounds(&self) -> SurfaceBounds {
        SurfaceBounds::new(self.columns, self.max_rows)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events kept per kind for replay; 0 disables history.
    pub history_capacity: usize,
    pub max_listeners: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    /// Interval refresh policies faster than this are slowed down to it.
    pub min_refresh_interval_ms: u64,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval_ms: DEFAULT_MIN_REFRESH_INTERVAL.as_millis() as u64,
        }
    }
}

impl BinderConfig {
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.min_refresh_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub undo_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            undo_limit: DEFAULT_UNDO_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Board directory; the platform data directory when unset.
    pub directory: Option<PathBuf>,
    pub autosave_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: None,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub surface: SurfaceConfig,
    pub events: EventsConfig,
    pub binder: BinderConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Load from `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let surface = &self.surface;
        if surface.columns == 0 {
            return Err(ConfigError::Invalid("surface.columns must be positive".into()));
        }
        if surface.max_rows == Some(0) {
            return Err(ConfigError::Invalid("surface.max_rows must be positive".into()));
        }
        if !(surface.row_height > 0.0 && surface.width > 0.0) {
            return Err(ConfigError::Invalid(
                "surface.row_height and surface.width must be positive".into(),
            ));
        }
        if !(surface.margin >= 0.0) {
            return Err(ConfigError::Invalid("surface.margin must not be negative".into()));
        }
        if self.events.max_listeners == 0 {
            return Err(ConfigError::Invalid("events.max_listeners must be positive".into()));
        }
        Ok(())
    }
}
