//! Configuration parsing and management.

use sandbox_runtime::{FrameOptions, RuntimeLimits};
use sandbox_types::{DEFAULT_ANCHOR_ID, DEFAULT_QUIET_PERIOD_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file looked up when none is given
pub const DEFAULT_CONFIG_FILE: &str = "sandbox.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration struct matching the sandbox.yml schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Quiet period after the last edit before code is sent (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Id of the element the runtime mounts into
    #[serde(default = "default_anchor_id")]
    pub anchor_id: String,

    #[serde(default)]
    pub limits: RuntimeLimits,

    /// Component source watched by `sandbox watch` when no file is given
    #[serde(default)]
    pub source: Option<PathBuf>,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_QUIET_PERIOD_MS
}

fn default_anchor_id() -> String {
    DEFAULT_ANCHOR_ID.to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            anchor_id: default_anchor_id(),
            limits: RuntimeLimits::default(),
            source: None,
            config_path: None,
        }
    }
}

impl SandboxConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: SandboxConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.anchor_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "anchor_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.limits.max_nesting_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_nesting_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limits.max_render_passes == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_render_passes",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn frame_options(&self) -> FrameOptions {
        FrameOptions {
            anchor_id: self.anchor_id.clone(),
            limits: self.limits.clone(),
        }
    }

    /// Source file, resolved relative to the config file
    pub fn source_path(&self) -> Option<PathBuf> {
        self.source.as_ref().map(|p| self.resolve_path(p))
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_ref().and_then(|p| p.parent()) {
            Some(parent) => parent.join(path),
            None => path.to_path_buf(),
        }
    }

    /// YAML for a fresh config file, every field at its default
    pub fn default_yaml() -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(&Self::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = SandboxConfig::from_yaml("{}").unwrap();
        assert_eq!(config, SandboxConfig::default());
        assert_eq!(config.quiet_period(), Duration::from_millis(500));
        assert_eq!(config.anchor_id, "preview-root");
    }

    #[test]
    fn test_partial_limits() {
        let config = SandboxConfig::from_yaml("debounce_ms: 250\nlimits:\n  max_call_depth: 64\n").unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.limits.max_call_depth, 64);
        assert_eq!(config.limits.max_render_passes, 25);
    }

    #[test]
    fn test_rejects_empty_anchor() {
        let err = SandboxConfig::from_yaml("anchor_id: ''").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "anchor_id", .. }));
    }

    #[test]
    fn test_default_yaml_round_trips() {
        let yaml = SandboxConfig::default_yaml().unwrap();
        assert_eq!(SandboxConfig::from_yaml(&yaml).unwrap(), SandboxConfig::default());
    }

    #[test]
    fn test_source_resolves_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbox.yml");
        std::fs::write(&path, "source: app.jsx\n").unwrap();
        let config = SandboxConfig::from_file(&path).unwrap();
        assert_eq!(config.source_path(), Some(dir.path().join("app.jsx")));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig::load_or_default(dir.path().join("nope.yml")).unwrap();
        assert_eq!(config, SandboxConfig::default());
    }
}
