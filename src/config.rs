//! Host configuration.
//!
//! Loaded from TOML files; every field has a default so an empty or missing
//! file is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::plugin::{SecurityValidator, MAX_PLUGIN_FILE_SIZE, PLUGIN_EXTENSION};

/// Plugin host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory scanned for plugin modules (`~` is expanded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_directory: Option<PathBuf>,

    /// Version reported to plugins through the host context
    pub host_version: String,

    /// Hash whitelist file (`~` is expanded). Absent means every hash is accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<PathBuf>,

    /// Size ceiling for module files, in bytes
    pub max_file_size: u64,

    /// Accepted module file extensions
    pub allowed_extensions: Vec<String>,

    /// Initial values of the shared plugin config store
    pub config: BTreeMap<String, String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_directory: None,
            host_version: crate::VERSION.to_string(),
            whitelist: None,
            max_file_size: MAX_PLUGIN_FILE_SIZE,
            allowed_extensions: vec![PLUGIN_EXTENSION.to_string()],
            config: BTreeMap::new(),
        }
    }
}

impl HostConfig {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.plughost.toml` in current directory
    /// 2. `~/.config/plughost/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".plughost.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded host config");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("plughost"))
    }

    /// Set the plugin directory.
    pub fn with_plugin_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_directory = Some(dir.into());
        self
    }

    /// Set the host version.
    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    /// Set the whitelist file.
    pub fn with_whitelist(mut self, path: impl Into<PathBuf>) -> Self {
        self.whitelist = Some(path.into());
        self
    }

    /// Plugin directory to use: the configured one, or `plugins/` beside the executable.
    pub fn resolved_plugin_directory(&self) -> PathBuf {
        self.plugin_directory.as_deref().map_or_else(default_plugin_directory, expand_path)
    }

    /// Whitelist file to use, if any.
    pub fn resolved_whitelist(&self) -> Option<PathBuf> {
        self.whitelist.as_deref().map(expand_path)
    }

    /// Security validator matching this configuration.
    pub fn validator(&self) -> SecurityValidator {
        let validator = SecurityValidator::new()
            .with_allowed_extensions(self.allowed_extensions.iter().cloned())
            .with_max_file_size(self.max_file_size);

        match self.resolved_whitelist() {
            Some(whitelist) => validator.with_whitelist(whitelist),
            None => validator,
        }
    }
}

/// `plugins/` under the directory holding the running executable, or under
/// the current directory when the executable path is unknown.
pub fn default_plugin_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default()
        .join("plugins")
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
