//! Host services handed to plugins.
//!
//! Every plugin receives the same [`HostContext`] during `initialize`. It
//! carries read-only host metadata, a logging sink, and a key/value store
//! shared by all plugins of one manager.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// Log level for plugin logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

/// Logging sink shared between the host and its plugins.
///
/// Messages are passed through untouched; plugins add their own prefixes.
pub trait HostLogger: Send + Sync {
    /// Log a message.
    fn log(&self, level: LogLevel, message: &str);

    /// Log at trace level.
    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    /// Log at debug level.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Log at info level.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log at warn level.
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Log at error level.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Default logger forwarding to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl HostLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(plugin = true, "{}", message),
            LogLevel::Debug => tracing::debug!(plugin = true, "{}", message),
            LogLevel::Info => tracing::info!(plugin = true, "{}", message),
            LogLevel::Warn => tracing::warn!(plugin = true, "{}", message),
            LogLevel::Error => tracing::error!(plugin = true, "{}", message),
        }
    }
}

/// Context shared by every plugin registered with one manager.
///
/// The config store is not namespaced: any plugin can read or overwrite
/// keys written by another. Values live in memory only.
pub struct HostContext {
    host_version: String,
    plugin_directory: PathBuf,
    logger: Arc<dyn HostLogger>,
    config: RwLock<HashMap<String, String>>,
}

impl HostContext {
    /// Create a new context.
    pub fn new(
        host_version: impl Into<String>,
        plugin_directory: impl Into<PathBuf>,
        logger: Arc<dyn HostLogger>,
    ) -> Self {
        Self {
            host_version: host_version.into(),
            plugin_directory: plugin_directory.into(),
            logger,
            config: RwLock::new(HashMap::new()),
        }
    }

    /// Version of the host application.
    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    /// Directory scanned for plugin modules.
    pub fn plugin_directory(&self) -> &Path {
        &self.plugin_directory
    }

    /// The host logging sink.
    pub fn logger(&self) -> &dyn HostLogger {
        self.logger.as_ref()
    }

    /// Read a config value.
    pub fn get_config_value(&self, key: &str) -> Option<String> {
        self.config.read().get(key).cloned()
    }

    /// Write a config value, replacing any previous one.
    pub fn set_config_value(&self, key: impl Into<String>, value: impl Into<String>) {
        self.config.write().insert(key.into(), value.into());
    }

    /// Remove a config value, returning it if present.
    pub fn remove_config_value(&self, key: &str) -> Option<String> {
        self.config.write().remove(key)
    }

    /// Copy of the whole config store.
    pub fn config_snapshot(&self) -> HashMap<String, String> {
        self.config.read().clone()
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("host_version", &self.host_version)
            .field("plugin_directory", &self.plugin_directory)
            .field("config_keys", &self.config.read().len())
            .finish()
    }
}
