//! Plugin system error types.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use thiserror::Error;

use super::ErrorKind;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur during plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Candidate file failed a pre-load check (missing, extension, size, whitelist).
    #[error("Validation failed for {}: {reason}", .path.display())]
    Validation { path: PathBuf, reason: String },

    /// Module could not be opened or exports no usable plugin type.
    #[error("Failed to load plugin module {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    /// A plugin with this id is already registered.
    #[error("Plugin '{0}' is already registered")]
    DuplicateId(String),

    /// Plugin metadata is unusable (e.g. empty id).
    #[error("Invalid plugin metadata: {0}")]
    InvalidMetadata(String),

    /// Plugin failed during `initialize`.
    #[error("Plugin initialization failed: {0}")]
    Initialization(String),

    /// Plugin failed during `execute`.
    #[error("Plugin execution failed: {0}")]
    Execution(String),

    /// No plugin registered under this id.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PluginError {
    /// Build a validation error for `path`.
    pub fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Validation { path: path.into(), reason: reason.into() }
    }

    /// Build a load error for `path`.
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Load { path: path.into(), reason: reason.into() }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Load { .. } | Self::InvalidMetadata(_) => ErrorKind::Load,
            Self::DuplicateId(_) => ErrorKind::DuplicateId,
            Self::Initialization(_) => ErrorKind::Initialization,
            Self::Execution(_) => ErrorKind::Execution,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Config(_) => ErrorKind::Host,
        }
    }
}

/// Run plugin code, turning a panic into an `Err` carrying the panic message.
///
/// Every call the host makes into plugin code goes through here.
pub(crate) fn isolate<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}
