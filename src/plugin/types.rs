//! Core plugin types.

use serde::{Deserialize, Serialize};

use super::{PluginError, PluginResult};

/// Arguments passed to [`Plugin::execute`](super::Plugin::execute).
pub type PluginArgs = serde_json::Map<String, serde_json::Value>;

/// Plugin ABI version. A module whose `plughost_abi_version` differs is rejected.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Plugin file extension (the platform's dynamic library extension).
pub const PLUGIN_EXTENSION: &str = std::env::consts::DLL_EXTENSION;

/// Largest plugin module the validator accepts (50 MiB).
pub const MAX_PLUGIN_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Exported symbol returning the module's ABI version.
pub const ABI_VERSION_SYMBOL: &[u8] = b"plughost_abi_version\0";

/// Exported symbol through which a module registers its plugin types.
pub const REGISTER_SYMBOL: &[u8] = b"plughost_register\0";

/// Descriptive metadata every plugin exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Globally unique identifier, e.g. `com.example.greeting`.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Plugin version (semver).
    pub version: String,
    /// Plugin author.
    #[serde(default)]
    pub author: Option<String>,
    /// Plugin description.
    #[serde(default)]
    pub description: Option<String>,
    /// Oldest host version the plugin claims to support. Advisory only.
    #[serde(default)]
    pub minimum_host_version: Option<String>,
    /// Ids of plugins this one expects to be present. Advisory only.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl PluginMetadata {
    /// Create metadata with the required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            author: None,
            description: None,
            minimum_host_version: None,
            dependencies: Vec::new(),
        }
    }

    /// Set the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the minimum host version.
    pub fn with_minimum_host_version(mut self, version: impl Into<String>) -> Self {
        self.minimum_host_version = Some(version.into());
        self
    }

    /// Declare a dependency on another plugin id.
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Check the fields the loader relies on.
    pub fn validate(&self) -> PluginResult<()> {
        if self.id.trim().is_empty() {
            return Err(PluginError::InvalidMetadata(format!(
                "plugin '{}' has an empty id",
                self.name
            )));
        }

        Ok(())
    }

    /// Check whether `host_version` satisfies `minimum_host_version`.
    ///
    /// Major versions must match and the host minor must be at least the
    /// required minor. Unparseable versions count as compatible.
    pub fn is_compatible_with(&self, host_version: &str) -> bool {
        let Some(required) = self.minimum_host_version.as_deref() else {
            return true;
        };

        let required: Vec<u32> = required.split('.').filter_map(|s| s.parse().ok()).collect();
        let available: Vec<u32> = host_version.split('.').filter_map(|s| s.parse().ok()).collect();

        if required.is_empty() || available.is_empty() {
            return true;
        }

        required[0] == available[0]
            && (available.len() < 2 || required.len() < 2 || available[1] >= required[1])
    }
}

/// Lifecycle state of a plugin candidate.
///
/// `Discovered → Validated → Instantiated → Initialized → (Executing) →
/// Unloading → Unloaded`, with `Rejected` reachable before registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Found on disk, nothing checked yet.
    Discovered,
    /// Passed the security validator.
    Validated,
    /// Instance created from the module.
    Instantiated,
    /// `initialize` succeeded; registered and idle.
    Initialized,
    /// At least one `execute` call in flight.
    Executing,
    /// Removed from the registry, `cleanup` running.
    Unloading,
    /// Cleanup finished.
    Unloaded,
    /// Failed a check before registration.
    Rejected,
}

impl PluginState {
    /// Get the display name for this state.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Validated => "validated",
            Self::Instantiated => "instantiated",
            Self::Initialized => "ready",
            Self::Executing => "executing",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
            Self::Rejected => "rejected",
        }
    }

    /// Whether the plugin can still accept calls.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Initialized | Self::Executing)
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Error taxonomy carried in failed results and load reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing file, disallowed extension, oversize, not whitelisted.
    Validation,
    /// Module could not be loaded or held no valid plugin type.
    Load,
    /// Id already registered.
    DuplicateId,
    /// `initialize` failed.
    Initialization,
    /// `execute` failed.
    Execution,
    /// Unknown plugin id.
    NotFound,
    /// Host-side failure (IO, configuration).
    Host,
}

/// Structured error attached to a failed [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error category.
    pub kind: ErrorKind,
    /// Error message.
    pub message: String,
}

impl From<&PluginError> for ErrorDetail {
    fn from(error: &PluginError) -> Self {
        Self { kind: error.kind(), message: error.to_string() }
    }
}

/// Outcome of a plugin execution.
///
/// Either a success with optional data, or a failure with a message and an
/// optional error. Use the constructors; they keep the two shapes apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the execution succeeded.
    pub success: bool,
    /// Human readable message.
    pub message: String,
    /// Optional payload (successes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Optional error detail (failures only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ExecutionResult {
    /// Successful result without data.
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), data: None, error: None }
    }

    /// Successful result carrying data.
    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self { success: true, message: message.into(), data: Some(data), error: None }
    }

    /// Failed result without structured detail.
    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None, error: None }
    }

    /// Failed result carrying an error detail.
    pub fn failed_with_error(message: impl Into<String>, error: ErrorDetail) -> Self {
        Self { success: false, message: message.into(), data: None, error: Some(error) }
    }

    /// Failed result derived from a plugin error.
    pub fn from_error(error: &PluginError) -> Self {
        Self::failed_with_error(error.to_string(), ErrorDetail::from(error))
    }

    /// Error kind, if this is a failure with detail.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
