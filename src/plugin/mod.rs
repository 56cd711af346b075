//! Runtime plugin system.
//!
//! Plugins are independently compiled dynamic libraries dropped into a plugin
//! directory. The host discovers them, checks them, loads them, and exposes
//! them by id without being rebuilt.
//!
//! # Architecture
//!
//! - [`SecurityValidator`]: existence, extension, size and hash-whitelist checks
//! - [`PluginLoader`]: discovery, instantiation, initialization, unload
//! - [`PluginRegistry`]: concurrent id → [`PluginHandle`] map
//! - [`PluginManager`]: process-wide facade over all of the above
//! - [`HostContext`]: what the host hands to every plugin
//!
//! # Lifecycle
//!
//! ```text
//! Discovered → Validated → Instantiated → Initialized ⇄ Executing
//!      ↘            ↘             ↘                ↓
//!                 Rejected                 Unloading → Unloaded
//! ```
//!
//! Failures while loading one candidate never stop the scan, and failures
//! inside `execute` come back as a failed [`ExecutionResult`].
//!
//! # Example Configuration
//!
//! ```toml
//! plugin_directory = "~/.local/share/plughost/plugins"
//! whitelist = "~/.config/plughost/whitelist.txt"
//!
//! [config]
//! "greeting.salutation" = "Hi"
//! ```

mod error;
mod host;
mod loader;
mod manager;
mod module;
mod registry;
mod security;
mod traits;
mod types;

pub use error::{PluginError, PluginResult};
pub use host::{HostContext, HostLogger, LogLevel, TracingLogger};
pub use loader::{LoadReport, PluginLoader, Rejection};
pub use manager::PluginManager;
pub use module::{LoadedModule, ModuleLoader, NativeModuleLoader, StaticModuleLoader};
pub use registry::{PluginHandle, PluginRegistry, PluginSummary};
pub use security::SecurityValidator;
pub use traits::{
    factory_of, AbiVersionFn, Contained, Plugin, PluginFactory, PluginRegistrar, RegisterFn,
};
pub use types::{
    ErrorDetail, ErrorKind, ExecutionResult, PluginArgs, PluginMetadata, PluginState,
    ABI_VERSION_SYMBOL, MAX_PLUGIN_FILE_SIZE, PLUGIN_ABI_VERSION, PLUGIN_EXTENSION,
    REGISTER_SYMBOL,
};

/// Everything a plugin crate needs.
pub mod prelude {
    pub use std::sync::Arc;

    pub use super::{
        ErrorKind, ExecutionResult, HostContext, HostLogger, LogLevel, Plugin, PluginArgs,
        PluginError, PluginMetadata, PluginResult,
    };
    pub use crate::export_plugins;
}
