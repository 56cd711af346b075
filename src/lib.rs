//! # Plughost
//!
//! Runtime plugin host: discover, validate, load, execute and unload natively
//! compiled extension modules without rebuilding the host.
//!
//! ## Features
//!
//! - **Discovery**: recursive scan of a plugin directory for dynamic libraries
//! - **Security gate**: extension allow-list, size ceiling, SHA-256 whitelist
//! - **Isolation**: a failing or panicking plugin never takes the host down
//! - **Concurrency**: lookups and executions run in parallel with loads and unloads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plughost::plugin::{PluginArgs, PluginManager};
//!
//! let manager = PluginManager::get_instance(None, plughost::VERSION)?;
//! manager.initialize();
//!
//! let result = manager.execute_plugin("com.example.greeting", &PluginArgs::new());
//! println!("{}", result.message);
//! # Ok::<(), plughost::plugin::PluginError>(())
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod config;
pub mod plugin;

pub use config::HostConfig;
pub use plugin::{
    ExecutionResult, HostContext, LoadReport, Plugin, PluginArgs, PluginError, PluginManager,
    PluginMetadata, PluginResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "plughost";
