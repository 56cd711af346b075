//! Process-wide plugin manager.
//!
//! [`PluginManager`] composes a [`HostContext`] and a [`PluginLoader`] and is
//! the surface the rest of the host talks to. One instance per process is
//! reachable through [`PluginManager::get_instance`]; [`PluginManager::new`]
//! builds standalone managers for embedding and tests.
//!
//! `execute_plugin` has no timeout: a plugin that never returns blocks the
//! calling thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::loader::{LoadReport, PluginLoader};
use super::module::{ModuleLoader, NativeModuleLoader};
use super::{
    ExecutionResult, HostContext, PluginArgs, PluginError, PluginHandle, PluginMetadata,
    PluginResult, PluginSummary, TracingLogger,
};
use crate::config::HostConfig;

static INSTANCE: Lazy<RwLock<Option<Arc<PluginManager>>>> = Lazy::new(|| RwLock::new(None));

/// Facade over plugin loading, lookup and execution.
#[derive(Debug)]
pub struct PluginManager {
    loader: PluginLoader,
}

impl PluginManager {
    /// The process-wide manager, created on first call.
    ///
    /// Arguments only matter for the call that creates the instance. Without
    /// a directory, `plugins/` beside the executable is used. Failing to
    /// create the plugin directory is the only error.
    pub fn get_instance(
        plugin_directory: Option<PathBuf>,
        host_version: &str,
    ) -> PluginResult<Arc<Self>> {
        let mut config = HostConfig::default().with_host_version(host_version);
        config.plugin_directory = plugin_directory;
        Self::get_instance_with(config)
    }

    /// The process-wide manager, created from `config` on first call.
    pub fn get_instance_with(config: HostConfig) -> PluginResult<Arc<Self>> {
        Self::get_instance_with_loader(config, Arc::new(NativeModuleLoader))
    }

    /// The process-wide manager, created from `config` and `modules` on first call.
    pub fn get_instance_with_loader(
        config: HostConfig,
        modules: Arc<dyn ModuleLoader>,
    ) -> PluginResult<Arc<Self>> {
        if let Some(manager) = INSTANCE.read().as_ref() {
            return Ok(Arc::clone(manager));
        }

        let mut slot = INSTANCE.write();
        if let Some(manager) = slot.as_ref() {
            return Ok(Arc::clone(manager));
        }

        let manager = Arc::new(Self::new(config, modules)?);
        *slot = Some(Arc::clone(&manager));
        Ok(manager)
    }

    /// The process-wide manager, if one has been created.
    pub fn instance() -> Option<Arc<Self>> {
        INSTANCE.read().clone()
    }

    /// Shut down and drop the process-wide manager.
    ///
    /// Callers still holding the old `Arc` keep a manager with no plugins.
    pub fn reset_instance() {
        let previous = INSTANCE.write().take();
        if let Some(manager) = previous {
            manager.shutdown();
        }
    }

    /// Create a standalone manager.
    pub fn new(config: HostConfig, modules: Arc<dyn ModuleLoader>) -> PluginResult<Self> {
        let directory = config.resolved_plugin_directory();
        std::fs::create_dir_all(&directory)?;
        let directory = directory.canonicalize().unwrap_or(directory);

        let context =
            Arc::new(HostContext::new(config.host_version.as_str(), &directory, Arc::new(TracingLogger)));
        for (key, value) in &config.config {
            context.set_config_value(key.as_str(), value.as_str());
        }

        tracing::debug!(
            directory = %directory.display(),
            host_version = %config.host_version,
            "Created plugin manager"
        );

        Ok(Self { loader: PluginLoader::new(context, config.validator(), modules) })
    }

    /// Scan the plugin directory and load everything found.
    ///
    /// Plugins already registered are reported as duplicate-id rejections.
    pub fn initialize(&self) -> LoadReport {
        self.loader.load_all()
    }

    /// Run plugin `id`. Never panics; failures come back as a failed result.
    pub fn execute_plugin(&self, id: &str, args: &PluginArgs) -> ExecutionResult {
        match self.loader.get(id) {
            Some(handle) => handle.execute(args),
            None => {
                tracing::debug!(plugin_id = %id, "Execute requested for unknown plugin");
                ExecutionResult::from_error(&PluginError::NotFound(id.to_string()))
            }
        }
    }

    /// Load one module file. Returns `true` if at least one plugin registered.
    pub fn load_plugin(&self, path: &Path) -> bool {
        self.loader.load(path)
    }

    /// Unload plugin `id`. Returns `false` if it was not registered.
    pub fn unload_plugin(&self, id: &str) -> bool {
        self.loader.unload(id)
    }

    /// Metadata of every registered plugin, sorted by id.
    pub fn list_plugins(&self) -> Vec<PluginMetadata> {
        self.loader.list()
    }

    /// Live handle for `id`.
    pub fn get_plugin(&self, id: &str) -> Option<Arc<PluginHandle>> {
        self.loader.get(id)
    }

    /// Display snapshot for `id`.
    pub fn plugin_info(&self, id: &str) -> Option<PluginSummary> {
        self.loader.get(id).map(|handle| handle.summary())
    }

    /// Display snapshots of every registered plugin.
    pub fn plugin_summaries(&self) -> Vec<PluginSummary> {
        self.loader.list_handles()
    }

    /// Unload every plugin.
    pub fn shutdown(&self) {
        let count = self.loader.registry().len();
        self.loader.unload_all();
        tracing::debug!(unloaded = count, "Plugin manager shut down");
    }

    /// Context shared with every plugin.
    pub fn context(&self) -> &Arc<HostContext> {
        self.loader.context()
    }

    /// Directory scanned for plugin modules.
    pub fn plugin_directory(&self) -> &Path {
        self.context().plugin_directory()
    }

    /// The underlying loader.
    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }
}
