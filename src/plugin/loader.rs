//! Plugin discovery, loading and unloading.
//!
//! Each candidate file moves through
//! `Discovered → Validated → Instantiated → Initialized`, or stops at
//! `Rejected`. A rejected candidate is logged and skipped; the scan always
//! moves on to the next file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use serde::Serialize;
use walkdir::WalkDir;

use super::error::isolate;
use super::module::ModuleLoader;
use super::{
    HostContext, PluginError, PluginFactory, PluginHandle, PluginMetadata, PluginRegistry,
    PluginResult, PluginState, PluginSummary, SecurityValidator,
};

/// A candidate that did not make it into the registry.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    /// Candidate file.
    pub path: PathBuf,
    /// Why it was rejected.
    pub reason: String,
}

/// Outcome of a directory scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Candidate files found.
    pub discovered: usize,
    /// Ids registered during the scan.
    pub loaded: Vec<String>,
    /// Files that registered nothing.
    pub rejected: Vec<Rejection>,
}

impl LoadReport {
    /// Whether every discovered file registered at least one plugin.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Discovers, validates and loads plugin modules into a registry.
pub struct PluginLoader {
    context: Arc<HostContext>,
    validator: SecurityValidator,
    modules: Arc<dyn ModuleLoader>,
    registry: PluginRegistry,
}

impl PluginLoader {
    /// Create a loader feeding plugins `context`.
    pub fn new(
        context: Arc<HostContext>,
        validator: SecurityValidator,
        modules: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self { context, validator, modules, registry: PluginRegistry::new() }
    }

    /// The shared host context.
    pub fn context(&self) -> &Arc<HostContext> {
        &self.context
    }

    /// The security gate.
    pub fn validator(&self) -> &SecurityValidator {
        &self.validator
    }

    /// The live registry.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Candidate files under the plugin directory, sorted by path.
    ///
    /// Unreadable directory entries are logged and skipped.
    pub fn discover(&self) -> Vec<PathBuf> {
        let root = self.context.plugin_directory();
        let mut candidates = Vec::new();

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable plugin directory entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && self.validator.has_allowed_extension(entry.path()) {
                candidates.push(entry.into_path());
            }
        }

        candidates
    }

    /// Load every candidate under the plugin directory.
    pub fn load_all(&self) -> LoadReport {
        let candidates = self.discover();
        let mut report = LoadReport { discovered: candidates.len(), ..LoadReport::default() };

        tracing::debug!(
            directory = %self.context.plugin_directory().display(),
            candidates = candidates.len(),
            "Scanning for plugins"
        );

        for path in candidates {
            match self.load_isolated(&path) {
                Ok(ids) => report.loaded.extend(ids),
                Err(e) => report.rejected.push(Rejection { path, reason: e.to_string() }),
            }
        }

        tracing::info!(
            discovered = report.discovered,
            loaded = report.loaded.len(),
            rejected = report.rejected.len(),
            "Plugin scan complete"
        );

        report
    }

    /// Load one module file. Returns `true` if at least one plugin registered.
    pub fn load(&self, path: &Path) -> bool {
        self.load_isolated(path).is_ok()
    }

    /// Load one module file, returning the registered ids or the reason nothing registered.
    pub fn try_load(&self, path: &Path) -> PluginResult<Vec<String>> {
        tracing::debug!(path = %path.display(), state = %PluginState::Discovered, "Plugin candidate");

        let hash = self.validator.verify(path)?;
        tracing::debug!(path = %path.display(), state = %PluginState::Validated, hash = %hash, "Plugin candidate");

        let module = self.modules.open(path)?;
        if module.factories.is_empty() {
            return Err(PluginError::load(path, "module exports no plugin types"));
        }

        let mut registered = Vec::new();
        let mut last_error = None;

        for factory in &module.factories {
            match self.register_from(path, &hash, factory.as_ref(), module.library.clone()) {
                Ok(id) => registered.push(id),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        state = %PluginState::Rejected,
                        error = %e,
                        "Plugin rejected"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if registered.is_empty() => Err(e),
            _ => Ok(registered),
        }
    }

    /// Run `try_load` with panics contained and failures logged.
    fn load_isolated(&self, path: &Path) -> PluginResult<Vec<String>> {
        let result = isolate(|| self.try_load(path))
            .unwrap_or_else(|panic| Err(PluginError::load(path, panic)));

        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "Plugin module not loaded");
        }

        result
    }

    /// Instantiate, initialize and register one plugin type.
    fn register_from(
        &self,
        path: &Path,
        hash: &str,
        factory: &dyn PluginFactory,
        library: Option<Arc<Library>>,
    ) -> PluginResult<String> {
        let mut plugin = isolate(|| factory.create())
            .map_err(|panic| PluginError::load(path, format!("instantiation {panic}")))?;

        let metadata = isolate(|| plugin.metadata())
            .map_err(|panic| PluginError::InvalidMetadata(format!("metadata {panic}")))?;
        metadata.validate()?;
        tracing::debug!(plugin_id = %metadata.id, state = %PluginState::Instantiated, "Plugin candidate");

        if self.registry.contains(&metadata.id) {
            return Err(PluginError::DuplicateId(metadata.id));
        }

        self.check_advisories(&metadata);

        let context = Arc::clone(&self.context);
        isolate(|| plugin.initialize(context))
            .unwrap_or_else(|panic| Err(PluginError::Initialization(panic)))
            .map_err(|e| match e {
                PluginError::Initialization(_) => e,
                other => PluginError::Initialization(other.to_string()),
            })?;

        let handle = PluginHandle::new(plugin, metadata, path, Some(hash.to_string()), library);

        match self.registry.insert(handle) {
            Ok(handle) => {
                tracing::info!(
                    plugin_id = %handle.id(),
                    version = %handle.metadata().version,
                    path = %path.display(),
                    "Registered plugin"
                );
                Ok(handle.id().to_string())
            }
            Err(rejected) => {
                // Lost a race with a concurrent load of the same id.
                rejected.cleanup();
                Err(PluginError::DuplicateId(rejected.id().to_string()))
            }
        }
    }

    /// Log unmet host-version and dependency declarations. Never blocks a load.
    fn check_advisories(&self, metadata: &PluginMetadata) {
        let host_version = self.context.host_version();
        if !metadata.is_compatible_with(host_version) {
            tracing::warn!(
                plugin_id = %metadata.id,
                required = metadata.minimum_host_version.as_deref().unwrap_or_default(),
                host_version,
                "Plugin targets a different host version"
            );
        }

        for dependency in &metadata.dependencies {
            if !self.registry.contains(dependency) {
                tracing::debug!(plugin_id = %metadata.id, dependency = %dependency, "Declared dependency not loaded");
            }
        }
    }

    /// Unload a plugin. Returns `false` if `id` is not registered.
    ///
    /// The handle leaves the registry before `cleanup` runs, so no new call
    /// can reach it. Calls already in flight are not waited for.
    pub fn unload(&self, id: &str) -> bool {
        let Some(handle) = self.registry.remove(id) else {
            tracing::debug!(plugin_id = %id, "Unload requested for unknown plugin");
            return false;
        };

        handle.set_state(PluginState::Unloading);
        handle.cleanup();
        handle.set_state(PluginState::Unloaded);

        tracing::info!(plugin_id = %id, in_flight = handle.in_flight(), "Unloaded plugin");
        true
    }

    /// Unload every registered plugin, in no particular order.
    pub fn unload_all(&self) {
        for id in self.registry.ids() {
            self.unload(&id);
        }
    }

    /// Look up a live handle.
    pub fn get(&self, id: &str) -> Option<Arc<PluginHandle>> {
        self.registry.get(id)
    }

    /// Metadata of every registered plugin.
    pub fn list(&self) -> Vec<PluginMetadata> {
        self.registry.list()
    }

    /// Display snapshots of every registered plugin.
    pub fn list_handles(&self) -> Vec<PluginSummary> {
        self.registry.summaries()
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("context", &self.context)
            .field("validator", &self.validator)
            .field("registry", &self.registry)
            .finish()
    }
}
