//! Registry of live plugins.
//!
//! Maps plugin id to a shared [`PluginHandle`]. Lookups clone the `Arc` and
//! drop the lock before any plugin code runs, so a slow `execute` never
//! blocks loading or unloading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use libloading::Library;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::error::isolate;
use super::{ExecutionResult, Plugin, PluginArgs, PluginError, PluginMetadata, PluginState};

/// A registered plugin instance with its metadata and lifecycle state.
pub struct PluginHandle {
    /// The live instance. Declared before `library` so it is dropped first.
    plugin: Box<dyn Plugin>,
    metadata: PluginMetadata,
    state: RwLock<PluginState>,
    in_flight: AtomicUsize,
    source: PathBuf,
    file_hash: Option<String>,
    loaded_at: u64,
    library: Option<Arc<Library>>,
}

/// Display-friendly snapshot of a handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSummary {
    /// Plugin metadata.
    pub metadata: PluginMetadata,
    /// Lifecycle state at snapshot time.
    pub state: PluginState,
    /// Module file the plugin came from.
    pub source: PathBuf,
    /// SHA-256 of the module file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// Registration timestamp (seconds since the Unix epoch).
    pub loaded_at: u64,
    /// Number of `execute` calls running right now.
    pub in_flight: usize,
}

impl PluginHandle {
    /// Wrap an initialized plugin.
    pub fn new(
        plugin: Box<dyn Plugin>,
        metadata: PluginMetadata,
        source: impl Into<PathBuf>,
        file_hash: Option<String>,
        library: Option<Arc<Library>>,
    ) -> Self {
        Self {
            plugin,
            metadata,
            state: RwLock::new(PluginState::Initialized),
            in_flight: AtomicUsize::new(0),
            source: source.into(),
            file_hash,
            loaded_at: SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs()),
            library,
        }
    }

    /// Plugin id.
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Metadata captured at load time.
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PluginState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: PluginState) {
        *self.state.write() = state;
    }

    /// Module file the plugin came from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// SHA-256 of the module file.
    pub fn file_hash(&self) -> Option<&str> {
        self.file_hash.as_deref()
    }

    /// Whether the plugin came from a dynamic library.
    pub fn is_native(&self) -> bool {
        self.library.is_some()
    }

    /// Number of `execute` calls currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot for display.
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            metadata: self.metadata.clone(),
            state: self.state(),
            source: self.source.clone(),
            file_hash: self.file_hash.clone(),
            loaded_at: self.loaded_at,
            in_flight: self.in_flight(),
        }
    }

    /// Run the plugin, converting errors and panics into a failed result.
    pub fn execute(&self, args: &PluginArgs) -> ExecutionResult {
        let _call = CallGuard::enter(self);

        match isolate(|| self.plugin.execute(args)) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(plugin_id = %self.id(), error = %e, "Plugin execution failed");
                ExecutionResult::from_error(&PluginError::Execution(format!("{}: {e}", self.id())))
            }
            Err(panic) => {
                tracing::error!(plugin_id = %self.id(), error = %panic, "Plugin panicked during execution");
                ExecutionResult::from_error(&PluginError::Execution(format!("{}: {panic}", self.id())))
            }
        }
    }

    /// Run the plugin's cleanup. Errors and panics are logged and swallowed.
    pub(crate) fn cleanup(&self) {
        match isolate(|| self.plugin.cleanup()) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(plugin_id = %self.id(), error = %e, "Plugin cleanup failed");
            }
            Err(panic) => {
                tracing::error!(plugin_id = %self.id(), error = %panic, "Plugin panicked during cleanup");
            }
        }
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("id", &self.metadata.id)
            .field("state", &self.state())
            .field("source", &self.source)
            .field("native", &self.is_native())
            .finish()
    }
}

/// Tracks one in-flight `execute` and flips `Initialized`/`Executing`.
struct CallGuard<'a> {
    handle: &'a PluginHandle,
}

impl<'a> CallGuard<'a> {
    fn enter(handle: &'a PluginHandle) -> Self {
        let mut state = handle.state.write();
        handle.in_flight.fetch_add(1, Ordering::AcqRel);
        if *state == PluginState::Initialized {
            *state = PluginState::Executing;
        }
        Self { handle }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.handle.state.write();
        let remaining = self.handle.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && *state == PluginState::Executing {
            *state = PluginState::Initialized;
        }
    }
}

/// Concurrent id → handle map. At most one handle per id.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<PluginHandle>>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Returns the handle back if its id is already taken.
    pub fn insert(&self, handle: PluginHandle) -> Result<Arc<PluginHandle>, PluginHandle> {
        let mut plugins = self.plugins.write();

        if plugins.contains_key(handle.id()) {
            return Err(handle);
        }

        let handle = Arc::new(handle);
        plugins.insert(handle.id().to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.read().contains_key(id)
    }

    /// Look up a handle.
    pub fn get(&self, id: &str) -> Option<Arc<PluginHandle>> {
        self.plugins.read().get(id).cloned()
    }

    /// Remove a handle. After this returns no lookup can reach it.
    pub fn remove(&self, id: &str) -> Option<Arc<PluginHandle>> {
        self.plugins.write().remove(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.plugins.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Metadata of every registered plugin, sorted by id.
    pub fn list(&self) -> Vec<PluginMetadata> {
        let mut list: Vec<_> = self.plugins.read().values().map(|h| h.metadata().clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Summaries of every registered plugin, sorted by id.
    pub fn summaries(&self) -> Vec<PluginSummary> {
        let mut list: Vec<_> = self.plugins.read().values().map(|h| h.summary()).collect();
        list.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        list
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }
}
