//! Opening plugin modules.
//!
//! [`ModuleLoader`] turns a validated file into the list of plugin factories
//! it exports. [`NativeModuleLoader`] maps real dynamic libraries;
//! [`StaticModuleLoader`] serves factories linked into the host itself.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};

use super::traits::{AbiVersionFn, FactoryCollector, RegisterFn};
use super::{
    PluginError, PluginFactory, PluginResult, ABI_VERSION_SYMBOL, PLUGIN_ABI_VERSION,
    REGISTER_SYMBOL,
};

/// Factories exported by one module, plus the library keeping their code mapped.
pub struct LoadedModule {
    /// One factory per plugin type, in registration order.
    pub factories: Vec<Arc<dyn PluginFactory>>,
    /// Backing library; `None` for in-process modules.
    pub library: Option<Arc<Library>>,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("factories", &self.factories.len())
            .field("native", &self.library.is_some())
            .finish()
    }
}

/// Opens a candidate file and collects its plugin factories.
pub trait ModuleLoader: Send + Sync {
    /// Open the module at `path`.
    fn open(&self, path: &Path) -> PluginResult<LoadedModule>;
}

/// Loads plugin modules through the platform dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeModuleLoader;

impl ModuleLoader for NativeModuleLoader {
    fn open(&self, path: &Path) -> PluginResult<LoadedModule> {
        // SAFETY: loading a library runs its initializers. The file has passed
        // the security validator; beyond that the host trusts the module.
        let library =
            unsafe { Library::new(path) }.map_err(|e| PluginError::load(path, e.to_string()))?;

        let factories = {
            // SAFETY: the symbol type matches the signature generated by `export_plugins!`.
            let abi_version: Symbol<'_, AbiVersionFn> = unsafe { library.get(ABI_VERSION_SYMBOL) }
                .map_err(|e| PluginError::load(path, format!("missing ABI version symbol: {e}")))?;

            let found = abi_version();
            if found != PLUGIN_ABI_VERSION {
                return Err(PluginError::load(
                    path,
                    format!("ABI version {found} does not match host ABI version {PLUGIN_ABI_VERSION}"),
                ));
            }

            // SAFETY: as above; the ABI version check guards against stale modules.
            let register: Symbol<'_, RegisterFn> = unsafe { library.get(REGISTER_SYMBOL) }
                .map_err(|e| PluginError::load(path, format!("missing register symbol: {e}")))?;

            let mut collector = FactoryCollector::default();
            register(&mut collector);
            collector.factories
        };

        tracing::debug!(path = %path.display(), factories = factories.len(), "Opened native module");

        Ok(LoadedModule { factories, library: Some(Arc::new(library)) })
    }
}

/// Serves plugin factories compiled into the host, keyed by module file name.
///
/// The file must still exist and pass validation; only the code comes from
/// the host binary.
#[derive(Default, Clone)]
pub struct StaticModuleLoader {
    modules: HashMap<String, Vec<Arc<dyn PluginFactory>>>,
}

impl StaticModuleLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factories served for files named `file_name`.
    pub fn with_module(
        mut self,
        file_name: impl Into<String>,
        factories: Vec<Arc<dyn PluginFactory>>,
    ) -> Self {
        self.modules.insert(file_name.into(), factories);
        self
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn open(&self, path: &Path) -> PluginResult<LoadedModule> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        let factories = self
            .modules
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::load(path, "not a recognized plugin module"))?;

        Ok(LoadedModule { factories, library: None })
    }
}

impl std::fmt::Debug for StaticModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticModuleLoader").field("modules", &self.modules.keys()).finish()
    }
}
