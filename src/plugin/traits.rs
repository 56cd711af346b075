//! The plugin capability contract.
//!
//! A plugin module is a dynamic library exporting two C-ABI symbols:
//!
//! - `plughost_abi_version() -> u32`, which must return
//!   [`PLUGIN_ABI_VERSION`](super::PLUGIN_ABI_VERSION)
//! - `plughost_register(&mut dyn PluginRegistrar)`, which registers one
//!   [`PluginFactory`] per plugin type the module provides
//!
//! Both are generated by [`export_plugins!`](crate::export_plugins), which
//! also wraps every exported type in [`Contained`] so panics are caught on
//! the module's side of the boundary.
//!
//! ```rust,ignore
//! use plughost::plugin::prelude::*;
//!
//! #[derive(Default)]
//! struct Greeting;
//!
//! impl Plugin for Greeting {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new("com.example.greeting", "Greeting", "1.0.0")
//!     }
//!
//!     fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
//!         Ok(())
//!     }
//!
//!     fn execute(&self, args: &PluginArgs) -> PluginResult<ExecutionResult> {
//!         let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("world");
//!         Ok(ExecutionResult::ok(format!("Hello, {name}!")))
//!     }
//! }
//!
//! export_plugins!(Greeting);
//! ```
//!
//! Trait objects cross the library boundary with the Rust ABI, so host and
//! module must be built by the same compiler against the same `plughost`.

use std::any;
use std::sync::Arc;

use super::error::isolate;
use super::{
    ExecutionResult, HostContext, PluginArgs, PluginError, PluginMetadata, PluginResult,
};

/// A loadable plugin.
///
/// `execute` takes `&self` and may be called from several threads at once;
/// use interior mutability for per-plugin state.
pub trait Plugin: Send + Sync {
    /// Plugin metadata. Must return the same value on every call.
    fn metadata(&self) -> PluginMetadata;

    /// Called once before the plugin is registered.
    ///
    /// An error rejects this instance; it is never registered.
    fn initialize(&mut self, context: Arc<HostContext>) -> PluginResult<()>;

    /// Run the plugin.
    fn execute(&self, args: &PluginArgs) -> PluginResult<ExecutionResult>;

    /// Called once after the plugin is removed from the registry.
    ///
    /// Calls that started before removal may still be running.
    fn cleanup(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// Creates instances of one plugin type.
pub trait PluginFactory: Send + Sync {
    /// Create a fresh, uninitialized instance.
    fn create(&self) -> Box<dyn Plugin>;
}

impl<F> PluginFactory for F
where
    F: Fn() -> Box<dyn Plugin> + Send + Sync,
{
    fn create(&self) -> Box<dyn Plugin> {
        self()
    }
}

/// Factory for a `Default`-constructible plugin type.
pub fn factory_of<P>() -> Arc<dyn PluginFactory>
where
    P: Plugin + Default + 'static,
{
    Arc::new(|| Box::new(P::default()) as Box<dyn Plugin>)
}

/// Receives plugin factories from a module's register entry point.
pub trait PluginRegistrar {
    /// Register a factory.
    fn register(&mut self, factory: Box<dyn PluginFactory>);
}

/// Signature of `plughost_abi_version`.
pub type AbiVersionFn = extern "C" fn() -> u32;

/// Signature of `plughost_register`.
#[allow(improper_ctypes, improper_ctypes_definitions)]
pub type RegisterFn = extern "C" fn(&mut dyn PluginRegistrar);

/// Collects factories handed over by a module.
#[derive(Default)]
pub(crate) struct FactoryCollector {
    pub(crate) factories: Vec<Arc<dyn PluginFactory>>,
}

impl PluginRegistrar for FactoryCollector {
    fn register(&mut self, factory: Box<dyn PluginFactory>) {
        self.factories.push(Arc::from(factory));
    }
}

/// Runs a plugin behind `catch_unwind`, reporting panics as errors.
///
/// A module links its own copy of std, so an unwind escaping it cannot be
/// caught by the host. [`export_plugins!`](crate::export_plugins) builds every
/// exported type through this wrapper, which is compiled into the module and
/// catches there.
///
/// Construction and the first `metadata` call happen in [`Contained::new`].
/// If either panics, the wrapper reports the type name as its id and fails
/// `initialize`, so the loader rejects it.
pub struct Contained<P> {
    inner: Option<P>,
    metadata: PluginMetadata,
    failure: Option<String>,
}

impl<P: Plugin + Default> Contained<P> {
    /// Build `P::default()` and read its metadata.
    pub fn new() -> Self {
        match isolate(|| {
            let plugin = P::default();
            let metadata = plugin.metadata();
            (plugin, metadata)
        }) {
            Ok((plugin, metadata)) => Self { inner: Some(plugin), metadata, failure: None },
            Err(panic) => {
                let name = any::type_name::<P>();
                Self {
                    inner: None,
                    metadata: PluginMetadata::new(name, name, "0.0.0"),
                    failure: Some(format!("construction {panic}")),
                }
            }
        }
    }
}

impl<P: Plugin + Default> Default for Contained<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Plugin> Contained<P> {
    fn failure(&self) -> String {
        self.failure.clone().unwrap_or_else(|| "plugin is gone".to_string())
    }
}

impl<P: Plugin> Plugin for Contained<P> {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    fn initialize(&mut self, context: Arc<HostContext>) -> PluginResult<()> {
        let failure = self.failure();
        match self.inner.as_mut() {
            Some(plugin) => isolate(|| plugin.initialize(context))
                .unwrap_or_else(|panic| Err(PluginError::Initialization(panic))),
            None => Err(PluginError::Initialization(failure)),
        }
    }

    fn execute(&self, args: &PluginArgs) -> PluginResult<ExecutionResult> {
        match &self.inner {
            Some(plugin) => isolate(|| plugin.execute(args))
                .unwrap_or_else(|panic| Err(PluginError::Execution(panic))),
            None => Err(PluginError::Execution(self.failure())),
        }
    }

    fn cleanup(&self) -> PluginResult<()> {
        match &self.inner {
            Some(plugin) => isolate(|| plugin.cleanup())
                .unwrap_or_else(|panic| Err(PluginError::Execution(panic))),
            None => Ok(()),
        }
    }
}

impl<P> Drop for Contained<P> {
    fn drop(&mut self) {
        if let Some(plugin) = self.inner.take() {
            // A panicking destructor is swallowed rather than unwinding into the host.
            let _ = isolate(move || drop(plugin));
        }
    }
}

/// Export one or more plugin types from a `cdylib`.
///
/// Each type must implement [`Plugin`] and `Default`. Instances are wrapped in
/// [`Contained`], and a panic inside the register entry point stops
/// registration of the remaining types instead of crossing the C ABI.
#[macro_export]
macro_rules! export_plugins {
    ($($plugin:ty),+ $(,)?) => {
        /// Returns the plugin ABI version this module was built against.
        #[no_mangle]
        #[allow(unsafe_code)]
        pub extern "C" fn plughost_abi_version() -> u32 {
            $crate::plugin::PLUGIN_ABI_VERSION
        }

        /// Registers every plugin type exported by this module.
        #[no_mangle]
        #[allow(unsafe_code, improper_ctypes_definitions)]
        pub extern "C" fn plughost_register(
            registrar: &mut dyn $crate::plugin::PluginRegistrar,
        ) {
            let _ = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                $(
                    registrar.register(::std::boxed::Box::new(
                        || -> ::std::boxed::Box<dyn $crate::plugin::Plugin> {
                            ::std::boxed::Box::new($crate::plugin::Contained::<$plugin>::new())
                        },
                    ));
                )+
            }));
        }
    };
}
