//! Module built against a plugin ABI the host does not speak.
//!
//! Built as a `cdylib` by `tests/native_plugins.rs`.

use plughost::plugin::{PluginRegistrar, PLUGIN_ABI_VERSION};

#[no_mangle]
pub extern "C" fn plughost_abi_version() -> u32 {
    PLUGIN_ABI_VERSION + 1
}

#[no_mangle]
#[allow(improper_ctypes_definitions)]
pub extern "C" fn plughost_register(_registrar: &mut dyn PluginRegistrar) {}
