//! Module whose plugins panic in every entry point the host calls.
//!
//! Built as a `cdylib` by `tests/native_plugins.rs`.

use plughost::plugin::prelude::*;

/// Registers, then panics on every `execute`.
#[derive(Default)]
pub struct PanicsOnExecute;

impl Plugin for PanicsOnExecute {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("fixture.panics-on-execute", "Panics on execute", "0.1.0")
    }

    fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
        Ok(())
    }

    fn execute(&self, _args: &PluginArgs) -> PluginResult<ExecutionResult> {
        panic!("execute exploded");
    }
}

/// Never registers.
#[derive(Default)]
pub struct PanicsOnInitialize;

impl Plugin for PanicsOnInitialize {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("fixture.panics-on-initialize", "Panics on initialize", "0.1.0")
    }

    fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
        panic!("initialize exploded");
    }

    fn execute(&self, _args: &PluginArgs) -> PluginResult<ExecutionResult> {
        Ok(ExecutionResult::ok("unreachable"))
    }
}

/// Never gets built.
pub struct PanicsOnConstruct;

impl Default for PanicsOnConstruct {
    fn default() -> Self {
        panic!("constructor exploded");
    }
}

impl Plugin for PanicsOnConstruct {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("fixture.panics-on-construct", "Panics on construct", "0.1.0")
    }

    fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
        Ok(())
    }

    fn execute(&self, _args: &PluginArgs) -> PluginResult<ExecutionResult> {
        Ok(ExecutionResult::ok("unreachable"))
    }
}

/// Registers and runs, then panics while being unloaded.
#[derive(Default)]
pub struct PanicsOnCleanup;

impl Plugin for PanicsOnCleanup {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("fixture.panics-on-cleanup", "Panics on cleanup", "0.1.0")
    }

    fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
        Ok(())
    }

    fn execute(&self, _args: &PluginArgs) -> PluginResult<ExecutionResult> {
        Ok(ExecutionResult::ok("still standing"))
    }

    fn cleanup(&self) -> PluginResult<()> {
        panic!("cleanup exploded");
    }
}

export_plugins!(PanicsOnExecute, PanicsOnInitialize, PanicsOnConstruct, PanicsOnCleanup);
