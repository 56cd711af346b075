//! Plugin Integration Tests
//!
//! End-to-end flows through `PluginManager`: discovery, the security gate,
//! failure isolation, unloading and the process-wide instance.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use plughost::plugin::prelude::*;
use plughost::plugin::{factory_of, PluginFactory, SecurityValidator, StaticModuleLoader, PLUGIN_EXTENSION};
use plughost::{HostConfig, PluginManager};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

// ============================================================================
// Test Plugins
// ============================================================================

#[derive(Default)]
struct Greeting {
    context: Option<Arc<HostContext>>,
}

impl Plugin for Greeting {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("com.example.greeting", "Greeting", "1.0.0")
            .with_author("Example")
            .with_description("Says hello")
    }

    fn initialize(&mut self, context: Arc<HostContext>) -> PluginResult<()> {
        context.logger().info("greeting ready");
        self.context = Some(context);
        Ok(())
    }

    fn execute(&self, args: &PluginArgs) -> PluginResult<ExecutionResult> {
        let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("world");
        if let Some(context) = &self.context {
            context.set_config_value("greeting.last", name);
        }
        Ok(ExecutionResult::ok(format!("Hello, {name}!")))
    }
}

/// Reads what `Greeting` wrote to the shared config store.
#[derive(Default)]
struct Reader {
    context: Option<Arc<HostContext>>,
}

impl Plugin for Reader {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("com.example.reader", "Reader", "1.0.0")
            .with_dependency("com.example.greeting")
    }

    fn initialize(&mut self, context: Arc<HostContext>) -> PluginResult<()> {
        self.context = Some(context);
        Ok(())
    }

    fn execute(&self, _args: &PluginArgs) -> PluginResult<ExecutionResult> {
        let last = self.context.as_ref().and_then(|c| c.get_config_value("greeting.last"));
        Ok(ExecutionResult::ok_with_data("read", json!({ "last": last })))
    }
}

#[derive(Default)]
struct Faulty;

impl Plugin for Faulty {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("com.example.faulty", "Faulty", "1.0.0")
    }

    fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
        Ok(())
    }

    fn execute(&self, args: &PluginArgs) -> PluginResult<ExecutionResult> {
        match args.get("mode").and_then(|v| v.as_str()) {
            Some("panic") => panic!("faulty plugin panicked"),
            Some("error") => Err(PluginError::Execution("boom".into())),
            _ => Ok(ExecutionResult::ok("fine")),
        }
    }
}

#[derive(Default)]
struct BrokenInit;

impl Plugin for BrokenInit {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("com.example.broken", "Broken", "1.0.0")
    }

    fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
        Err(PluginError::Initialization("database unreachable".into()))
    }

    fn execute(&self, _args: &PluginArgs) -> PluginResult<ExecutionResult> {
        Ok(ExecutionResult::ok("never"))
    }
}

static SLOW_CLEANUPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Slow;

impl Plugin for Slow {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("com.example.slow", "Slow", "1.0.0")
    }

    fn initialize(&mut self, _context: Arc<HostContext>) -> PluginResult<()> {
        Ok(())
    }

    fn execute(&self, _args: &PluginArgs) -> PluginResult<ExecutionResult> {
        thread::sleep(Duration::from_millis(5));
        Ok(ExecutionResult::ok("slow"))
    }

    fn cleanup(&self) -> PluginResult<()> {
        SLOW_CLEANUPS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn module_name(stem: &str) -> String {
    format!("{stem}.{PLUGIN_EXTENSION}")
}

fn write_module(dir: &Path, stem: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(module_name(stem));
    std::fs::write(&path, contents).unwrap();
    path
}

fn args(value: serde_json::Value) -> PluginArgs {
    value.as_object().cloned().unwrap_or_default()
}

fn manager_with(
    dir: &TempDir,
    config: HostConfig,
    modules: Vec<(&str, Vec<Arc<dyn PluginFactory>>)>,
) -> PluginManager {
    let mut loader = StaticModuleLoader::new();
    for (stem, factories) in modules {
        write_module(dir.path(), stem, stem.as_bytes());
        loader = loader.with_module(module_name(stem), factories);
    }

    PluginManager::new(config.with_plugin_directory(dir.path()), Arc::new(loader)).unwrap()
}

fn manager(dir: &TempDir, modules: Vec<(&str, Vec<Arc<dyn PluginFactory>>)>) -> PluginManager {
    manager_with(dir, HostConfig::default(), modules)
}

// ============================================================================
// Discovery & Execution
// ============================================================================

mod discovery {
    use super::*;

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, vec![]);

        let report = manager.initialize();
        assert_eq!(report.discovered, 0);
        assert!(manager.list_plugins().is_empty());
    }

    #[test]
    fn test_greeting_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, vec![("greeting", vec![factory_of::<Greeting>()])]);

        let report = manager.initialize();
        assert_eq!(report.loaded, vec!["com.example.greeting"]);

        let list = manager.list_plugins();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].description.as_deref(), Some("Says hello"));

        let result = manager.execute_plugin("com.example.greeting", &args(json!({"name": "Ada"})));
        assert!(result.success);
        assert_eq!(result.message, "Hello, Ada!");
        assert!(result.error.is_none());
    }

    #[test]
    fn test_non_module_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a plugin").unwrap();
        std::fs::write(dir.path().join("greeting.dll.bak"), b"backup").unwrap();
        let manager = manager(&dir, vec![("greeting", vec![factory_of::<Greeting>()])]);

        let report = manager.initialize();
        assert_eq!(report.discovered, 1);
        assert_eq!(report.loaded.len(), 1);
    }

    #[test]
    fn test_nested_directories_are_scanned() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("vendor").join("greeting");
        std::fs::create_dir_all(&nested).unwrap();
        write_module(&nested, "greeting", b"nested");

        let loader = StaticModuleLoader::new()
            .with_module(module_name("greeting"), vec![factory_of::<Greeting>()]);
        let config = HostConfig::default().with_plugin_directory(dir.path());
        let manager = PluginManager::new(config, Arc::new(loader)).unwrap();

        assert_eq!(manager.initialize().loaded, vec!["com.example.greeting"]);
        let info = manager.plugin_info("com.example.greeting").unwrap();
        assert!(info.source.starts_with(manager.plugin_directory()));
    }

    #[test]
    fn test_shared_config_between_plugins() {
        let dir = TempDir::new().unwrap();
        let manager = manager(
            &dir,
            vec![("pair", vec![factory_of::<Greeting>(), factory_of::<Reader>()])],
        );
        manager.initialize();

        manager.execute_plugin("com.example.greeting", &args(json!({"name": "Grace"})));
        let result = manager.execute_plugin("com.example.reader", &PluginArgs::new());

        assert_eq!(result.data.unwrap()["last"], json!("Grace"));
        assert_eq!(manager.context().get_config_value("greeting.last").as_deref(), Some("Grace"));
    }
}

// ============================================================================
// Security Gate
// ============================================================================

mod security_gate {
    use super::*;

    #[test]
    fn test_oversize_module_is_rejected() {
        let dir = TempDir::new().unwrap();
        let big = dir.path().join(module_name("big"));
        std::fs::File::create(&big).unwrap().set_len(60 * 1024 * 1024).unwrap();
        let manager = manager(&dir, vec![("greeting", vec![factory_of::<Greeting>()])]);

        let report = manager.initialize();
        assert_eq!(report.discovered, 2);
        assert_eq!(report.loaded, vec!["com.example.greeting"]);
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].path.ends_with(module_name("big")));
        assert!(!manager.load_plugin(&big));
    }

    #[test]
    fn test_whitelist_gates_loading() {
        let dir = TempDir::new().unwrap();
        let approved = write_module(dir.path(), "approved", b"approved module");
        write_module(dir.path(), "rogue", b"rogue module");
        let hash = SecurityValidator::compute_hash(&approved).unwrap();

        let lists = TempDir::new().unwrap();
        let whitelist = lists.path().join("whitelist.txt");
        std::fs::write(&whitelist, format!("# approved\n{}\n", hash.to_uppercase())).unwrap();

        let loader = StaticModuleLoader::new()
            .with_module(module_name("approved"), vec![factory_of::<Greeting>()])
            .with_module(module_name("rogue"), vec![factory_of::<Faulty>()]);
        let config =
            HostConfig::default().with_whitelist(&whitelist).with_plugin_directory(dir.path());
        let manager = PluginManager::new(config, Arc::new(loader)).unwrap();

        let report = manager.initialize();
        assert_eq!(report.loaded, vec!["com.example.greeting"]);
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].reason.contains("not whitelisted"));
        assert!(manager.get_plugin("com.example.faulty").is_none());
    }

    #[test]
    fn test_missing_whitelist_accepts_everything() {
        let dir = TempDir::new().unwrap();
        let config = HostConfig::default().with_whitelist(dir.path().join("absent.txt"));
        let manager = manager_with(&dir, config, vec![("greeting", vec![factory_of::<Greeting>()])]);

        assert_eq!(manager.initialize().loaded.len(), 1);
    }
}

// ============================================================================
// Failure Isolation
// ============================================================================

mod isolation {
    use super::*;

    #[test]
    fn test_failing_initialize_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let manager = manager(
            &dir,
            vec![
                ("a-broken", vec![factory_of::<BrokenInit>()]),
                ("b-greeting", vec![factory_of::<Greeting>()]),
            ],
        );

        let report = manager.initialize();
        assert_eq!(report.loaded, vec!["com.example.greeting"]);
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].reason.contains("database unreachable"));
        assert!(manager.get_plugin("com.example.broken").is_none());
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let dir = TempDir::new().unwrap();
        let manager = manager(
            &dir,
            vec![
                ("a-greeting", vec![factory_of::<Greeting>()]),
                ("b-greeting", vec![factory_of::<Greeting>()]),
            ],
        );

        let report = manager.initialize();
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.rejected.len(), 1);

        let info = manager.plugin_info("com.example.greeting").unwrap();
        assert!(info.source.ends_with(module_name("a-greeting")));
    }

    #[test]
    fn test_execution_errors_become_failed_results() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, vec![("faulty", vec![factory_of::<Faulty>()])]);
        manager.initialize();

        let result = manager.execute_plugin("com.example.faulty", &args(json!({"mode": "error"})));
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::Execution));
        assert!(result.data.is_none());
        assert!(result.message.contains("boom"));

        let result = manager.execute_plugin("com.example.faulty", &args(json!({"mode": "panic"})));
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::Execution));
        assert!(result.message.contains("faulty plugin panicked"));

        // Still usable after both.
        let result = manager.execute_plugin("com.example.faulty", &PluginArgs::new());
        assert!(result.success);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, vec![]);

        let result = manager.execute_plugin("com.example.missing", &PluginArgs::new());
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
        assert!(result.message.contains("com.example.missing"));
    }
}

// ============================================================================
// Unloading
// ============================================================================

mod unloading {
    use super::*;

    #[test]
    fn test_unload_then_execute() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, vec![("greeting", vec![factory_of::<Greeting>()])]);
        manager.initialize();

        assert!(manager.unload_plugin("com.example.greeting"));
        assert!(!manager.unload_plugin("com.example.greeting"));

        let result = manager.execute_plugin("com.example.greeting", &PluginArgs::new());
        assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
        assert!(manager.list_plugins().is_empty());
    }

    #[test]
    fn test_unload_during_concurrent_execution() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(manager(&dir, vec![("slow", vec![factory_of::<Slow>()])]));
        manager.initialize();
        let before = SLOW_CLEANUPS.load(Ordering::SeqCst);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    (0..20)
                        .map(|_| manager.execute_plugin("com.example.slow", &PluginArgs::new()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(manager.unload_plugin("com.example.slow"));

        for worker in workers {
            for result in worker.join().unwrap() {
                assert!(
                    result.success || result.error_kind() == Some(ErrorKind::NotFound),
                    "unexpected result: {result:?}"
                );
            }
        }

        assert_eq!(SLOW_CLEANUPS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_shutdown_clears_registry() {
        let dir = TempDir::new().unwrap();
        let manager = manager(
            &dir,
            vec![("pair", vec![factory_of::<Greeting>(), factory_of::<Reader>()])],
        );
        assert_eq!(manager.initialize().loaded.len(), 2);

        manager.shutdown();
        assert!(manager.list_plugins().is_empty());
    }
}

// ============================================================================
// Process-wide Instance
// ============================================================================

mod singleton {
    use super::*;

    #[test]
    #[serial]
    fn test_concurrent_get_instance() {
        PluginManager::reset_instance();
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let barrier = Arc::new(std::sync::Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                thread::spawn(move || {
                    barrier.wait();
                    PluginManager::get_instance(Some(path), "1.2.0").unwrap()
                })
            })
            .collect();

        let managers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(managers.iter().all(|m| Arc::ptr_eq(m, &managers[0])));
        assert_eq!(managers[0].context().host_version(), "1.2.0");

        PluginManager::reset_instance();
    }

    #[test]
    #[serial]
    fn test_reset_gives_fresh_instance() {
        PluginManager::reset_instance();
        let dir = TempDir::new().unwrap();

        let first = PluginManager::get_instance(Some(dir.path().to_path_buf()), "1.0.0").unwrap();
        PluginManager::reset_instance();
        let second = PluginManager::get_instance(Some(dir.path().to_path_buf()), "2.0.0").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.context().host_version(), "2.0.0");

        PluginManager::reset_instance();
    }

    #[test]
    #[serial]
    fn test_default_directory_is_created() {
        PluginManager::reset_instance();

        let manager = PluginManager::get_instance(None, "1.0.0").unwrap();
        assert!(manager.plugin_directory().is_dir());
        assert!(manager.plugin_directory().ends_with("plugins"));

        PluginManager::reset_instance();
    }
}
