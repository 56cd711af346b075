//! Greeting plugin for plughost.
//!
//! Build with `cargo build --release`, then copy the library from
//! `target/release/` into the host's plugin directory:
//!
//! ```bash
//! plughost run com.example.greeting --arg name=Ada
//! # Hello, Ada!
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use plughost::plugin::prelude::*;

/// Config key holding the greeting word.
const SALUTATION_KEY: &str = "greeting.salutation";

/// Says hello, counting how many times it has.
#[derive(Default)]
pub struct Greeting {
    context: Option<Arc<HostContext>>,
    greeted: AtomicU64,
}

impl Plugin for Greeting {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("com.example.greeting", "Greeting", env!("CARGO_PKG_VERSION"))
            .with_author("plughost contributors")
            .with_description("Greets whoever is named in the `name` argument")
            .with_minimum_host_version("0.1")
    }

    fn initialize(&mut self, context: Arc<HostContext>) -> PluginResult<()> {
        context.logger().info(&format!("greeting plugin ready (host {})", context.host_version()));
        self.context = Some(context);
        Ok(())
    }

    fn execute(&self, args: &PluginArgs) -> PluginResult<ExecutionResult> {
        let name = match args.get("name") {
            Some(value) => value
                .as_str()
                .ok_or_else(|| PluginError::Execution("'name' must be a string".into()))?,
            None => "world",
        };

        let salutation = self
            .context
            .as_ref()
            .and_then(|c| c.get_config_value(SALUTATION_KEY))
            .unwrap_or_else(|| "Hello".to_string());

        let count = self.greeted.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(ExecutionResult::ok_with_data(
            format!("{salutation}, {name}!"),
            serde_json::json!({ "greeted": count }),
        ))
    }

    fn cleanup(&self) -> PluginResult<()> {
        if let Some(context) = &self.context {
            context.logger().info(&format!(
                "greeting plugin unloading after {} greeting(s)",
                self.greeted.load(Ordering::Relaxed)
            ));
        }
        Ok(())
    }
}

export_plugins!(Greeting);
