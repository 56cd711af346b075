//! Plughost - runtime plugin host.
//!
//! Discovers native plugin modules in a directory, checks them, loads them
//! and runs them by id.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plughost::plugin::{PluginArgs, PluginManager, SecurityValidator};
use plughost::HostConfig;

/// Runtime plugin host
#[derive(Parser)]
#[command(name = "plughost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: .plughost.toml, then the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Plugin directory to scan
    #[arg(long, global = true, env = "PLUGHOST_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,

    /// Hash whitelist file
    #[arg(long, global = true, env = "PLUGHOST_WHITELIST")]
    whitelist: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List loaded plugins
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show details of a plugin
    Info {
        /// Plugin id
        id: String,
    },

    /// Execute a plugin
    Run {
        /// Plugin id
        id: String,

        /// Argument as key=value (value parsed as JSON when possible)
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Arguments as a JSON object
        #[arg(long)]
        json: Option<String>,
    },

    /// Load a single module file and report what it registers
    Load {
        /// Path to the module
        path: PathBuf,
    },

    /// Load all plugins, then unload one
    Unload {
        /// Plugin id
        id: String,
    },

    /// Print the SHA-256 of a module (for the whitelist)
    Hash {
        /// Path to the module
        path: PathBuf,
    },

    /// Run the security checks on a module without loading it
    Validate {
        /// Path to the module
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    let config = load_config(&cli)?;

    let result = match cli.command {
        Commands::List { format } => cmd_list(config, &format),
        Commands::Info { id } => cmd_info(config, &id),
        Commands::Run { id, args, json } => cmd_run(config, &id, &args, json.as_deref()),
        Commands::Load { path } => cmd_load(config, &path),
        Commands::Unload { id } => cmd_unload(config, &id),
        Commands::Hash { path } => cmd_hash(&path),
        Commands::Validate { path } => cmd_validate(&config.validator(), &path),
    };

    PluginManager::reset_instance();
    result
}

/// Resolve the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<HostConfig> {
    let mut config = match &cli.config {
        Some(path) => HostConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HostConfig::load().context("Failed to load config")?,
    };

    if let Some(dir) = &cli.plugin_dir {
        config.plugin_directory = Some(dir.clone());
    }
    if let Some(whitelist) = &cli.whitelist {
        config.whitelist = Some(whitelist.clone());
    }

    Ok(config)
}

/// Create the manager and load every plugin in the plugin directory.
fn start(config: HostConfig) -> Result<Arc<PluginManager>> {
    let manager = PluginManager::get_instance_with(config).context("Failed to start plugin manager")?;
    let report = manager.initialize();

    for rejection in &report.rejected {
        tracing::info!(path = %rejection.path.display(), reason = %rejection.reason, "Skipped module");
    }

    Ok(manager)
}

/// List loaded plugins.
fn cmd_list(config: HostConfig, format: &str) -> Result<()> {
    let manager = start(config)?;
    let plugins = manager.plugin_summaries();

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&plugins)?;
            println!("{json}");
        }
        _ => {
            if plugins.is_empty() {
                println!("No plugins loaded from {}", manager.plugin_directory().display());
                return Ok(());
            }

            for plugin in &plugins {
                let meta = &plugin.metadata;
                println!("  {} v{} - {} [{}]", meta.id, meta.version, meta.name, plugin.state);
                if let Some(description) = &meta.description {
                    println!("      {description}");
                }
            }
            println!("\nTotal: {} plugin(s)", plugins.len());
        }
    }

    Ok(())
}

/// Show details of one plugin.
fn cmd_info(config: HostConfig, id: &str) -> Result<()> {
    let manager = start(config)?;
    let Some(info) = manager.plugin_info(id) else {
        bail!("Plugin not found: {id}");
    };

    let meta = &info.metadata;
    println!("{} v{}", meta.name, meta.version);
    println!("  id:          {}", meta.id);
    if let Some(author) = &meta.author {
        println!("  author:      {author}");
    }
    if let Some(description) = &meta.description {
        println!("  description: {description}");
    }
    if let Some(required) = &meta.minimum_host_version {
        println!("  requires:    host {required}");
    }
    if !meta.dependencies.is_empty() {
        println!("  depends on:  {}", meta.dependencies.join(", "));
    }
    println!("  state:       {}", info.state);
    println!("  source:      {}", info.source.display());
    if let Some(hash) = &info.file_hash {
        println!("  sha256:      {hash}");
    }

    Ok(())
}

/// Execute a plugin and print its result.
fn cmd_run(config: HostConfig, id: &str, pairs: &[String], json: Option<&str>) -> Result<()> {
    let args = build_args(pairs, json)?;
    let manager = start(config)?;

    let result = manager.execute_plugin(id, &args);
    if !result.success {
        bail!("{}", result.message);
    }

    println!("{}", result.message);
    if let Some(data) = &result.data {
        println!("{}", serde_json::to_string_pretty(data)?);
    }

    Ok(())
}

/// Load one module file.
fn cmd_load(config: HostConfig, path: &Path) -> Result<()> {
    let manager = PluginManager::get_instance_with(config).context("Failed to start plugin manager")?;

    let ids = manager.loader().try_load(path)?;
    println!("Loaded {} plugin(s) from {}:", ids.len(), path.display());
    for id in &ids {
        println!("  {id}");
    }

    Ok(())
}

/// Load everything, then unload one plugin.
fn cmd_unload(config: HostConfig, id: &str) -> Result<()> {
    let manager = start(config)?;
    if !manager.unload_plugin(id) {
        bail!("Plugin not found: {id}");
    }

    println!("Unloaded {id}");
    Ok(())
}

/// Print the SHA-256 of a module.
fn cmd_hash(path: &Path) -> Result<()> {
    let Some(hash) = SecurityValidator::compute_hash(path) else {
        bail!("Could not read {}", path.display());
    };

    println!("{hash}");
    Ok(())
}

/// Run the security checks on a module.
fn cmd_validate(validator: &SecurityValidator, path: &Path) -> Result<()> {
    let hash = validator.verify(path)?;
    println!("✓ {} passed validation", path.display());
    println!("  sha256: {hash}");
    Ok(())
}

/// Merge `--json` and `--arg key=value` into one argument map.
fn build_args(pairs: &[String], json: Option<&str>) -> Result<PluginArgs> {
    let mut args = match json {
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw).context("Invalid --json value")? {
            serde_json::Value::Object(map) => map,
            _ => bail!("--json must be a JSON object"),
        },
        None => PluginArgs::new(),
    };

    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid argument '{pair}', expected key=value");
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        args.insert(key.to_string(), value);
    }

    Ok(args)
}
