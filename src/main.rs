#![forbid(unsafe_code)]

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{Level as TraceLevel, info, warn};
use tracing_subscriber::FmtSubscriber;

use putwindow_settings::constants::{extension, paths};
use putwindow_settings::{
    ConfigStore, ExtensionMetadata, KeyFileHost, Notifier, StoreOptions, TracingNotifier,
};

/// Inspect and edit the putWindow extension settings
#[derive(Debug, Parser)]
#[command(name = "putwindow-settings", version)]
struct Cli {
    /// Extension install directory (holds metadata.json and schemas/)
    #[arg(long)]
    extension_dir: Option<PathBuf>,

    /// Directory holding stored setting values
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// System-wide schema directory
    #[arg(long)]
    schema_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the whole settings snapshot as JSON
    Show,
    /// Print the value at a dotted path
    Get {
        path: String,
        /// Fallback (JSON) when the path does not resolve
        #[arg(long, default_value = "null")]
        default: String,
    },
    /// Print the numeric value at a dotted path
    GetNumber {
        path: String,
        #[arg(long, default_value_t = 0.0)]
        default: f64,
    },
    /// Print the boolean value at a dotted path
    GetBool {
        path: String,
        #[arg(long, default_value = "false")]
        default: String,
    },
    /// Set a value (parsed as JSON, else taken as a string) and save
    Set { path: String, value: String },
    /// Remove a value from the locations structure and save
    Unset { path: String },
    /// Keybinding string arrays
    Strv {
        #[command(subcommand)]
        action: StrvCommand,
    },
}

#[derive(Debug, Subcommand)]
enum StrvCommand {
    Get { key: String },
    Set { key: String, values: Vec<String> },
}

/// Logs like [`TracingNotifier`] and remembers how many failures it saw.
#[derive(Default)]
struct CliNotifier {
    failures: Cell<usize>,
}

impl Notifier for CliNotifier {
    fn info(&self, title: &str, message: &str) {
        TracingNotifier.info(title, message);
    }

    fn error(&self, title: &str, message: &str) {
        self.failures.set(self.failures.get() + 1);
        TracingNotifier.error(title, message);
    }
}

fn default_dir(base: Option<PathBuf>, tail: &str) -> PathBuf {
    let mut path = base.unwrap_or_else(|| PathBuf::from("."));
    path.push(tail);
    path
}

fn load_metadata(dir: PathBuf) -> Result<ExtensionMetadata> {
    if dir.join(extension::METADATA_FILE).exists() {
        return ExtensionMetadata::from_dir(&dir)
            .with_context(|| format!("Failed to read extension metadata from {:?}", dir));
    }

    warn!(path = %dir.display(), "No metadata.json found, using built-in extension identity");
    Ok(ExtensionMetadata::new(extension::UUID, extension::SCHEMA_ID, dir))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli, store: &ConfigStore) -> Result<()> {
    match cli.command {
        Command::Show => print_json(&serde_json::to_value(store.snapshot())?)?,
        Command::Get { path, default } => {
            print_json(&store.get_parameter(&path, parse_value(&default)))?
        }
        Command::GetNumber { path, default } => println!("{}", store.get_number(&path, default)),
        Command::GetBool { path, default } => {
            println!("{}", store.get_boolean(&path, parse_value(&default)))
        }
        Command::Set { path, value } => {
            store.set_parameter(&path, parse_value(&value));
            store.save_settings();
        }
        Command::Unset { path } => {
            store
                .unset_parameter(&path)
                .with_context(|| format!("Failed to unset '{}'", path))?;
            store.save_settings();
        }
        Command::Strv { action: StrvCommand::Get { key } } => {
            for value in store.get_strv(&key)? {
                println!("{}", value);
            }
        }
        Command::Strv { action: StrvCommand::Set { key, values } } => {
            store.set_strv(&key, &values)?;
            info!(key = %key, count = values.len(), "Updated string array");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let extension_dir = cli.extension_dir.clone().unwrap_or_else(|| {
        default_dir(dirs::data_dir(), paths::EXTENSIONS_DIR).join(extension::UUID)
    });
    let store_dir = cli
        .store_dir
        .clone()
        .unwrap_or_else(|| default_dir(dirs::config_dir(), paths::APP_DIR));
    let schema_dir = cli
        .schema_dir
        .clone()
        .unwrap_or_else(|| default_dir(dirs::data_dir(), paths::SYSTEM_SCHEMA_DIR));

    let metadata = load_metadata(extension_dir)?;
    let host = Rc::new(
        KeyFileHost::new(&schema_dir, store_dir)
            .with_context(|| format!("Failed to load system schemas from {:?}", schema_dir))?,
    );
    let notifier = Rc::new(CliNotifier::default());
    let store = ConfigStore::with_options(metadata, host, notifier.clone(), StoreOptions::default())
        .context("Failed to open extension settings")?;

    run(cli, &store)?;

    let failures = notifier.failures.get();
    if failures > 0 {
        bail!("{} settings operation(s) failed", failures);
    }
    Ok(())
}
