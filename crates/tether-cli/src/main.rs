//! tether: command-line client for end-to-end encrypted location reminders.
//!
//! Reminder text and saved place names are encrypted on this machine before
//! they are synced. Every command works offline; `tether sync` reconciles
//! with the backend when it is reachable.

mod app;
mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about = "End-to-end encrypted location reminders")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Passphrase unlocking the secure store (min 12 characters on first use)
    #[arg(long, env = "TETHER_PASSPHRASE", hide_env_values = true, global = true)]
    pub passphrase: Option<String>,

    /// Data directory (overrides config)
    #[arg(long, env = "TETHER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Use cheaper key derivation for the secure store
    #[arg(long, global = true)]
    pub low_memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate this account's keypair and show the recovery key
    Init {
        /// Confirm the recovery key has been saved without prompting
        #[arg(long)]
        yes: bool,
    },

    /// Show the recovery key again
    RecoveryKey,

    /// Restore the keypair on this device from a recovery key
    Restore {
        /// Recovery key as shown by `tether init`
        artifact: String,
    },

    /// Replace a lost keypair. Data encrypted under the old key becomes unreadable
    RegenerateKeys {
        /// Acknowledge that existing encrypted data will be lost
        #[arg(long)]
        i_understand_data_loss: bool,
    },

    /// Show session and key status
    Whoami,

    /// Store a backend session
    Login {
        #[arg(long)]
        user: String,

        #[arg(long, env = "TETHER_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Forget the backend session
    Logout,

    /// Manage reminders
    #[command(subcommand)]
    Reminder(ReminderCommand),

    /// Manage saved locations
    #[command(subcommand)]
    Preset(PresetCommand),

    /// Reconcile local data with the backend
    Sync,

    /// Encrypt text to a public key (default: your own)
    Seal {
        text: String,

        /// Recipient public key (base64)
        #[arg(long)]
        to: Option<String>,
    },

    /// Decrypt a sealed payload with your private key
    Open { payload: String },
}

#[derive(Args)]
pub struct ReminderFields {
    /// What to do
    #[arg(long)]
    pub task: Option<String>,

    /// Place name
    #[arg(long)]
    pub location: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Geofence radius in meters
    #[arg(long)]
    pub radius: Option<u32>,

    /// arrive or leave
    #[arg(long)]
    pub trigger: Option<String>,
}

#[derive(Subcommand)]
pub enum ReminderCommand {
    /// Create a reminder
    Add {
        #[command(flatten)]
        fields: ReminderFields,
    },

    /// List reminders
    List {
        /// Include archived reminders
        #[arg(long)]
        all: bool,
    },

    /// Edit a reminder
    Update {
        id: String,

        #[command(flatten)]
        fields: ReminderFields,
    },

    /// Archive reminders
    Archive {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Restore archived reminders
    Unarchive {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Delete reminders
    Delete {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum PresetCommand {
    /// Save a location
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        address: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// List saved locations
    List,

    /// Delete saved locations
    Delete {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

/// Initialize tracing.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "tether=info")
///
/// Console output goes to stderr so command output on stdout stays parseable.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tether=info,tether_sync=info,tether_store=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("tether.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let cli = Cli::parse();
    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
