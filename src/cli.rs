//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// dashsync - keep a dashboard value in sync from a stream and a poller
///
/// Subscribes to a WebSocket push stream, polls an HTTP endpoint on a fixed
/// period, merges both into one tracked value and prints a status line as
/// it changes.
#[derive(Parser, Debug)]
#[command(name = "dashsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a stream and/or polling endpoint until interrupted
    Watch(WatchArgs),

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Options for `watch`; each one overrides the config file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Path to configuration file
    #[arg(short, long, env = "DASHSYNC_CONFIG")]
    pub config: Option<String>,

    /// WebSocket endpoint pushing updates (ws:// or wss://)
    #[arg(short, long)]
    pub url: Option<String>,

    /// HTTP(S) endpoint polled for the full value
    #[arg(short, long)]
    pub fetch_url: Option<String>,

    /// Polling period in milliseconds (0 = manual refresh only)
    #[arg(short, long)]
    pub interval_ms: Option<u64>,

    /// Start with auto-refresh paused
    #[arg(long)]
    pub no_auto_refresh: bool,

    /// Print the full value as JSON on every update
    #[arg(long)]
    pub json: bool,

    /// Ignore and do not update the saved value
    #[arg(long)]
    pub no_store: bool,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
