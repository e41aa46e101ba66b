//! dashsync command-line entry point
//!
//! `watch` runs a coordinator over `serde_json::Value` until Ctrl+C, printing
//! a status line whenever the value or the stream status changes.

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use dashsync::cli::{Cli, Commands, ConfigSubcommand, WatchArgs};
use dashsync::config::{self, SyncConfig};
use dashsync::error::{Error, Result};
use dashsync::logging;
use dashsync::store::{JsonFileStore, KeyedStore};
use dashsync::version::{self, BuildInfo};
use dashsync::{ConnectionStatus, Decoder, HttpFetcher, SyncCoordinator, SyncOptions};

/// How often `watch` checks for stream status changes
const STATUS_POLL: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = match cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand);
        }
        Commands::Watch(args) => args,
    };

    let config = match load_watch_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };

    // Must outlive the runtime so buffered file logs are flushed
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = BuildInfo::current();
    info!(
        version = %build.full_version(),
        target = %build.target,
        "Starting dashsync"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("dashsync")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    if let Err(e) = runtime.block_on(watch(config, args)) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
    Ok(())
}

/// Config file and environment, then CLI flags on top
fn load_watch_config(args: &WatchArgs) -> Result<SyncConfig> {
    let mut config = SyncConfig::load(args.config.as_deref())?;

    if let Some(url) = &args.url {
        config.stream.url = Some(url.clone());
    }
    if let Some(fetch_url) = &args.fetch_url {
        config.polling.fetch_url = Some(fetch_url.clone());
    }
    if let Some(interval_ms) = args.interval_ms {
        config.polling.refresh_interval_ms = interval_ms;
    }
    if args.no_auto_refresh {
        config.polling.auto_refresh = false;
    }
    config.validate()?;

    if config.stream.url.is_none() && config.polling.fetch_url.is_none() {
        return Err(Error::config_field_invalid(
            "stream.url",
            "Nothing to watch: set a stream URL (--url) or a fetch URL (--fetch-url)",
        ));
    }

    Ok(config)
}

async fn watch(config: SyncConfig, args: WatchArgs) -> Result<()> {
    let store = if args.no_store {
        None
    } else {
        Some(JsonFileStore::open_or_empty(config.store_path())?)
    };
    let store_key = config.storage.store_key.as_str();
    let initial = store
        .as_ref()
        .and_then(|s| s.get(store_key))
        .unwrap_or(Value::Null);

    let (update_tx, mut update_rx) = mpsc::unbounded_channel::<Value>();
    let mut options = SyncOptions::new(initial)
        .on_data(move |value: &Value| {
            let _ = update_tx.send(value.clone());
        })
        .with_auto_refresh(config.polling.auto_refresh)
        .with_connection_config(config.connection_config());

    if let Some(url) = &config.stream.url {
        options = options.with_stream(url.clone(), Decoder::json());
    }
    if let Some(fetch_url) = &config.polling.fetch_url {
        options = options
            .with_fetcher(HttpFetcher::<Value>::with_timeout(
                fetch_url.clone(),
                config.fetch_timeout(),
            )?)
            .with_refresh_interval(config.refresh_interval());
    }

    let coordinator = SyncCoordinator::start(options);

    if config.polling.fetch_url.is_some() {
        if let Err(e) = coordinator.refresh().await {
            warn!(error = %e.format_for_log(), "Initial refresh failed");
        }
    }

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    let mut status_timer = tokio::time::interval(STATUS_POLL);
    status_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_status: Option<ConnectionStatus> = None;
    let mut warned_exhausted = false;

    loop {
        tokio::select! {
            signal = &mut shutdown_signal => {
                signal?;
                info!("Shutdown signal received");
                break;
            }

            Some(value) = update_rx.recv() => {
                if args.json {
                    println!("{}", serde_json::to_string(&value)?);
                } else {
                    println!("{}", coordinator.snapshot().status_line(Utc::now()));
                }
            }

            _ = status_timer.tick() => {
                let snapshot = coordinator.snapshot();
                if last_status != Some(snapshot.status) {
                    last_status = Some(snapshot.status);
                    if let Some(error) = &snapshot.last_error {
                        debug!(error = %error, "Last stream error");
                    }
                    if !args.json {
                        println!("{}", snapshot.status_line(Utc::now()));
                    }
                }
                let exhausted = coordinator.connection().is_some_and(|c| c.is_exhausted());
                if exhausted && !warned_exhausted {
                    warned_exhausted = true;
                    warn!("Stream gave up reconnecting; polling continues if configured");
                }
            }
        }
    }

    coordinator.shutdown();

    if let Some(store) = &store {
        if coordinator.last_updated().is_some() {
            store.set(store_key, coordinator.value())?;
            info!(path = %store.path().display(), key = store_key, "Saved last value");
        }
    }

    Ok(())
}

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = SyncConfig::load(config.as_deref())?;
            println!("{}", cfg.to_toml()?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate { config } => match SyncConfig::load(config.as_deref()) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
        },
    }

    Ok(())
}
