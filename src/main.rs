//! auto-uploader CLI
//!
//! Watches a directory and uploads finished files to an HTTP endpoint.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use auto_uploader::commands::{self, AppState};
use auto_uploader::config::{clear_config, load_config, save_config, UploaderConfig};
use auto_uploader::events::{EventBus, StatusLogHandler, DEFAULT_EVENT_CAPACITY};
use auto_uploader::logging::{self, log_info};
use auto_uploader::shutdown::ShutdownCoordinator;

#[derive(Parser)]
#[command(name = "auto-uploader")]
#[command(about = "Upload finished files from a watched directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory until interrupted
    Watch {
        #[command(flatten)]
        target: TargetArgs,
        /// Directory to watch
        #[arg(short, long)]
        directory: Option<String>,
        /// File-name suffix to upload (case-insensitive)
        #[arg(short, long)]
        suffix: Option<String>,
        /// Number of concurrent uploads
        #[arg(short, long)]
        workers: Option<usize>,
        /// Also upload matching files already in the directory
        #[arg(long)]
        scan_existing: bool,
    },
    /// Upload a single file now
    Upload {
        file: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show recent activity
    Logs {
        /// Component log to read
        #[arg(short, long, default_value = "uploads")]
        component: String,
        /// Maximum entries
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,
    },
    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Default)]
struct TargetArgs {
    /// Upload endpoint URL
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Token sent in the multipart `token` field
    #[arg(short, long)]
    token: Option<String>,
    /// Value for the multipart `path` field
    #[arg(long)]
    destination: Option<String>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration (token masked)
    Show,
    /// Delete the saved configuration
    Clear,
    /// Update saved fields
    Set {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(short, long)]
        directory: Option<String>,
        #[arg(short, long)]
        suffix: Option<String>,
        #[arg(short, long)]
        workers: Option<usize>,
        #[arg(long)]
        scan_existing: Option<bool>,
    },
}

impl TargetArgs {
    fn apply(self, config: &mut UploaderConfig) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint_url = Some(endpoint);
        }
        if let Some(token) = self.token {
            config.auth_token = Some(token);
        }
        if let Some(destination) = self.destination {
            config.destination_path = Some(destination);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Watch {
            target,
            directory,
            suffix,
            workers,
            scan_existing,
        } => {
            let mut config = load_config().map_err(|e| anyhow::anyhow!("{}", e))?;
            target.apply(&mut config);
            apply_watch_overrides(&mut config, directory, suffix, workers);
            config.scan_existing |= scan_existing;

            run_watch(config).await
        }
        Commands::Upload { file, target } => {
            let mut config = load_config().map_err(|e| anyhow::anyhow!("{}", e))?;
            target.apply(&mut config);

            let endpoint = config
                .endpoint_url
                .clone()
                .context("No endpoint URL configured")?;
            let token = config.auth_token.clone().context("No auth token configured")?;

            let result = commands::upload_once(
                &file,
                &endpoint,
                &token,
                config.destination_path.as_deref(),
                &config.transfer,
            )
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

            if !result.success {
                bail!(
                    "Upload of {} failed after {} attempt(s): {}",
                    file.display(),
                    result.attempts,
                    result.message.unwrap_or_default()
                );
            }
            println!(
                "Uploaded {} ({} bytes, HTTP {})",
                file.display(),
                result.bytes,
                result.http_status.unwrap_or_default()
            );
            Ok(())
        }
        Commands::Logs { component, lines } => {
            let entries = commands::get_component_logs(component, Some(lines))
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            for entry in entries.iter().rev() {
                println!(
                    "{} {:5} [{}] {}",
                    entry.timestamp, entry.level, entry.component, entry.message
                );
            }
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config().map_err(|e| anyhow::anyhow!("{}", e))?;
                println!("{}", serde_json::to_string_pretty(&masked(config))?);
                Ok(())
            }
            ConfigAction::Clear => {
                clear_config().map_err(|e| anyhow::anyhow!("{}", e))?;
                println!("Configuration cleared");
                Ok(())
            }
            ConfigAction::Set {
                target,
                directory,
                suffix,
                workers,
                scan_existing,
            } => {
                let mut config = load_config().map_err(|e| anyhow::anyhow!("{}", e))?;
                target.apply(&mut config);
                apply_watch_overrides(&mut config, directory, suffix, workers);
                if let Some(scan_existing) = scan_existing {
                    config.scan_existing = scan_existing;
                }
                if let Some(endpoint) = config.endpoint_url.as_deref() {
                    auto_uploader::config::validate_endpoint_url(endpoint)?;
                }
                save_config(&config).map_err(|e| anyhow::anyhow!("{}", e))?;
                println!("Configuration saved");
                Ok(())
            }
        },
    }
}

async fn run_watch(config: UploaderConfig) -> Result<()> {
    let watch_config = config.watch_config()?;
    let options = config.watch_options();

    let shutdown = ShutdownCoordinator::new();
    let event_bus = EventBus::new(DEFAULT_EVENT_CAPACITY);
    let handler = StatusLogHandler::new(event_bus.clone(), shutdown.clone()).start();

    // Mirror status lines to stdout
    let mut rx = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("{}", event.status_line());
        }
    });

    let state = AppState::new(event_bus);
    commands::start_watch(&state, watch_config, options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    wait_for_signal().await;
    log_info("watcher", "Shutdown signal received, finishing in-flight uploads").unwrap_or_default();

    commands::stop_watch(&state)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    shutdown.shutdown();
    let _ = handler.await;
    drop(state);
    printer.abort();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn apply_watch_overrides(
    config: &mut UploaderConfig,
    directory: Option<String>,
    suffix: Option<String>,
    workers: Option<usize>,
) {
    if let Some(directory) = directory {
        config.directory_path = Some(directory);
    }
    if let Some(suffix) = suffix {
        config.suffix = suffix;
    }
    if let Some(workers) = workers {
        config.workers = workers.max(1);
    }
}

fn masked(mut config: UploaderConfig) -> UploaderConfig {
    if let Some(token) = config.auth_token.as_mut() {
        let visible: String = token.chars().take(4).collect();
        *token = format!("{}****", visible);
    }
    config
}
