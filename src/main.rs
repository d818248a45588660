//! Socksd - SOCKS5 Proxy Server
//!
//! This is the main entry point for the Socksd application.

use anyhow::{Context, Result};
use clap::Parser;
use socksd::config::{load_config, Config, ServerConfig, Suggestion};
use socksd::helper::local_ip;
use socksd::server::run_server;
use socksd::SocksdError;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Socksd - SOCKS5 proxy server with optional username/password auth
#[derive(Parser, Debug)]
#[command(name = "socksd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host or IP to listen on (overrides the config file)
    #[arg(long)]
    listen_host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Username for SOCKS5 auth (requires --password)
    #[arg(short, long)]
    username: Option<String>,

    /// Password for SOCKS5 auth (requires --username)
    #[arg(long)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,

    /// Print a suggested configuration and share link, then exit
    #[arg(long)]
    suggest: bool,
}

impl Args {
    /// Apply command line overrides on top of the file configuration
    fn apply_overrides(&self, server: &mut ServerConfig) {
        if let Some(host) = &self.listen_host {
            server.listen_host = host.clone();
        }
        if let Some(port) = self.port {
            server.listen_port = port;
        }
        if self.username.is_some() {
            server.username = self.username.clone();
        }
        if self.password.is_some() {
            server.password = self.password.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    if args.suggest {
        return print_suggestion();
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };
    args.apply_overrides(&mut config.server);
    config.server.validate()?;

    info!("Socksd v{}", socksd::VERSION);

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Run the server
    if let Err(e) = run_server(config.server, shutdown_rx).await {
        match e.downcast_ref::<SocksdError>() {
            Some(bind @ SocksdError::Bind { .. }) => {
                error!("{} ({})", bind, bind.bind_reason().unwrap_or("bind failed"))
            }
            _ => error!("Server stopped: {:#}", e),
        }
        return Err(e);
    }

    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
                return;
            }
            Err(e) => warn!("Failed to setup SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}

/// Print a ready-to-use configuration with random port and credentials
fn print_suggestion() -> Result<()> {
    let suggestion = Suggestion::generate(local_ip());
    let config = toml::to_string(&suggestion.to_config())
        .with_context(|| "Failed to render suggested configuration")?;

    println!("# Suggested configuration");
    println!("{}", config);
    println!("# Share link");
    println!("{}", suggestion.share_link());
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
