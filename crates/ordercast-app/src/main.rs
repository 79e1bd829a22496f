// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ordercast -- order notification and receipt print server
//
// Entry point. Initialises logging, loads configuration, and runs the
// notification server until Ctrl-C or SIGTERM.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ordercast_core::config::OrdercastConfig;
use ordercast_core::error::{OrdercastError, Result};
use ordercast_notify::{AppState, NotificationServer};

/// Fan restaurant orders out to POS terminals and print receipts on LAN
/// printers.
#[derive(Debug, Parser)]
#[command(name = "ordercast", version)]
struct Cli {
    /// JSON configuration file; built-in defaults apply when omitted.
    #[arg(long, short = 'c', env = "ORDERCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Port for HTTP and terminal WebSockets (overrides config and env).
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Interface to bind (overrides config and env).
    #[arg(long)]
    bind: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ordercast exited with error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let bind = bind_addr(&config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        locations = %config.locations.join(","),
        "Ordercast starting"
    );

    let state = AppState::from_config(&config)?;
    let mut server = NotificationServer::new(bind, state);
    server.start().await?;

    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        result = server.wait() => {
            result?;
            return Err(OrdercastError::Server("server task ended unexpectedly".into()));
        }
    }
    server.stop().await
}

/// File (if given), then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<OrdercastConfig> {
    let mut config = match &cli.config {
        Some(path) => OrdercastConfig::from_file(path)?,
        None => OrdercastConfig::default(),
    };
    config.apply_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    config.validate()?;
    Ok(config)
}

fn bind_addr(config: &OrdercastConfig) -> Result<SocketAddr> {
    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| OrdercastError::Config(format!("bind address '{}': {e}", config.server.bind)))?;
    Ok(SocketAddr::new(ip, config.server.port))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
