//! # tether
//!
//! Signaling server and command-line call client.
//!
//! `serve` runs relay and gateway in one process; `relay` and `gateway`
//! split them; `client` connects as one user and drives calls from stdin.

#![deny(unsafe_code)]

mod client;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tether_core::logging::{LogFormat, init_subscriber};
use tether_server::ServerMode;
use tether_settings::TetherSettings;

/// tether signaling stack.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "tether signaling server and call client")]
struct Cli {
    /// Settings file (defaults to `~/.tether/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relay and gateway in one process.
    Serve(Listen),
    /// Relay only: sockets plus the internal delivery endpoint.
    Relay(Listen),
    /// Gateway only, delivering through a remote relay.
    Gateway {
        #[command(flatten)]
        listen: Listen,
        /// Relay base URL (defaults to `relay.remoteUrl`).
        #[arg(long)]
        relay_url: Option<String>,
    },
    /// Connect as one user and drive calls from stdin.
    Client(client::ClientArgs),
}

/// Bind overrides.
#[derive(Args, Debug, Default)]
struct Listen {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,
    /// Port to bind.
    #[arg(long)]
    port: Option<u16>,
}

impl Listen {
    fn apply(&self, settings: &mut TetherSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

fn server_mode(command: &Command, settings: &mut TetherSettings) -> Result<Option<ServerMode>> {
    let mode = match command {
        Command::Serve(listen) => {
            listen.apply(settings);
            ServerMode::Full
        }
        Command::Relay(listen) => {
            listen.apply(settings);
            ServerMode::RelayOnly
        }
        Command::Gateway { listen, relay_url } => {
            listen.apply(settings);
            let relay_url = relay_url
                .clone()
                .or_else(|| settings.relay.remote_url.clone())
                .context("gateway mode needs --relay-url or relay.remoteUrl")?;
            ServerMode::GatewayOnly { relay_url }
        }
        Command::Client(_) => return Ok(None),
    };
    Ok(Some(mode))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = tether_settings::load_settings(cli.config.as_deref())
        .context("failed to load settings")?;
    let format = if cli.json_logs || settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_subscriber(&settings.logging.level, format);

    if let Command::Client(args) = &cli.command {
        return client::run(args, &settings).await;
    }

    let Some(mode) = server_mode(&cli.command, &mut settings)? else {
        return Ok(());
    };
    let metrics = match tether_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "metrics recorder unavailable");
            None
        }
    };
    tether_server::server::run(mode, &settings, metrics, shutdown_signal())
        .await
        .context("server failed")?;
    Ok(())
}
