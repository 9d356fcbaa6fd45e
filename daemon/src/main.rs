//! murmur daemon — runs one node, sends each stdin line as a Data packet and
//! prints every payload it receives.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use murmur_node::{init_logging, Node, NodeConfig, PoolEvent};

#[derive(Parser, Debug)]
#[command(name = "murmur-daemon", about = "murmur gossip node")]
struct Cli {
    /// Port to listen on (0 or unset picks an ephemeral port).
    #[arg(long, env = "MURMUR_PORT")]
    port: Option<u16>,

    /// Host to bind and advertise.
    #[arg(long, env = "MURMUR_HOST")]
    host: Option<String>,

    /// Seed ports to dial on startup (comma-separated: "4001,4002").
    #[arg(long, env = "MURMUR_SEEDS", value_delimiter = ',')]
    seeds: Vec<u16>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "MURMUR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "MURMUR_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// File settings (or defaults) with command-line overrides applied.
fn resolve_config(cli: Cli) -> anyhow::Result<NodeConfig> {
    let base = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };

    let config = NodeConfig {
        port: cli.port.unwrap_or(base.port),
        host: cli.host.unwrap_or_else(|| base.host.clone()),
        seeds: if cli.seeds.is_empty() {
            base.seeds.clone()
        } else {
            cli.seeds
        },
        log_level: cli.log_level.unwrap_or_else(|| base.log_level.clone()),
        log_format: cli.log_format.unwrap_or_else(|| base.log_format.clone()),
        ..base
    };
    config.validate()?;
    Ok(config)
}

/// Forward stdin lines until EOF.
async fn read_stdin(lines_tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn report(event: PoolEvent) {
    match event {
        PoolEvent::Data { from, data, .. } => {
            println!("{} > {}", from, String::from_utf8_lossy(&data));
        }
        PoolEvent::Listening(addr) => tracing::info!(%addr, "ready"),
        PoolEvent::PeerList { peer, peers } => {
            tracing::info!(%peer, count = peers.len(), "received peer list");
        }
        PoolEvent::PeerClosed { key, node_id } => {
            tracing::info!(peer = %key, node = ?node_id, "peer disconnected");
        }
        // Already logged by the pool.
        PoolEvent::Peer(_) | PoolEvent::Error { .. } => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = resolve_config(Cli::parse())?;
    init_logging(config.log_format()?, &config.log_level);

    let mut node = Node::new(config).start().await?;
    tracing::info!(node = %node.id(), port = node.port(), "murmur daemon running");

    let (lines_tx, mut lines) = mpsc::unbounded_channel();
    tokio::spawn(read_stdin(lines_tx));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = node.next_event() => match event {
                Some(event) => report(event),
                None => break,
            },
            line = lines.recv(), if stdin_open => match line {
                Some(line) if line.is_empty() => {}
                Some(line) => {
                    if let Err(e) = node.send(line.into_bytes()).await {
                        tracing::warn!(error = %e, "send failed");
                    }
                }
                None => {
                    tracing::debug!("stdin closed");
                    stdin_open = false;
                }
            },
            () = &mut shutdown => break,
        }
    }

    let uptime = murmur_utils::format_duration(node.uptime());
    node.shutdown().await;
    tracing::info!(%uptime, "murmur daemon exited cleanly");
    Ok(())
}
