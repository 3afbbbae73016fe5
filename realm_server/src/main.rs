//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p realm_server -- [--config server.json] [--addr 0.0.0.0:43594] [--tick-ms 600]
//!
//! Flags override values from the config file; anything unset falls back to
//! the defaults in `ServerConfig`.

use std::env;

use anyhow::Context;
use realm_server::GameServer;
use realm_shared::config::ServerConfig;
use tracing::info;

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    addr: Option<String>,
    tick_ms: Option<u64>,
}

fn parse_args() -> Args {
    let mut parsed = Args::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                parsed.config = Some(args[i + 1].clone());
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                parsed.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-ms" if i + 1 < args.len() => {
                parsed.tick_ms = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    parsed
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            ServerConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        None => ServerConfig::default(),
    };
    if let Some(addr) = &args.addr {
        cfg.listen_addr = addr.clone();
    }
    if let Some(tick_ms) = args.tick_ms {
        cfg.tick_ms = tick_ms;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = load_config(&parse_args())?;
    info!(
        addr = %cfg.listen_addr,
        tick_ms = cfg.tick_ms,
        max_players = cfg.max_players,
        "Starting server"
    );

    let mut server = GameServer::new(cfg).await.context("create server")?;
    info!(local = %server.local_addr(), "Server listening");

    server.run().await;
    Ok(())
}
