//! Server implementation.
//!
//! Binds the listener, spawns one session task per connection and drives
//! the world on a fixed timestep. The accept loop and sessions run on the
//! tokio runtime; the world is only ever touched from [`GameServer::step`].
//!
//! Determinism notes:
//! - Ticks never block; all I/O lives in session tasks.
//! - Registries iterate in slot order, so update order is stable.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use realm_shared::{
    config::{ItemDefinition, MobSpawn, ServerConfig},
    net::{KeystreamFactory, PassthroughKeystream},
};
use tokio::{net::TcpListener, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    session,
    world::{World, WorldHandle},
};

/// Game server.
pub struct GameServer {
    pub cfg: ServerConfig,
    world: World,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl GameServer {
    /// Binds the listener and loads static content. Opcodes pass through
    /// unobfuscated.
    pub async fn new(cfg: ServerConfig) -> anyhow::Result<Self> {
        Self::with_keystreams(cfg, Arc::new(PassthroughKeystream)).await
    }

    /// Like [`GameServer::new`], with the cipher used to obfuscate opcodes.
    pub async fn with_keystreams(
        cfg: ServerConfig,
        keystreams: Arc<dyn KeystreamFactory>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.listen_addr)
            .await
            .with_context(|| format!("bind {}", cfg.listen_addr))?;
        let local_addr = listener.local_addr().context("local addr")?;

        let (mut world, handle) = World::new(cfg.clone());
        if let Some(path) = &cfg.item_definitions_path {
            world.load_items(load_items(path)?);
        }
        if let Some(path) = &cfg.mob_spawns_path {
            let spawns = load_spawns(path)?;
            world.spawn_mobs(&spawns);
        }

        let accept_task = tokio::spawn(accept_loop(listener, handle, keystreams));
        Ok(Self {
            cfg,
            world,
            local_addr,
            accept_task,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.cfg.tick_ms.max(1))
    }

    /// Executes one world tick.
    pub fn step(&mut self) {
        self.world.tick();
        debug!(
            tick = self.world.state.tick,
            players = self.world.state.players.size(),
            tasks = self.world.tasks.len(),
            "Tick"
        );
    }

    /// Runs `ticks` ticks at the configured rate.
    pub async fn run_for_ticks(&mut self, ticks: u32) {
        let dt = self.tick_interval();
        let mut next = Instant::now();
        for _ in 0..ticks {
            next += dt;
            self.step();
            tokio::time::sleep_until(next).await;
        }
    }

    /// Ticks until the process exits.
    pub async fn run(&mut self) {
        let dt = self.tick_interval();
        let mut next = Instant::now();
        loop {
            self.step();
            next += dt;
            let now = Instant::now();
            if next < now {
                warn!(behind_ms = (now - next).as_millis() as u64, "Tick overran its period");
                next = now;
            }
            tokio::time::sleep_until(next).await;
        }
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

fn load_spawns(path: &str) -> anyhow::Result<Vec<MobSpawn>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    MobSpawn::list_from_json_str(&text).with_context(|| format!("parse {path}"))
}

fn load_items(path: &str) -> anyhow::Result<Vec<ItemDefinition>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    ItemDefinition::list_from_json_str(&text).with_context(|| format!("parse {path}"))
}

async fn accept_loop(
    listener: TcpListener,
    world: WorldHandle,
    keystreams: Arc<dyn KeystreamFactory>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "Connection accepted");
                let world = world.clone();
                let keystreams = Arc::clone(&keystreams);
                tokio::spawn(async move {
                    if let Err(e) = session::run(stream, peer, world, keystreams).await {
                        info!(%peer, error = %format!("{e:#}"), "Session ended");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(tick_ms: u64) -> anyhow::Result<(GameServer, SocketAddr)> {
    let cfg = ServerConfig {
        listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        tick_ms,
        ..Default::default()
    };
    let server = GameServer::new(cfg).await?;
    let addr = server.local_addr();
    Ok((server, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_and_ticks() -> anyhow::Result<()> {
        let (mut server, addr) = bind_ephemeral(5).await?;
        assert_ne!(addr.port(), 0);
        server.run_for_ticks(3).await;
        assert_eq!(server.world().state.tick, 3);
        Ok(())
    }

    #[tokio::test]
    async fn missing_spawn_file_is_reported() {
        let cfg = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            mob_spawns_path: Some("/nonexistent/spawns.json".to_string()),
            ..Default::default()
        };
        let err = GameServer::new(cfg).await.err().unwrap();
        assert!(format!("{err:#}").contains("spawns.json"));
    }

    #[tokio::test]
    async fn item_definitions_replace_builtins() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("realm-items-{}.json", std::process::id()));
        std::fs::write(&path, r#"[ { "id": 6570, "name": "Fire cape", "equipment_slot": 1 } ]"#)?;
        let cfg = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            item_definitions_path: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let server = GameServer::new(cfg).await;
        std::fs::remove_file(&path)?;
        let server = server?;
        let items = &server.world().state.items;
        assert_eq!(items.len(), 1);
        assert_eq!(items.get(6570).map(|def| def.name.as_str()), Some("Fire cape"));
        Ok(())
    }
}
