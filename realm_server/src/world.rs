//! The world and its tick.
//!
//! One [`World`] owns every player, mob and task. Sessions never touch it
//! directly: they submit join and leave requests through a [`WorldHandle`]
//! and push inbound messages onto each player's queue. Everything else
//! happens inside [`World::tick`], in a fixed phase order:
//!
//! 1. register joining players
//! 2. remove leaving players
//! 3. dispatch queued inbound messages
//! 4. pre-update (movement) for mobs, then players
//! 5. run tasks
//! 6. main update: build and send each player's view
//! 7. post-update (clear per-tick state) for mobs, then players

use std::mem;

use bytes::Bytes;
use realm_shared::{
    config::{ItemDefinition, MobSpawn, ServerConfig},
    login::LoginResponse,
    net::{InboundMessage, Keystream, SessionId},
    registry::{EntityRegistry, Handle},
    task::TaskScheduler,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    content::RUN_CONFIG,
    entity::{Entity, Mobile, Target},
    handlers,
    item::ItemCatalog,
    mob::Mob,
    packets,
    player::{Outbox, Player, RegionState},
    tasks::GameTask,
    update,
};

/// Everything tasks and handlers may touch.
pub struct WorldState {
    pub players: EntityRegistry<Player>,
    pub mobs: EntityRegistry<Mob>,
    pub items: ItemCatalog,
    /// Ticks completed since startup.
    pub tick: u64,
    /// Players that asked to log out; removed at the start of the next tick.
    pub logouts: Vec<Handle>,
}

impl WorldState {
    pub fn new(max_players: usize, max_mobs: usize) -> Self {
        Self {
            players: EntityRegistry::new(max_players),
            mobs: EntityRegistry::new(max_mobs),
            items: ItemCatalog::builtin(),
            tick: 0,
            logouts: Vec::new(),
        }
    }

    pub fn entity(&self, target: Target) -> Option<&Entity> {
        match target {
            Target::Player(handle) => self.players.resolve(handle).map(Mobile::entity),
            Target::Mob(handle) => self.mobs.resolve(handle).map(Mobile::entity),
        }
    }

    pub fn entity_mut(&mut self, target: Target) -> Option<&mut Entity> {
        match target {
            Target::Player(handle) => self.players.resolve_mut(handle).map(Mobile::entity_mut),
            Target::Mob(handle) => self.mobs.resolve_mut(handle).map(Mobile::entity_mut),
        }
    }

    pub fn find_player(&self, username: &str) -> Option<Handle> {
        self.players
            .iter()
            .find(|(_, p)| p.username.eq_ignore_ascii_case(username))
            .map(|(handle, _)| handle)
    }
}

/// A session asking to enter the world.
pub struct JoinRequest {
    pub username: String,
    pub session: SessionId,
    /// Framed bytes for the session's writer.
    pub outbound: mpsc::UnboundedSender<Bytes>,
    /// Messages the session has framed.
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
    /// Server-to-client keystream.
    pub keystream: Box<dyn Keystream>,
    pub reply: oneshot::Sender<JoinReply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinReply {
    Accepted { handle: Handle, rights: u8 },
    Rejected(LoginResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveRequest {
    pub handle: Handle,
}

/// Cloneable entry point for sessions.
#[derive(Clone)]
pub struct WorldHandle {
    joins: mpsc::UnboundedSender<JoinRequest>,
    leaves: mpsc::UnboundedSender<LeaveRequest>,
}

impl WorldHandle {
    /// Queues a join and waits for the world's decision.
    pub async fn join(
        &self,
        username: String,
        session: SessionId,
        outbound: mpsc::UnboundedSender<Bytes>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        keystream: Box<dyn Keystream>,
    ) -> anyhow::Result<JoinReply> {
        let (reply, rx) = oneshot::channel();
        self.joins
            .send(JoinRequest {
                username,
                session,
                outbound,
                inbound,
                keystream,
                reply,
            })
            .map_err(|_| anyhow::anyhow!("world is shut down"))?;
        Ok(rx.await?)
    }

    /// Queues removal of a player. Stale handles are ignored by the world.
    pub fn leave(&self, handle: Handle) {
        let _ = self.leaves.send(LeaveRequest { handle });
    }
}

pub struct World {
    config: ServerConfig,
    pub state: WorldState,
    pub tasks: TaskScheduler<GameTask>,
    joins: mpsc::UnboundedReceiver<JoinRequest>,
    leaves: mpsc::UnboundedReceiver<LeaveRequest>,
}

impl World {
    pub fn new(config: ServerConfig) -> (Self, WorldHandle) {
        let (join_tx, joins) = mpsc::unbounded_channel();
        let (leave_tx, leaves) = mpsc::unbounded_channel();
        let mut tasks = TaskScheduler::new();
        if let Err(e) = tasks.schedule(GameTask::restore_run_energy()) {
            error!(error = %e, "Could not start run energy restoration");
        }
        let world = Self {
            state: WorldState::new(config.max_players, config.max_mobs),
            config,
            tasks,
            joins,
            leaves,
        };
        let handle = WorldHandle {
            joins: join_tx,
            leaves: leave_tx,
        };
        (world, handle)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registers static mobs. Returns how many fit.
    pub fn spawn_mobs(&mut self, spawns: &[MobSpawn]) -> usize {
        let mut spawned = 0;
        for spawn in spawns {
            match self.state.mobs.add(Mob::from_spawn(spawn)) {
                Ok(_) => spawned += 1,
                Err(e) => {
                    warn!(id = spawn.id, position = %spawn.position(), error = %e, "Mob spawn skipped");
                }
            }
        }
        info!(spawned, total = spawns.len(), "Mobs spawned");
        spawned
    }

    /// Replaces the built-in item definitions.
    pub fn load_items(&mut self, definitions: Vec<ItemDefinition>) {
        self.state.items = ItemCatalog::new(definitions);
        info!(items = self.state.items.len(), "Item definitions loaded");
    }

    /// Runs one full tick.
    pub fn tick(&mut self) {
        self.register_joins();
        self.process_leaves();
        self.dispatch_inbound();
        self.pre_update();
        self.tasks.run(&mut self.state);
        self.main_update();
        self.post_update();
        self.state.tick += 1;
    }

    fn register_joins(&mut self) {
        while let Ok(request) = self.joins.try_recv() {
            self.register(request);
        }
    }

    fn register(&mut self, request: JoinRequest) {
        let JoinRequest {
            username,
            session,
            outbound,
            inbound,
            keystream,
            reply,
        } = request;

        let verdict = if self.state.find_player(&username).is_some() {
            Some(LoginResponse::AlreadyOnline)
        } else if self.state.players.is_full() {
            Some(LoginResponse::WorldFull)
        } else {
            None
        };
        if let Some(response) = verdict {
            info!(player = %username, %session, ?response, "Join rejected");
            let _ = reply.send(JoinReply::Rejected(response));
            return;
        }

        let player = Player::new(
            username,
            session,
            self.config.spawn,
            Outbox::new(outbound, keystream),
            inbound,
        );
        let rights = player.rights;
        let handle = match self.state.players.add(player) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(%session, error = %e, "Join failed");
                let _ = reply.send(JoinReply::Rejected(LoginResponse::WorldFull));
                return;
            }
        };
        if reply.send(JoinReply::Accepted { handle, rights }).is_err() {
            debug!(%session, "Session left before the join completed");
            let _ = self.state.players.remove(handle.index);
            return;
        }

        let online = self.state.players.size();
        if let Some(player) = self.state.players.resolve_mut(handle) {
            player.on_login(&self.config.welcome_message, &self.state.items);
            info!(
                player = %player.username,
                index = handle.index,
                online,
                "Player joined"
            );
        }
    }

    fn process_leaves(&mut self) {
        let mut leaving = mem::take(&mut self.state.logouts);
        while let Ok(LeaveRequest { handle }) = self.leaves.try_recv() {
            leaving.push(handle);
        }
        for handle in leaving {
            self.remove_player(handle);
        }
    }

    fn remove_player(&mut self, handle: Handle) {
        if !self.state.players.is_live(handle) {
            return;
        }
        let cancelled = handlers::cancel_all(&mut self.tasks, handle);
        match self.state.players.remove(handle.index) {
            Ok(player) => info!(
                player = %player.username,
                index = handle.index,
                cancelled,
                "Player left"
            ),
            Err(e) => error!(index = handle.index, error = %e, "Player removal failed"),
        }
    }

    fn dispatch_inbound(&mut self) {
        let handles: Vec<Handle> = self.state.players.iter().map(|(h, _)| h).collect();
        for handle in handles {
            while let Some(message) = self
                .state
                .players
                .resolve_mut(handle)
                .and_then(Player::poll_inbound)
            {
                if let Err(e) = handlers::dispatch(&mut self.state, &mut self.tasks, handle, &message) {
                    debug!(index = handle.index, opcode = message.opcode, error = %e, "Bad message payload");
                }
            }
        }
    }

    fn pre_update(&mut self) {
        for mob in self.state.mobs.iter_mut() {
            mob.entity.process_movement();
        }
        for player in self.state.players.iter_mut() {
            let outcome = player.entity.process_movement();
            if outcome.needs_rebuild {
                player.region_state = RegionState::Rebuilding;
            }
            if outcome.run_exhausted {
                player.send(packets::client_config(RUN_CONFIG, 0));
                player.send_message("You don't have any energy left.");
            }
            player.refresh_energy();
        }
    }

    fn main_update(&mut self) {
        let WorldState { players, mobs, .. } = &mut self.state;
        let handles: Vec<Handle> = players.iter().map(|(h, _)| h).collect();
        for handle in handles {
            let Some(player) = players.resolve_mut(handle) else {
                continue;
            };
            if player.region_state == RegionState::Rebuilding {
                player.entity.region = player.entity.position;
                let region = player.entity.region;
                player.send(packets::construct_region(&region));
            }
            let mut local_players = mem::take(&mut player.local_players);
            let mut local_mobs = mem::take(&mut player.local_mobs);

            let Some(observer) = players.resolve(handle) else {
                continue;
            };
            let player_update = update::player::build(observer, &mut local_players, players, mobs);
            let mob_update = update::mob::build(observer, &mut local_mobs, mobs);

            if let Some(player) = players.resolve_mut(handle) {
                player.local_players = local_players;
                player.local_mobs = local_mobs;
                player.send(player_update);
                player.send(mob_update);
            }
        }
    }

    fn post_update(&mut self) {
        for mob in self.state.mobs.iter_mut() {
            mob.entity.post_update();
        }
        for player in self.state.players.iter_mut() {
            player.entity.post_update();
            player.chat = None;
            player.region_state = RegionState::Traversing;
        }
    }
}
