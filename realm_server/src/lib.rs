//! `realm_server`
//!
//! Server-side systems:
//! - Fixed-rate world tick with ordered update phases
//! - Player and mob entities
//! - Inventory, equipment and skill experience
//! - Inbound message handlers and timed tasks
//! - Player/mob visibility updates
//! - TCP sessions feeding the world through queues
//!
//! Threading model:
//! - The world is owned by the tick driver and never shared.
//! - Sessions talk to it through unbounded channels only.

pub mod content;
pub mod entity;
pub mod handlers;
pub mod item;
pub mod mob;
pub mod packets;
pub mod player;
pub mod server;
pub mod session;
pub mod tasks;
pub mod update;
pub mod world;

pub use server::GameServer;
pub use world::{World, WorldHandle, WorldState};
