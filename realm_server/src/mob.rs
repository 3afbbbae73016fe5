//! Non-player characters.

use realm_shared::{
    config::MobSpawn,
    position::Position,
    registry::Indexed,
    walking::WalkingQueue,
};

use crate::entity::{Entity, Mobile};

#[derive(Debug)]
pub struct Mob {
    pub entity: Entity,
    /// Definition id the client renders.
    pub identity: u16,
    /// Footprint in tiles along each axis.
    pub size: u8,
}

impl Mob {
    pub fn new(identity: u16, position: Position, hitpoints: u16, size: u8) -> Self {
        Self {
            entity: Entity::new(position, WalkingQueue::tireless(), hitpoints),
            identity,
            size: size.max(1),
        }
    }

    pub fn from_spawn(spawn: &MobSpawn) -> Self {
        Self::new(spawn.id, spawn.position(), spawn.hitpoints, spawn.size)
    }
}

impl Mobile for Mob {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl Indexed for Mob {
    fn index(&self) -> i32 {
        self.entity.index
    }

    fn set_index(&mut self, index: i32) {
        self.entity.index = index;
    }
}
