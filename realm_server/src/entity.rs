//! State common to every simulated entity.
//!
//! Players and mobs embed an [`Entity`] and expose it through [`Mobile`], so
//! the update phases and the tasks can treat both populations alike without
//! inspecting types at runtime.

use realm_shared::{
    flags::UpdateFlags,
    position::Position,
    registry::{Handle, UNREGISTERED},
    walking::WalkingQueue,
};

/// An animation request as the client understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    pub id: u16,
    pub delay: u8,
}

impl Animation {
    /// Id that cancels whatever is currently playing.
    pub const RESET: Animation = Animation::new(65535, 0);

    pub const fn new(id: u16, delay: u8) -> Self {
        Self { id, delay }
    }
}

/// A spot graphic. `height` packs the render height in the high half and a
/// delay in the low half, exactly as written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Graphic {
    pub id: u16,
    pub height: u32,
}

impl Graphic {
    pub const fn new(id: u16, height: u32) -> Self {
        Self { id, height }
    }
}

/// Splat shown over a damaged entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HitType {
    Block = 0,
    Damage = 1,
    Poison = 2,
    Disease = 3,
}

impl HitType {
    pub fn value(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub damage: u8,
    pub kind: HitType,
}

/// The other side of an interaction. Resolved through the registries on every
/// use, so a departed entity simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Player(Handle),
    Mob(Handle),
}

impl Target {
    /// Index written in a face-entity block. Player indices are offset by
    /// 0x8000 so the client can tell the populations apart.
    pub fn face_index(self) -> u16 {
        match self {
            Target::Mob(handle) => handle.index as u16,
            Target::Player(handle) => 0x8000 | handle.index as u16,
        }
    }
}

#[derive(Debug)]
pub struct Entity {
    pub index: i32,
    pub position: Position,
    /// Position the client's current viewport was built around.
    pub region: Position,
    pub animation: Option<Animation>,
    pub graphic: Option<Graphic>,
    pub flags: UpdateFlags,
    pub walking: WalkingQueue,
    pub hit: Option<Hit>,
    pub hitpoints: u16,
    pub max_hitpoints: u16,
    /// Set on the tick the entity lands somewhere without walking.
    pub teleported: bool,
    /// Held while a teleport is being cast.
    pub movement_locked: bool,
    pub interacting: Option<Target>,
}

impl Entity {
    pub fn new(position: Position, walking: WalkingQueue, hitpoints: u16) -> Self {
        Self {
            index: UNREGISTERED,
            position,
            region: position,
            animation: None,
            graphic: None,
            flags: UpdateFlags::empty(),
            walking,
            hit: None,
            hitpoints,
            max_hitpoints: hitpoints,
            teleported: false,
            movement_locked: false,
            interacting: None,
        }
    }

    pub fn animate(&mut self, animation: Animation) {
        self.animation = Some(animation);
        self.flags.flag(UpdateFlags::ANIMATION);
    }

    pub fn show_graphic(&mut self, graphic: Graphic) {
        self.graphic = Some(graphic);
        self.flags.flag(UpdateFlags::GRAPHICS);
    }

    /// Applies damage and records the splat.
    pub fn damage(&mut self, amount: u8, kind: HitType) {
        self.hitpoints = self.hitpoints.saturating_sub(u16::from(amount));
        self.hit = Some(Hit {
            damage: amount,
            kind,
        });
        self.flags.flag(UpdateFlags::HIT);
    }

    /// Starts (or with `None`, ends) an interaction and turns to face it.
    pub fn face(&mut self, target: Option<Target>) {
        self.interacting = target;
        self.flags.flag(UpdateFlags::FACE_ENTITY);
    }

    /// Moves the entity without walking. Observers drop and re-add it this
    /// tick.
    pub fn teleport(&mut self, to: Position) {
        self.position = to;
        self.teleported = true;
        self.walking.process(&mut self.position, &to, true);
    }

    pub fn is_dead(&self) -> bool {
        self.hitpoints == 0
    }

    /// Advances the walking queue. Returns what the queue noticed.
    pub fn process_movement(&mut self) -> realm_shared::walking::ProcessOutcome {
        let halted = self.teleported || self.movement_locked;
        self.walking.process(&mut self.position, &self.region, halted)
    }

    /// Drops per-tick state once every observer has seen it.
    pub fn post_update(&mut self) {
        self.flags.reset();
        self.teleported = false;
        self.animation = None;
        self.graphic = None;
        self.hit = None;
    }
}

/// Access to the shared state of a player or mob.
pub trait Mobile {
    fn entity(&self) -> &Entity;
    fn entity_mut(&mut self) -> &mut Entity;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_at(x: i32, y: i32) -> Entity {
        Entity::new(Position::new(x, y, 0), WalkingQueue::tireless(), 10)
    }

    #[test]
    fn face_index_marks_players() {
        let handle = Handle {
            index: 5,
            generation: 1,
        };
        assert_eq!(Target::Mob(handle).face_index(), 5);
        assert_eq!(Target::Player(handle).face_index(), 0x8005);
    }

    #[test]
    fn damage_saturates_and_flags() {
        let mut e = entity_at(3200, 3200);
        e.damage(4, HitType::Damage);
        e.damage(9, HitType::Damage);
        assert_eq!(e.hitpoints, 0);
        assert!(e.is_dead());
        assert_eq!(e.hit.map(|h| h.damage), Some(9));
        assert!(e.flags.contains(UpdateFlags::HIT));
    }

    #[test]
    fn teleport_drops_path_and_clears_after_post_update() {
        let mut e = entity_at(3200, 3200);
        let here = e.position;
        e.walking.step(&here, 3205, 3200);
        e.walking.finish();
        e.teleport(Position::new(3000, 3000, 0));
        assert!(e.teleported);
        assert_eq!(e.walking.len(), 1);
        assert!(e.walking.points().all(|p| p.direction.is_none()));
        assert_eq!(e.walking.walking_direction(), None);

        e.post_update();
        assert!(!e.teleported);
        assert!(e.flags.is_empty());
    }

    #[test]
    fn post_update_drops_block_data() {
        let mut e = entity_at(3200, 3200);
        e.animate(Animation::new(714, 0));
        e.show_graphic(Graphic::new(308, 0));
        e.damage(1, HitType::Damage);
        e.post_update();
        assert_eq!(e.animation, None);
        assert_eq!(e.graphic, None);
        assert_eq!(e.hit, None);

        // a flag raised without fresh data must not resend the old block
        e.flags.flag(UpdateFlags::ANIMATION);
        assert_eq!(e.animation, None);
    }

    #[test]
    fn locked_entity_does_not_walk() {
        let mut e = entity_at(3200, 3200);
        let here = e.position;
        e.walking.step(&here, 3202, 3200);
        e.movement_locked = true;
        e.process_movement();
        assert_eq!(e.position, here);
    }
}
