//! Timed behaviours driven by the task scheduler.
//!
//! Every kind is a small state machine keyed on the number of completed
//! executions. Entities are referenced through [`Target`]s and re-resolved on
//! each step, so a task whose subject left the world just stops.

use realm_shared::{
    flags::UpdateFlags,
    position::Position,
    registry::Handle,
    task::{Flow, Task, TaskKind, TaskSource},
    walking::MAX_RUN_ENERGY,
};
use tracing::{debug, error};

use crate::{
    content::{attack_animation, weapon_speed, SpellBook, UNINTERESTED_MOBS},
    entity::{HitType, Target},
    player::RegionState,
    world::WorldState,
};

/// Ticks between run energy restorations.
pub const ENERGY_RESTORE_INTERVAL: u64 = 10;

/// Reach of a melee attack, in tiles.
pub const MELEE_DISTANCE: i32 = 1;

/// Damage dealt by a melee swing.
pub const MELEE_DAMAGE: u8 = 1;

/// Executions a walk-to-mob task waits for arrival.
pub const MAX_ROUTING_TICKS: u64 = 30;

impl Target {
    /// Scheduler group for tasks owned by this entity.
    pub fn source(self) -> TaskSource {
        match self {
            Target::Player(handle) => TaskSource::Player(handle),
            Target::Mob(handle) => TaskSource::Mob(handle),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameTask {
    /// World-wide run energy regeneration. Never meant to end.
    RestoreRunEnergy,
    Teleport {
        caster: Target,
        spell: SpellBook,
        destination: Position,
    },
    /// Keeps `follower` next to `target` while they interact.
    CombatFollow { follower: Target, target: Target },
    /// Swings at `target` on the weapon's cadence while adjacent.
    MeleeAttack { attacker: Handle, target: Target },
    WalkToMob { player: Handle, mob: Handle },
}

impl GameTask {
    pub fn restore_run_energy() -> Task<GameTask> {
        Task::new(TaskSource::World, GameTask::RestoreRunEnergy)
    }

    /// Starts casting: locks movement, drops any interaction and plays the
    /// cast animation. The returned task finishes the spell.
    pub fn cast_teleport(
        state: &mut WorldState,
        caster: Target,
        spell: SpellBook,
        destination: Position,
    ) -> Option<Task<GameTask>> {
        let entity = state.entity_mut(caster)?;
        entity.movement_locked = true;
        entity.interacting = None;
        entity.animate(spell.cast_animation());
        Some(Task::new(
            caster.source(),
            GameTask::Teleport {
                caster,
                spell,
                destination,
            },
        ))
    }

    /// Following and swinging tasks for a player attacking `target`.
    pub fn melee(attacker: Handle, target: Target) -> [Task<GameTask>; 2] {
        let follower = Target::Player(attacker);
        [
            Task::new(
                follower.source(),
                GameTask::CombatFollow { follower, target },
            ),
            Task::new(follower.source(), GameTask::MeleeAttack { attacker, target }),
        ]
    }

    pub fn walk_to_mob(player: Handle, mob: Handle) -> Task<GameTask> {
        Task::new(TaskSource::Player(player), GameTask::WalkToMob { player, mob })
    }
}

impl TaskKind<WorldState> for GameTask {
    fn execute(&mut self, ticks: u64, state: &mut WorldState) -> Flow {
        match *self {
            GameTask::RestoreRunEnergy => {
                if ticks % ENERGY_RESTORE_INTERVAL == 0 {
                    for player in state.players.iter_mut() {
                        let walking = &mut player.entity.walking;
                        if walking.energy().is_some_and(|e| e < MAX_RUN_ENERGY) {
                            walking.restore_energy(1);
                        }
                    }
                }
                Flow::Continue
            }
            GameTask::Teleport {
                caster,
                spell,
                destination,
            } => teleport_step(state, ticks, caster, spell, destination),
            GameTask::CombatFollow { follower, target } => follow_step(state, follower, target),
            GameTask::MeleeAttack { attacker, target } => melee_step(state, ticks, attacker, target),
            GameTask::WalkToMob { player, mob } => walk_to_mob_step(state, ticks, player, mob),
        }
    }

    fn finish(&mut self, state: &mut WorldState) {
        match *self {
            GameTask::RestoreRunEnergy => {
                error!("Run energy restoration stopped; energy will no longer regenerate");
            }
            GameTask::Teleport { caster, spell, .. } => {
                if let Some(entity) = state.entity_mut(caster) {
                    entity.animate(spell.end_animation());
                    entity.movement_locked = false;
                }
            }
            GameTask::CombatFollow { .. }
            | GameTask::MeleeAttack { .. }
            | GameTask::WalkToMob { .. } => {}
        }
    }
}

fn teleport_step(
    state: &mut WorldState,
    ticks: u64,
    caster: Target,
    spell: SpellBook,
    destination: Position,
) -> Flow {
    let Some(entity) = state.entity_mut(caster) else {
        return Flow::Stop;
    };
    if ticks == spell.graphic_tick() {
        entity.show_graphic(spell.graphic());
    } else if ticks == spell.arrival_tick() {
        entity.teleport(destination);
        if let Target::Player(handle) = caster {
            if let Some(player) = state.players.resolve_mut(handle) {
                player.region_state = RegionState::Rebuilding;
            }
        }
        debug!(?caster, %destination, "Teleport landed");
        return Flow::Stop;
    }
    Flow::Continue
}

fn follow_step(state: &mut WorldState, follower: Target, target: Target) -> Flow {
    let Some(goal) = state.entity(target).map(|e| e.position) else {
        return Flow::Stop;
    };
    let Some(entity) = state.entity_mut(follower) else {
        return Flow::Stop;
    };
    if entity.position.is_within_distance(&goal, MELEE_DISTANCE) {
        return Flow::Continue;
    }
    entity.flags.flag(UpdateFlags::FACE_ENTITY);
    if entity.interacting != Some(target) {
        return Flow::Stop;
    }

    let here = entity.position;
    let candidates = [
        Position::new(goal.x - MELEE_DISTANCE, goal.y, goal.plane),
        Position::new(goal.x, goal.y - MELEE_DISTANCE, goal.plane),
        Position::new(goal.x, goal.y + MELEE_DISTANCE, goal.plane),
        Position::new(goal.x + MELEE_DISTANCE, goal.y, goal.plane),
    ];
    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.manhattan(&here) < best.manhattan(&here) {
            best = *candidate;
        }
    }
    entity.walking.reset(&here);
    entity.walking.step(&here, best.x, best.y);
    entity.walking.finish();
    Flow::Continue
}

fn melee_step(state: &mut WorldState, ticks: u64, attacker: Handle, target: Target) -> Flow {
    let Some(player) = state.players.resolve(attacker) else {
        return Flow::Stop;
    };
    if player.entity.interacting != Some(target) {
        return Flow::Stop;
    }
    let here = player.entity.position;
    let weapon = player.equipment.weapon();

    let Some(victim) = state.entity(target) else {
        return Flow::Stop;
    };
    if victim.is_dead() {
        return Flow::Stop;
    }
    if !here.is_within_distance(&victim.position, MELEE_DISTANCE)
        || ticks % weapon_speed(weapon) != 0
    {
        return Flow::Continue;
    }

    if let Some(player) = state.players.resolve_mut(attacker) {
        player.entity.animate(attack_animation(weapon));
    }
    if let Some(victim) = state.entity_mut(target) {
        victim.damage(MELEE_DAMAGE, HitType::Damage);
    }
    Flow::Continue
}

fn walk_to_mob_step(state: &mut WorldState, ticks: u64, player: Handle, mob: Handle) -> Flow {
    let Some((goal, size, identity)) = state
        .mobs
        .resolve(mob)
        .filter(|m| !m.entity.is_dead())
        .map(|m| (m.entity.position, m.size, m.identity))
    else {
        return Flow::Stop;
    };
    let Some(p) = state.players.resolve_mut(player) else {
        return Flow::Stop;
    };
    if p.entity.interacting.is_none() || ticks == MAX_ROUTING_TICKS {
        return Flow::Stop;
    }
    p.entity.flags.flag(UpdateFlags::FACE_ENTITY);
    if !p.entity.position.is_within_distance(&goal, i32::from(size)) {
        return Flow::Continue;
    }

    if UNINTERESTED_MOBS.contains(&identity) {
        p.send_message("He doesn't seem interested in talking right now.");
    }
    Flow::Stop
}
