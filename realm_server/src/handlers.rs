//! Inbound message handlers.
//!
//! Messages arrive already framed; each handler decodes its own payload and
//! applies it to the world. A payload that fails to decode only costs the
//! one message.

use std::{fmt::Display, str::FromStr};

use realm_shared::{
    cursor::{CursorError, ReadCursor},
    flags::UpdateFlags,
    net::{inbound, InboundMessage},
    position::{Position, MAX_COORDINATE},
    registry::Handle,
    task::{Task, TaskScheduler, TaskSource},
    walking::MAX_RUN_ENERGY,
};
use tracing::{debug, info, trace, warn};

use crate::{
    content::{
        emote_for_button, SpellBook, MAX_YELL_LENGTH, TELEPORT_COOLDOWN_TICKS, YELL_FORBIDDEN,
    },
    entity::Target,
    item::{Equipment, Inventory, Item},
    packets,
    player::{ChatMessage, Player, RegionState, Skills},
    tasks::GameTask,
    world::WorldState,
};

const LOGOUT_BUTTON: u16 = 2458;
const STANDARD_HOME_BUTTON: u16 = 1164;
const ANCIENT_HOME_BUTTON: u16 = 1167;
const WALK_BUTTON: u16 = 152;
const RUN_BUTTON: u16 = 153;

/// Trailing bytes of a minimap walk that describe the camera, not the path.
const MAP_WALK_TRAILER: usize = 14;

/// Routes one inbound message from `player`.
pub fn dispatch(
    state: &mut WorldState,
    tasks: &mut TaskScheduler<GameTask>,
    player: Handle,
    message: &InboundMessage,
) -> Result<(), CursorError> {
    let mut cur = ReadCursor::new(&message.payload);
    match message.opcode {
        inbound::CHAT => chat(state, player, &mut cur),
        inbound::COMMAND => {
            let line = cur.read_string();
            command(state, player, &line);
            Ok(())
        }
        inbound::ACTION_BUTTON => {
            let button = cur.read_u16()?;
            action_button(state, tasks, player, button);
            Ok(())
        }
        inbound::STANDARD_WALK | inbound::MAP_WALK | inbound::WALK_TO => {
            walk(state, player, message.opcode, &mut cur)
        }
        inbound::ATTACK_MOB => {
            let index = cur.read_u16_a()?;
            attack_mob(state, tasks, player, usize::from(index));
            Ok(())
        }
        inbound::EQUIP_ITEM => {
            let id = cur.read_u16()?;
            let slot = cur.read_u16_a()?;
            let interface = cur.read_u16_a()?;
            if interface == Inventory::INTERFACE {
                let WorldState { players, items, .. } = state;
                if let Some(p) = players.resolve_mut(player) {
                    p.equip(usize::from(slot), id, items);
                }
            }
            Ok(())
        }
        inbound::UNEQUIP_ITEM => {
            let interface = cur.read_u16_a()?;
            let slot = cur.read_u16_a()?;
            let id = cur.read_u16_a()?;
            if interface == Equipment::INTERFACE {
                let WorldState { players, items, .. } = state;
                if let Some(p) = players.resolve_mut(player) {
                    p.unequip(usize::from(slot), id, items);
                }
            }
            Ok(())
        }
        inbound::FIRST_CLICK_MOB => {
            let index = cur.read_u16_le()?;
            click_mob(state, tasks, player, usize::from(index));
            Ok(())
        }
        opcode => {
            trace!(opcode, len = message.payload.len(), "Ignoring unhandled message");
            Ok(())
        }
    }
}

fn chat(state: &mut WorldState, player: Handle, cur: &mut ReadCursor<'_>) -> Result<(), CursorError> {
    let effects = cur.read_u8_s()?;
    let colour = cur.read_u8_s()?;
    let len = cur.remaining();
    let text = cur.read_bytes_a(len)?;
    if let Some(p) = state.players.resolve_mut(player) {
        p.chat = Some(ChatMessage {
            effects,
            colour,
            text,
        });
        p.entity.flags.flag(UpdateFlags::CHAT);
    }
    Ok(())
}

fn command(state: &mut WorldState, player: Handle, line: &str) {
    let mut args = line.split(' ');
    let name = args.next().unwrap_or_default().to_ascii_lowercase();
    debug!(index = player.index, command = %name, "Command");

    match name.as_str() {
        "yell" => {
            let message: String = args.map(|word| format!(" {word}")).collect();
            yell(state, player, &message);
        }
        "restore" => {
            if let Some(p) = state.players.resolve_mut(player) {
                p.entity.walking.set_energy(MAX_RUN_ENERGY);
                p.send_message("Your run energy has been restored.");
            }
        }
        "tele" => {
            let coords: Result<Vec<i32>, _> = args.map(str::parse::<i32>).collect();
            let Some(p) = state.players.resolve_mut(player) else {
                return;
            };
            let plane = p.entity.position.plane;
            let to = match coords.as_deref() {
                Ok([x, y]) => Position::new(*x, *y, plane),
                Ok([x, y, z]) => match u8::try_from(*z) {
                    Ok(plane) if plane <= 3 => Position::new(*x, *y, plane),
                    _ => {
                        p.send_message("Error while parsing command. Plane must be 0 to 3.");
                        return;
                    }
                },
                Ok(_) => {
                    p.send_message("Error while parsing command. Usage: tele x y [z].");
                    return;
                }
                Err(e) => {
                    p.send_message(&format!("Error while parsing command. {e}."));
                    return;
                }
            };
            if !to.is_on_map() {
                p.send_message(&format!(
                    "Error while parsing command. Coordinates must be within 0 to {MAX_COORDINATE}."
                ));
                return;
            }
            teleport_now(p, to);
        }
        "add" => {
            let parsed = two_args::<u16, u32>(args, "add id amount");
            let WorldState { players, items, .. } = state;
            let Some(p) = players.resolve_mut(player) else {
                return;
            };
            match parsed {
                Ok((id, _)) if items.get(id).is_none() => {
                    p.send_message(&format!("There is no item with id {id}."));
                }
                Ok((id, amount)) => {
                    p.give(Item::new(id, amount), items);
                }
                Err(e) => p.send_message(&format!("Error while parsing command. {e}.")),
            }
        }
        "remove" => {
            let parsed = two_args::<u16, u32>(args, "remove id amount");
            let Some(p) = state.players.resolve_mut(player) else {
                return;
            };
            match parsed {
                Ok((id, amount)) => {
                    p.inventory.remove(id, amount);
                    p.refresh_inventory();
                }
                Err(e) => p.send_message(&format!("Error while parsing command. {e}.")),
            }
        }
        "exp" => {
            let parsed = two_args::<usize, u32>(args, "exp skill amount");
            let Some(p) = state.players.resolve_mut(player) else {
                return;
            };
            match parsed {
                Ok((skill, amount)) if skill < Skills::COUNT => p.add_experience(skill, amount),
                Ok(_) => p.send_message(&format!(
                    "Error while parsing command. Skill must be 0 to {}.",
                    Skills::COUNT - 1
                )),
                Err(e) => p.send_message(&format!("Error while parsing command. {e}.")),
            }
        }
        _ => {}
    }
}

/// Parses exactly two command arguments.
fn two_args<'a, A, B>(args: impl Iterator<Item = &'a str>, usage: &str) -> Result<(A, B), String>
where
    A: FromStr,
    A::Err: Display,
    B: FromStr,
    B::Err: Display,
{
    let args: Vec<&str> = args.collect();
    let [a, b] = args.as_slice() else {
        return Err(format!("Usage: {usage}"));
    };
    let a = a.parse::<A>().map_err(|e| e.to_string())?;
    let b = b.parse::<B>().map_err(|e| e.to_string())?;
    Ok((a, b))
}

fn teleport_now(player: &mut Player, to: Position) {
    player.entity.teleport(to);
    player.region_state = RegionState::Rebuilding;
}

fn yell(state: &mut WorldState, player: Handle, message: &str) {
    let Some(sender) = state.players.resolve_mut(player) else {
        return;
    };
    if message.len() > MAX_YELL_LENGTH {
        sender.send_message("This message is too long to be broadcasted.");
        return;
    }
    if YELL_FORBIDDEN.iter().any(|marker| message.contains(marker)) {
        sender.send_message("This message contains invalid characters.");
        return;
    }
    let line = format!("{} : {}", sender.display_name(), message);
    info!(player = %sender.username, "Yell:{message}");
    for other in state.players.iter_mut() {
        other.send_message(&line);
    }
}

fn action_button(
    state: &mut WorldState,
    tasks: &mut TaskScheduler<GameTask>,
    player: Handle,
    button: u16,
) {
    let tick = state.tick;
    let Some(p) = state.players.resolve_mut(player) else {
        return;
    };
    if let Some(emote) = emote_for_button(button) {
        p.entity.animate(emote);
        return;
    }

    let spell = match button {
        LOGOUT_BUTTON => {
            p.send(packets::logout());
            state.logouts.push(player);
            return;
        }
        STANDARD_HOME_BUTTON => SpellBook::Standard,
        ANCIENT_HOME_BUTTON => SpellBook::Ancient,
        WALK_BUTTON => {
            p.set_running(false);
            return;
        }
        RUN_BUTTON => {
            p.set_running(true);
            return;
        }
        _ => {
            p.send_message(&format!("Pressed the button {button}."));
            return;
        }
    };

    if p
        .last_teleport
        .is_some_and(|last| tick.saturating_sub(last) < TELEPORT_COOLDOWN_TICKS)
    {
        p.send_message("Please wait a few moments before attempting to cast a spell again.");
        return;
    }
    p.last_teleport = Some(tick);
    if let Some(task) = GameTask::cast_teleport(state, Target::Player(player), spell, spell.home()) {
        schedule(tasks, task);
    }
}

fn walk(
    state: &mut WorldState,
    player: Handle,
    opcode: u8,
    cur: &mut ReadCursor<'_>,
) -> Result<(), CursorError> {
    let Some(p) = state.players.resolve_mut(player) else {
        return Ok(());
    };
    if opcode != inbound::WALK_TO && p.entity.interacting.is_some() {
        p.entity.face(None);
    }
    if p.entity.teleported || p.entity.movement_locked {
        return Ok(());
    }

    let mut len = cur.remaining();
    if opcode == inbound::MAP_WALK {
        len = len.saturating_sub(MAP_WALK_TRAILER);
    }
    let steps = len.saturating_sub(5) / 2;

    let x = i32::from(cur.read_u16_le_a()?);
    let mut path = Vec::with_capacity(steps);
    for _ in 0..steps {
        let dx = i32::from(cur.read_i8()?);
        let dy = i32::from(cur.read_i8()?);
        path.push((dx, dy));
    }
    let y = i32::from(cur.read_u16_le()?);

    let here = p.entity.position;
    let walking = &mut p.entity.walking;
    walking.reset(&here);
    walking.step(&here, x, y);
    for (dx, dy) in path {
        walking.step(&here, x + dx, y + dy);
    }
    walking.finish();
    Ok(())
}

fn attack_mob(state: &mut WorldState, tasks: &mut TaskScheduler<GameTask>, player: Handle, index: usize) {
    let Some(mob) = state.mobs.handle(index) else {
        return;
    };
    let target = Target::Mob(mob);
    let Some(p) = state.players.resolve_mut(player) else {
        return;
    };
    if p.entity.interacting == Some(target) {
        return;
    }
    p.entity.face(Some(target));
    for task in GameTask::melee(player, target) {
        schedule(tasks, task);
    }
}

fn click_mob(state: &mut WorldState, tasks: &mut TaskScheduler<GameTask>, player: Handle, index: usize) {
    let Some(mob) = state.mobs.handle(index) else {
        return;
    };
    let Some(p) = state.players.resolve_mut(player) else {
        return;
    };
    p.entity.interacting = Some(Target::Mob(mob));
    schedule(tasks, GameTask::walk_to_mob(player, mob));
}

fn schedule(tasks: &mut TaskScheduler<GameTask>, task: Task<GameTask>) {
    if let Err(e) = tasks.schedule(task) {
        warn!(error = %e, "Task rejected");
    }
}

/// Cancels everything `player` had running.
pub fn cancel_all(tasks: &mut TaskScheduler<GameTask>, player: Handle) -> usize {
    tasks.cancel(TaskSource::Player(player))
}
