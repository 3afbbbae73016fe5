//! Mob update packet (65).

use realm_shared::{
    cursor::WriteCursor,
    flags::UpdateFlags,
    net::{outbound, Packet, PacketHeader},
    registry::{EntityRegistry, Handle},
};

use super::{backed, write_movement, write_removal, MAX_VIEWABLE};
use crate::{mob::Mob, player::Player};

const MAIN_CAPACITY: usize = 4096;
const BLOCK_CAPACITY: usize = 2048;

const ADD_SENTINEL: u32 = 16383;

/// Builds `observer`'s mob update and brings `local` (its mob view list) up
/// to date.
pub fn build(observer: &Player, local: &mut Vec<Handle>, mobs: &EntityRegistry<Mob>) -> Packet {
    let mut main = WriteCursor::with_capacity(MAIN_CAPACITY);
    let mut blocks = WriteCursor::with_capacity(BLOCK_CAPACITY);
    let here = observer.entity.position;

    {
        let mut bits = main.bits();
        bits.write(8, local.len() as u32);
        let mut kept = Vec::with_capacity(local.len());
        for handle in local.drain(..) {
            match mobs.resolve(handle) {
                Some(mob)
                    if !mob.entity.teleported && mob.entity.position.is_viewable_from(&here) =>
                {
                    let dirty = mob.entity.flags.is_dirty();
                    write_movement(&mut bits, &mob.entity.walking, dirty);
                    if dirty {
                        write_state(mob, &mut blocks);
                    }
                    kept.push(handle);
                }
                _ => write_removal(&mut bits),
            }
        }
        *local = kept;

        for (handle, mob) in mobs.iter() {
            if local.len() >= MAX_VIEWABLE {
                break;
            }
            if !mob.entity.position.is_viewable_from(&here) || local.contains(&handle) {
                continue;
            }
            local.push(handle);
            let dirty = mob.entity.flags.is_dirty();
            bits.write(14, handle.index as u32)
                .write(5, (mob.entity.position.y - here.y) as u32)
                .write(5, (mob.entity.position.x - here.x) as u32)
                .write(1, 0)
                .write(12, u32::from(mob.identity))
                .write_bool(dirty);
            if dirty {
                write_state(mob, &mut blocks);
            }
        }

        if !blocks.is_empty() {
            bits.write(14, ADD_SENTINEL);
        }
    }
    main.put_slice(blocks.as_slice());
    Packet::new(outbound::MOB_UPDATE, PacketHeader::VariableShort, main)
}

fn write_state(mob: &Mob, out: &mut WriteCursor) {
    let entity = &mob.entity;
    let flags = entity.flags;
    let index = entity.index;

    let hit = backed(flags, UpdateFlags::HIT, entity.hit, index);
    let animation = backed(flags, UpdateFlags::ANIMATION, entity.animation, index);
    let graphic = backed(flags, UpdateFlags::GRAPHICS, entity.graphic, index);

    let mut mask = 0u8;
    if hit.is_some() {
        mask |= 0x40;
    }
    if animation.is_some() {
        mask |= 0x10;
    }
    if graphic.is_some() {
        mask |= 0x80;
    }
    out.put_u8(mask);

    if let Some(hit) = hit {
        out.put_u8_c(hit.damage)
            .put_u8_s(hit.kind.value())
            .put_u8_s(entity.hitpoints.min(255) as u8)
            .put_u8_c(entity.max_hitpoints.min(255) as u8);
    }
    if let Some(animation) = animation {
        out.put_u16_le(animation.id).put_u8(animation.delay);
    }
    if let Some(graphic) = graphic {
        out.put_u16(graphic.id).put_u32(graphic.height);
    }
}
