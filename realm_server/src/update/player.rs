//! Player update packet (81).

use realm_shared::{
    cursor::WriteCursor,
    flags::UpdateFlags,
    net::{outbound, Packet, PacketHeader},
    position::Viewport,
    registry::{EntityRegistry, Handle},
    text::encode_base37,
};

use super::{backed, write_movement, write_removal, MAX_ADDS_PER_CYCLE, MAX_VIEWABLE};
use crate::{
    content::{PlayerAnimations, FULL_BODY_ITEMS, FULL_HEAD_ITEMS},
    entity::Target,
    item::Equipment,
    mob::Mob,
    player::{Gender, Player, RegionState},
};

const MAIN_CAPACITY: usize = 8192;
const BLOCK_CAPACITY: usize = 4096;

/// Index that ends the list of added players.
const ADD_SENTINEL: u32 = 0x7FF;

/// Both populations, for resolving who a player is facing.
#[derive(Clone, Copy)]
struct Lookup<'a> {
    players: &'a EntityRegistry<Player>,
    mobs: &'a EntityRegistry<Mob>,
}

impl Lookup<'_> {
    /// Face index of `target`, or 0 once it has left the world.
    fn face_index(&self, target: Option<Target>) -> u16 {
        let live = match target {
            Some(Target::Player(handle)) => self.players.is_live(handle),
            Some(Target::Mob(handle)) => self.mobs.is_live(handle),
            None => false,
        };
        match target {
            Some(target) if live => target.face_index(),
            _ => 0,
        }
    }
}

/// Builds `observer`'s player update and brings `local` (its view list) up
/// to date. The caller detaches the view list from the observer for the
/// duration so the registry can be read freely.
pub fn build(
    observer: &Player,
    local: &mut Vec<Handle>,
    players: &EntityRegistry<Player>,
    mobs: &EntityRegistry<Mob>,
) -> Packet {
    let lookup = Lookup { players, mobs };
    let mut main = WriteCursor::with_capacity(MAIN_CAPACITY);
    let mut blocks = WriteCursor::with_capacity(BLOCK_CAPACITY);
    let me = &observer.entity;

    {
        let mut bits = main.bits();
        write_own_movement(&mut bits, observer);
        if me.flags.is_dirty() {
            write_state(observer, &mut blocks, lookup, false, true);
        }

        bits.write(8, local.len() as u32);
        let mut kept = Vec::with_capacity(local.len());
        for handle in local.drain(..) {
            match players.resolve(handle) {
                Some(other)
                    if !other.entity.teleported
                        && other.entity.position.is_viewable_from(&me.position) =>
                {
                    let dirty = other.entity.flags.is_dirty();
                    write_movement(&mut bits, &other.entity.walking, dirty);
                    if dirty {
                        write_state(other, &mut blocks, lookup, false, false);
                    }
                    kept.push(handle);
                }
                _ => write_removal(&mut bits),
            }
        }
        *local = kept;

        let mut added = 0;
        for (handle, other) in players.iter() {
            if added >= MAX_ADDS_PER_CYCLE || local.len() >= MAX_VIEWABLE {
                break;
            }
            if other.entity.index == me.index || local.contains(&handle) {
                continue;
            }
            if !other.entity.position.is_viewable_from(&me.position) {
                continue;
            }
            local.push(handle);
            let dy = other.entity.position.y - me.position.y;
            let dx = other.entity.position.x - me.position.x;
            bits.write(11, handle.index as u32)
                .write(1, 1)
                .write(1, 1)
                .write(5, dy as u32)
                .write(5, dx as u32);
            write_state(other, &mut blocks, lookup, true, false);
            added += 1;
        }

        if !blocks.is_empty() {
            bits.write(11, ADD_SENTINEL);
        }
    }
    main.put_slice(blocks.as_slice());
    Packet::new(outbound::PLAYER_UPDATE, PacketHeader::VariableShort, main)
}

fn write_own_movement(bits: &mut realm_shared::cursor::BitWriter<'_>, observer: &Player) {
    let me = &observer.entity;
    if observer.region_state == RegionState::Rebuilding {
        let viewport = Viewport::new(&me.region);
        bits.write(1, 1)
            .write(2, 3)
            .write(2, u32::from(me.position.plane))
            .write(1, 1)
            .write_bool(me.flags.is_dirty())
            .write(7, viewport.local_y(&me.position) as u32)
            .write(7, viewport.local_x(&me.position) as u32);
    } else {
        write_movement(bits, &me.walking, me.flags.is_dirty());
    }
}

/// Writes one state block. `forced` adds the appearance whether or not it
/// changed; `own` leaves out the chat, which the client already shows.
fn write_state(player: &Player, out: &mut WriteCursor, lookup: Lookup<'_>, forced: bool, own: bool) {
    let entity = &player.entity;
    let flags = entity.flags;
    let index = entity.index;

    let graphic = backed(flags, UpdateFlags::GRAPHICS, entity.graphic, index);
    let animation = backed(flags, UpdateFlags::ANIMATION, entity.animation, index);
    let chat = if own {
        None
    } else {
        backed(flags, UpdateFlags::CHAT, player.chat.as_ref(), index)
    };
    let face = flags.contains(UpdateFlags::FACE_ENTITY);
    let appearance = forced || flags.contains(UpdateFlags::APPEARANCE);

    let mut mask = 0u16;
    if appearance {
        mask |= 0x10;
    }
    if animation.is_some() {
        mask |= 0x8;
    }
    if chat.is_some() {
        mask |= 0x80;
    }
    if face {
        mask |= 0x1;
    }
    if graphic.is_some() {
        mask |= 0x100;
    }
    if mask >= 0x100 {
        mask |= 0x40;
        out.put_u8(mask as u8).put_u8((mask >> 8) as u8);
    } else {
        out.put_u8(mask as u8);
    }

    if let Some(graphic) = graphic {
        out.put_u16_le(graphic.id).put_u32(graphic.height);
    }
    if let Some(animation) = animation {
        out.put_u16_le(animation.id).put_u8_c(animation.delay);
    }
    if let Some(chat) = chat {
        let style = (u16::from(chat.colour) << 8) | u16::from(chat.effects);
        out.put_u16_le(style)
            .put_u8(player.rights)
            .put_u8_c(chat.text.len() as u8)
            .put_slice(&chat.text);
    }
    if face {
        out.put_u16_le(lookup.face_index(entity.interacting));
    }
    if appearance {
        write_appearance(player, out);
    }
}

fn write_appearance(player: &Player, out: &mut WriteCursor) {
    let looks = &player.appearance;
    let gear = &player.equipment;
    let mut props = WriteCursor::with_capacity(128);

    let worn = |props: &mut WriteCursor, slot: usize| match gear.get(slot) {
        Some(item) => {
            props.put_u16(0x200 + item);
        }
        None => {
            props.put_u8(0);
        }
    };
    let body = |props: &mut WriteCursor, part: usize| {
        props.put_u16(0x100 + looks.body[part]);
    };
    let helm = gear.get(Equipment::HEAD);
    let full_helm = helm.is_some_and(|item| FULL_HEAD_ITEMS.contains(&item));

    props.put_u8(looks.gender.value()).put_u8(0);
    worn(&mut props, Equipment::HEAD);
    worn(&mut props, Equipment::CAPE);
    worn(&mut props, Equipment::AMULET);
    worn(&mut props, Equipment::WEAPON);
    match gear.get(Equipment::CHEST) {
        Some(item) => {
            props.put_u16(0x200 + item);
        }
        None => body(&mut props, 0),
    }
    worn(&mut props, Equipment::SHIELD);
    match gear.get(Equipment::CHEST) {
        Some(item) if FULL_BODY_ITEMS.contains(&item) => {
            props.put_u16(0x200 + item);
        }
        _ => body(&mut props, 1),
    }
    match gear.get(Equipment::LEGS) {
        Some(item) => {
            props.put_u16(0x200 + item);
        }
        None => body(&mut props, 2),
    }
    if full_helm {
        props.put_u8(0);
    } else {
        body(&mut props, 3);
    }
    match gear.get(Equipment::HANDS) {
        Some(item) => {
            props.put_u16(0x200 + item);
        }
        None => body(&mut props, 4),
    }
    match gear.get(Equipment::FEET) {
        Some(item) => {
            props.put_u16(0x200 + item);
        }
        None => body(&mut props, 5),
    }
    if full_helm || (helm.is_none() && looks.gender == Gender::Female) {
        props.put_u8(0);
    } else {
        body(&mut props, 6);
    }

    for colour in looks.colours {
        props.put_u8(colour);
    }

    let anims = &player.animations;
    for animation in [
        anims.stand,
        PlayerAnimations::TURN,
        anims.walk,
        PlayerAnimations::BACKWARD,
        PlayerAnimations::TURN_RIGHT,
        PlayerAnimations::TURN_LEFT,
        anims.run,
    ] {
        props.put_u16(animation.id);
    }

    props
        .put_u64(encode_base37(&player.username))
        .put_u8(player.skills.combat_level())
        .put_u16(0);

    out.put_u8_c(props.len() as u8).put_slice(props.as_slice());
}

#[cfg(test)]
mod tests {
    use realm_shared::{
        cursor::ReadCursor,
        position::{Direction, Position},
    };

    use super::*;
    use crate::{
        entity::{Animation, Graphic, Target},
        item::Item,
        player::{testing::player, ChatMessage},
        update::reference::{read_player_update, Movement},
    };

    fn registry_with(positions: &[Position]) -> (EntityRegistry<Player>, Vec<Handle>) {
        let mut players = EntityRegistry::new(2048);
        let mut handles = Vec::new();
        for (i, &position) in positions.iter().enumerate() {
            let (mut p, _wires) = player(&format!("p{i}"), position);
            p.region_state = RegionState::Traversing;
            handles.push(players.add(p).unwrap());
        }
        (players, handles)
    }

    fn update_for(players: &mut EntityRegistry<Player>, observer: Handle) -> Packet {
        update_with_mobs(players, &EntityRegistry::new(1), observer)
    }

    fn update_with_mobs(
        players: &mut EntityRegistry<Player>,
        mobs: &EntityRegistry<Mob>,
        observer: Handle,
    ) -> Packet {
        let mut local = std::mem::take(&mut players.resolve_mut(observer).unwrap().local_players);
        let packet = build(players.resolve(observer).unwrap(), &mut local, players, mobs);
        players.resolve_mut(observer).unwrap().local_players = local;
        packet
    }

    #[test]
    fn lone_player_sends_idle_and_empty_list() {
        let (mut players, handles) = registry_with(&[Position::new(3200, 3200, 0)]);
        let packet = update_for(&mut players, handles[0]);
        assert_eq!(packet.opcode, outbound::PLAYER_UPDATE);
        assert_eq!(packet.header, PacketHeader::VariableShort);
        // idle bit, then an 8-bit zero count
        assert_eq!(&packet.payload[..], &[0, 0]);
    }

    #[test]
    fn rebuild_writes_local_coordinates() {
        let (mut players, handles) = registry_with(&[Position::new(3222, 3211, 0)]);
        {
            let p = players.resolve_mut(handles[0]).unwrap();
            p.region_state = RegionState::Rebuilding;
            p.entity.region = p.entity.position;
        }
        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        let viewport = Viewport::new(&Position::new(3222, 3211, 0));
        assert_eq!(
            update.own,
            Some(Movement::Rebuild {
                plane: 0,
                dirty: false,
                local_x: viewport.local_x(&Position::new(3222, 3211, 0)) as u32,
                local_y: viewport.local_y(&Position::new(3222, 3211, 0)) as u32,
            })
        );
    }

    #[test]
    fn nearby_player_is_added_with_forced_appearance() {
        let (mut players, handles) = registry_with(&[
            Position::new(3200, 3200, 0),
            Position::new(3203, 3198, 0),
            Position::new(3300, 3300, 0),
        ]);
        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();

        assert_eq!(update.added.len(), 1);
        let added = &update.added[0];
        assert_eq!(added.index, handles[1].index as u32);
        assert_eq!((added.dx, added.dy), (3, -2));
        assert_eq!(update.blocks.len(), 1);
        assert_eq!(update.blocks[0].mask, 0x10);
        assert!(update.blocks[0].appearance.is_some());

        let local = &players.resolve(handles[0]).unwrap().local_players;
        assert_eq!(local, &vec![handles[1]]);
    }

    #[test]
    fn animation_and_graphic_round_trip() {
        let (mut players, handles) =
            registry_with(&[Position::new(3200, 3200, 0), Position::new(3201, 3200, 0)]);
        update_for(&mut players, handles[0]);
        {
            let other = players.resolve_mut(handles[1]).unwrap();
            other.entity.animate(Animation::new(714, 3));
            other.entity.show_graphic(Graphic::new(308, 6_553_600));
        }
        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();

        assert_eq!(update.tracked, vec![Movement::Idle { dirty: true }]);
        let block = &update.blocks[0];
        assert_eq!(block.mask, 0x100 | 0x40 | 0x8);
        assert_eq!(block.animation, Some((714, 3)));
        assert_eq!(block.graphic, Some((308, 6_553_600)));
    }

    #[test]
    fn own_block_leaves_out_chat() {
        let (mut players, handles) = registry_with(&[Position::new(3200, 3200, 0)]);
        {
            let p = players.resolve_mut(handles[0]).unwrap();
            p.chat = Some(ChatMessage {
                effects: 0,
                colour: 0,
                text: vec![1, 2, 3],
            });
            p.entity.flags.flag(UpdateFlags::CHAT);
        }
        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        assert_eq!(update.own, Some(Movement::Idle { dirty: true }));
        assert_eq!(update.blocks[0].mask, 0);
    }

    #[test]
    fn chat_and_face_reach_observers() {
        let (mut players, handles) =
            registry_with(&[Position::new(3200, 3200, 0), Position::new(3201, 3200, 0)]);
        update_for(&mut players, handles[0]);
        {
            let other = players.resolve_mut(handles[1]).unwrap();
            other.chat = Some(ChatMessage {
                effects: 2,
                colour: 1,
                text: b"abc".to_vec(),
            });
            other.entity.flags.flag(UpdateFlags::CHAT);
            other.entity.face(Some(Target::Player(handles[0])));
        }
        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        let block = &update.blocks[0];
        assert_eq!(block.chat, Some((0x0102, 0, b"abc".to_vec())));
        assert_eq!(block.face, Some(0x8000 | handles[0].index as u16));
    }

    #[test]
    fn facing_a_departed_entity_writes_zero() {
        let (mut players, handles) =
            registry_with(&[Position::new(3200, 3200, 0), Position::new(3201, 3200, 0)]);
        let mut mobs = EntityRegistry::new(4);
        let mob = mobs.add(Mob::new(1, Position::new(3202, 3200, 0), 5, 1)).unwrap();
        update_with_mobs(&mut players, &mobs, handles[0]);

        players
            .resolve_mut(handles[1])
            .unwrap()
            .entity
            .face(Some(Target::Mob(mob)));
        mobs.remove(mob.index).unwrap();
        // same slot, new occupant
        let replacement = mobs.add(Mob::new(2, Position::new(3202, 3200, 0), 5, 1)).unwrap();
        assert_eq!(replacement.index, mob.index);

        let packet = update_with_mobs(&mut players, &mobs, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        assert_eq!(update.blocks[0].face, Some(0));
    }

    #[test]
    fn flag_without_data_is_skipped() {
        let (mut players, handles) =
            registry_with(&[Position::new(3200, 3200, 0), Position::new(3201, 3200, 0)]);
        update_for(&mut players, handles[0]);
        {
            let other = players.resolve_mut(handles[1]).unwrap();
            other.entity.flags.flag(UpdateFlags::ANIMATION);
            other.entity.flags.flag(UpdateFlags::CHAT);
            other.entity.face(None);
        }
        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        let block = &update.blocks[0];
        assert_eq!(block.mask, 0x1);
        assert_eq!(block.face, Some(0));
    }

    #[test]
    fn walking_and_leaving_players() {
        let (mut players, handles) = registry_with(&[
            Position::new(3200, 3200, 0),
            Position::new(3201, 3200, 0),
            Position::new(3202, 3200, 0),
        ]);
        update_for(&mut players, handles[0]);
        {
            let walker = players.resolve_mut(handles[1]).unwrap();
            let at = walker.entity.position;
            walker.entity.walking.reset(&at);
            walker.entity.walking.step(&at, 3201, 3201);
            walker.entity.walking.finish();
            walker.entity.process_movement();
        }
        players.remove(handles[2].index).unwrap();

        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        assert_eq!(
            update.tracked,
            vec![
                Movement::Walk {
                    dir: Direction::North.value(),
                    dirty: false,
                },
                Movement::Removed,
            ]
        );
        assert_eq!(
            players.resolve(handles[0]).unwrap().local_players,
            vec![handles[1]]
        );
    }

    #[test]
    fn teleported_player_is_dropped_and_re_added() {
        let (mut players, handles) =
            registry_with(&[Position::new(3200, 3200, 0), Position::new(3201, 3200, 0)]);
        update_for(&mut players, handles[0]);
        players
            .resolve_mut(handles[1])
            .unwrap()
            .entity
            .teleport(Position::new(3205, 3205, 0));

        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        assert_eq!(update.tracked, vec![Movement::Removed]);
        assert_eq!(update.added.len(), 1);
        assert_eq!((update.added[0].dx, update.added[0].dy), (5, 5));
    }

    #[test]
    fn admission_is_capped_per_cycle_and_in_total() {
        let mut positions = vec![Position::new(3200, 3200, 0)];
        for i in 0..300 {
            positions.push(Position::new(3190 + i % 20, 3190 + i / 20, 0));
        }
        let (mut players, handles) = registry_with(&positions);
        let observer = handles[0];

        let mut previous = 0;
        for _ in 0..20 {
            update_for(&mut players, observer);
            let me = players.resolve(observer).unwrap();
            let count = me.local_players.len();
            assert!(count <= MAX_VIEWABLE.min(previous + MAX_ADDS_PER_CYCLE));
            for handle in &me.local_players {
                let other = players.resolve(*handle).unwrap();
                assert!(other.entity.position.is_viewable_from(&me.entity.position));
            }
            previous = count;
        }
        assert_eq!(previous, MAX_VIEWABLE);
    }

    #[test]
    fn appearance_layout() {
        let (mut players, handles) =
            registry_with(&[Position::new(3200, 3200, 0), Position::new(3201, 3200, 0)]);
        {
            let other = players.resolve_mut(handles[1]).unwrap();
            other.equipment.set(Equipment::HEAD, Some(Item::new(1153, 1)));
            other.equipment.set(Equipment::WEAPON, Some(Item::new(4151, 1)));
        }
        let packet = update_for(&mut players, handles[0]);
        let update = read_player_update(&packet.payload).unwrap();
        let props = update.blocks[0].appearance.clone().unwrap();

        let mut cur = ReadCursor::new(&props);
        assert_eq!(cur.read_u8().unwrap(), 0); // gender
        assert_eq!(cur.read_u8().unwrap(), 0); // head icon
        assert_eq!(cur.read_u16().unwrap(), 0x200 + 1153);
        assert_eq!(cur.read_u8().unwrap(), 0); // cape
        assert_eq!(cur.read_u8().unwrap(), 0); // amulet
        assert_eq!(cur.read_u16().unwrap(), 0x200 + 4151);
        assert_eq!(cur.read_u16().unwrap(), 0x100 + 18); // torso
        assert_eq!(cur.read_u8().unwrap(), 0); // shield
        assert_eq!(cur.read_u16().unwrap(), 0x100 + 26); // arms
        assert_eq!(cur.read_u16().unwrap(), 0x100 + 36); // legs
        assert_eq!(cur.read_u8().unwrap(), 0); // hair, under a full helm
        assert_eq!(cur.read_u16().unwrap(), 0x100 + 33); // hands
        assert_eq!(cur.read_u16().unwrap(), 0x100 + 42); // feet
        assert_eq!(cur.read_u8().unwrap(), 0); // beard, under a full helm
        assert_eq!(cur.read_bytes(5).unwrap(), &[7, 8, 9, 5, 0]);
        let anims: Vec<u16> = (0..7).map(|_| cur.read_u16().unwrap()).collect();
        assert_eq!(anims, vec![808, 823, 819, 820, 821, 822, 824]);
        assert_eq!(cur.read_u64().unwrap(), encode_base37("p1"));
        assert_eq!(cur.read_u8().unwrap(), 3);
        assert_eq!(cur.read_u16().unwrap(), 0);
        assert_eq!(cur.remaining(), 0);
    }
}
