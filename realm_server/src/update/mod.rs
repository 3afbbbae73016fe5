//! Visibility synchronisation.
//!
//! Once per tick every player receives two packets describing the entities
//! around it: one for players and one for mobs. Each packet opens with a
//! bit-packed section (movement of already-tracked entities, then newly
//! tracked ones) and closes with the state blocks those entities carry.
//! The view lists are diffed in place while the packet is written.

pub mod mob;
pub mod player;

use realm_shared::{cursor::BitWriter, flags::UpdateFlags, walking::WalkingQueue};
use tracing::warn;

/// Most entities of one population a client tracks at once.
pub const MAX_VIEWABLE: usize = 255;

/// Most players admitted into a view list per tick.
pub const MAX_ADDS_PER_CYCLE: usize = 20;

/// Movement of an entity the observer already tracks.
pub(crate) fn write_movement(bits: &mut BitWriter<'_>, walking: &WalkingQueue, dirty: bool) {
    match (walking.walking_direction(), walking.running_direction()) {
        (None, _) => {
            if dirty {
                bits.write(1, 1).write(2, 0);
            } else {
                bits.write(1, 0);
            }
        }
        (Some(walk), None) => {
            bits.write(1, 1)
                .write(2, 1)
                .write(3, walk.value())
                .write_bool(dirty);
        }
        (Some(walk), Some(run)) => {
            bits.write(1, 1)
                .write(2, 2)
                .write(3, walk.value())
                .write(3, run.value())
                .write_bool(dirty);
        }
    }
}

/// Movement code that drops an entity from the observer's view.
pub(crate) fn write_removal(bits: &mut BitWriter<'_>) {
    bits.write(1, 1).write(2, 3);
}

/// Returns `value` when `flag` is set and backed by data. A flag without
/// data is a logic error upstream; the block is skipped with a diagnostic
/// so the rest of the packet still goes out.
pub(crate) fn backed<T: Copy>(
    flags: UpdateFlags,
    flag: UpdateFlags,
    value: Option<T>,
    index: i32,
) -> Option<T> {
    if !flags.contains(flag) {
        return None;
    }
    if value.is_none() {
        warn!(index, flag = ?flag, "Update flag set without data, skipping block");
    }
    value
}

/// A client-side reading of update packets, used to check the encoders.
#[cfg(test)]
pub(crate) mod reference {
    use realm_shared::cursor::{BitReader, CursorError, ReadCursor};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Movement {
        Idle { dirty: bool },
        Walk { dir: u32, dirty: bool },
        Run { walk: u32, run: u32, dirty: bool },
        Rebuild { plane: u32, dirty: bool, local_x: u32, local_y: u32 },
        Removed,
    }

    impl Movement {
        pub fn dirty(&self) -> bool {
            match *self {
                Movement::Idle { dirty }
                | Movement::Walk { dirty, .. }
                | Movement::Run { dirty, .. }
                | Movement::Rebuild { dirty, .. } => dirty,
                Movement::Removed => false,
            }
        }
    }

    pub fn read_movement(bits: &mut BitReader<'_, '_>, rebuild_allowed: bool) -> Result<Movement, CursorError> {
        if !bits.read_bool()? {
            return Ok(Movement::Idle { dirty: false });
        }
        Ok(match bits.read(2)? {
            0 => Movement::Idle { dirty: true },
            1 => Movement::Walk {
                dir: bits.read(3)?,
                dirty: bits.read_bool()?,
            },
            2 => Movement::Run {
                walk: bits.read(3)?,
                run: bits.read(3)?,
                dirty: bits.read_bool()?,
            },
            _ if rebuild_allowed => {
                let plane = bits.read(2)?;
                let _discard = bits.read(1)?;
                let dirty = bits.read_bool()?;
                let local_y = bits.read(7)?;
                let local_x = bits.read(7)?;
                Movement::Rebuild {
                    plane,
                    dirty,
                    local_x,
                    local_y,
                }
            }
            _ => Movement::Removed,
        })
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Added {
        pub index: u32,
        pub dy: i32,
        pub dx: i32,
        pub dirty: bool,
        /// Mob identity; zero for players.
        pub identity: u32,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct PlayerBlock {
        pub mask: u16,
        pub graphic: Option<(u16, u32)>,
        pub animation: Option<(u16, u8)>,
        pub chat: Option<(u16, u8, Vec<u8>)>,
        pub face: Option<u16>,
        pub appearance: Option<Vec<u8>>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct MobBlock {
        pub mask: u8,
        pub hit: Option<(u8, u8, u8, u8)>,
        pub animation: Option<(u16, u8)>,
        pub graphic: Option<(u16, u32)>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct PlayerUpdate {
        pub own: Option<Movement>,
        pub tracked: Vec<Movement>,
        pub added: Vec<Added>,
        pub blocks: Vec<PlayerBlock>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct MobUpdate {
        pub tracked: Vec<Movement>,
        pub added: Vec<Added>,
        pub blocks: Vec<MobBlock>,
    }

    pub fn read_player_block(cur: &mut ReadCursor<'_>) -> Result<PlayerBlock, CursorError> {
        let mut mask = u16::from(cur.read_u8()?);
        if mask & 0x40 != 0 {
            mask |= u16::from(cur.read_u8()?) << 8;
        }
        let mut block = PlayerBlock {
            mask,
            ..Default::default()
        };
        if mask & 0x100 != 0 {
            block.graphic = Some((cur.read_u16_le()?, cur.read_u32()?));
        }
        if mask & 0x8 != 0 {
            block.animation = Some((cur.read_u16_le()?, cur.read_u8_c()?));
        }
        if mask & 0x80 != 0 {
            let style = cur.read_u16_le()?;
            let rights = cur.read_u8()?;
            let len = cur.read_u8_c()? as usize;
            block.chat = Some((style, rights, cur.read_bytes(len)?.to_vec()));
        }
        if mask & 0x1 != 0 {
            block.face = Some(cur.read_u16_le()?);
        }
        if mask & 0x10 != 0 {
            let len = cur.read_u8_c()? as usize;
            block.appearance = Some(cur.read_bytes(len)?.to_vec());
        }
        Ok(block)
    }

    pub fn read_mob_block(cur: &mut ReadCursor<'_>) -> Result<MobBlock, CursorError> {
        let mask = cur.read_u8()?;
        let mut block = MobBlock {
            mask,
            ..Default::default()
        };
        if mask & 0x40 != 0 {
            block.hit = Some((
                cur.read_u8_c()?,
                cur.read_u8_s()?,
                cur.read_u8_s()?,
                cur.read_u8_c()?,
            ));
        }
        if mask & 0x10 != 0 {
            block.animation = Some((cur.read_u16_le()?, cur.read_u8()?));
        }
        if mask & 0x80 != 0 {
            block.graphic = Some((cur.read_u16()?, cur.read_u32()?));
        }
        Ok(block)
    }

    pub fn read_player_update(payload: &[u8]) -> Result<PlayerUpdate, CursorError> {
        let mut cur = ReadCursor::new(payload);
        let mut update = PlayerUpdate::default();
        let mut dirty = 0;
        {
            let mut bits = cur.bits();
            let own = read_movement(&mut bits, true)?;
            if own.dirty() {
                dirty += 1;
            }
            update.own = Some(own);
            let count = bits.read(8)?;
            for _ in 0..count {
                let movement = read_movement(&mut bits, false)?;
                if movement.dirty() {
                    dirty += 1;
                }
                update.tracked.push(movement);
            }
            while bits.remaining() >= 11 {
                let index = bits.read(11)?;
                if index == 0x7FF {
                    break;
                }
                let dirty_bit = bits.read_bool()?;
                let _discard = bits.read(1)?;
                let dy = bits.read_signed(5)?;
                let dx = bits.read_signed(5)?;
                if dirty_bit {
                    dirty += 1;
                }
                update.added.push(Added {
                    index,
                    dy,
                    dx,
                    dirty: dirty_bit,
                    identity: 0,
                });
            }
        }
        for _ in 0..dirty {
            update.blocks.push(read_player_block(&mut cur)?);
        }
        Ok(update)
    }

    pub fn read_mob_update(payload: &[u8]) -> Result<MobUpdate, CursorError> {
        let mut cur = ReadCursor::new(payload);
        let mut update = MobUpdate::default();
        let mut dirty = 0;
        {
            let mut bits = cur.bits();
            let count = bits.read(8)?;
            for _ in 0..count {
                let movement = read_movement(&mut bits, false)?;
                if movement.dirty() {
                    dirty += 1;
                }
                update.tracked.push(movement);
            }
            while bits.remaining() >= 14 {
                let index = bits.read(14)?;
                if index == 16383 {
                    break;
                }
                let dy = bits.read_signed(5)?;
                let dx = bits.read_signed(5)?;
                let _discard = bits.read(1)?;
                let identity = bits.read(12)?;
                let dirty_bit = bits.read_bool()?;
                if dirty_bit {
                    dirty += 1;
                }
                update.added.push(Added {
                    index,
                    dy,
                    dx,
                    dirty: dirty_bit,
                    identity,
                });
            }
        }
        for _ in 0..dirty {
            update.blocks.push(read_mob_block(&mut cur)?);
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use realm_shared::{
        cursor::WriteCursor,
        position::{Direction, Position},
    };

    use super::*;

    fn direction_of(value: u32) -> Option<Direction> {
        use Direction::*;
        [NorthWest, North, NorthEast, West, East, SouthWest, South, SouthEast]
            .get(value as usize)
            .copied()
    }

    fn encode(walking: &WalkingQueue, dirty: bool) -> Vec<u8> {
        let mut buf = WriteCursor::new();
        write_movement(&mut buf.bits(), walking, dirty);
        buf.as_slice().to_vec()
    }

    #[test]
    fn idle_movement_is_one_bit_when_clean() {
        let walking = WalkingQueue::tireless();
        assert_eq!(encode(&walking, false), vec![0]);
        assert_eq!(encode(&walking, true), vec![0b1000_0000]);
    }

    #[test]
    fn walk_and_run_codes() {
        let mut pos = Position::new(3200, 3200, 0);
        let mut walking = WalkingQueue::tireless();
        walking.reset(&pos);
        walking.step(&pos, 3203, 3200);
        walking.finish();
        walking.process(&mut pos, &Position::new(3200, 3200, 0), false);
        // 1, 01, 100 (east), 1
        assert_eq!(encode(&walking, true), vec![0b1011_0010]);

        walking.set_running(true);
        walking.process(&mut pos, &Position::new(3200, 3200, 0), false);
        assert_eq!(pos, Position::new(3203, 3200, 0));
        // 1, 10, 100, 100, 0
        assert_eq!(encode(&walking, false), vec![0b1101_0010, 0]);
    }

    #[test]
    fn direction_values_round_trip() {
        for value in 0..8 {
            assert_eq!(direction_of(value).map(Direction::value), Some(value));
        }
        assert_eq!(direction_of(8), None);
    }
}
