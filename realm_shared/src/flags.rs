//! Dirty-state flags.
//!
//! A flag marks an attribute that changed this tick and must be described in
//! the entity's next state block. The wire masks differ between players and
//! mobs, so the translation lives next to each encoder; the helpers here only
//! cover the logical set.

bitflags::bitflags! {
    /// Attributes awaiting a state block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UpdateFlags: u8 {
        const CHAT = 1 << 0;
        const HIT = 1 << 1;
        const FACE_ENTITY = 1 << 2;
        const APPEARANCE = 1 << 3;
        const GRAPHICS = 1 << 4;
        const ANIMATION = 1 << 5;
    }
}

impl UpdateFlags {
    /// Whether any state block is pending.
    pub fn is_dirty(&self) -> bool {
        !self.is_empty()
    }

    pub fn flag(&mut self, flag: UpdateFlags) {
        self.insert(flag);
    }

    pub fn reset(&mut self) {
        *self = UpdateFlags::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_tracks_any_flag() {
        let mut flags = UpdateFlags::default();
        assert!(!flags.is_dirty());
        flags.flag(UpdateFlags::ANIMATION);
        flags.flag(UpdateFlags::GRAPHICS);
        assert!(flags.is_dirty());
        assert!(flags.contains(UpdateFlags::ANIMATION | UpdateFlags::GRAPHICS));
        flags.reset();
        assert!(!flags.is_dirty());
    }
}
