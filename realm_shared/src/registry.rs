//! Fixed-capacity slotted entity table.
//!
//! Slot `i` holds at most one live entity whose index is `i + 1`; index 0 is
//! never handed out so the client can use it as "nobody". Each slot also
//! carries a generation counter, bumped on every insertion, so that a
//! [`Handle`] taken earlier stops resolving once its occupant leaves.

use thiserror::Error;

/// Index value carried by an entity that is not registered anywhere.
pub const UNREGISTERED: i32 = -1;

/// Errors raised by [`EntityRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("index {index} outside 1..={capacity}")]
    OutOfBounds { index: usize, capacity: usize },
    #[error("slot {slot} holds index {found}, expected {expected}")]
    IndexMismatch { slot: usize, expected: usize, found: i32 },
    #[error("registry full ({capacity} slots)")]
    Full { capacity: usize },
    #[error("index {index} is vacant")]
    Vacant { index: usize },
}

/// Errors raised by [`RegistryCursor::remove_current`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IterRemoveError {
    #[error("remove called without advancing the cursor")]
    NotAdvanced,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Anything stored in a registry records its own 1-based index.
pub trait Indexed {
    fn index(&self) -> i32;
    fn set_index(&mut self, index: i32);
}

/// Liveness-checked reference to a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub index: usize,
    pub generation: u32,
}

pub struct EntityRegistry<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    size: usize,
}

impl<T: Indexed> EntityRegistry<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            generations: vec![0; capacity],
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_full(&self) -> bool {
        self.size == self.slots.len()
    }

    /// Places `entity` in the first free slot and returns its handle.
    pub fn add(&mut self, mut entity: T) -> Result<Handle, RegistryError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::Full {
                capacity: self.capacity(),
            })?;

        let index = slot + 1;
        entity.set_index(index as i32);
        self.slots[slot] = Some(entity);
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.size += 1;
        Ok(Handle {
            index,
            generation: self.generations[slot],
        })
    }

    fn slot_of(&self, index: usize) -> Result<usize, RegistryError> {
        if index == 0 || index > self.capacity() {
            return Err(RegistryError::OutOfBounds {
                index,
                capacity: self.capacity(),
            });
        }
        Ok(index - 1)
    }

    /// Returns the occupant of `index`, or `Ok(None)` for a free slot.
    pub fn get(&self, index: usize) -> Result<Option<&T>, RegistryError> {
        let slot = self.slot_of(index)?;
        Ok(self.slots[slot].as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Result<Option<&mut T>, RegistryError> {
        let slot = self.slot_of(index)?;
        Ok(self.slots[slot].as_mut())
    }

    /// Removes the occupant of `index`. The occupant must still believe it
    /// lives at `index`; a disagreement means a stale index was used.
    pub fn remove(&mut self, index: usize) -> Result<T, RegistryError> {
        let slot = self.slot_of(index)?;
        let found = match &self.slots[slot] {
            Some(entity) => entity.index(),
            None => return Err(RegistryError::Vacant { index }),
        };
        if found != index as i32 {
            return Err(RegistryError::IndexMismatch {
                slot,
                expected: index,
                found,
            });
        }
        let mut entity = self.slots[slot]
            .take()
            .ok_or(RegistryError::Vacant { index })?;
        entity.set_index(UNREGISTERED);
        self.size -= 1;
        Ok(entity)
    }

    /// Handle for the current occupant of `index`.
    pub fn handle(&self, index: usize) -> Option<Handle> {
        let slot = self.slot_of(index).ok()?;
        self.slots[slot].as_ref().map(|_| Handle {
            index,
            generation: self.generations[slot],
        })
    }

    /// Whether `handle` still refers to a live occupant.
    pub fn is_live(&self, handle: Handle) -> bool {
        self.resolve(handle).is_some()
    }

    pub fn resolve(&self, handle: Handle) -> Option<&T> {
        let slot = self.slot_of(handle.index).ok()?;
        if self.generations[slot] != handle.generation {
            return None;
        }
        self.slots[slot].as_ref()
    }

    pub fn resolve_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slot_of(handle.index).ok()?;
        if self.generations[slot] != handle.generation {
            return None;
        }
        self.slots[slot].as_mut()
    }

    /// Iterates live occupants in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.slots
            .iter()
            .zip(self.generations.iter())
            .enumerate()
            .filter_map(|(slot, (entry, generation))| {
                entry.as_ref().map(|entity| {
                    (
                        Handle {
                            index: slot + 1,
                            generation: *generation,
                        },
                        entity,
                    )
                })
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Snapshot of the live indices, for passes that need to touch other
    /// occupants while visiting each one.
    pub fn indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(slot, _)| slot + 1)
            .collect()
    }

    /// Starts an explicit cursor over the live slots.
    pub fn cursor(&self) -> RegistryCursor {
        RegistryCursor::default()
    }
}

/// Explicit iteration state that allows removing the element it last
/// yielded, once per advance.
#[derive(Debug, Default)]
pub struct RegistryCursor {
    next_slot: usize,
    current: Option<usize>,
}

impl RegistryCursor {
    /// Moves to the next live slot and returns its index.
    pub fn advance<T: Indexed>(&mut self, registry: &EntityRegistry<T>) -> Option<usize> {
        while self.next_slot < registry.slots.len() {
            let slot = self.next_slot;
            self.next_slot += 1;
            if registry.slots[slot].is_some() {
                self.current = Some(slot + 1);
                return self.current;
            }
        }
        self.current = None;
        None
    }

    /// Removes the most recently yielded occupant.
    pub fn remove_current<T: Indexed>(
        &mut self,
        registry: &mut EntityRegistry<T>,
    ) -> Result<T, IterRemoveError> {
        let index = self.current.take().ok_or(IterRemoveError::NotAdvanced)?;
        Ok(registry.remove(index)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Dummy {
        index: i32,
        tag: u32,
    }

    impl Dummy {
        fn new(tag: u32) -> Self {
            Self {
                index: UNREGISTERED,
                tag,
            }
        }
    }

    impl Indexed for Dummy {
        fn index(&self) -> i32 {
            self.index
        }
        fn set_index(&mut self, index: i32) {
            self.index = index;
        }
    }

    fn assert_consistent(reg: &EntityRegistry<Dummy>) {
        let live: Vec<_> = reg.iter().collect();
        assert_eq!(live.len(), reg.size());
        for (handle, entity) in live {
            assert_eq!(entity.index, handle.index as i32);
        }
    }

    #[test]
    fn add_assigns_first_free_slot() {
        let mut reg = EntityRegistry::new(3);
        let a = reg.add(Dummy::new(1)).unwrap();
        let b = reg.add(Dummy::new(2)).unwrap();
        assert_eq!((a.index, b.index), (1, 2));
        reg.remove(1).unwrap();
        let c = reg.add(Dummy::new(3)).unwrap();
        assert_eq!(c.index, 1);
        assert_eq!(reg.get(1).unwrap().unwrap().tag, 3);
        assert_consistent(&reg);
    }

    #[test]
    fn full_registry_rejects_add() {
        let mut reg = EntityRegistry::new(2);
        reg.add(Dummy::new(1)).unwrap();
        reg.add(Dummy::new(2)).unwrap();
        assert_eq!(
            reg.add(Dummy::new(3)).unwrap_err(),
            RegistryError::Full { capacity: 2 }
        );
        assert_eq!(reg.size(), 2);
    }

    #[test]
    fn get_is_bounds_checked() {
        let reg: EntityRegistry<Dummy> = EntityRegistry::new(4);
        assert!(matches!(reg.get(0), Err(RegistryError::OutOfBounds { .. })));
        assert!(matches!(reg.get(5), Err(RegistryError::OutOfBounds { .. })));
        assert!(reg.get(4).unwrap().is_none());
    }

    #[test]
    fn remove_detects_stale_index() {
        let mut reg = EntityRegistry::new(2);
        reg.add(Dummy::new(1)).unwrap();
        reg.get_mut(1).unwrap().unwrap().index = 2;
        assert!(matches!(
            reg.remove(1),
            Err(RegistryError::IndexMismatch { expected: 1, found: 2, .. })
        ));
        assert!(matches!(reg.remove(2), Err(RegistryError::Vacant { .. })));
    }

    #[test]
    fn removed_entity_is_unregistered() {
        let mut reg = EntityRegistry::new(2);
        reg.add(Dummy::new(1)).unwrap();
        let out = reg.remove(1).unwrap();
        assert_eq!(out.index, UNREGISTERED);
        assert_eq!(reg.size(), 0);
    }

    #[test]
    fn handles_expire_when_slot_is_reused() {
        let mut reg = EntityRegistry::new(1);
        let first = reg.add(Dummy::new(1)).unwrap();
        assert!(reg.is_live(first));
        reg.remove(1).unwrap();
        let second = reg.add(Dummy::new(2)).unwrap();
        assert_eq!(first.index, second.index);
        assert!(!reg.is_live(first));
        assert_eq!(reg.resolve(second).unwrap().tag, 2);
    }

    #[test]
    fn cursor_removes_once_per_advance() {
        let mut reg = EntityRegistry::new(5);
        for tag in 0..4 {
            reg.add(Dummy::new(tag)).unwrap();
        }
        let mut cursor = reg.cursor();
        assert_eq!(
            cursor.remove_current(&mut reg).unwrap_err(),
            IterRemoveError::NotAdvanced
        );

        let mut seen = Vec::new();
        while let Some(index) = cursor.advance(&reg) {
            seen.push(index);
            if index % 2 == 0 {
                cursor.remove_current(&mut reg).unwrap();
                assert_eq!(
                    cursor.remove_current(&mut reg).unwrap_err(),
                    IterRemoveError::NotAdvanced
                );
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(reg.indices(), vec![1, 3]);
        assert_consistent(&reg);
    }

    #[test]
    fn random_add_remove_keeps_invariants() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut reg = EntityRegistry::new(16);
        let mut rng = StdRng::seed_from_u64(0x2545_f491);
        for step in 0..500u32 {
            if rng.gen_bool(1.0 / 3.0) && reg.size() > 0 {
                let live = reg.indices();
                let victim = live[rng.gen_range(0..live.len())];
                reg.remove(victim).unwrap();
            } else {
                let _ = reg.add(Dummy::new(step));
            }
            assert_consistent(&reg);
            assert_eq!(reg.size(), reg.indices().len());
        }
    }
}
