//! Items, their definitions, and the inventory and equipment containers.
//!
//! Containers only move items around; telling the client about it is the
//! owning player's job.

use std::collections::HashMap;

use realm_shared::config::ItemDefinition;

use crate::content;

/// Largest stack the client can display.
pub const MAX_STACK: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub id: u16,
    pub amount: u32,
}

impl Item {
    pub const fn new(id: u16, amount: u32) -> Self {
        Self { id, amount }
    }
}

/// Item definitions by id.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    definitions: HashMap<u16, ItemDefinition>,
}

impl ItemCatalog {
    pub fn new(definitions: impl IntoIterator<Item = ItemDefinition>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|mut def| {
                def.two_handed |= looks_two_handed(&def.name);
                (def.id, def)
            })
            .collect();
        Self { definitions }
    }

    /// The definitions the server ships with.
    pub fn builtin() -> Self {
        Self::new(content::builtin_items())
    }

    pub fn get(&self, id: u16) -> Option<&ItemDefinition> {
        self.definitions.get(&id)
    }

    pub fn is_stackable(&self, id: u16) -> bool {
        self.get(id).is_some_and(|def| def.stackable)
    }

    pub fn is_two_handed(&self, id: u16) -> bool {
        self.get(id).is_some_and(|def| def.two_handed)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn looks_two_handed(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["2h", "bow", "maul"].iter().any(|marker| name.contains(marker))
}

/// Fixed number of item slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemContainer {
    slots: Vec<Option<Item>>,
}

impl ItemContainer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> Option<Item> {
        self.slots.get(slot).copied().flatten()
    }

    /// Puts `item` in `slot`, returning what was there. Out-of-range slots
    /// hold nothing and accept nothing.
    pub fn set(&mut self, slot: usize, item: Option<Item>) -> Option<Item> {
        match self.slots.get_mut(slot) {
            Some(held) => std::mem::replace(held, item),
            None => None,
        }
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    /// First slot holding `id`.
    pub fn find(&self, id: u16) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|item| item.id == id))
    }

    pub fn contains(&self, id: u16) -> bool {
        self.find(id).is_some()
    }

    /// Combined amount of `id` across all slots.
    pub fn total(&self, id: u16) -> u64 {
        self.slots
            .iter()
            .flatten()
            .filter(|item| item.id == id)
            .map(|item| u64::from(item.amount))
            .sum()
    }

    pub fn slots(&self) -> &[Option<Item>] {
        &self.slots
    }
}

/// Why items could not be moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemError {
    /// The slot does not hold the named item.
    NotHeld,
    /// The item has no equipment slot.
    NotWearable,
    /// The inventory has no room for the result.
    NoSpace,
}

/// The 28-slot backpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    items: ItemContainer,
}

impl Inventory {
    pub const CAPACITY: usize = 28;
    pub const INTERFACE: u16 = 3214;

    pub fn items(&self) -> &ItemContainer {
        &self.items
    }

    /// Whether `item` would fit, without changing anything.
    pub fn has_room_for(&self, item: Item, catalog: &ItemCatalog) -> bool {
        self.items.free_slot().is_some()
            || (catalog.is_stackable(item.id) && self.items.contains(item.id))
    }

    /// Adds `item`. Stackable items join an existing stack; others take one
    /// slot per unit, as many as fit. Returns the amount added.
    pub fn add(&mut self, item: Item, catalog: &ItemCatalog) -> Result<u32, ItemError> {
        if item.amount == 0 {
            return Ok(0);
        }
        if !self.has_room_for(item, catalog) {
            return Err(ItemError::NoSpace);
        }

        if catalog.is_stackable(item.id) {
            if let Some(slot) = self.items.find(item.id) {
                let held = self.items.get(slot).map_or(0, |held| held.amount);
                let total = held.saturating_add(item.amount).min(MAX_STACK);
                self.items.set(slot, Some(Item::new(item.id, total)));
                return Ok(total - held);
            }
            let amount = item.amount.min(MAX_STACK);
            if let Some(slot) = self.items.free_slot() {
                self.items.set(slot, Some(Item::new(item.id, amount)));
            }
            return Ok(amount);
        }

        let mut added = 0;
        while added < item.amount {
            let Some(slot) = self.items.free_slot() else {
                break;
            };
            self.items.set(slot, Some(Item::new(item.id, 1)));
            added += 1;
        }
        Ok(added)
    }

    /// Removes up to `amount` of `id`, first slots first. Returns the amount
    /// removed.
    pub fn remove(&mut self, id: u16, amount: u32) -> u32 {
        let mut remaining = amount;
        for slot in 0..self.items.capacity() {
            if remaining == 0 {
                break;
            }
            let Some(held) = self.items.get(slot).filter(|held| held.id == id) else {
                continue;
            };
            let taken = held.amount.min(remaining);
            remaining -= taken;
            let left = (held.amount > taken).then(|| Item::new(id, held.amount - taken));
            self.items.set(slot, left);
        }
        amount - remaining
    }

    pub fn get(&self, slot: usize) -> Option<Item> {
        self.items.get(slot)
    }

    pub fn set(&mut self, slot: usize, item: Option<Item>) -> Option<Item> {
        self.items.set(slot, item)
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            items: ItemContainer::new(Self::CAPACITY),
        }
    }
}

/// Worn items by slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    items: ItemContainer,
}

impl Equipment {
    pub const SLOTS: usize = 14;
    pub const INTERFACE: u16 = 1688;
    pub const HEAD: usize = 0;
    pub const CAPE: usize = 1;
    pub const AMULET: usize = 2;
    pub const WEAPON: usize = 3;
    pub const CHEST: usize = 4;
    pub const SHIELD: usize = 5;
    pub const LEGS: usize = 7;
    pub const HANDS: usize = 9;
    pub const FEET: usize = 10;
    pub const RING: usize = 12;
    pub const ARROWS: usize = 13;

    pub fn items(&self) -> &ItemContainer {
        &self.items
    }

    /// Id of the item worn in `slot`.
    pub fn get(&self, slot: usize) -> Option<u16> {
        self.items.get(slot).map(|item| item.id)
    }

    pub fn item(&self, slot: usize) -> Option<Item> {
        self.items.get(slot)
    }

    /// Puts `item` in `slot`, returning what was there.
    pub fn set(&mut self, slot: usize, item: Option<Item>) -> Option<Item> {
        self.items.set(slot, item)
    }

    pub fn weapon(&self) -> Option<u16> {
        self.get(Self::WEAPON)
    }

    /// Wears the item in inventory slot `inventory_slot`, which must hold
    /// `id`. Whatever was worn goes back to the inventory, along with a
    /// shield displaced by a two-handed weapon or a two-handed weapon
    /// displaced by a shield. Returns the equipment slot used.
    pub fn equip(
        &mut self,
        inventory: &mut Inventory,
        inventory_slot: usize,
        id: u16,
        catalog: &ItemCatalog,
    ) -> Result<usize, ItemError> {
        let held = inventory
            .get(inventory_slot)
            .filter(|held| held.id == id)
            .ok_or(ItemError::NotHeld)?;
        let def = catalog.get(id).ok_or(ItemError::NotWearable)?;
        let slot = def
            .equipment_slot
            .filter(|&slot| slot < Self::SLOTS)
            .ok_or(ItemError::NotWearable)?;
        let stackable = def.stackable;

        // the other half of a two-handed pair that has to come off
        let displaced = if def.two_handed {
            Some(Self::SHIELD)
        } else if slot == Self::SHIELD && self.weapon().is_some_and(|w| catalog.is_two_handed(w)) {
            Some(Self::WEAPON)
        } else {
            None
        };
        if displaced.is_some_and(|other| self.item(other).is_some()) {
            // the emptied inventory slot only stays free when nothing is swapped into it
            let freed = usize::from(self.item(slot).is_none());
            if inventory.items().free_slots() + freed < 1 {
                return Err(ItemError::NoSpace);
            }
        }

        let worn = self.item(slot);
        match worn {
            Some(worn) if stackable && worn.id == id => {
                let total = worn.amount.saturating_add(held.amount).min(MAX_STACK);
                inventory.set(inventory_slot, None);
                self.set(slot, Some(Item::new(id, total)));
            }
            _ => {
                let wearing = if stackable { held } else { Item::new(id, 1) };
                inventory.set(inventory_slot, worn);
                self.set(slot, Some(wearing));
            }
        }

        if let Some(other) = displaced {
            if let Some(removed) = self.set(other, None) {
                inventory.add(removed, catalog)?;
            }
        }
        Ok(slot)
    }

    /// Takes off the item in `slot`, which must be `id`, into the inventory.
    pub fn unequip(
        &mut self,
        inventory: &mut Inventory,
        slot: usize,
        id: u16,
        catalog: &ItemCatalog,
    ) -> Result<Item, ItemError> {
        let worn = self
            .item(slot)
            .filter(|worn| worn.id == id)
            .ok_or(ItemError::NotHeld)?;
        if !inventory.has_room_for(worn, catalog) {
            return Err(ItemError::NoSpace);
        }
        inventory.add(worn, catalog)?;
        self.set(slot, None);
        Ok(worn)
    }
}

impl Default for Equipment {
    fn default() -> Self {
        Self {
            items: ItemContainer::new(Self::SLOTS),
        }
    }
}
