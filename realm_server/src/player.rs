//! Connected players.

use bytes::{Bytes, BytesMut};
use realm_shared::{
    flags::UpdateFlags,
    net::{InboundMessage, Keystream, Packet, SessionId},
    position::Position,
    registry::{Handle, Indexed},
    text::format_name,
    walking::{WalkingQueue, MAX_RUN_ENERGY},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    content::{
        equip_requirements, weapon_animations, weapon_interface, PlayerAnimations, RUN_CONFIG,
        SIDEBAR_INTERFACES, UNARMED_INTERFACE, WEAPON_TAB,
    },
    entity::{Entity, Mobile},
    item::{Equipment, Inventory, Item, ItemCatalog, ItemError},
    packets,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Gender {
    #[default]
    Male = 0,
    Female = 1,
}

impl Gender {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Body models and colours picked at character design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    pub gender: Gender,
    /// Torso, arms, legs, head, hands, feet, beard.
    pub body: [u16; 7],
    /// Hair, torso, legs, feet, skin.
    pub colours: [u8; 5],
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            gender: Gender::Male,
            body: [18, 26, 36, 0, 33, 42, 10],
            colours: [7, 8, 9, 5, 0],
        }
    }
}

/// Skill levels and experience.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skills {
    levels: [u8; Skills::COUNT],
    experience: [u32; Skills::COUNT],
}

impl Skills {
    pub const COUNT: usize = 21;
    pub const ATTACK: usize = 0;
    pub const DEFENCE: usize = 1;
    pub const STRENGTH: usize = 2;
    pub const HITPOINTS: usize = 3;
    pub const RANGE: usize = 4;
    pub const PRAYER: usize = 5;
    pub const MAGIC: usize = 6;
    pub const COOKING: usize = 7;
    pub const AGILITY: usize = 16;

    /// Experience never grows past this.
    pub const MAX_EXPERIENCE: u32 = 200_000_000;

    pub const NAMES: [&'static str; Skills::COUNT] = [
        "Attack",
        "Defence",
        "Strength",
        "Hitpoints",
        "Range",
        "Prayer",
        "Magic",
        "Cooking",
        "Woodcutting",
        "Fletching",
        "Fishing",
        "Firemaking",
        "Crafting",
        "Smithing",
        "Mining",
        "Herblore",
        "Agility",
        "Thieving",
        "Slayer",
        "Farming",
        "Runecrafting",
    ];

    pub fn level(&self, skill: usize) -> u8 {
        self.levels.get(skill).copied().unwrap_or(1)
    }

    pub fn experience(&self, skill: usize) -> u32 {
        self.experience.get(skill).copied().unwrap_or(0)
    }

    pub fn set(&mut self, skill: usize, level: u8, experience: u32) {
        if skill < Self::COUNT {
            self.levels[skill] = level;
            self.experience[skill] = experience;
        }
    }

    /// Adds experience to `skill` and recomputes its level, which never
    /// drops. Returns the levels before and after, or `None` for an unknown
    /// skill.
    pub fn add_experience(&mut self, skill: usize, amount: u32) -> Option<(u8, u8)> {
        let experience = self.experience.get_mut(skill)?;
        *experience = experience.saturating_add(amount).min(Self::MAX_EXPERIENCE);
        let gained = level_for_experience(*experience);
        let level = self.levels.get_mut(skill)?;
        let before = *level;
        *level = before.max(gained);
        Some((before, *level))
    }

    pub fn combat_level(&self) -> u8 {
        let level = |skill| f64::from(self.level(skill));
        let base = 0.25
            * (level(Self::DEFENCE)
                + level(Self::HITPOINTS)
                + (level(Self::PRAYER) / 2.0).floor());
        let melee = 0.325 * (level(Self::ATTACK) + level(Self::STRENGTH));
        let range = 0.325 * ((level(Self::RANGE) / 2.0).floor() + level(Self::RANGE));
        let magic = 0.325 * ((level(Self::MAGIC) / 2.0).floor() + level(Self::MAGIC));
        (base + melee.max(range).max(magic)).floor() as u8
    }
}

/// Highest level `experience` reaches, 1 to 99.
pub fn level_for_experience(experience: u32) -> u8 {
    let mut points = 0u64;
    for level in 1..99u8 {
        let level_f = f64::from(level);
        points += (level_f + 300.0 * 2f64.powf(level_f / 7.0)).floor() as u64;
        if points / 4 > u64::from(experience) {
            return level;
        }
    }
    99
}

impl Default for Skills {
    fn default() -> Self {
        let mut skills = Self {
            levels: [1; Self::COUNT],
            experience: [0; Self::COUNT],
        };
        skills.set(Self::HITPOINTS, 10, 1184);
        skills
    }
}

/// Last public chat line, kept until the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub effects: u8,
    pub colour: u8,
    pub text: Vec<u8>,
}

/// Whether the client's map must be rebuilt before the next update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Rebuilding,
    Traversing,
}

/// Server end of a player's connection: frames packets with the
/// server-to-client keystream and queues the bytes for the writer task.
pub struct Outbox {
    tx: mpsc::UnboundedSender<Bytes>,
    keystream: Box<dyn Keystream>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Bytes>, keystream: Box<dyn Keystream>) -> Self {
        Self { tx, keystream }
    }

    /// Frames and queues one packet. A closed connection is not an error
    /// here; the session reports the leave on its own.
    pub fn send(&mut self, packet: Packet) {
        let mut out = BytesMut::with_capacity(packet.payload.len() + 3);
        if let Err(e) = packet.encode(self.keystream.as_mut(), &mut out) {
            warn!(opcode = packet.opcode, error = %e, "Dropping outbound packet");
            return;
        }
        let _ = self.tx.send(out.freeze());
    }
}

pub struct Player {
    pub entity: Entity,
    pub session: SessionId,
    pub username: String,
    pub rights: u8,
    pub member: bool,
    pub appearance: Appearance,
    pub inventory: Inventory,
    pub equipment: Equipment,
    pub skills: Skills,
    pub animations: PlayerAnimations,
    pub chat: Option<ChatMessage>,
    pub region_state: RegionState,
    pub local_players: Vec<Handle>,
    pub local_mobs: Vec<Handle>,
    /// Tick of the last teleport button press.
    pub last_teleport: Option<u64>,
    /// Last run energy value shown to the client.
    shown_energy: Option<u8>,
    outbox: Outbox,
    inbox: mpsc::UnboundedReceiver<InboundMessage>,
}

impl Player {
    pub fn new(
        username: String,
        session: SessionId,
        position: Position,
        outbox: Outbox,
        inbox: mpsc::UnboundedReceiver<InboundMessage>,
    ) -> Self {
        let skills = Skills::default();
        let hitpoints = u16::from(skills.level(Skills::HITPOINTS));
        Self {
            entity: Entity::new(position, WalkingQueue::with_energy(MAX_RUN_ENERGY), hitpoints),
            session,
            username,
            rights: 0,
            member: true,
            appearance: Appearance::default(),
            inventory: Inventory::default(),
            equipment: Equipment::default(),
            skills,
            animations: PlayerAnimations::default(),
            chat: None,
            region_state: RegionState::Rebuilding,
            local_players: Vec::new(),
            local_mobs: Vec::new(),
            last_teleport: None,
            shown_energy: None,
            outbox,
            inbox,
        }
    }

    pub fn display_name(&self) -> String {
        format_name(&self.username)
    }

    pub fn send(&mut self, packet: Packet) {
        self.outbox.send(packet);
    }

    pub fn send_message(&mut self, text: &str) {
        self.send(packets::chatbox_message(text));
    }

    /// Next queued inbound message, if any arrived since the last drain.
    pub fn poll_inbound(&mut self) -> Option<InboundMessage> {
        self.inbox.try_recv().ok()
    }

    /// Spawn setup: initial interface state and the first appearance block.
    pub fn on_login(&mut self, welcome: &str, catalog: &ItemCatalog) {
        self.region_state = RegionState::Rebuilding;
        self.entity.flags.flag(UpdateFlags::APPEARANCE);

        self.send_message(welcome);
        self.send(packets::client_config(RUN_CONFIG, 0));
        for &(tab, interface) in SIDEBAR_INTERFACES {
            self.send(packets::sidebar_widget(tab, interface));
        }
        let index = self.entity.index.max(0) as u16;
        self.send(packets::login_details(self.member, index));
        for skill in 0..Skills::COUNT {
            self.refresh_skill(skill);
        }
        self.refresh_inventory();
        self.refresh_equipment(catalog);
    }

    pub fn refresh_skill(&mut self, skill: usize) {
        self.send(packets::skill(
            skill as u8,
            self.skills.experience(skill),
            self.skills.level(skill),
        ));
    }

    pub fn refresh_inventory(&mut self) {
        self.send(packets::item_interface(
            Inventory::INTERFACE,
            self.inventory.items().slots(),
        ));
    }

    /// Sends the worn items and the weapon tab, and picks the movement
    /// animations for the wielded weapon.
    pub fn refresh_equipment(&mut self, catalog: &ItemCatalog) {
        self.send(packets::item_interface(
            Equipment::INTERFACE,
            self.equipment.items().slots(),
        ));
        let weapon = self.equipment.weapon();
        self.animations = weapon_animations(weapon);
        match weapon {
            None => {
                self.send(packets::sidebar_widget(WEAPON_TAB, UNARMED_INTERFACE));
                self.send(packets::interface_text("Unarmed", UNARMED_INTERFACE + 2));
            }
            Some(id) => {
                let name = catalog.get(id).map_or("", |def| def.name.as_str());
                let interface = weapon_interface(name);
                self.send(packets::sidebar_widget(WEAPON_TAB, interface));
                self.send(packets::interface_text(name, interface + 3));
                self.send(packets::item_on_interface(interface + 1, 200, id));
            }
        }
    }

    /// Grants experience, announcing any level gained.
    pub fn add_experience(&mut self, skill: usize, amount: u32) {
        let Some((before, after)) = self.skills.add_experience(skill, amount) else {
            return;
        };
        if after > before {
            let name = Skills::NAMES[skill];
            self.send_message(&format!(
                "Congratulations! You have advanced a {name} level. Your level is now {after}."
            ));
            if skill == Skills::HITPOINTS {
                let gained = u16::from(after - before);
                self.entity.max_hitpoints = u16::from(after);
                self.entity.hitpoints = (self.entity.hitpoints + gained).min(u16::from(after));
            }
            if skill <= Skills::MAGIC {
                self.entity.flags.flag(UpdateFlags::APPEARANCE);
            }
        }
        self.refresh_skill(skill);
    }

    /// The first skill requirement of `item` this player falls short of.
    fn unmet_requirement(&self, item: u16) -> Option<(usize, u8)> {
        equip_requirements(item)
            .iter()
            .copied()
            .find(|&(skill, level)| self.skills.level(skill) < level)
    }

    /// Wears the item in inventory slot `slot`, which must be `id`.
    pub fn equip(&mut self, slot: usize, id: u16, catalog: &ItemCatalog) {
        if let Some((skill, level)) = self.unmet_requirement(id) {
            let article = if matches!(skill, Skills::ATTACK | Skills::AGILITY) { "an" } else { "a" };
            let name = Skills::NAMES[skill].to_ascii_lowercase();
            self.send_message(&format!(
                "You need {article} {name} level of {level} to equip this item."
            ));
            return;
        }
        match self.equipment.equip(&mut self.inventory, slot, id, catalog) {
            Ok(_) => {
                self.refresh_inventory();
                self.refresh_equipment(catalog);
                self.entity.flags.flag(UpdateFlags::APPEARANCE);
            }
            Err(ItemError::NoSpace) => {
                self.send_message("You don't have the required inventory space to equip this item.");
            }
            Err(e) => debug!(player = %self.username, item = id, slot, error = ?e, "Equip refused"),
        }
    }

    /// Takes off the item in equipment slot `slot`, which must be `id`.
    pub fn unequip(&mut self, slot: usize, id: u16, catalog: &ItemCatalog) {
        match self.equipment.unequip(&mut self.inventory, slot, id, catalog) {
            Ok(_) => {
                self.refresh_inventory();
                self.refresh_equipment(catalog);
                if slot != Equipment::ARROWS && slot != Equipment::RING {
                    self.entity.flags.flag(UpdateFlags::APPEARANCE);
                }
            }
            Err(ItemError::NoSpace) => {
                self.send_message("You don't have the required inventory space to remove this item.");
            }
            Err(e) => debug!(player = %self.username, item = id, slot, error = ?e, "Unequip refused"),
        }
    }

    /// Puts `item` in the inventory. Returns the amount that fit.
    pub fn give(&mut self, item: Item, catalog: &ItemCatalog) -> u32 {
        match self.inventory.add(item, catalog) {
            Ok(added) => {
                self.refresh_inventory();
                added
            }
            Err(_) => {
                self.send_message("You don't have the required inventory space to hold this item.");
                0
            }
        }
    }

    /// Shows the current run energy if it changed since last shown.
    pub fn refresh_energy(&mut self) {
        let energy = self.entity.walking.energy();
        if energy != self.shown_energy {
            self.shown_energy = energy;
            if let Some(energy) = energy {
                self.send(packets::run_energy(energy));
            }
        }
    }

    /// Flips the run toggle on the client and in the walking queue.
    pub fn set_running(&mut self, running: bool) {
        self.entity.walking.set_running(running);
        self.send(packets::client_config(RUN_CONFIG, u8::from(running)));
    }
}

impl Mobile for Player {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl Indexed for Player {
    fn index(&self) -> i32 {
        self.entity.index
    }

    fn set_index(&mut self, index: i32) {
        self.entity.index = index;
    }
}
