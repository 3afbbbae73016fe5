//! Static game content: lookup tables and fixed constants.

use realm_shared::{config::ItemDefinition, position::Position};

use crate::{
    entity::{Animation, Graphic},
    item::Equipment,
    player::Skills,
};

/// Emote played for an emote-tab button, if `button` is one.
pub fn emote_for_button(button: u16) -> Option<Animation> {
    let id = match button {
        168 => 855,
        169 => 856,
        162 => 857,
        164 => 858,
        165 => 859,
        161 => 860,
        170 => 861,
        171 => 862,
        163 => 863,
        167 => 864,
        172 => 865,
        166 => 866,
        _ => return None,
    };
    Some(Animation::new(id, 0))
}

/// Ticks between melee swings for the given weapon item.
pub fn weapon_speed(weapon: Option<u16>) -> u64 {
    match weapon {
        // scimitars
        Some(1321 | 1323 | 1325 | 1327 | 1329 | 1331 | 1333 | 4587) => 3,
        // battle axes
        Some(1363 | 1365 | 1367 | 1369 | 1371 | 1373 | 1375 | 1377) => 6,
        // two-handed swords
        Some(1307 | 1309 | 1311 | 1313 | 1315 | 1317 | 1319) => 7,
        // daggers
        Some(1203 | 1205 | 1207 | 1209 | 1211 | 1213 | 1215) => 4,
        // maces
        Some(1420 | 1422 | 1424 | 1426 | 1428 | 1430 | 1432 | 1434) => 5,
        // shortbows
        Some(841 | 843 | 849 | 853 | 857 | 861) => 4,
        Some(4151) => 4,
        Some(4153) => 7,
        _ => 3,
    }
}

/// Swing animation for the given weapon item.
pub fn attack_animation(weapon: Option<u16>) -> Animation {
    match weapon {
        None => Animation::new(422, 0),
        Some(4151) => Animation::new(1658, 0),
        Some(4153) => Animation::new(1665, 0),
        Some(_) => PlayerAnimations::STAND,
    }
}

/// Stand, walk and run animations while wielding `weapon`.
pub fn weapon_animations(weapon: Option<u16>) -> PlayerAnimations {
    match weapon {
        Some(4151) => PlayerAnimations {
            stand: Animation::new(1832, 0),
            walk: Animation::new(1660, 0),
            run: Animation::new(1661, 0),
        },
        Some(4153) => PlayerAnimations {
            stand: Animation::new(1662, 0),
            walk: Animation::new(1663, 0),
            run: Animation::new(1664, 0),
        },
        _ => PlayerAnimations::default(),
    }
}

/// Sidebar tab showing the wielded weapon's attack styles.
pub const WEAPON_TAB: u8 = 0;

/// Weapon tab interface when nothing is wielded.
pub const UNARMED_INTERFACE: u16 = 5855;

/// Name fragments and the attack style interface of weapons named with them.
/// Earlier rows win.
const WEAPON_INTERFACES: &[(&[&str], u16)] = &[
    (&["whip"], 12290),
    (&["bow"], 1764),
    (&["staff", "wand"], 328),
    (&["dart", "knife", "javelin"], 4446),
    (&["dagger", "sword", "scimitar"], 2276),
    (&["pickaxe"], 5570),
    (&["axe", "battleaxe"], 1698),
    (&["halberd"], 8460),
    (&["spear"], 4679),
    (&["mace"], 3796),
    (&["warhammer", "maul"], 425),
];

/// Attack style interface for a weapon called `name`.
pub fn weapon_interface(name: &str) -> u16 {
    let name = name.to_ascii_lowercase();
    WEAPON_INTERFACES
        .iter()
        .find(|(fragments, _)| fragments.iter().any(|f| name.contains(f)))
        .map_or(UNARMED_INTERFACE, |&(_, interface)| interface)
}

/// Skill levels, as `(skill, level)`, needed to wear `item`.
pub fn equip_requirements(item: u16) -> &'static [(usize, u8)] {
    match item {
        1333 => &[(Skills::ATTACK, 40)],
        1079 | 1093 | 1113 | 1127 | 1147 | 1163 | 1185 | 1201 => &[(Skills::DEFENCE, 40)],
        4587 => &[(Skills::ATTACK, 60)],
        4151 => &[(Skills::ATTACK, 70)],
        4153 => &[(Skills::ATTACK, 50), (Skills::STRENGTH, 50)],
        _ => &[],
    }
}

/// Items known without a definitions file, as
/// `(id, name, equipment slot, stackable)`.
const BUILTIN_ITEMS: &[(u16, &str, Option<usize>, bool)] = &[
    (315, "Shrimps", None, false),
    (841, "Shortbow", Some(Equipment::WEAPON), false),
    (882, "Bronze arrow", Some(Equipment::ARROWS), true),
    (995, "Coins", None, true),
    (1052, "Cape of legends", Some(Equipment::CAPE), false),
    (1059, "Leather gloves", Some(Equipment::HANDS), false),
    (1061, "Leather boots", Some(Equipment::FEET), false),
    (1079, "Rune platelegs", Some(Equipment::LEGS), false),
    (1127, "Rune platebody", Some(Equipment::CHEST), false),
    (1163, "Rune full helm", Some(Equipment::HEAD), false),
    (1201, "Rune kiteshield", Some(Equipment::SHIELD), false),
    (1307, "Bronze 2h sword", Some(Equipment::WEAPON), false),
    (1321, "Bronze scimitar", Some(Equipment::WEAPON), false),
    (1333, "Rune scimitar", Some(Equipment::WEAPON), false),
    (1511, "Logs", None, false),
    (1635, "Gold ring", Some(Equipment::RING), false),
    (1725, "Amulet of strength", Some(Equipment::AMULET), false),
    (4151, "Abyssal whip", Some(Equipment::WEAPON), false),
    (4153, "Granite maul", Some(Equipment::WEAPON), false),
    (4587, "Dragon scimitar", Some(Equipment::WEAPON), false),
];

pub fn builtin_items() -> Vec<ItemDefinition> {
    BUILTIN_ITEMS
        .iter()
        .map(|&(id, name, equipment_slot, stackable)| ItemDefinition {
            id,
            name: name.to_string(),
            stackable,
            equipment_slot,
            two_handed: false,
        })
        .collect()
}

/// Movement animation set a player renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerAnimations {
    pub stand: Animation,
    pub walk: Animation,
    pub run: Animation,
}

impl PlayerAnimations {
    pub const STAND: Animation = Animation::new(808, 0);
    pub const WALK: Animation = Animation::new(819, 0);
    pub const RUN: Animation = Animation::new(824, 0);
    pub const TURN: Animation = Animation::new(823, 0);
    pub const BACKWARD: Animation = Animation::new(820, 0);
    pub const TURN_RIGHT: Animation = Animation::new(821, 0);
    pub const TURN_LEFT: Animation = Animation::new(822, 0);
}

impl Default for PlayerAnimations {
    fn default() -> Self {
        Self {
            stand: Self::STAND,
            walk: Self::WALK,
            run: Self::RUN,
        }
    }
}

/// Helmets that hide the hair and beard.
pub const FULL_HEAD_ITEMS: &[u16] = &[
    6109, 1153, 1155, 1157, 1159, 1161, 1163, 1165, 2587, 2595, 2605, 2613, 2619, 2627, 2657,
    2673, 3486, 4745, 1053, 1055, 1057,
];

/// Body armour that hides the arms.
pub const FULL_BODY_ITEMS: &[u16] = &[
    6107, 3140, 1115, 1117, 1119, 1121, 1123, 1125, 1127, 1035, 2583, 2591, 2599, 2607, 2615,
    2623, 2653, 2669, 2661, 3481, 4720, 4728, 4749, 4712,
];

/// Interfaces placed in the side tabs at login, as `(tab, interface)`.
pub const SIDEBAR_INTERFACES: &[(u8, u16)] = &[
    (1, 3917),
    (2, 638),
    (3, 3213),
    (4, 1644),
    (5, 5608),
    (6, 1151),
    (8, 5065),
    (9, 5715),
    (10, 2449),
    (11, 4445),
    (12, 147),
    (13, 962),
];

/// Client config slot holding the run toggle.
pub const RUN_CONFIG: u16 = 173;

/// Tick cooldown between teleport button presses.
pub const TELEPORT_COOLDOWN_TICKS: u64 = 7;

/// Longest yell that is broadcast.
pub const MAX_YELL_LENGTH: usize = 50;

/// Chat-box markers a yell may not contain.
pub const YELL_FORBIDDEN: &[&str] = &[":tradereq:", ":duelreq:"];

/// Mob identities that decline to talk on first click.
pub const UNINTERESTED_MOBS: &[u16] = &[1, 2];

/// A teleport spell book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellBook {
    Standard,
    Ancient,
}

impl SpellBook {
    pub fn cast_animation(self) -> Animation {
        match self {
            SpellBook::Standard => Animation::new(714, 0),
            SpellBook::Ancient => Animation::new(1979, 0),
        }
    }

    pub fn graphic(self) -> Graphic {
        match self {
            SpellBook::Standard => Graphic::new(308, 6_553_600),
            SpellBook::Ancient => Graphic::new(392, 0),
        }
    }

    pub fn end_animation(self) -> Animation {
        match self {
            SpellBook::Standard => Animation::new(715, 0),
            SpellBook::Ancient => Animation::RESET,
        }
    }

    /// Execution on which the caster lands.
    pub fn arrival_tick(self) -> u64 {
        match self {
            SpellBook::Standard => 3,
            SpellBook::Ancient => 5,
        }
    }

    /// Execution on which the graphic appears.
    pub fn graphic_tick(self) -> u64 {
        2
    }

    /// Where the spell-book home teleport button sends the caster.
    pub fn home(self) -> Position {
        match self {
            SpellBook::Standard => Position::new(3240, 3420, 0),
            SpellBook::Ancient => Position::new(3200, 3200, 0),
        }
    }
}
