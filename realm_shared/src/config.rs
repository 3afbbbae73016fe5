//! Configuration system.
//!
//! Loads server configuration, static spawn tables and item definitions
//! from JSON strings;
//! reading the files is left to the binary.

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Root server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:43594`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Milliseconds between world ticks.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default = "default_max_mobs")]
    pub max_mobs: usize,
    /// Where new players appear.
    #[serde(default = "default_spawn")]
    pub spawn: Position,
    /// Optional JSON file with static mob spawns.
    #[serde(default)]
    pub mob_spawns_path: Option<String>,
    /// Optional JSON file with item definitions, replacing the built-in set.
    #[serde(default)]
    pub item_definitions_path: Option<String>,
    /// First chatbox line a player sees.
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:43594".to_string()
}

fn default_tick_ms() -> u64 {
    600
}

fn default_max_players() -> usize {
    2000
}

fn default_max_mobs() -> usize {
    8192
}

fn default_spawn() -> Position {
    Position::new(3200, 3200, 0)
}

fn default_welcome_message() -> String {
    "Welcome to the realm.".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tick_ms: default_tick_ms(),
            max_players: default_max_players(),
            max_mobs: default_max_mobs(),
            spawn: default_spawn(),
            mob_spawns_path: None,
            item_definitions_path: None,
            welcome_message: default_welcome_message(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// One statically placed mob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobSpawn {
    pub id: u16,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: u8,
    #[serde(default = "default_mob_hitpoints")]
    pub hitpoints: u16,
    #[serde(default = "default_mob_size")]
    pub size: u8,
}

fn default_mob_hitpoints() -> u16 {
    10
}

fn default_mob_size() -> u8 {
    1
}

impl MobSpawn {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }

    /// Parses a JSON array of spawns.
    pub fn list_from_json_str(s: &str) -> serde_json::Result<Vec<MobSpawn>> {
        serde_json::from_str(s)
    }
}

/// Static properties of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub stackable: bool,
    /// Equipment slot the item is worn in; `None` for items that can't be worn.
    #[serde(default)]
    pub equipment_slot: Option<usize>,
    /// Set for weapons that occupy the shield slot as well. Names containing
    /// "2h", "bow" or "maul" are treated as two-handed regardless.
    #[serde(default)]
    pub two_handed: bool,
}

impl ItemDefinition {
    /// Parses a JSON array of definitions.
    pub fn list_from_json_str(s: &str) -> serde_json::Result<Vec<ItemDefinition>> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = ServerConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert_eq!(cfg.tick_ms, 600);
        assert_eq!(cfg.spawn, Position::new(3200, 3200, 0));
    }

    #[test]
    fn partial_override() {
        let cfg = ServerConfig::from_json_str(
            r#"{ "listen_addr": "127.0.0.1:0", "max_players": 4, "spawn": { "x": 1, "y": 2, "plane": 1 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:0");
        assert_eq!(cfg.max_players, 4);
        assert_eq!(cfg.spawn, Position::new(1, 2, 1));
        assert_eq!(cfg.max_mobs, 8192);
    }

    #[test]
    fn mob_spawn_list() {
        let spawns = MobSpawn::list_from_json_str(
            r#"[ { "id": 1, "x": 3205, "y": 3205 }, { "id": 2, "x": 3210, "y": 3201, "z": 0, "hitpoints": 7, "size": 2 } ]"#,
        )
        .unwrap();
        assert_eq!(spawns.len(), 2);
        assert_eq!(spawns[0].hitpoints, 10);
        assert_eq!(spawns[1].position(), Position::new(3210, 3201, 0));
        assert_eq!(spawns[1].size, 2);
    }

    #[test]
    fn item_definition_list() {
        let items = ItemDefinition::list_from_json_str(
            r#"[ { "id": 995, "name": "Coins", "stackable": true }, { "id": 4151, "name": "Abyssal whip", "equipment_slot": 3 } ]"#,
        )
        .unwrap();
        assert!(items[0].stackable);
        assert_eq!(items[0].equipment_slot, None);
        assert_eq!(items[1].equipment_slot, Some(3));
        assert!(!items[1].two_handed);
    }
}
