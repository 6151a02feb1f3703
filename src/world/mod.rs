//! Immutable world data.
//!
//! Rooms, exits, features, mob and item templates, shops, and spawn rules
//! are loaded once at boot and never mutated; all mutable overlays (door
//! states, live mobs, item instances) live in the registries. World files
//! are TOML, the same format as the rest of the server configuration.

mod demo;

pub use demo::demo_world;

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{Direction, ItemSlot, RoomId, RoomIdError};

#[derive(Error, Debug)]
pub enum WorldError {
    #[error("failed to read world file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse world file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    RoomId(#[from] RoomIdError),

    #[error("world has no room {0}")]
    UnknownRoom(RoomId),

    #[error("exit {from} -> {dir} targets unknown room {to}")]
    DanglingExit {
        from: RoomId,
        dir: Direction,
        to: RoomId,
    },

    #[error("unknown item template {0:?}")]
    UnknownItemTemplate(String),

    #[error("unknown mob template {0:?}")]
    UnknownMobTemplate(String),
}

/// An exit from one room toward another. `door` names a door feature in the
/// source room that gates passage.
#[derive(Debug, Clone, Deserialize)]
pub struct Exit {
    pub to: RoomId,
    #[serde(default)]
    pub door: Option<String>,
}

/// Static definition of a room feature. Mutable state (open/locked, lever
/// position, container contents) lives in the WorldStateRegistry.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeatureDef {
    Door {
        id: String,
        keyword: String,
        #[serde(default)]
        key_item: Option<String>,
        #[serde(default)]
        starts_locked: bool,
    },
    Container {
        id: String,
        keyword: String,
        #[serde(default)]
        starts_open: bool,
        #[serde(default)]
        contents: Vec<String>,
    },
    Lever {
        id: String,
        keyword: String,
        /// Full feature id (`zone:room/feature`) of a door this lever
        /// unlocks and opens when pulled down.
        #[serde(default)]
        opens_door: Option<String>,
    },
    Sign {
        id: String,
        keyword: String,
        text: String,
    },
}

impl FeatureDef {
    pub fn local_id(&self) -> &str {
        match self {
            FeatureDef::Door { id, .. }
            | FeatureDef::Container { id, .. }
            | FeatureDef::Lever { id, .. }
            | FeatureDef::Sign { id, .. } => id,
        }
    }

    pub fn keyword(&self) -> &str {
        match self {
            FeatureDef::Door { keyword, .. }
            | FeatureDef::Container { keyword, .. }
            | FeatureDef::Lever { keyword, .. }
            | FeatureDef::Sign { keyword, .. } => keyword,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub exits: HashMap<Direction, Exit>,
    #[serde(default)]
    pub features: Vec<FeatureDef>,
}

impl Room {
    pub fn exit(&self, dir: Direction) -> Option<&Exit> {
        self.exits.get(&dir)
    }

    pub fn feature_by_keyword(&self, keyword: &str) -> Option<&FeatureDef> {
        self.features
            .iter()
            .find(|f| f.keyword().eq_ignore_ascii_case(keyword))
    }

    pub fn feature_by_id(&self, local_id: &str) -> Option<&FeatureDef> {
        self.features.iter().find(|f| f.local_id() == local_id)
    }
}

/// What happens when an item is `use`d.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum OnUse {
    HealHp { amount: i32 },
}

/// An item template. Instances embed a copy; only `charges` ever changes on
/// an instance.
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub keyword: String,
    pub display_name: String,
    #[serde(default)]
    pub slot: Option<ItemSlot>,
    #[serde(default)]
    pub armor: i32,
    #[serde(default)]
    pub damage: i32,
    #[serde(default)]
    pub consumable: bool,
    #[serde(default)]
    pub charges: u32,
    #[serde(default)]
    pub base_price: u64,
    #[serde(default)]
    pub on_use: Vec<OnUse>,
}

/// One line of an NPC dialogue menu.
#[derive(Debug, Clone, Deserialize)]
pub struct DialogueChoice {
    pub label: String,
    #[serde(default)]
    pub actions: Vec<DialogueAction>,
    /// Node to continue at; `None` ends the dialogue.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DialogueAction {
    GiveItem { template: String },
    GrantXp { amount: u64 },
    SetRecall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialogueNode {
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<DialogueChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialogueTree {
    pub start: String,
    pub nodes: HashMap<String, DialogueNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MobTemplate {
    pub id: String,
    pub name: String,
    pub keyword: String,
    pub max_hp: i32,
    #[serde(default)]
    pub damage: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub threat: i32,
    #[serde(default)]
    pub xp_reward: u64,
    #[serde(default)]
    pub loot: Vec<String>,
    #[serde(default)]
    pub dialogue: Option<DialogueTree>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MobSpawn {
    pub template: String,
    pub room: RoomId,
    #[serde(default)]
    pub respawn_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSpawn {
    pub template: String,
    pub room: RoomId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopDef {
    pub name: String,
    pub room: RoomId,
    pub stock: Vec<String>,
}

/// The loaded, validated, immutable world.
#[derive(Debug)]
pub struct World {
    pub rooms: HashMap<RoomId, Room>,
    pub item_templates: HashMap<String, Item>,
    pub mob_templates: HashMap<String, MobTemplate>,
    pub shops: HashMap<RoomId, ShopDef>,
    pub mob_spawns: Vec<MobSpawn>,
    pub item_spawns: Vec<ItemSpawn>,
    pub start_room: RoomId,
}

/// On-disk shape of a world file.
#[derive(Debug, Deserialize)]
struct WorldFile {
    start_room: RoomId,
    #[serde(default)]
    rooms: Vec<Room>,
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    mobs: Vec<MobTemplate>,
    #[serde(default)]
    shops: Vec<ShopDef>,
    #[serde(default)]
    mob_spawns: Vec<MobSpawn>,
    #[serde(default)]
    item_spawns: Vec<ItemSpawn>,
}

impl World {
    /// Load and validate a world from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<World, WorldError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorldError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: WorldFile = toml::from_str(&text).map_err(|source| WorldError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_parts(file)
    }

    fn from_parts(file: WorldFile) -> Result<World, WorldError> {
        let rooms: HashMap<RoomId, Room> = file
            .rooms
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        let item_templates: HashMap<String, Item> = file
            .items
            .into_iter()
            .map(|i| (i.keyword.clone(), i))
            .collect();
        let mob_templates: HashMap<String, MobTemplate> = file
            .mobs
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        let shops: HashMap<RoomId, ShopDef> = file
            .shops
            .into_iter()
            .map(|s| (s.room.clone(), s))
            .collect();

        let world = World {
            rooms,
            item_templates,
            mob_templates,
            shops,
            mob_spawns: file.mob_spawns,
            item_spawns: file.item_spawns,
            start_room: file.start_room,
        };
        world.validate()?;
        Ok(world)
    }

    fn validate(&self) -> Result<(), WorldError> {
        if !self.rooms.contains_key(&self.start_room) {
            return Err(WorldError::UnknownRoom(self.start_room.clone()));
        }
        for room in self.rooms.values() {
            for (dir, exit) in &room.exits {
                if !self.rooms.contains_key(&exit.to) {
                    return Err(WorldError::DanglingExit {
                        from: room.id.clone(),
                        dir: *dir,
                        to: exit.to.clone(),
                    });
                }
            }
            for feature in &room.features {
                if let FeatureDef::Container { contents, .. } = feature {
                    for template in contents {
                        if !self.item_templates.contains_key(template) {
                            return Err(WorldError::UnknownItemTemplate(template.clone()));
                        }
                    }
                }
            }
        }
        for spawn in &self.item_spawns {
            if !self.item_templates.contains_key(&spawn.template) {
                return Err(WorldError::UnknownItemTemplate(spawn.template.clone()));
            }
            if !self.rooms.contains_key(&spawn.room) {
                return Err(WorldError::UnknownRoom(spawn.room.clone()));
            }
        }
        for spawn in &self.mob_spawns {
            if !self.mob_templates.contains_key(&spawn.template) {
                return Err(WorldError::UnknownMobTemplate(spawn.template.clone()));
            }
            if !self.rooms.contains_key(&spawn.room) {
                return Err(WorldError::UnknownRoom(spawn.room.clone()));
            }
        }
        for shop in self.shops.values() {
            for template in &shop.stock {
                if !self.item_templates.contains_key(template) {
                    return Err(WorldError::UnknownItemTemplate(template.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn item_template(&self, keyword: &str) -> Option<&Item> {
        self.item_templates.get(keyword)
    }

    pub fn mob_template(&self, id: &str) -> Option<&MobTemplate> {
        self.mob_templates.get(id)
    }

    pub fn shop_in(&self, room: &RoomId) -> Option<&ShopDef> {
        self.shops.get(room)
    }

    /// All rooms whose zone half matches, in stable (sorted) order.
    pub fn rooms_in_zone<'a>(&'a self, zone: &'a str) -> Vec<&'a Room> {
        let mut rooms: Vec<&Room> = self
            .rooms
            .values()
            .filter(|r| r.id.zone() == zone)
            .collect();
        rooms.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        rooms
    }
}

/// Incremental world construction, used by tests and the demo world.
pub struct WorldBuilder {
    file: WorldFile,
}

impl WorldBuilder {
    pub fn new(start_room: RoomId) -> Self {
        Self {
            file: WorldFile {
                start_room,
                rooms: Vec::new(),
                items: Vec::new(),
                mobs: Vec::new(),
                shops: Vec::new(),
                mob_spawns: Vec::new(),
                item_spawns: Vec::new(),
            },
        }
    }

    pub fn room(mut self, room: Room) -> Self {
        self.file.rooms.push(room);
        self
    }

    pub fn item(mut self, item: Item) -> Self {
        self.file.items.push(item);
        self
    }

    pub fn mob(mut self, mob: MobTemplate) -> Self {
        self.file.mobs.push(mob);
        self
    }

    pub fn shop(mut self, shop: ShopDef) -> Self {
        self.file.shops.push(shop);
        self
    }

    pub fn mob_spawn(mut self, spawn: MobSpawn) -> Self {
        self.file.mob_spawns.push(spawn);
        self
    }

    pub fn item_spawn(mut self, spawn: ItemSpawn) -> Self {
        self.file.item_spawns.push(spawn);
        self
    }

    pub fn build(self) -> Result<World, WorldError> {
        World::from_parts(self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(s: &str) -> RoomId {
        s.parse().unwrap()
    }

    fn bare_room(id: &str, title: &str) -> Room {
        Room {
            id: rid(id),
            title: title.into(),
            description: String::new(),
            exits: HashMap::new(),
            features: Vec::new(),
        }
    }

    #[test]
    fn builder_validates_start_room() {
        let err = WorldBuilder::new(rid("town:square")).build();
        assert!(matches!(err, Err(WorldError::UnknownRoom(_))));
    }

    #[test]
    fn builder_rejects_dangling_exits() {
        let mut room = bare_room("town:square", "The Square");
        room.exits.insert(
            Direction::North,
            Exit {
                to: rid("town:nowhere"),
                door: None,
            },
        );
        let err = WorldBuilder::new(rid("town:square")).room(room).build();
        assert!(matches!(err, Err(WorldError::DanglingExit { .. })));
    }

    #[test]
    fn parses_a_world_file() {
        let text = r#"
start_room = "town:square"

[[rooms]]
id = "town:square"
title = "The Square"
description = "Cobblestones stretch in every direction."

[rooms.exits.north]
to = "town:gate"

[[rooms]]
id = "town:gate"
title = "The North Gate"
description = "A heavy portcullis."

[[rooms.features]]
kind = "sign"
id = "notice"
keyword = "sign"
text = "No mules beyond this point."

[[items]]
keyword = "cap"
display_name = "a leather cap"
slot = "head"
armor = 1
base_price = 10
"#;
        let file: WorldFile = toml::from_str(text).unwrap();
        let world = World::from_parts(file).unwrap();
        assert_eq!(world.rooms.len(), 2);
        let square = world.room(&rid("town:square")).unwrap();
        assert_eq!(square.exit(Direction::North).unwrap().to, rid("town:gate"));
        let gate = world.room(&rid("town:gate")).unwrap();
        assert!(gate.feature_by_keyword("SIGN").is_some());
        assert_eq!(world.item_template("cap").unwrap().armor, 1);
    }

    #[test]
    fn demo_world_is_valid() {
        let world = demo_world().expect("demo world must validate");
        assert!(world.rooms.len() >= 4);
        assert!(world.shop_in(&world.start_room.clone()).is_none());
    }

    #[test]
    fn rooms_in_zone_is_sorted() {
        let world = demo_world().unwrap();
        let rooms = world.rooms_in_zone("town");
        assert!(!rooms.is_empty());
        for pair in rooms.windows(2) {
            assert!(pair[0].id.as_str() <= pair[1].id.as_str());
        }
    }
}
