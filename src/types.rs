//! Strongly typed identifiers and domain values shared across the engine.
//!
//! Everything that crosses a registry, persistence, or bus boundary is
//! identified by one of these types rather than a bare integer or string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one engine process. Zones are assigned to engines by id.
pub type EngineId = String;

/// Opaque connection identifier assigned by the I/O layer; stable for the
/// lifetime of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a live mob instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MobId(pub u64);

impl fmt::Display for MobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mob#{}", self.0)
    }
}

/// Identifier of a live item instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Identifier of a player group (party).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

/// Error produced when parsing a `RoomId` from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid room id {0:?} (expected \"zone:local\", [a-zA-Z0-9_]+ halves)")]
pub struct RoomIdError(pub String);

/// A room address of the form `"zone:local"`. The zone half is the shard
/// routing key. Both halves are non-empty `[a-zA-Z0-9_]+`; comparisons are
/// exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn new(zone: &str, local: &str) -> Result<Self, RoomIdError> {
        format!("{}:{}", zone, local).parse()
    }

    pub fn zone(&self) -> &str {
        // Constructor guarantees exactly one colon with non-empty halves.
        self.0.split_once(':').map(|(z, _)| z).unwrap_or("")
    }

    pub fn local(&self) -> &str {
        self.0.split_once(':').map(|(_, l)| l).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn valid_id_half(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((zone, local)) if valid_id_half(zone) && valid_id_half(local) => {
                Ok(RoomId(s.to_string()))
            }
            _ => Err(RoomIdError(s.to_string())),
        }
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> String {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A room reference as typed by staff: `"zone:local"`, a bare `"local"`
/// resolved in the caller's zone, or `"zone:"` meaning any room of that zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSpec {
    Full(RoomId),
    Local(String),
    Zone(String),
}

impl RoomSpec {
    pub fn parse(s: &str) -> Option<RoomSpec> {
        match s.split_once(':') {
            None if valid_id_half(s) => Some(RoomSpec::Local(s.to_string())),
            Some((zone, "")) if valid_id_half(zone) => Some(RoomSpec::Zone(zone.to_string())),
            Some(_) => s.parse().ok().map(RoomSpec::Full),
            None => None,
        }
    }
}

/// Compose the id of a room feature: `"zone:room/feature_local"`.
pub fn feature_id(room: &RoomId, local: &str) -> String {
    format!("{}/{}", room.as_str(), local)
}

/// A cardinal (plus vertical) movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    /// Parse either the single-letter or the long form.
    pub fn parse(word: &str) -> Option<Direction> {
        match word {
            "n" | "north" => Some(Direction::North),
            "s" | "south" => Some(Direction::South),
            "e" | "east" => Some(Direction::East),
            "w" | "west" => Some(Direction::West),
            "u" | "up" => Some(Direction::Up),
            "d" | "down" => Some(Direction::Down),
            _ => None,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        f.write_str(s)
    }
}

/// Equipment slots. At most one item per slot per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSlot {
    Head,
    Chest,
    Legs,
    Feet,
    Hands,
    Weapon,
    Shield,
}

impl ItemSlot {
    pub const ALL: [ItemSlot; 7] = [
        ItemSlot::Head,
        ItemSlot::Chest,
        ItemSlot::Legs,
        ItemSlot::Feet,
        ItemSlot::Hands,
        ItemSlot::Weapon,
        ItemSlot::Shield,
    ];

    pub fn parse(word: &str) -> Option<ItemSlot> {
        match word {
            "head" => Some(ItemSlot::Head),
            "chest" | "torso" | "body" => Some(ItemSlot::Chest),
            "legs" => Some(ItemSlot::Legs),
            "feet" => Some(ItemSlot::Feet),
            "hands" => Some(ItemSlot::Hands),
            "weapon" | "wield" => Some(ItemSlot::Weapon),
            "shield" | "offhand" => Some(ItemSlot::Shield),
            _ => None,
        }
    }
}

impl fmt::Display for ItemSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemSlot::Head => "head",
            ItemSlot::Chest => "chest",
            ItemSlot::Legs => "legs",
            ItemSlot::Feet => "feet",
            ItemSlot::Hands => "hands",
            ItemSlot::Weapon => "weapon",
            ItemSlot::Shield => "shield",
        };
        f.write_str(s)
    }
}

/// Rank of a player within a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GuildRank {
    Leader,
    Officer,
    Member,
}

impl fmt::Display for GuildRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuildRank::Leader => "Leader",
            GuildRank::Officer => "Officer",
            GuildRank::Member => "Member",
        };
        f.write_str(s)
    }
}

/// Door feature state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorState {
    Locked,
    Closed,
    Open,
}

/// Container feature state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Closed,
    Open,
}

/// Lever feature state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeverState {
    Up,
    Down,
}

impl LeverState {
    pub fn toggled(self) -> LeverState {
        match self {
            LeverState::Up => LeverState::Down,
            LeverState::Down => LeverState::Up,
        }
    }
}
