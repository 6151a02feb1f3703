//! Player records and the `PlayerRepository` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::mail::MailMessage;
use crate::types::{GuildRank, ItemSlot, RoomId};

use super::RepoError;

/// Durable state of one player. Inventory and equipment are stored as item
/// template keywords; instances are re-materialized on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    /// Opaque login secret. Hashing happens outside the engine core.
    pub secret: String,
    pub level: u32,
    pub xp_total: u64,
    pub gold: u64,
    pub is_staff: bool,
    pub room: Option<RoomId>,
    pub recall_room: Option<RoomId>,
    pub inventory: Vec<String>,
    pub equipment: Vec<(ItemSlot, String)>,
    pub inbox: Vec<MailMessage>,
    pub guild_id: Option<String>,
    pub guild_rank: Option<GuildRank>,
}

impl PlayerRecord {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            level: 1,
            xp_total: 0,
            gold: 0,
            is_staff: false,
            room: None,
            recall_room: None,
            inventory: Vec::new(),
            equipment: Vec::new(),
            inbox: Vec::new(),
            guild_id: None,
            guild_rank: None,
        }
    }
}

/// Storage contract for players. Lookup is case-insensitive on name.
pub trait PlayerRepository: Send + Sync {
    fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, RepoError>;
    fn save(&self, record: &PlayerRecord) -> Result<(), RepoError>;
    fn delete(&self, name: &str) -> Result<(), RepoError>;
}

/// In-memory repository used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryPlayerRepository {
    records: Mutex<HashMap<String, PlayerRecord>>,
}

impl MemoryPlayerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlayerRepository for MemoryPlayerRepository {
    fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, RepoError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&name.to_lowercase())
            .cloned())
    }

    fn save(&self, record: &PlayerRecord) -> Result<(), RepoError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.name.to_lowercase(), record.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), RepoError> {
        self.records.lock().unwrap().remove(&name.to_lowercase());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let repo = MemoryPlayerRepository::new();
        repo.save(&PlayerRecord::new("Alice", "s3cret")).unwrap();
        assert!(repo.find_by_name("alice").unwrap().is_some());
        assert!(repo.find_by_name("ALICE").unwrap().is_some());
        assert!(repo.find_by_name("Bob").unwrap().is_none());
    }

    #[test]
    fn save_overwrites_and_delete_removes() {
        let repo = MemoryPlayerRepository::new();
        let mut record = PlayerRecord::new("Alice", "s3cret");
        repo.save(&record).unwrap();
        record.gold = 250;
        repo.save(&record).unwrap();
        assert_eq!(repo.find_by_name("alice").unwrap().unwrap().gold, 250);
        repo.delete("ALICE").unwrap();
        assert!(repo.find_by_name("alice").unwrap().is_none());
    }

    #[test]
    fn records_round_trip_through_json() {
        let mut record = PlayerRecord::new("Alice", "s3cret");
        record.room = Some("town:square".parse().unwrap());
        record.equipment.push((ItemSlot::Head, "cap".into()));
        let text = serde_json::to_string(&record).unwrap();
        let back: PlayerRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.name, "Alice");
        assert_eq!(back.equipment.len(), 1);
    }
}
