//! Guild records and the `GuildRepository` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::GuildRank;

use super::RepoError;

/// Durable state of one guild, keyed by the slug of its display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: String,
    pub display_name: String,
    pub tag: String,
    pub motd: String,
    /// Player name (exact case) -> rank.
    pub roster: HashMap<String, GuildRank>,
}

pub trait GuildRepository: Send + Sync {
    fn find_by_id(&self, slug: &str) -> Result<Option<GuildRecord>, RepoError>;
    fn save(&self, record: &GuildRecord) -> Result<(), RepoError>;
    fn delete(&self, slug: &str) -> Result<(), RepoError>;
    fn all(&self) -> Result<Vec<GuildRecord>, RepoError>;
}

/// In-memory repository used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryGuildRepository {
    records: Mutex<HashMap<String, GuildRecord>>,
}

impl MemoryGuildRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuildRepository for MemoryGuildRepository {
    fn find_by_id(&self, slug: &str) -> Result<Option<GuildRecord>, RepoError> {
        Ok(self.records.lock().unwrap().get(slug).cloned())
    }

    fn save(&self, record: &GuildRecord) -> Result<(), RepoError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, slug: &str) -> Result<(), RepoError> {
        self.records.lock().unwrap().remove(slug);
        Ok(())
    }

    fn all(&self) -> Result<Vec<GuildRecord>, RepoError> {
        let mut records: Vec<GuildRecord> = self.records.lock().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_records_persist_and_delete() {
        let repo = MemoryGuildRepository::new();
        let mut record = GuildRecord {
            id: "order_of_the_rose".into(),
            display_name: "Order of the Rose".into(),
            tag: "ROSE".into(),
            motd: String::new(),
            roster: HashMap::new(),
        };
        record.roster.insert("Alice".into(), GuildRank::Leader);
        repo.save(&record).unwrap();

        let found = repo.find_by_id("order_of_the_rose").unwrap().unwrap();
        assert_eq!(found.roster.get("Alice"), Some(&GuildRank::Leader));

        repo.delete("order_of_the_rose").unwrap();
        assert!(repo.find_by_id("order_of_the_rose").unwrap().is_none());
    }
}
