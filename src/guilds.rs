//! Guilds: named, persistent player organizations with ranks and a MOTD.
//!
//! The system keeps every guild in memory (loaded from the repository at
//! boot) and tracks dirty guilds for the periodic flush. Permission checks
//! (who may promote, kick, disband) live with the guild handler; this
//! module owns the data transitions.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::info;

use crate::db::{GuildRecord, GuildRepository, RepoError};
use crate::types::GuildRank;
use crate::validation::{guild_slug, validate_guild_name, validate_guild_tag};

#[derive(Debug, Clone)]
pub struct Guild {
    pub id: String,
    pub display_name: String,
    pub tag: String,
    pub motd: String,
    /// Player name (exact case) -> rank.
    pub roster: HashMap<String, GuildRank>,
}

impl Guild {
    pub fn rank_of(&self, name: &str) -> Option<GuildRank> {
        self.roster
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, r)| *r)
    }

    /// Roster sorted by rank (leader first) then name.
    pub fn sorted_roster(&self) -> Vec<(&str, GuildRank)> {
        let mut entries: Vec<(&str, GuildRank)> = self
            .roster
            .iter()
            .map(|(n, r)| (n.as_str(), *r))
            .collect();
        let weight = |r: GuildRank| match r {
            GuildRank::Leader => 0,
            GuildRank::Officer => 1,
            GuildRank::Member => 2,
        };
        entries.sort_by(|a, b| weight(a.1).cmp(&weight(b.1)).then(a.0.cmp(b.0)));
        entries
    }
}

impl From<&Guild> for GuildRecord {
    fn from(guild: &Guild) -> GuildRecord {
        GuildRecord {
            id: guild.id.clone(),
            display_name: guild.display_name.clone(),
            tag: guild.tag.clone(),
            motd: guild.motd.clone(),
            roster: guild.roster.clone(),
        }
    }
}

impl From<GuildRecord> for Guild {
    fn from(record: GuildRecord) -> Guild {
        Guild {
            id: record.id,
            display_name: record.display_name,
            tag: record.tag,
            motd: record.motd,
            roster: record.roster,
        }
    }
}

#[derive(Error, Debug)]
pub enum GuildError {
    #[error("{0}")]
    Invalid(String),

    #[error("a guild by that name already exists")]
    NameTaken,

    #[error("no such guild")]
    NotFound,

    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Default)]
pub struct GuildSystem {
    guilds: HashMap<String, Guild>,
    /// Lowercased player name -> slug of the guild that invited them.
    pending_invites: HashMap<String, String>,
    dirty: HashSet<String>,
}

impl GuildSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from the repository at boot.
    pub fn load(repo: &dyn GuildRepository) -> Result<Self, RepoError> {
        let mut system = Self::new();
        for record in repo.all()? {
            system.guilds.insert(record.id.clone(), record.into());
        }
        info!(guilds = system.guilds.len(), "guilds loaded");
        Ok(system)
    }

    pub fn get(&self, slug: &str) -> Option<&Guild> {
        self.guilds.get(slug)
    }

    pub fn get_mut(&mut self, slug: &str) -> Option<&mut Guild> {
        self.dirty.insert(slug.to_string());
        self.guilds.get_mut(slug)
    }

    /// Create a guild with `founder` as its leader. Persists immediately.
    pub fn create(
        &mut self,
        name: &str,
        tag: &str,
        founder: &str,
        repo: &dyn GuildRepository,
    ) -> Result<&Guild, GuildError> {
        validate_guild_name(name).map_err(|e| GuildError::Invalid(e.message))?;
        validate_guild_tag(tag).map_err(|e| GuildError::Invalid(e.message))?;
        let slug = guild_slug(name);
        if slug.is_empty() {
            return Err(GuildError::Invalid("Guild names need letters.".into()));
        }
        if self.guilds.contains_key(&slug) {
            return Err(GuildError::NameTaken);
        }

        let mut roster = HashMap::new();
        roster.insert(founder.to_string(), GuildRank::Leader);
        let guild = Guild {
            id: slug.clone(),
            display_name: name.to_string(),
            tag: tag.to_string(),
            motd: String::new(),
            roster,
        };
        repo.save(&GuildRecord::from(&guild))?;
        info!(guild = %slug, %founder, "guild created");
        self.guilds.insert(slug.clone(), guild);
        Ok(&self.guilds[&slug])
    }

    pub fn invite(&mut self, slug: &str, player_name: &str) -> Result<(), GuildError> {
        if !self.guilds.contains_key(slug) {
            return Err(GuildError::NotFound);
        }
        self.pending_invites
            .insert(player_name.to_lowercase(), slug.to_string());
        Ok(())
    }

    /// Consume a pending invite, returning the guild slug joined.
    pub fn accept_invite(&mut self, player_name: &str) -> Option<String> {
        let slug = self.pending_invites.remove(&player_name.to_lowercase())?;
        let guild = self.guilds.get_mut(&slug)?;
        guild.roster.insert(player_name.to_string(), GuildRank::Member);
        self.dirty.insert(slug.clone());
        Some(slug)
    }

    pub fn pending_invite_for(&self, player_name: &str) -> Option<&str> {
        self.pending_invites
            .get(&player_name.to_lowercase())
            .map(String::as_str)
    }

    /// Remove a member by name. Returns the member's former rank.
    pub fn remove_member(&mut self, slug: &str, player_name: &str) -> Option<GuildRank> {
        let guild = self.guilds.get_mut(slug)?;
        let key = guild
            .roster
            .keys()
            .find(|n| n.eq_ignore_ascii_case(player_name))?
            .clone();
        let rank = guild.roster.remove(&key);
        self.dirty.insert(slug.to_string());
        rank
    }

    pub fn set_rank(&mut self, slug: &str, player_name: &str, rank: GuildRank) -> bool {
        let Some(guild) = self.guilds.get_mut(slug) else {
            return false;
        };
        let Some(key) = guild
            .roster
            .keys()
            .find(|n| n.eq_ignore_ascii_case(player_name))
            .cloned()
        else {
            return false;
        };
        guild.roster.insert(key, rank);
        self.dirty.insert(slug.to_string());
        true
    }

    pub fn set_motd(&mut self, slug: &str, motd: &str) -> bool {
        match self.guilds.get_mut(slug) {
            Some(guild) => {
                guild.motd = motd.to_string();
                self.dirty.insert(slug.to_string());
                true
            }
            None => false,
        }
    }

    /// Delete a guild outright. Returns the member names that must have
    /// their membership dropped. Persists the deletion immediately.
    pub fn disband(
        &mut self,
        slug: &str,
        repo: &dyn GuildRepository,
    ) -> Result<Vec<String>, GuildError> {
        let guild = self.guilds.remove(slug).ok_or(GuildError::NotFound)?;
        repo.delete(slug)?;
        self.dirty.remove(slug);
        self.pending_invites.retain(|_, s| s != slug);
        info!(guild = %slug, "guild disbanded");
        Ok(guild.roster.into_keys().collect())
    }

    /// Dirty guilds as records, for the periodic flush.
    pub fn take_dirty_records(&mut self) -> Vec<GuildRecord> {
        let mut slugs: Vec<String> = self.dirty.drain().collect();
        slugs.sort();
        slugs
            .iter()
            .filter_map(|s| self.guilds.get(s))
            .map(GuildRecord::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryGuildRepository;

    #[test]
    fn create_persists_with_leader() {
        let repo = MemoryGuildRepository::new();
        let mut guilds = GuildSystem::new();
        let guild = guilds.create("Order of the Rose", "ROSE", "Alice", &repo).unwrap();
        assert_eq!(guild.id, "order_of_the_rose");
        assert_eq!(guild.rank_of("alice"), Some(GuildRank::Leader));

        let stored = repo.find_by_id("order_of_the_rose").unwrap().unwrap();
        assert_eq!(stored.display_name, "Order of the Rose");
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let repo = MemoryGuildRepository::new();
        let mut guilds = GuildSystem::new();
        guilds.create("Order of the Rose", "ROSE", "Alice", &repo).unwrap();
        assert!(matches!(
            guilds.create("order OF the rose", "RSE", "Bob", &repo),
            Err(GuildError::NameTaken)
        ));
    }

    #[test]
    fn invite_accept_joins_as_member() {
        let repo = MemoryGuildRepository::new();
        let mut guilds = GuildSystem::new();
        guilds.create("Order of the Rose", "ROSE", "Alice", &repo).unwrap();
        guilds.invite("order_of_the_rose", "Bob").unwrap();
        assert_eq!(guilds.pending_invite_for("BOB"), Some("order_of_the_rose"));
        let joined = guilds.accept_invite("Bob").unwrap();
        assert_eq!(joined, "order_of_the_rose");
        assert_eq!(
            guilds.get(&joined).unwrap().rank_of("bob"),
            Some(GuildRank::Member)
        );
    }

    #[test]
    fn disband_returns_roster_and_deletes() {
        let repo = MemoryGuildRepository::new();
        let mut guilds = GuildSystem::new();
        guilds.create("Order of the Rose", "ROSE", "Alice", &repo).unwrap();
        guilds.invite("order_of_the_rose", "Bob").unwrap();
        guilds.accept_invite("Bob").unwrap();

        let mut members = guilds.disband("order_of_the_rose", &repo).unwrap();
        members.sort();
        assert_eq!(members, vec!["Alice".to_string(), "Bob".to_string()]);
        assert!(repo.find_by_id("order_of_the_rose").unwrap().is_none());
        assert!(guilds.get("order_of_the_rose").is_none());
    }

    #[test]
    fn dirty_tracking_feeds_the_flush() {
        let repo = MemoryGuildRepository::new();
        let mut guilds = GuildSystem::new();
        guilds.create("Order of the Rose", "ROSE", "Alice", &repo).unwrap();
        guilds.set_motd("order_of_the_rose", "Rally at dawn.");
        let records = guilds.take_dirty_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].motd, "Rally at dawn.");
        assert!(guilds.take_dirty_records().is_empty());
    }

    #[test]
    fn roster_sorts_leader_first() {
        let repo = MemoryGuildRepository::new();
        let mut guilds = GuildSystem::new();
        guilds.create("Order of the Rose", "ROSE", "Mira", &repo).unwrap();
        guilds.invite("order_of_the_rose", "Abel").unwrap();
        guilds.accept_invite("Abel").unwrap();
        let roster = guilds.get("order_of_the_rose").unwrap().sorted_roster();
        assert_eq!(roster[0], ("Mira", GuildRank::Leader));
        assert_eq!(roster[1], ("Abel", GuildRank::Member));
    }
}
