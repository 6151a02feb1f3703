//! Session-keyed player state, the case-insensitive name index, the
//! per-room roster index, and the login outcomes.
//!
//! The three maps move together: any mutation that changes a player's name
//! binding or room updates all indices before the call returns.

use std::collections::HashMap;

use tracing::info;

use crate::constants::BASE_MAX_HP;
use crate::db::{PlayerRecord, PlayerRepository, RepoError};
use crate::dialogue::DialogueState;
use crate::mail::{MailCompose, MailMessage};
use crate::types::{GroupId, GuildRank, RoomId, SessionId};
use crate::validation::validate_player_name;

/// Live state of one connected player. Owned exclusively by the registry;
/// everything else refers to players by `SessionId`.
#[derive(Debug)]
pub struct PlayerState {
    pub name: String,
    pub session: SessionId,
    pub room: RoomId,
    pub hp: i32,
    pub max_hp: i32,
    pub base_max_hp: i32,
    pub level: u32,
    pub xp_total: u64,
    pub gold: u64,
    pub is_staff: bool,
    pub guild_id: Option<String>,
    pub guild_rank: Option<GuildRank>,
    pub group_id: Option<GroupId>,
    pub recall_room: Option<RoomId>,
    /// Engine-clock timestamp before which `recall` is on cooldown.
    pub recall_ready_at_ms: u64,
    pub inbox: Vec<MailMessage>,
    pub mail_compose: Option<MailCompose>,
    pub dialogue: Option<DialogueState>,
    /// Custom prompt format, `%h`/`%H` expanded to hp/max hp.
    pub prompt_format: Option<String>,
    pub login_seq: u64,
}

impl PlayerState {
    fn from_record(record: &PlayerRecord, session: SessionId, room: RoomId, login_seq: u64) -> Self {
        Self {
            name: record.name.clone(),
            session,
            room,
            hp: BASE_MAX_HP,
            max_hp: BASE_MAX_HP,
            base_max_hp: BASE_MAX_HP,
            level: record.level,
            xp_total: record.xp_total,
            gold: record.gold,
            is_staff: record.is_staff,
            guild_id: record.guild_id.clone(),
            guild_rank: record.guild_rank,
            group_id: None,
            recall_room: record.recall_room.clone(),
            recall_ready_at_ms: 0,
            inbox: record.inbox.clone(),
            mail_compose: None,
            dialogue: None,
            prompt_format: None,
            login_seq,
        }
    }
}

/// Result of a login attempt.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Logged in; `record` still needs its inventory/equipment materialized.
    Ok { created: bool, record: PlayerRecord },
    BadPassword,
    /// Correct credentials for an already-online name. The registry has
    /// rebound the state to the new session; the caller must notify and
    /// close `prior_session`.
    Takeover { prior_session: SessionId },
    NameInvalid { reason: String },
}

#[derive(Default)]
pub struct PlayerRegistry {
    players: HashMap<SessionId, PlayerState>,
    by_name: HashMap<String, SessionId>,
    by_room: HashMap<RoomId, Vec<SessionId>>,
    next_login_seq: u64,
    dirty: Vec<SessionId>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt a login. New names create a record on the spot; an online
    /// name with the right secret is taken over by the new session.
    pub fn login(
        &mut self,
        session: SessionId,
        name: &str,
        secret: &str,
        repo: &dyn PlayerRepository,
        start_room: &RoomId,
    ) -> Result<LoginOutcome, RepoError> {
        if let Err(e) = validate_player_name(name) {
            return Ok(LoginOutcome::NameInvalid { reason: e.message });
        }

        let existing = repo.find_by_name(name)?;
        if let Some(record) = &existing {
            if record.secret != secret {
                return Ok(LoginOutcome::BadPassword);
            }
        }

        if let Some(&prior) = self.by_name.get(&name.to_lowercase()) {
            // Credentials already checked; an unknown name cannot be online.
            self.rebind(prior, session);
            info!(name, %prior, %session, "session takeover");
            return Ok(LoginOutcome::Takeover {
                prior_session: prior,
            });
        }

        let (created, record) = match existing {
            Some(record) => (false, record),
            None => {
                let record = PlayerRecord::new(name, secret);
                repo.save(&record)?;
                (true, record)
            }
        };

        let room = record
            .room
            .clone()
            .unwrap_or_else(|| start_room.clone());
        let seq = self.next_login_seq;
        self.next_login_seq += 1;

        let state = PlayerState::from_record(&record, session, room.clone(), seq);
        self.by_name.insert(record.name.to_lowercase(), session);
        self.by_room.entry(room).or_default().push(session);
        self.players.insert(session, state);
        info!(name = %record.name, %session, created, "player logged in");
        Ok(LoginOutcome::Ok { created, record })
    }

    /// Move a live player's state from one session to another (takeover).
    fn rebind(&mut self, from: SessionId, to: SessionId) {
        let Some(mut state) = self.players.remove(&from) else {
            return;
        };
        state.session = to;
        self.by_name.insert(state.name.to_lowercase(), to);
        if let Some(roster) = self.by_room.get_mut(&state.room) {
            for slot in roster.iter_mut() {
                if *slot == from {
                    *slot = to;
                }
            }
        }
        self.dirty.retain(|s| *s != from);
        self.players.insert(to, state);
    }

    /// Index an externally built player state (zone handoff arrival). A
    /// fresh login seq keeps roster ordering consistent with arrival time.
    pub fn adopt(&mut self, mut state: PlayerState) {
        state.login_seq = self.next_login_seq;
        self.next_login_seq += 1;
        self.by_name.insert(state.name.to_lowercase(), state.session);
        self.by_room
            .entry(state.room.clone())
            .or_default()
            .push(state.session);
        self.players.insert(state.session, state);
    }

    /// Remove a player from all indices, returning the final state for
    /// persistence. Cancels any in-progress mail composition.
    pub fn remove(&mut self, session: SessionId) -> Option<PlayerState> {
        let mut state = self.players.remove(&session)?;
        state.mail_compose = None;
        self.by_name.remove(&state.name.to_lowercase());
        if let Some(roster) = self.by_room.get_mut(&state.room) {
            roster.retain(|s| *s != session);
            if roster.is_empty() {
                self.by_room.remove(&state.room);
            }
        }
        self.dirty.retain(|s| *s != session);
        Some(state)
    }

    /// Re-home a player. Indices update; broadcasting and exit validation
    /// are the caller's concern.
    pub fn move_to(&mut self, session: SessionId, room: RoomId) {
        let Some(state) = self.players.get_mut(&session) else {
            return;
        };
        let old = std::mem::replace(&mut state.room, room.clone());
        if old == room {
            return;
        }
        if let Some(roster) = self.by_room.get_mut(&old) {
            roster.retain(|s| *s != session);
            if roster.is_empty() {
                self.by_room.remove(&old);
            }
        }
        self.by_room.entry(room).or_default().push(session);
    }

    pub fn get(&self, session: SessionId) -> Option<&PlayerState> {
        self.players.get(&session)
    }

    pub fn get_mut(&mut self, session: SessionId) -> Option<&mut PlayerState> {
        self.players.get_mut(&session)
    }

    pub fn by_name(&self, name: &str) -> Option<&PlayerState> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|s| self.players.get(s))
    }

    pub fn session_by_name(&self, name: &str) -> Option<SessionId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    /// Roster of a room ordered by login time ascending.
    pub fn players_in_room(&self, room: &RoomId) -> Vec<&PlayerState> {
        let mut players: Vec<&PlayerState> = self
            .by_room
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|s| self.players.get(s))
            .collect();
        players.sort_by_key(|p| p.login_seq);
        players
    }

    pub fn sessions_in_room(&self, room: &RoomId) -> Vec<SessionId> {
        self.players_in_room(room).iter().map(|p| p.session).collect()
    }

    /// All online players ordered by login time ascending.
    pub fn all(&self) -> Vec<&PlayerState> {
        let mut players: Vec<&PlayerState> = self.players.values().collect();
        players.sort_by_key(|p| p.login_seq);
        players
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.all().iter().map(|p| p.session).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Flag a player as needing a persistence flush.
    pub fn mark_dirty(&mut self, session: SessionId) {
        if self.players.contains_key(&session) && !self.dirty.contains(&session) {
            self.dirty.push(session);
        }
    }

    pub fn take_dirty(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.dirty)
    }
}
