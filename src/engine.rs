//! The engine task: one owner for all mutable world state.
//!
//! A single async task drains an input channel of session lines, bus
//! messages, and ticks. Every registry mutation and event emission happens
//! here; I/O and persistence run elsewhere and talk to the engine through
//! channels. No handler ever runs concurrently with another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::{
    BroadcastKind, InterEngineBus, InterEngineMessage, PlayerLocationIndex, PlayerSnapshot,
    SnapshotItem,
};
use crate::clock::Clock;
use crate::combat::CombatSystem;
use crate::config::EngineConfig;
use crate::constants::{PERSIST_FLUSH_INTERVAL_MS, SHUTDOWN_GRACE_MS};
use crate::db::{GuildRepository, PlayerRecord, PlayerRepository, RepoError};
use crate::groups::GroupSystem;
use crate::guilds::GuildSystem;
use crate::handlers;
use crate::mail::{deliver, MailMessage};
use crate::outbound::OutboundBus;
use crate::parser::{parse, Command};
use crate::progression::PlayerProgression;
use crate::registry::{
    ItemRegistry, LoginOutcome, MobRegistry, PlayerRegistry, PlayerState, ShopRegistry,
    WorldStateRegistry,
};
use crate::scheduler::Scheduler;
use crate::types::{EngineId, MobId, RoomId, SessionId};
use crate::world::World;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Everything the engine consumes, local or remote, flows in as one of
/// these.
#[derive(Debug)]
pub enum EngineInput {
    Connected { session: SessionId },
    Line { session: SessionId, line: String },
    Disconnected { session: SessionId },
    Bus(InterEngineMessage),
    /// Process-level shutdown request (signal handler).
    Shutdown,
}

/// Login state machine. Only `Playing` sessions reach the command router.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionPhase {
    AwaitingName,
    AwaitingPassword { name: String },
    Playing,
    /// Mid zone-handoff: the local player record is gone, the socket stays.
    HandedOff,
}

/// Scheduler action payloads. Referents are re-resolved at execution; a
/// vanished referent makes the action a no-op.
#[derive(Debug, Clone)]
pub enum TickAction {
    PlayerSwing { session: SessionId },
    MobSwing { mob: MobId, target: SessionId },
    MobRespawn { spawn_index: usize },
    PersistFlush,
    CloseSession { session: SessionId },
    FinishShutdown,
}

/// Dependencies for an engine instance. Tests swap in mutable clocks,
/// memory repositories, and a seeded RNG.
pub struct EngineDeps {
    pub config: EngineConfig,
    pub world: Arc<World>,
    pub clock: Arc<dyn Clock>,
    pub bus: Arc<OutboundBus>,
    pub player_repo: Arc<dyn PlayerRepository>,
    pub guild_repo: Arc<dyn GuildRepository>,
    pub inter_bus: Option<Box<dyn InterEngineBus>>,
    pub location_index: Option<Arc<dyn PlayerLocationIndex>>,
    pub rng_seed: Option<u64>,
}

pub struct Engine {
    pub(crate) engine_id: EngineId,
    pub(crate) config: EngineConfig,
    pub(crate) world: Arc<World>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) bus: Arc<OutboundBus>,
    pub(crate) players: PlayerRegistry,
    pub(crate) mobs: MobRegistry,
    pub(crate) items: ItemRegistry,
    pub(crate) world_state: WorldStateRegistry,
    pub(crate) combat: CombatSystem,
    pub(crate) shops: ShopRegistry,
    pub(crate) groups: GroupSystem,
    pub(crate) guilds: GuildSystem,
    pub(crate) progression: PlayerProgression,
    pub(crate) scheduler: Scheduler<TickAction>,
    pub(crate) phases: crate::phase::PhaseManager,
    pub(crate) player_repo: Arc<dyn PlayerRepository>,
    pub(crate) guild_repo: Arc<dyn GuildRepository>,
    pub(crate) inter_bus: Option<Box<dyn InterEngineBus>>,
    pub(crate) location_index: Option<Arc<dyn PlayerLocationIndex>>,
    pub(crate) rng: StdRng,
    sessions: HashMap<SessionId, SessionPhase>,
    /// Supplies names of players on other engines for `who`.
    on_remote_who: Option<Box<dyn Fn() -> Vec<String> + Send + Sync>>,
    pub(crate) shutting_down: bool,
    stopped: bool,
}

impl Engine {
    pub fn new(deps: EngineDeps) -> Result<Engine, EngineError> {
        let guilds = GuildSystem::load(deps.guild_repo.as_ref())?;
        let rng = match deps.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let engine_id = deps.config.server.engine_id.clone();
        let phases =
            crate::phase::PhaseManager::new(engine_id.clone(), deps.config.instances.clone());

        let mut engine = Engine {
            engine_id,
            shops: ShopRegistry::new(deps.config.economy),
            combat: CombatSystem::new(deps.config.combat),
            progression: PlayerProgression::new(deps.config.progression),
            config: deps.config,
            world: deps.world,
            clock: deps.clock,
            bus: deps.bus,
            players: PlayerRegistry::new(),
            mobs: MobRegistry::new(),
            items: ItemRegistry::new(),
            world_state: WorldStateRegistry::new(),
            groups: GroupSystem::new(),
            guilds,
            scheduler: Scheduler::new(),
            phases,
            player_repo: deps.player_repo,
            guild_repo: deps.guild_repo,
            inter_bus: deps.inter_bus,
            location_index: deps.location_index,
            rng,
            sessions: HashMap::new(),
            on_remote_who: None,
            shutting_down: false,
            stopped: false,
        };
        engine.populate_world();
        engine
            .scheduler
            .schedule_in(engine.clock.now_ms(), PERSIST_FLUSH_INTERVAL_MS, TickAction::PersistFlush);
        Ok(engine)
    }

    /// Seed initial mobs and floor items from the world's spawn rules.
    fn populate_world(&mut self) {
        let world = Arc::clone(&self.world);
        for spawn in &world.mob_spawns {
            if let Some(template) = world.mob_template(&spawn.template) {
                self.mobs.spawn(template, spawn.room.clone());
            }
        }
        for spawn in &world.item_spawns {
            if let Some(template) = world.item_template(&spawn.template) {
                let instance = self.items.mint(template);
                self.items.put_in_room(spawn.room.clone(), instance);
            }
        }
        info!(
            mobs = self.mobs.len(),
            items = self.items.instance_count(),
            "world populated"
        );
    }

    pub fn engine_id(&self) -> &EngineId {
        &self.engine_id
    }

    /// Install the remote roster source used by `who` on sharded setups.
    pub fn set_remote_who_provider(&mut self, provider: Box<dyn Fn() -> Vec<String> + Send + Sync>) {
        self.on_remote_who = Some(provider);
    }

    pub(crate) fn remote_who(&self) -> Vec<String> {
        match &self.on_remote_who {
            Some(provider) => provider(),
            None => Vec::new(),
        }
    }

    /// Drop a session's login-machine entry so no further prompt is sent.
    pub(crate) fn end_session(&mut self, session: SessionId) {
        self.sessions.remove(&session);
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    /// Drive the engine until shutdown completes. `bus_rx` is the incoming
    /// half of the inter-engine bus, when one is configured.
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<EngineInput>,
        mut bus_rx: Option<mpsc::UnboundedReceiver<InterEngineMessage>>,
    ) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.scheduler.tick_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input).await,
                    None => break,
                },
                message = recv_bus(&mut bus_rx) => {
                    self.handle_input(EngineInput::Bus(message)).await;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
            if self.stopped {
                break;
            }
        }
        info!(engine = %self.engine_id, "engine task stopped");
    }

    pub async fn handle_input(&mut self, input: EngineInput) {
        match input {
            EngineInput::Connected { session } => self.on_connected(session).await,
            EngineInput::Line { session, line } => self.on_line(session, &line).await,
            EngineInput::Disconnected { session } => self.on_disconnected(session).await,
            EngineInput::Bus(message) => self.on_bus_message(message).await,
            EngineInput::Shutdown => self.begin_shutdown(None).await,
        }
    }

    // =========================================================================
    // Session lifecycle and login
    // =========================================================================

    async fn on_connected(&mut self, session: SessionId) {
        self.sessions.insert(session, SessionPhase::AwaitingName);
        self.bus
            .send_info(session, self.config.server.motd.clone())
            .await;
        self.bus.send_info(session, "What is your name?").await;
        self.bus.send_prompt(session, "> ").await;
    }

    async fn on_line(&mut self, session: SessionId, line: &str) {
        let Some(phase) = self.sessions.get(&session).cloned() else {
            debug!(%session, "line from unknown session");
            return;
        };
        match phase {
            SessionPhase::AwaitingName => {
                let name = line.trim();
                if name.is_empty() {
                    self.bus.send_info(session, "What is your name?").await;
                    self.bus.send_prompt(session, "> ").await;
                    return;
                }
                self.sessions.insert(
                    session,
                    SessionPhase::AwaitingPassword {
                        name: name.to_string(),
                    },
                );
                self.bus.send_info(session, "Password?").await;
                self.bus.send_prompt(session, "> ").await;
            }
            SessionPhase::AwaitingPassword { name } => {
                self.try_login(session, &name, line.trim()).await;
            }
            SessionPhase::Playing => {
                // An open mail composition swallows raw lines.
                if self
                    .players
                    .get(session)
                    .map(|p| p.mail_compose.is_some())
                    .unwrap_or(false)
                {
                    handlers::mail::compose_line(self, session, line).await;
                    if self.session_is_playing(session) {
                        let prompt = self.prompt_for(session);
                        self.bus.send_prompt(session, prompt).await;
                    }
                    return;
                }
                let command = parse(line);
                self.dispatch(session, command).await;
            }
            SessionPhase::HandedOff => {
                self.bus
                    .send_error(session, "You are between worlds.")
                    .await;
            }
        }
    }

    async fn try_login(&mut self, session: SessionId, name: &str, secret: &str) {
        let start_room = self.world.start_room.clone();
        let outcome = match self
            .players
            .login(session, name, secret, self.player_repo.as_ref(), &start_room)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%session, error = %e, "login repository failure");
                self.bus
                    .send_error(session, "Internal error. Try again.")
                    .await;
                self.sessions.insert(session, SessionPhase::AwaitingName);
                self.bus.send_prompt(session, "> ").await;
                return;
            }
        };

        match outcome {
            LoginOutcome::NameInvalid { reason } => {
                self.bus.send_error(session, reason).await;
                self.bus.send_info(session, "What is your name?").await;
                self.sessions.insert(session, SessionPhase::AwaitingName);
                self.bus.send_prompt(session, "> ").await;
            }
            LoginOutcome::BadPassword => {
                self.bus.send_error(session, "Wrong password.").await;
                self.bus.send_info(session, "What is your name?").await;
                self.sessions.insert(session, SessionPhase::AwaitingName);
                self.bus.send_prompt(session, "> ").await;
            }
            LoginOutcome::Takeover { prior_session } => {
                self.bus
                    .send_text(prior_session, "You have been disconnected.")
                    .await;
                self.bus.close(prior_session).await;
                self.sessions.remove(&prior_session);
                // Carry every session-keyed satellite over to the new id.
                self.items.rebind_session(prior_session, session);
                self.combat.rebind_session(prior_session, session);
                self.groups.rebind_session(prior_session, session);
                self.sessions.insert(session, SessionPhase::Playing);
                self.bus
                    .send_info(session, "You take over your old body.")
                    .await;
                handlers::ui::send_room_look(self, session).await;
                let prompt = self.prompt_for(session);
                self.bus.send_prompt(session, prompt).await;
            }
            LoginOutcome::Ok { created, record } => {
                self.sessions.insert(session, SessionPhase::Playing);
                self.materialize_record(session, &record).await;
                if created {
                    self.deliver_welcome_mail(session).await;
                }
                self.bus
                    .send_info(session, format!("Welcome, {}.", record.name))
                    .await;
                if let Some(slug) = self.players.get(session).and_then(|p| p.guild_id.clone()) {
                    if let Some(guild) = self.guilds.get(&slug) {
                        if !guild.motd.is_empty() {
                            self.bus
                                .send_info(session, format!("[{}] MOTD: {}", guild.tag, guild.motd))
                                .await;
                        }
                    }
                }
                handlers::ui::send_room_look(self, session).await;
                let prompt = self.prompt_for(session);
                self.bus.send_prompt(session, prompt).await;
            }
        }
    }

    /// Mint and place the inventory and equipment a record describes, then
    /// apply equipment stat contributions.
    async fn materialize_record(&mut self, session: SessionId, record: &PlayerRecord) {
        let world = Arc::clone(&self.world);
        for keyword in &record.inventory {
            match world.item_template(keyword) {
                Some(template) => {
                    let instance = self.items.mint(template);
                    self.items.add_to_inventory(session, instance);
                }
                None => warn!(%keyword, "record references unknown item template"),
            }
        }
        for (slot, keyword) in &record.equipment {
            match world.item_template(keyword) {
                Some(template) if template.slot == Some(*slot) => {
                    let instance = self.items.mint(template);
                    self.items.equip(session, instance);
                }
                _ => warn!(%keyword, "record references unwearable equipment"),
            }
        }
        let armor = self.items.equipped_armor_total(session);
        if let Some(player) = self.players.get_mut(session) {
            player.max_hp = player.base_max_hp + armor;
            player.hp = player.max_hp;
        }
    }

    async fn deliver_welcome_mail(&mut self, session: SessionId) {
        let message = MailMessage::new(
            self.config.server.welcome_mail_sender.clone(),
            self.config.server.welcome_mail_text.clone(),
            self.now(),
        );
        if let Some(player) = self.players.get_mut(session) {
            deliver(&mut player.inbox, message);
            self.bus
                .send_info(session, "A courier hands you your first letter. (mail list)")
                .await;
        }
        self.players.mark_dirty(session);
    }

    async fn on_disconnected(&mut self, session: SessionId) {
        self.sessions.remove(&session);
        if self.players.get(session).is_some() {
            self.logout(session).await;
        }
        self.bus.unregister(session);
    }

    /// Persist and fully unwind one playing session.
    pub(crate) async fn logout(&mut self, session: SessionId) {
        self.persist_player(session);
        if let Some(group_id) = self.players.get(session).and_then(|p| p.group_id) {
            handlers::group::announce_departure(self, group_id, session).await;
            self.groups.remove_member(group_id, session);
        }
        self.combat.clear_session(session);
        self.items.clear_session(session);
        if let Some(state) = self.players.remove(session) {
            info!(name = %state.name, %session, "player logged out");
            self.broadcast_room(&state.room, Some(session), &format!("{} fades away.", state.name))
                .await;
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub(crate) fn session_is_playing(&self, session: SessionId) -> bool {
        matches!(self.sessions.get(&session), Some(SessionPhase::Playing))
    }

    /// Default or custom prompt, `%h`/`%H` expanded.
    pub(crate) fn prompt_for(&self, session: SessionId) -> String {
        let Some(player) = self.players.get(session) else {
            return "> ".to_string();
        };
        match &player.prompt_format {
            Some(format) => format
                .replace("%h", &player.hp.to_string())
                .replace("%H", &player.max_hp.to_string()),
            None => format!("[{}/{}] ", player.hp, player.max_hp),
        }
    }

    pub async fn dispatch(&mut self, session: SessionId, command: Command) {
        if self.players.get(session).is_none() {
            // The session is mid-teardown; nothing to act on.
            return;
        }

        match command {
            Command::Noop => {}
            Command::Unknown(_) => {
                self.bus.send_text(session, "Huh?").await;
            }
            Command::Invalid { hint } => {
                self.bus.send_error(session, hint).await;
            }

            Command::Move(dir) => handlers::navigation::move_player(self, session, dir).await,
            Command::Look => handlers::ui::look(self, session).await,
            Command::LookDir(dir) => handlers::navigation::look_dir(self, session, dir).await,
            Command::Exits => handlers::ui::exits(self, session).await,
            Command::Who => handlers::ui::who(self, session).await,
            Command::Score => handlers::ui::score(self, session).await,
            Command::Inventory => handlers::ui::inventory(self, session).await,
            Command::Equipment => handlers::ui::equipment(self, session).await,
            Command::Help => handlers::ui::help(self, session).await,
            Command::Quit => handlers::ui::quit(self, session).await,
            Command::Prompt(format) => handlers::ui::set_prompt(self, session, format).await,
            Command::Recall => handlers::navigation::recall(self, session).await,

            Command::Say(message) => handlers::communication::say(self, session, &message).await,
            Command::Tell { to, message } => {
                handlers::communication::tell(self, session, &to, &message).await
            }
            Command::Gossip(message) => {
                handlers::communication::gossip(self, session, &message).await
            }
            Command::Whisper { to, message } => {
                handlers::communication::whisper(self, session, &to, &message).await
            }
            Command::Shout(message) => {
                handlers::communication::shout(self, session, &message).await
            }
            Command::Ooc(message) => handlers::communication::ooc(self, session, &message).await,
            Command::Pose(text) => handlers::communication::pose(self, session, &text).await,

            Command::Get(keyword) => handlers::items::get(self, session, &keyword).await,
            Command::Drop(keyword) => handlers::items::drop_item(self, session, &keyword).await,
            Command::Give { item, to } => handlers::items::give(self, session, &item, &to).await,
            Command::Use(keyword) => handlers::items::use_item(self, session, &keyword).await,
            Command::Wear(keyword) => handlers::items::wear(self, session, &keyword).await,
            Command::Remove(slot) => handlers::items::remove(self, session, slot).await,

            Command::ShopList => handlers::shop::list(self, session).await,
            Command::Buy(keyword) => handlers::shop::buy(self, session, &keyword).await,
            Command::Sell(keyword) => handlers::shop::sell(self, session, &keyword).await,
            Command::Balance => handlers::shop::balance(self, session).await,

            Command::Talk(npc) => handlers::dialogue::talk(self, session, &npc).await,
            Command::DialogueChoice(n) => handlers::dialogue::choose(self, session, n).await,

            Command::Kill(keyword) => handlers::combat::kill(self, session, &keyword).await,
            Command::Flee => handlers::combat::flee(self, session).await,
            Command::Cast { spell, target } => {
                handlers::combat::cast(self, session, &spell, target.as_deref()).await
            }
            Command::Spells => handlers::combat::spells(self, session).await,
            Command::Effects => handlers::combat::effects(self, session).await,
            Command::Dispel(name) => handlers::combat::dispel(self, session, &name).await,

            Command::Open(keyword) => {
                handlers::world_features::open(self, session, &keyword).await
            }
            Command::Close(keyword) => {
                handlers::world_features::close(self, session, &keyword).await
            }
            Command::Unlock(keyword) => {
                handlers::world_features::unlock(self, session, &keyword).await
            }
            Command::Search(keyword) => {
                handlers::world_features::search(self, session, &keyword).await
            }
            Command::GetFrom { item, container } => {
                handlers::world_features::get_from(self, session, &item, &container).await
            }
            Command::PutIn { item, container } => {
                handlers::world_features::put_in(self, session, &item, &container).await
            }
            Command::Pull(keyword) => {
                handlers::world_features::pull(self, session, &keyword).await
            }
            Command::Read(keyword) => {
                handlers::world_features::read(self, session, &keyword).await
            }

            Command::Group(sub) => handlers::group::handle(self, session, sub).await,
            Command::GroupTell(message) => handlers::group::gtell(self, session, &message).await,
            Command::Guild(sub) => handlers::guild::handle(self, session, sub).await,
            Command::GuildChat(message) => handlers::guild::gchat(self, session, &message).await,
            Command::Mail(sub) => handlers::mail::handle(self, session, sub).await,
            Command::Admin(sub) => handlers::admin::handle(self, session, sub).await,
        }

        // Every turn ends with a prompt unless the session quit or was
        // handed off mid-command.
        if self.session_is_playing(session) && self.bus.is_registered(session) {
            let prompt = self.prompt_for(session);
            self.bus.send_prompt(session, prompt).await;
        }
    }

    // =========================================================================
    // Broadcast helpers
    // =========================================================================

    /// Room-scoped lossy broadcast, optionally excluding one session.
    pub(crate) async fn broadcast_room(
        &self,
        room: &RoomId,
        exclude: Option<SessionId>,
        text: &str,
    ) {
        for target in self.players.sessions_in_room(room) {
            if Some(target) == exclude {
                continue;
            }
            self.bus.broadcast_text(target, text);
        }
    }

    /// Zone-scoped lossy broadcast.
    pub(crate) async fn broadcast_zone(&self, zone: &str, exclude: Option<SessionId>, text: &str) {
        for player in self.players.all() {
            if Some(player.session) == exclude || player.room.zone() != zone {
                continue;
            }
            self.bus.broadcast_text(player.session, text);
        }
    }

    /// Global lossy broadcast to every playing session.
    pub(crate) async fn broadcast_all(&self, exclude: Option<SessionId>, text: &str) {
        for player in self.players.all() {
            if Some(player.session) == exclude {
                continue;
            }
            self.bus.broadcast_text(player.session, text);
        }
    }

    // =========================================================================
    // XP and death
    // =========================================================================

    /// Grant XP with level-up notifications.
    pub(crate) async fn grant_xp(&mut self, session: SessionId, amount: u64) {
        if amount == 0 {
            return;
        }
        let Some(player) = self.players.get_mut(session) else {
            return;
        };
        let gained = self.progression.grant(player, amount);
        let level = player.level;
        let name = player.name.clone();
        self.players.mark_dirty(session);
        self.bus
            .send_info(session, format!("You gain {} experience.", amount))
            .await;
        if gained > 0 {
            info!(%name, level, "level up");
            self.bus
                .send_info(session, format!("You are now level {}!", level))
                .await;
        }
    }

    /// Award a kill's XP, splitting with group members in the same zone.
    pub(crate) async fn award_kill_xp(&mut self, killer: SessionId, total: u64) {
        let Some(player) = self.players.get(killer) else {
            return;
        };
        let zone = player.room.zone().to_string();
        let group = player.group_id;

        let eligible: Vec<SessionId> = match group {
            Some(group_id) => self
                .groups
                .members(group_id)
                .into_iter()
                .filter(|m| {
                    self.players
                        .get(*m)
                        .map(|p| p.room.zone() == zone)
                        .unwrap_or(false)
                })
                .collect(),
            None => vec![killer],
        };

        let (share, remainder) = PlayerProgression::group_shares(total, eligible.len() as u64);
        for member in eligible {
            let amount = if member == killer {
                share + remainder
            } else {
                share
            };
            self.grant_xp(member, amount).await;
        }
    }

    /// Mob defeat: XP, loot, disengagement, respawn scheduling.
    pub(crate) async fn resolve_mob_death(&mut self, killer: SessionId, mob_id: MobId) {
        let Some(mob) = self.mobs.remove(mob_id) else {
            return;
        };
        self.broadcast_room(&mob.room, None, &format!("{} collapses!", mob.name))
            .await;

        let world = Arc::clone(&self.world);
        if let Some(template) = world.mob_template(&mob.template_id) {
            for loot in &template.loot {
                if let Some(item) = world.item_template(loot) {
                    let instance = self.items.mint(item);
                    let name = instance.item.display_name.clone();
                    self.items.put_in_room(mob.room.clone(), instance);
                    self.broadcast_room(&mob.room, None, &format!("{} drops {}.", mob.name, name))
                        .await;
                }
            }
        }

        for attacker in self.combat.attackers_of(mob_id) {
            self.combat.disengage(attacker);
        }
        self.award_kill_xp(killer, mob.xp_reward).await;

        // Schedule a respawn if a spawn rule covers this template and room.
        if let Some((index, spawn)) = world
            .mob_spawns
            .iter()
            .enumerate()
            .find(|(_, s)| s.template == mob.template_id && s.room == mob.room)
        {
            if let Some(delay) = spawn.respawn_ms {
                self.scheduler.schedule_in(
                    self.now(),
                    delay,
                    TickAction::MobRespawn { spawn_index: index },
                );
            }
        }
    }

    /// Player defeat: snapped back to safety at 1 hp.
    pub(crate) async fn resolve_player_death(&mut self, session: SessionId) {
        self.combat.clear_session(session);
        let Some(player) = self.players.get_mut(session) else {
            return;
        };
        player.hp = 1;
        let name = player.name.clone();
        let from = player.room.clone();
        let sanctuary = player
            .recall_room
            .clone()
            .unwrap_or_else(|| self.world.start_room.clone());
        info!(%name, "player died");
        self.broadcast_room(&from, Some(session), &format!("{} falls senseless.", name))
            .await;
        self.players.move_to(session, sanctuary.clone());
        self.players.mark_dirty(session);
        self.bus
            .send_text(
                session,
                "A divine force snatches you from death's door.",
            )
            .await;
        self.broadcast_room(
            &sanctuary,
            Some(session),
            &format!("{} appears, pale and shaking.", name),
        )
        .await;
        handlers::ui::send_room_look(self, session).await;
    }

    // =========================================================================
    // Ticks
    // =========================================================================

    /// One scheduler pump: run up to the configured cap of due actions.
    /// Returns `(ran, deferred)`; the deferred count is the backpressure
    /// signal exported to metrics.
    pub async fn tick(&mut self) -> (usize, usize) {
        let now = self.now();
        let cap = self.config.scheduler.max_actions_per_tick;
        let mut ran = 0;
        while ran < cap {
            match self.scheduler.pop_ready(now) {
                Some(action) => {
                    self.run_action(action).await;
                    ran += 1;
                }
                None => break,
            }
        }
        let deferred = self.scheduler.ready_count(now);
        if deferred > 0 {
            debug!(ran, deferred, "tick left ready actions behind");
        }
        (ran, deferred)
    }

    async fn run_action(&mut self, action: TickAction) {
        match action {
            TickAction::PlayerSwing { session } => {
                handlers::combat::player_swing(self, session).await;
            }
            TickAction::MobSwing { mob, target } => {
                handlers::combat::mob_swing(self, mob, target).await;
            }
            TickAction::MobRespawn { spawn_index } => {
                self.respawn_mob(spawn_index).await;
            }
            TickAction::PersistFlush => {
                self.persist_flush();
                self.scheduler.schedule_in(
                    self.now(),
                    PERSIST_FLUSH_INTERVAL_MS,
                    TickAction::PersistFlush,
                );
            }
            TickAction::CloseSession { session } => {
                self.bus.close(session).await;
            }
            TickAction::FinishShutdown => {
                self.finish_shutdown().await;
            }
        }
    }

    async fn respawn_mob(&mut self, spawn_index: usize) {
        let world = Arc::clone(&self.world);
        let Some(spawn) = world.mob_spawns.get(spawn_index) else {
            return;
        };
        if self.mobs.template_present(&spawn.room, &spawn.template) {
            return;
        }
        if let Some(template) = world.mob_template(&spawn.template) {
            self.mobs.spawn(template, spawn.room.clone());
            self.broadcast_room(&spawn.room, None, &format!("{} arrives.", template.name))
                .await;
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Build a durable record from live state.
    pub(crate) fn record_of(&self, session: SessionId) -> Option<PlayerRecord> {
        let player = self.players.get(session)?;
        let existing_secret = self
            .player_repo
            .find_by_name(&player.name)
            .ok()
            .flatten()
            .map(|r| r.secret)
            .unwrap_or_default();
        Some(PlayerRecord {
            name: player.name.clone(),
            secret: existing_secret,
            level: player.level,
            xp_total: player.xp_total,
            gold: player.gold,
            is_staff: player.is_staff,
            room: Some(player.room.clone()),
            recall_room: player.recall_room.clone(),
            inventory: self
                .items
                .inventory(session)
                .iter()
                .map(|i| i.item.keyword.clone())
                .collect(),
            equipment: self
                .items
                .equipment_of(session)
                .iter()
                .map(|(slot, i)| (*slot, i.item.keyword.clone()))
                .collect(),
            inbox: player.inbox.clone(),
            guild_id: player.guild_id.clone(),
            guild_rank: player.guild_rank,
        })
    }

    pub(crate) fn persist_player(&mut self, session: SessionId) {
        let Some(record) = self.record_of(session) else {
            return;
        };
        if let Err(e) = self.player_repo.save(&record) {
            // In-memory state stays authoritative; retry on the next flush.
            warn!(name = %record.name, error = %e, "player save failed");
            self.players.mark_dirty(session);
        }
    }

    /// Periodic flush of dirty players, guilds, and world features.
    fn persist_flush(&mut self) {
        let dirty_players = self.players.take_dirty();
        for session in &dirty_players {
            self.persist_player(*session);
        }
        let guild_records = self.guilds.take_dirty_records();
        for record in &guild_records {
            if let Err(e) = self.guild_repo.save(record) {
                warn!(guild = %record.id, error = %e, "guild save failed");
            }
        }
        let dirty_features = self.world_state.take_dirty();
        if !dirty_players.is_empty() || !guild_records.is_empty() || !dirty_features.is_empty() {
            debug!(
                players = dirty_players.len(),
                guilds = guild_records.len(),
                features = dirty_features.len(),
                "persistence flush"
            );
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Begin the shutdown sequence: warning, bus notice, delayed close.
    pub(crate) async fn begin_shutdown(&mut self, initiator: Option<String>) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        let by = initiator.unwrap_or_else(|| "the server".to_string());
        info!(%by, "shutdown initiated");
        self.broadcast_all(None, "The world shudders: shutdown imminent.")
            .await;
        if let Some(bus) = &self.inter_bus {
            bus.broadcast(InterEngineMessage::GlobalBroadcast {
                kind: BroadcastKind::Shutdown,
                sender_name: by,
                text: "shutdown imminent".to_string(),
                source_engine_id: self.engine_id.clone(),
            });
        }
        self.scheduler
            .schedule_in(self.now(), SHUTDOWN_GRACE_MS, TickAction::FinishShutdown);
    }

    async fn finish_shutdown(&mut self) {
        for session in self.players.sessions() {
            self.persist_player(session);
            self.bus.close(session).await;
        }
        self.persist_flush();
        self.stopped = true;
        info!("shutdown complete");
    }

    // =========================================================================
    // Inter-engine bus
    // =========================================================================

    async fn on_bus_message(&mut self, message: InterEngineMessage) {
        if message.source() == &self.engine_id {
            return;
        }
        match message {
            InterEngineMessage::GlobalBroadcast {
                kind,
                sender_name,
                text,
                ..
            } => {
                let line = match kind {
                    BroadcastKind::Gossip => format!("{} gossips: {}", sender_name, text),
                    BroadcastKind::Ooc => format!("[OOC] {}: {}", sender_name, text),
                    BroadcastKind::Shutdown => {
                        "The world shudders: shutdown imminent.".to_string()
                    }
                };
                self.broadcast_all(None, &line).await;
            }
            InterEngineMessage::Tell {
                from_name,
                to_name,
                text,
                ..
            } => {
                if let Some(target) = self.players.session_by_name(&to_name) {
                    self.bus
                        .send_text(target, format!("{} tells you: {}", from_name, text))
                        .await;
                }
                // Not our player: at-most-once, silently dropped.
            }
            InterEngineMessage::KickRequest {
                target_player_name, ..
            } => {
                if let Some(target) = self.players.session_by_name(&target_player_name) {
                    self.bus
                        .send_text(target, "You have been removed by staff.")
                        .await;
                    self.bus.close(target).await;
                }
            }
            InterEngineMessage::TransferRequest {
                staff_name,
                target_player_name,
                target_room,
                ..
            } => {
                if self.world.room(&target_room).is_none() {
                    return;
                }
                if let Some(target) = self.players.session_by_name(&target_player_name) {
                    handlers::admin::force_move(self, target, &target_room).await;
                    info!(%staff_name, %target_player_name, room = %target_room, "remote transfer applied");
                }
            }
            InterEngineMessage::ZoneHandoff {
                player_name,
                target_room,
                snapshot,
                ..
            } => {
                self.receive_handoff(&player_name, target_room, snapshot).await;
            }
        }
    }

    // =========================================================================
    // Zone handoff
    // =========================================================================

    /// Whether moving to `zone` leaves this engine.
    pub(crate) fn is_remote_zone(&self, zone: &str) -> Option<EngineId> {
        if self.inter_bus.is_none() {
            return None;
        }
        match self.config.engine_for_zone(zone) {
            Some(engine) if engine != &self.engine_id => Some(engine.clone()),
            _ => None,
        }
    }

    /// Snapshot, publish, and park the session. The local player record is
    /// gone once this returns.
    pub(crate) async fn hand_off(
        &mut self,
        session: SessionId,
        target_engine: EngineId,
        target_room: RoomId,
    ) {
        // Groups are engine-local; membership ends at the border.
        if let Some(group_id) = self.players.get(session).and_then(|p| p.group_id) {
            handlers::group::announce_departure(self, group_id, session).await;
            self.groups.remove_member(group_id, session);
        }
        self.combat.clear_session(session);

        let (inventory, equipment) = self.items.clear_session(session);
        let Some(state) = self.players.remove(session) else {
            return;
        };
        let secret = self
            .player_repo
            .find_by_name(&state.name)
            .ok()
            .flatten()
            .map(|r| r.secret)
            .unwrap_or_default();

        let snapshot = PlayerSnapshot {
            session,
            name: state.name.clone(),
            secret,
            hp: state.hp,
            level: state.level,
            xp_total: state.xp_total,
            gold: state.gold,
            is_staff: state.is_staff,
            recall_room: state.recall_room.clone(),
            guild_id: state.guild_id.clone(),
            guild_rank: state.guild_rank,
            inbox: state.inbox.clone(),
            inventory: inventory
                .iter()
                .map(|i| SnapshotItem {
                    template: i.item.keyword.clone(),
                    charges: i.item.charges,
                })
                .collect(),
            equipment: equipment
                .iter()
                .map(|(slot, i)| {
                    (
                        *slot,
                        SnapshotItem {
                            template: i.item.keyword.clone(),
                            charges: i.item.charges,
                        },
                    )
                })
                .collect(),
        };

        self.broadcast_room(&state.room, Some(session), &format!("{} leaves.", state.name))
            .await;
        self.sessions.insert(session, SessionPhase::HandedOff);

        let message = InterEngineMessage::ZoneHandoff {
            player_name: state.name.clone(),
            target_room,
            snapshot,
            source_engine_id: self.engine_id.clone(),
        };
        if let Some(bus) = &self.inter_bus {
            // The zone table names the owner, so a targeted send suffices.
            bus.send_to(&target_engine, message);
        }
        info!(name = %state.name, %session, target = %target_engine, "zone handoff published");
    }

    /// Materialize a handed-off player arriving from another engine.
    async fn receive_handoff(
        &mut self,
        player_name: &str,
        target_room: RoomId,
        snapshot: PlayerSnapshot,
    ) {
        if self.world.room(&target_room).is_none() {
            warn!(%player_name, room = %target_room, "handoff to unknown room dropped");
            return;
        }
        let session = snapshot.session;
        let world = Arc::clone(&self.world);

        for item in &snapshot.inventory {
            if let Some(template) = world.item_template(&item.template) {
                let mut instance = self.items.mint(template);
                instance.item.charges = item.charges;
                self.items.add_to_inventory(session, instance);
            }
        }
        for (slot, item) in &snapshot.equipment {
            if let Some(template) = world.item_template(&item.template) {
                if template.slot == Some(*slot) {
                    let mut instance = self.items.mint(template);
                    instance.item.charges = item.charges;
                    self.items.equip(session, instance);
                }
            }
        }

        let armor = self.items.equipped_armor_total(session);
        let base = crate::constants::BASE_MAX_HP;
        let max_hp = base + armor;
        let state = PlayerState {
            name: snapshot.name.clone(),
            session,
            room: target_room.clone(),
            hp: snapshot.hp.clamp(1, max_hp),
            max_hp,
            base_max_hp: base,
            level: snapshot.level,
            xp_total: snapshot.xp_total,
            gold: snapshot.gold,
            is_staff: snapshot.is_staff,
            guild_id: snapshot.guild_id.clone(),
            guild_rank: snapshot.guild_rank,
            group_id: None,
            recall_room: snapshot.recall_room.clone(),
            recall_ready_at_ms: 0,
            inbox: snapshot.inbox.clone(),
            mail_compose: None,
            dialogue: None,
            prompt_format: None,
            login_seq: 0,
        };
        self.players.adopt(state);
        self.sessions.insert(session, SessionPhase::Playing);
        self.players.mark_dirty(session);

        info!(name = %player_name, %session, room = %target_room, "handoff received");
        self.broadcast_room(&target_room, Some(session), &format!("{} enters.", player_name))
            .await;
        handlers::ui::send_room_look(self, session).await;
        let prompt = self.prompt_for(session);
        self.bus.send_prompt(session, prompt).await;
    }
}

async fn recv_bus(
    rx: &mut Option<mpsc::UnboundedReceiver<InterEngineMessage>>,
) -> InterEngineMessage {
    match rx {
        Some(rx) => match rx.recv().await {
            Some(message) => message,
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::clock::MutableClock;
    use crate::config::InstanceConfig;
    use crate::db::{MemoryGuildRepository, MemoryPlayerRepository};
    use crate::outbound::OutboundEvent;
    use crate::types::ItemSlot;
    use crate::world::demo_world;

    fn rid(s: &str) -> RoomId {
        s.parse().unwrap()
    }

    /// One engine plus per-session outbound receivers and a hand-driven
    /// clock.
    struct Harness {
        engine: Engine,
        clock: Arc<MutableClock>,
        bus: Arc<OutboundBus>,
        repo: Arc<MemoryPlayerRepository>,
        rxs: HashMap<SessionId, mpsc::Receiver<OutboundEvent>>,
        next_session: u64,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(EngineConfig::default(), None)
        }

        fn with_config(config: EngineConfig, inter_bus: Option<Box<dyn InterEngineBus>>) -> Self {
            let clock = Arc::new(MutableClock::new(0));
            let bus = Arc::new(OutboundBus::new());
            let repo = Arc::new(MemoryPlayerRepository::new());
            let engine = Engine::new(EngineDeps {
                config,
                world: Arc::new(demo_world().unwrap()),
                clock: Arc::clone(&clock) as Arc<dyn Clock>,
                bus: Arc::clone(&bus),
                player_repo: Arc::clone(&repo) as Arc<dyn PlayerRepository>,
                guild_repo: Arc::new(MemoryGuildRepository::new()),
                inter_bus,
                location_index: None,
                rng_seed: Some(7),
            })
            .unwrap();
            Self {
                engine,
                clock,
                bus,
                repo,
                rxs: HashMap::new(),
                next_session: 0,
            }
        }

        async fn connect(&mut self, name: &str) -> SessionId {
            self.next_session += 1;
            let session = SessionId(self.next_session);
            let rx = self.bus.register(session);
            self.rxs.insert(session, rx);
            self.engine
                .handle_input(EngineInput::Connected { session })
                .await;
            self.line(session, name).await;
            self.line(session, "pw").await;
            self.drain(session);
            session
        }

        async fn line(&mut self, session: SessionId, line: &str) {
            self.engine
                .handle_input(EngineInput::Line {
                    session,
                    line: line.to_string(),
                })
                .await;
        }

        fn drain(&mut self, session: SessionId) -> Vec<OutboundEvent> {
            let mut events = Vec::new();
            if let Some(rx) = self.rxs.get_mut(&session) {
                while let Ok(event) = rx.try_recv() {
                    events.push(event);
                }
            }
            events
        }

        fn room_of(&self, session: SessionId) -> RoomId {
            self.engine.players.get(session).unwrap().room.clone()
        }
    }

    fn texts(events: &[OutboundEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::Text { text, .. }
                | OutboundEvent::Info { text, .. }
                | OutboundEvent::Error { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn has_error(events: &[OutboundEvent]) -> bool {
        events
            .iter()
            .any(|e| matches!(e, OutboundEvent::Error { .. }))
    }

    fn ends_with_prompt(events: &[OutboundEvent]) -> bool {
        matches!(events.last(), Some(OutboundEvent::Prompt { .. }))
    }

    /// A bus that records every publication for assertions.
    #[derive(Default)]
    struct RecordingBus {
        sent: Mutex<Vec<(Option<EngineId>, InterEngineMessage)>>,
    }

    struct RecordingHandle(Arc<RecordingBus>);

    impl InterEngineBus for RecordingHandle {
        fn send_to(&self, target: &EngineId, message: InterEngineMessage) {
            self.0
                .sent
                .lock()
                .unwrap()
                .push((Some(target.clone()), message));
        }

        fn broadcast(&self, message: InterEngineMessage) {
            self.0.sent.lock().unwrap().push((None, message));
        }
    }

    fn sharded_config(engine_id: &str) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.server.engine_id = engine_id.to_string();
        config.instances = vec![
            InstanceConfig {
                engine_id: "e1".into(),
                address: "127.0.0.1:4000".into(),
                zones: vec!["town".into()],
            },
            InstanceConfig {
                engine_id: "e2".into(),
                address: "127.0.0.1:4200".into(),
                zones: vec!["wilds".into()],
            },
        ];
        config
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn login_lands_in_the_start_room() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        assert_eq!(h.room_of(alice), rid("town:square"));
        assert!(h.repo.find_by_name("alice").unwrap().is_some());
    }

    #[tokio::test]
    async fn relogin_takes_over_and_closes_the_old_session() {
        let mut h = Harness::new();
        let first = h.connect("Alice").await;
        let second = h.connect("Alice").await;

        let old_events = h.drain(first);
        let old_texts = texts(&old_events);
        assert!(old_texts.iter().any(|t| t == "You have been disconnected."));
        assert!(old_events
            .iter()
            .any(|e| matches!(e, OutboundEvent::Close { .. })));

        assert!(h.engine.players.get(first).is_none());
        assert_eq!(h.engine.players.by_name("alice").unwrap().session, second);
    }

    #[tokio::test]
    async fn wrong_password_reprompts_for_a_name() {
        let mut h = Harness::new();
        h.connect("Alice").await;
        h.line(SessionId(1), "quit").await;

        h.next_session += 1;
        let intruder = SessionId(h.next_session);
        let rx = h.bus.register(intruder);
        h.rxs.insert(intruder, rx);
        h.engine
            .handle_input(EngineInput::Connected { session: intruder })
            .await;
        h.line(intruder, "Alice").await;
        h.line(intruder, "wrong").await;
        let events = h.drain(intruder);
        assert!(texts(&events).iter().any(|t| t == "Wrong password."));
        assert!(h.engine.players.get(intruder).is_none());
    }

    // -------------------------------------------------------------------------
    // Movement
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn movement_blocked_without_exit() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;

        h.line(alice, "s").await;
        let events = h.drain(alice);
        assert!(texts(&events).iter().any(|t| t == "You can't go that way."));
        assert!(ends_with_prompt(&events));
        assert_eq!(h.room_of(alice), rid("town:square"));
    }

    #[tokio::test]
    async fn movement_updates_room_and_broadcasts() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.drain(alice);

        h.line(alice, "n").await;
        assert_eq!(h.room_of(alice), rid("town:gate"));
        let bob_sees = texts(&h.drain(bob));
        assert!(bob_sees.iter().any(|t| t == "Alice leaves."));
        let alice_sees = texts(&h.drain(alice));
        assert!(alice_sees.iter().any(|t| t == "The North Gate"));
    }

    #[tokio::test]
    async fn recall_enforces_its_cooldown() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "e").await;
        h.drain(alice);

        h.line(alice, "recall").await;
        assert_eq!(h.room_of(alice), rid("town:square"));
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "You recall."));

        h.line(alice, "recall").await;
        let events = texts(&h.drain(alice));
        assert!(events.iter().any(|t| t == "300 seconds remaining"));

        h.clock.advance(300_000);
        h.line(alice, "recall").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "You recall."));
    }

    // -------------------------------------------------------------------------
    // Communication
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn tell_reaches_a_local_player() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.drain(alice);

        h.line(alice, "tell Bob hi").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "You tell Bob: hi"));
        assert!(texts(&h.drain(bob)).iter().any(|t| t == "Alice tells you: hi"));
    }

    #[tokio::test]
    async fn tell_routes_cross_engine_through_the_index() {
        struct PinnedIndex;
        impl PlayerLocationIndex for PinnedIndex {
            fn lookup_engine_id(&self, name: &str) -> Option<EngineId> {
                (name.eq_ignore_ascii_case("bob")).then(|| "e2".to_string())
            }
        }

        let recorder = Arc::new(RecordingBus::default());
        let mut h = Harness::with_config(
            sharded_config("e1"),
            Some(Box::new(RecordingHandle(Arc::clone(&recorder)))),
        );
        h.engine.location_index = Some(Arc::new(PinnedIndex));
        let alice = h.connect("Alice").await;

        h.line(alice, "tell Bob hi").await;
        let events = h.drain(alice);
        assert!(texts(&events).iter().any(|t| t == "You tell Bob: hi"));
        assert!(!has_error(&events));

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (target, message) = &sent[0];
        assert_eq!(target.as_deref(), Some("e2"));
        match message {
            InterEngineMessage::Tell {
                from_name,
                to_name,
                text,
                ..
            } => {
                assert_eq!(from_name, "Alice");
                assert_eq!(to_name, "Bob");
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn tell_without_bus_is_no_such_player() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "tell Ghost hi").await;
        let events = h.drain(alice);
        assert!(has_error(&events));
        assert!(texts(&events).iter().any(|t| t == "No such player."));
    }

    #[tokio::test]
    async fn pose_requires_the_senders_name() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "pose dances wildly").await;
        assert!(has_error(&h.drain(alice)));
        h.line(alice, "pose Alice dances wildly").await;
        let events = h.drain(alice);
        assert!(!has_error(&events));
        assert!(texts(&events).iter().any(|t| t == "Alice dances wildly"));
    }

    #[tokio::test]
    async fn shout_is_zone_scoped() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        // Bob walks out of the zone.
        h.line(bob, "n").await;
        h.line(bob, "n").await;
        h.drain(alice);
        h.drain(bob);
        assert_eq!(h.room_of(bob), rid("wilds:road"));

        h.line(alice, "shout oi").await;
        assert!(texts(&h.drain(bob)).is_empty());

        let cora = h.connect("Cora").await;
        h.drain(alice);
        h.line(alice, "shout oi").await;
        assert!(texts(&h.drain(cora)).iter().any(|t| t == "[SHOUT] Alice: oi"));
    }

    // -------------------------------------------------------------------------
    // Shop economy
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn buy_then_sell_at_configured_multipliers() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.engine.players.get_mut(alice).unwrap().gold = 100;
        h.line(alice, "e").await;
        h.drain(alice);

        h.line(alice, "buy sword").await;
        let bought = texts(&h.drain(alice));
        assert!(bought.iter().any(|t| t.contains("50 gold")));
        assert_eq!(h.engine.players.get(alice).unwrap().gold, 50);
        assert_eq!(h.engine.items.inventory(alice).len(), 1);

        h.line(alice, "sell sword").await;
        let sold = texts(&h.drain(alice));
        assert!(sold.iter().any(|t| t.contains("25 gold")));
        assert_eq!(h.engine.players.get(alice).unwrap().gold, 75);
        assert!(h.engine.items.inventory(alice).is_empty());
    }

    #[tokio::test]
    async fn shop_rejects_unknown_and_unaffordable() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "e").await;
        h.drain(alice);

        h.line(alice, "buy moon").await;
        assert!(texts(&h.drain(alice))
            .iter()
            .any(|t| t == "This shop doesn't sell that."));

        h.line(alice, "buy sword").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "You can't afford that."));
    }

    #[tokio::test]
    async fn selling_worthless_items_is_refused() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "e").await;
        h.drain(alice);
        // The rusty key has base price 0.
        let template = h.engine.world.item_template("rusty_key").unwrap().clone();
        let key = h.engine.items.mint(&template);
        h.engine.items.add_to_inventory(alice, key);

        h.line(alice, "sell rusty_key").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "That's worthless."));
        assert_eq!(h.engine.items.inventory(alice).len(), 1);
    }

    #[tokio::test]
    async fn no_shop_outside_shop_rooms() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "list").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "There is no shop here."));
    }

    // -------------------------------------------------------------------------
    // Mail
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn mail_compose_delivers_to_an_online_player() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.drain(alice);
        let bob_inbox_before = h.engine.players.get(bob).unwrap().inbox.len();

        h.line(alice, "mail send Bob").await;
        h.line(alice, "Hello Bob,").await;
        h.line(alice, "How are you?").await;
        h.line(alice, ".").await;

        let inbox = &h.engine.players.get(bob).unwrap().inbox;
        assert_eq!(inbox.len(), bob_inbox_before + 1);
        let message = inbox.last().unwrap();
        assert_eq!(message.from_name, "Alice");
        assert_eq!(message.body, "Hello Bob,\nHow are you?");
        assert!(!message.read);
        assert!(h.engine.players.get(alice).unwrap().mail_compose.is_none());
        assert!(texts(&h.drain(bob)).iter().any(|t| t == "You have new mail."));
    }

    #[tokio::test]
    async fn mail_delivers_offline_through_the_repository() {
        let mut h = Harness::new();
        let bob = h.connect("Bob").await;
        h.line(bob, "quit").await;
        let alice = h.connect("Alice").await;

        h.line(alice, "mail send Bob").await;
        h.line(alice, "Returning your ferret.").await;
        h.line(alice, ".").await;
        h.drain(alice);

        let record = h.repo.find_by_name("bob").unwrap().unwrap();
        let fresh = record.inbox.last().unwrap();
        assert_eq!(fresh.from_name, "Alice");
        assert_eq!(fresh.body, "Returning your ferret.");
    }

    #[tokio::test]
    async fn mail_send_while_composing_is_a_conflict() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.connect("Bob").await;
        h.drain(alice);

        h.line(alice, "mail send Bob").await;
        h.line(alice, "mail send Bob").await;
        assert!(texts(&h.drain(alice))
            .iter()
            .any(|t| t == "You are already composing a letter."));
        // Still composing; an abort resolves it.
        h.line(alice, "mail abort").await;
        assert!(h.engine.players.get(alice).unwrap().mail_compose.is_none());
    }

    #[tokio::test]
    async fn empty_mail_is_rejected_and_delete_restores_inbox_size() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.drain(alice);

        h.line(alice, "mail send Bob").await;
        h.line(alice, ".").await;
        assert!(has_error(&h.drain(alice)));
        assert!(h.engine.players.get(alice).unwrap().mail_compose.is_some());
        h.line(alice, "mail abort").await;

        let before = h.engine.players.get(bob).unwrap().inbox.len();
        h.line(alice, "mail send Bob").await;
        h.line(alice, "short note").await;
        h.line(alice, ".").await;
        assert_eq!(h.engine.players.get(bob).unwrap().inbox.len(), before + 1);
        h.drain(bob);
        h.line(bob, "mail delete 1").await;
        assert_eq!(h.engine.players.get(bob).unwrap().inbox.len(), before);
    }

    // -------------------------------------------------------------------------
    // Items and equipment
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn wear_give_conserves_instances_and_stats() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.drain(alice);

        let cap_template = h.engine.world.item_template("cap").unwrap().clone();
        let cap = h.engine.items.mint(&cap_template);
        h.engine.items.put_in_room(rid("town:square"), cap);
        let world_count = h.engine.items.instance_count();

        h.line(alice, "get cap").await;
        h.line(alice, "wear cap").await;
        {
            let p = h.engine.players.get(alice).unwrap();
            assert_eq!((p.hp, p.max_hp), (11, 11));
        }

        h.line(alice, "give cap Bob").await;
        {
            let p = h.engine.players.get(alice).unwrap();
            assert_eq!((p.hp, p.max_hp), (10, 10));
        }
        assert!(h.engine.items.equipped(alice, ItemSlot::Head).is_none());
        assert_eq!(h.engine.items.inventory(bob).len(), 1);
        assert_eq!(h.engine.items.instance_count(), world_count);
    }

    #[tokio::test]
    async fn wear_then_remove_round_trips() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let cap_template = h.engine.world.item_template("cap").unwrap().clone();
        let cap = h.engine.items.mint(&cap_template);
        let cap_id = cap.id;
        h.engine.items.add_to_inventory(alice, cap);

        h.line(alice, "wear cap").await;
        h.line(alice, "remove head").await;
        let p = h.engine.players.get(alice).unwrap();
        assert_eq!((p.hp, p.max_hp), (10, 10));
        let inventory = h.engine.items.inventory(alice);
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].id, cap_id);
    }

    #[tokio::test]
    async fn drop_then_get_keeps_instance_identity() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let template = h.engine.world.item_template("bread").unwrap().clone();
        let bread = h.engine.items.mint(&template);
        let bread_id = bread.id;
        h.engine.items.add_to_inventory(alice, bread);

        h.line(alice, "drop bread").await;
        assert!(h.engine.items.inventory(alice).is_empty());
        h.line(alice, "get bread").await;
        assert_eq!(h.engine.items.inventory(alice)[0].id, bread_id);
    }

    #[tokio::test]
    async fn consumables_burn_out() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.engine.players.get_mut(alice).unwrap().hp = 5;
        let template = h.engine.world.item_template("bread").unwrap().clone();
        let bread = h.engine.items.mint(&template);
        h.engine.items.add_to_inventory(alice, bread);

        h.line(alice, "use bread").await;
        assert_eq!(h.engine.players.get(alice).unwrap().hp, 8);
        assert_eq!(h.engine.items.inventory(alice)[0].item.charges, 1);

        h.line(alice, "use bread").await;
        let events = texts(&h.drain(alice));
        assert!(events.iter().any(|t| t.contains("crumbles")));
        assert!(h.engine.items.inventory(alice).is_empty());
    }

    // -------------------------------------------------------------------------
    // World features
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn locked_trapdoor_needs_the_key() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;

        h.line(alice, "d").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "The trapdoor is locked."));

        h.line(alice, "unlock trapdoor").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "You don't have the key."));

        // Fetch the key from the gate.
        h.line(alice, "n").await;
        h.line(alice, "get rusty_key").await;
        h.line(alice, "s").await;
        h.drain(alice);

        h.line(alice, "unlock trapdoor").await;
        h.line(alice, "open trapdoor").await;
        h.line(alice, "d").await;
        h.drain(alice);
        assert_eq!(h.room_of(alice), rid("town:cellar"));
    }

    #[tokio::test]
    async fn containers_gate_on_open_state() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "e").await;
        h.drain(alice);

        h.line(alice, "search crate").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "The crate is closed."));

        h.line(alice, "open crate").await;
        h.line(alice, "search crate").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t.contains("a leather cap")));

        h.line(alice, "get cap from crate").await;
        assert_eq!(h.engine.items.inventory(alice).len(), 1);

        h.line(alice, "put cap in crate").await;
        assert!(h.engine.items.inventory(alice).is_empty());
        assert_eq!(h.engine.world_state.contained_item_count(), 1);
    }

    #[tokio::test]
    async fn the_winch_opens_the_trapdoor() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        // Staff shortcut into the cellar to reach the winch.
        h.engine.players.get_mut(alice).unwrap().is_staff = true;
        h.line(alice, "goto cellar").await;
        h.drain(alice);

        h.line(alice, "pull winch").await;
        h.line(alice, "u").await;
        h.drain(alice);
        h.line(alice, "d").await;
        h.drain(alice);
        assert_eq!(h.room_of(alice), rid("town:cellar"));
    }

    #[tokio::test]
    async fn signs_read_their_static_text() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "n").await;
        h.drain(alice);
        h.line(alice, "read sign").await;
        assert!(texts(&h.drain(alice))
            .iter()
            .any(|t| t.contains("Travellers beyond this gate")));
    }

    // -------------------------------------------------------------------------
    // Combat
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn killing_a_mob_awards_xp_and_schedules_respawn() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.engine.players.get_mut(alice).unwrap().is_staff = true;
        h.line(alice, "goto cellar").await;
        h.drain(alice);

        h.line(alice, "kill rat").await;
        assert!(h.engine.combat.is_engaged(alice));

        // Leave the rat one hit from death, then land the swing.
        let rat = h.engine.mobs.find_in_room(&rid("town:cellar"), "rat").unwrap().id;
        h.engine.mobs.get_mut(rat).unwrap().hp = 1;
        h.clock.advance(2_000);
        h.engine.tick().await;

        let events = texts(&h.drain(alice));
        assert!(events.iter().any(|t| t.contains("collapses")));
        assert!(!h.engine.combat.is_engaged(alice));
        assert_eq!(h.engine.players.get(alice).unwrap().xp_total, 50);
        // The pelt dropped where the rat died.
        assert!(h
            .engine
            .items
            .room_items(&rid("town:cellar"))
            .iter()
            .any(|i| i.matches("pelt")));

        // Respawn fires after the configured delay.
        h.clock.advance(60_000);
        h.engine.tick().await;
        assert!(h.engine.mobs.find_in_room(&rid("town:cellar"), "rat").is_some());
    }

    #[tokio::test]
    async fn movement_is_blocked_while_fighting() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.engine.players.get_mut(alice).unwrap().is_staff = true;
        h.line(alice, "goto cellar").await;
        h.drain(alice);
        h.line(alice, "kill rat").await;
        h.drain(alice);

        h.line(alice, "u").await;
        assert!(has_error(&h.drain(alice)));
        assert_eq!(h.room_of(alice), rid("town:cellar"));
    }

    #[tokio::test]
    async fn group_members_in_zone_share_kill_xp() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.line(alice, "group invite Bob").await;
        h.line(bob, "group accept").await;
        h.drain(alice);
        h.drain(bob);

        h.engine.award_kill_xp(alice, 101).await;
        // 101 split two ways: 50 each, remainder to the killer.
        assert_eq!(h.engine.players.get(alice).unwrap().xp_total, 51);
        assert_eq!(h.engine.players.get(bob).unwrap().xp_total, 50);
    }

    #[tokio::test]
    async fn spells_respect_cooldowns() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.engine.players.get_mut(alice).unwrap().hp = 4;

        h.line(alice, "cast mend").await;
        let hp_after = h.engine.players.get(alice).unwrap().hp;
        assert!(hp_after > 4);

        h.line(alice, "cast mend").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t.contains("not ready")));
    }

    #[tokio::test]
    async fn buffs_appear_in_effects_and_expire() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "cast aegis").await;
        h.line(alice, "effects").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t.contains("aegis")));

        h.clock.advance(31_000);
        h.line(alice, "effects").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "You feel quite ordinary."));
    }

    // -------------------------------------------------------------------------
    // Dialogue
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn dialogue_choices_set_recall_and_end() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "w").await;
        h.drain(alice);

        h.line(alice, "talk priest").await;
        let opening = texts(&h.drain(alice));
        assert!(opening.iter().any(|t| t.contains("What do you seek?")));
        assert!(opening.iter().any(|t| t.starts_with("1.")));

        h.line(alice, "1").await;
        assert_eq!(
            h.engine.players.get(alice).unwrap().recall_room,
            Some(rid("town:temple"))
        );
        h.line(alice, "1").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "The conversation ends."));
        assert!(h.engine.players.get(alice).unwrap().dialogue.is_none());
    }

    #[tokio::test]
    async fn bare_digits_outside_dialogue_are_noise() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "3").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "Huh?"));
    }

    // -------------------------------------------------------------------------
    // Admin
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn admin_commands_are_staff_gated() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "goto town:gate").await;
        let events = h.drain(alice);
        assert!(texts(&events).iter().any(|t| t == "You are not staff."));
        assert_eq!(h.room_of(alice), rid("town:square"));
    }

    #[tokio::test]
    async fn goto_resolves_partial_room_specs() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.engine.players.get_mut(alice).unwrap().is_staff = true;

        h.line(alice, "goto gate").await;
        assert_eq!(h.room_of(alice), rid("town:gate"));
        h.line(alice, "goto wilds:").await;
        assert_eq!(h.room_of(alice), rid("wilds:road"));
        h.line(alice, "goto town:square").await;
        assert_eq!(h.room_of(alice), rid("town:square"));
        h.line(alice, "goto nowhere:atall").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "No such room."));
    }

    #[tokio::test]
    async fn setlevel_clamps_and_syncs_xp() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.engine.players.get_mut(alice).unwrap().is_staff = true;

        h.line(alice, "setlevel Bob 999").await;
        let p = h.engine.players.get(bob).unwrap();
        assert_eq!(p.level, 50);
        assert_eq!(p.xp_total, h.engine.progression.total_xp_for_level(50));
    }

    #[tokio::test]
    async fn kick_closes_the_target_not_yourself() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;
        h.engine.players.get_mut(alice).unwrap().is_staff = true;

        h.line(alice, "kick Alice").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "You cannot kick yourself."));

        h.line(alice, "kick Bob").await;
        let bob_events = h.drain(bob);
        assert!(bob_events
            .iter()
            .any(|e| matches!(e, OutboundEvent::Close { .. })));
    }

    // -------------------------------------------------------------------------
    // Zone handoff across engines
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn cross_zone_move_hands_the_player_to_the_other_engine() {
        let network = crate::bus::LocalBusNetwork::new();
        let mut rx1 = network.register("e1".into());
        let mut rx2 = network.register("e2".into());

        let mut h1 = Harness::with_config(
            sharded_config("e1"),
            Some(Box::new(network.handle("e1".into()))),
        );
        let mut h2 = Harness::with_config(
            sharded_config("e2"),
            Some(Box::new(network.handle("e2".into()))),
        );

        let alice = h1.connect("Alice").await;
        // The frontend keeps the socket; mirror its registration on e2.
        let rx_on_e2 = h2.bus.register(alice);
        h2.rxs.insert(alice, rx_on_e2);

        h1.line(alice, "n").await; // town:gate
        h1.line(alice, "n").await; // crosses into the wilds
        assert!(h1.engine.players.get(alice).is_none());

        let message = rx2.try_recv().expect("handoff should be published");
        match &message {
            InterEngineMessage::ZoneHandoff {
                player_name,
                target_room,
                ..
            } => {
                assert_eq!(player_name, "Alice");
                assert_eq!(target_room, &rid("wilds:road"));
            }
            other => panic!("unexpected message {:?}", other),
        }
        h2.engine.handle_input(EngineInput::Bus(message)).await;

        assert_eq!(h2.room_of(alice), rid("wilds:road"));
        let arrival = texts(&h2.drain(alice));
        assert!(arrival.iter().any(|t| t == "The Wilds Road"));

        // The origin engine parks the session.
        h1.line(alice, "look").await;
        assert!(texts(&h1.drain(alice)).iter().any(|t| t == "You are between worlds."));
        assert!(rx1.try_recv().is_err());
    }

    // -------------------------------------------------------------------------
    // Groups and guilds
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn group_invite_accept_and_gtell() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;

        h.line(alice, "group invite Bob").await;
        assert!(texts(&h.drain(bob)).iter().any(|t| t.contains("invites you")));
        h.line(bob, "group accept").await;
        h.drain(alice);
        h.drain(bob);

        h.line(alice, "gt onward friends").await;
        assert!(texts(&h.drain(bob))
            .iter()
            .any(|t| t == "[Group] Alice: onward friends"));

        // Grouped players are flagged in who.
        h.line(alice, "who").await;
        assert!(texts(&h.drain(alice)).iter().any(|t| t == "  [G] Alice"));
    }

    #[tokio::test]
    async fn guild_lifecycle_create_invite_promote_disband() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        let bob = h.connect("Bob").await;

        h.line(alice, "guild create ROSE Order of the Rose").await;
        assert_eq!(
            h.engine.players.get(alice).unwrap().guild_rank,
            Some(crate::types::GuildRank::Leader)
        );

        h.line(alice, "guild invite Bob").await;
        h.line(bob, "guild accept").await;
        assert_eq!(
            h.engine.players.get(bob).unwrap().guild_id.as_deref(),
            Some("order_of_the_rose")
        );

        h.line(alice, "guild promote Bob").await;
        assert_eq!(
            h.engine.players.get(bob).unwrap().guild_rank,
            Some(crate::types::GuildRank::Officer)
        );

        h.drain(bob);
        h.line(alice, "gchat rally at dawn").await;
        assert!(texts(&h.drain(bob))
            .iter()
            .any(|t| t == "[ROSE] Alice: rally at dawn"));

        h.line(alice, "guild disband").await;
        assert!(h.engine.players.get(alice).unwrap().guild_id.is_none());
        assert!(h.engine.players.get(bob).unwrap().guild_id.is_none());
        assert!(h.engine.guilds.get("order_of_the_rose").is_none());
    }

    // -------------------------------------------------------------------------
    // Ordering and prompts
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn every_command_ends_with_exactly_one_prompt() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        for line in ["look", "score", "bogus", "get nothing", "who"] {
            h.line(alice, line).await;
            let events = h.drain(alice);
            let prompts = events
                .iter()
                .filter(|e| matches!(e, OutboundEvent::Prompt { .. }))
                .count();
            assert_eq!(prompts, 1, "line {:?} produced {} prompts", line, prompts);
            assert!(ends_with_prompt(&events), "line {:?}", line);
        }
    }

    #[tokio::test]
    async fn quit_closes_without_a_prompt() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "quit").await;
        let events = h.drain(alice);
        assert!(matches!(events.last(), Some(OutboundEvent::Close { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, OutboundEvent::Prompt { .. })));
        assert!(h.engine.players.get(alice).is_none());
    }

    #[tokio::test]
    async fn custom_prompts_render_hp() {
        let mut h = Harness::new();
        let alice = h.connect("Alice").await;
        h.line(alice, "prompt <%h/%H>").await;
        h.line(alice, "look").await;
        let events = h.drain(alice);
        match events.last() {
            Some(OutboundEvent::Prompt { text, .. }) => assert_eq!(text, "<10/10>"),
            other => panic!("expected prompt, got {:?}", other),
        }
    }
}
