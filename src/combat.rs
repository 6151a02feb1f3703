//! Combat engagement state, damage rolls, spells, and timed effects.
//!
//! The system tracks who is swinging at what and when the next swing lands;
//! the engine's scheduler actions drive the actual exchanges. All
//! randomness flows through the RNG handed in by the caller so tests can
//! pin outcomes.

use std::collections::HashMap;

use rand::Rng;

use crate::config::CombatConfig;
use crate::types::{MobId, SessionId};

/// Per-session state while engaged.
#[derive(Debug, Clone)]
pub struct CombatState {
    pub target: MobId,
    pub next_swing_due_at_ms: u64,
    /// Defense from equipment, cached; refreshed on every equipment change.
    pub defense: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpellKind {
    Damage,
    Heal,
    Buff { defense: i32, duration_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct SpellDef {
    pub name: &'static str,
    pub kind: SpellKind,
    pub min: i32,
    pub max: i32,
    pub cooldown_ms: u64,
}

/// The built-in ability table.
const SPELLS: &[SpellDef] = &[
    SpellDef {
        name: "ember",
        kind: SpellKind::Damage,
        min: 2,
        max: 6,
        cooldown_ms: 4_000,
    },
    SpellDef {
        name: "mend",
        kind: SpellKind::Heal,
        min: 3,
        max: 6,
        cooldown_ms: 6_000,
    },
    SpellDef {
        name: "aegis",
        kind: SpellKind::Buff {
            defense: 2,
            duration_ms: 30_000,
        },
        min: 0,
        max: 0,
        cooldown_ms: 60_000,
    },
];

/// A named, timed defense buff.
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub name: String,
    pub defense: i32,
    pub expires_at_ms: u64,
}

pub struct CombatSystem {
    config: CombatConfig,
    engagements: HashMap<SessionId, CombatState>,
    effects: HashMap<SessionId, Vec<ActiveEffect>>,
    /// `(session, spell)` -> engine-clock instant the spell is ready again.
    cooldowns: HashMap<(SessionId, String), u64>,
}

impl CombatSystem {
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            engagements: HashMap::new(),
            effects: HashMap::new(),
            cooldowns: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Engagement
    // -------------------------------------------------------------------------

    pub fn engage(&mut self, session: SessionId, target: MobId, now_ms: u64, defense: i32) {
        self.engagements.insert(
            session,
            CombatState {
                target,
                next_swing_due_at_ms: now_ms + self.config.swing_interval_ms,
                defense,
            },
        );
    }

    pub fn disengage(&mut self, session: SessionId) -> Option<CombatState> {
        self.engagements.remove(&session)
    }

    pub fn state(&self, session: SessionId) -> Option<&CombatState> {
        self.engagements.get(&session)
    }

    pub fn state_mut(&mut self, session: SessionId) -> Option<&mut CombatState> {
        self.engagements.get_mut(&session)
    }

    pub fn target_of(&self, session: SessionId) -> Option<MobId> {
        self.engagements.get(&session).map(|s| s.target)
    }

    pub fn is_engaged(&self, session: SessionId) -> bool {
        self.engagements.contains_key(&session)
    }

    /// Sessions currently targeting `mob`.
    pub fn attackers_of(&self, mob: MobId) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self
            .engagements
            .iter()
            .filter_map(|(s, c)| (c.target == mob).then_some(*s))
            .collect();
        sessions.sort();
        sessions
    }

    /// Refresh the cached equipment defense, if engaged.
    pub fn refresh_defense(&mut self, session: SessionId, armor_total: i32) {
        if let Some(state) = self.engagements.get_mut(&session) {
            state.defense = armor_total;
        }
    }

    // -------------------------------------------------------------------------
    // Rolls
    // -------------------------------------------------------------------------

    /// Uniform roll in `[min_damage, max_damage]`, plus a flat weapon bonus.
    pub fn roll_damage(&self, rng: &mut impl Rng, weapon_bonus: i32) -> i32 {
        rng.gen_range(self.config.min_damage..=self.config.max_damage) + weapon_bonus
    }

    pub fn roll_flee(&self, rng: &mut impl Rng) -> bool {
        rng.gen_bool(self.config.flee_chance)
    }

    // -------------------------------------------------------------------------
    // Spells and effects
    // -------------------------------------------------------------------------

    pub fn spells() -> &'static [SpellDef] {
        SPELLS
    }

    pub fn find_spell(name: &str) -> Option<&'static SpellDef> {
        SPELLS.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// `Ok` if off cooldown, else the milliseconds remaining.
    pub fn spell_ready(&self, session: SessionId, spell: &str, now_ms: u64) -> Result<(), u64> {
        match self.cooldowns.get(&(session, spell.to_string())) {
            Some(&ready_at) if ready_at > now_ms => Err(ready_at - now_ms),
            _ => Ok(()),
        }
    }

    pub fn start_cooldown(&mut self, session: SessionId, spell: &SpellDef, now_ms: u64) {
        self.cooldowns.insert(
            (session, spell.name.to_string()),
            now_ms + spell.cooldown_ms,
        );
    }

    pub fn add_effect(&mut self, session: SessionId, effect: ActiveEffect) {
        let effects = self.effects.entry(session).or_default();
        effects.retain(|e| e.name != effect.name);
        effects.push(effect);
    }

    /// Drop expired effects and return the active rest.
    pub fn active_effects(&mut self, session: SessionId, now_ms: u64) -> Vec<ActiveEffect> {
        let Some(effects) = self.effects.get_mut(&session) else {
            return Vec::new();
        };
        effects.retain(|e| e.expires_at_ms > now_ms);
        effects.clone()
    }

    pub fn remove_effect(&mut self, session: SessionId, name: &str) -> bool {
        let Some(effects) = self.effects.get_mut(&session) else {
            return false;
        };
        let before = effects.len();
        effects.retain(|e| !e.name.eq_ignore_ascii_case(name));
        effects.len() != before
    }

    /// Extra defense granted by active buffs.
    pub fn effect_defense_bonus(&mut self, session: SessionId, now_ms: u64) -> i32 {
        self.active_effects(session, now_ms)
            .iter()
            .map(|e| e.defense)
            .sum()
    }

    /// Forget everything about a session (logout, handoff, death cleanup).
    pub fn clear_session(&mut self, session: SessionId) {
        self.engagements.remove(&session);
        self.effects.remove(&session);
        self.cooldowns.retain(|(s, _), _| *s != session);
    }

    /// Rebind combat bookkeeping after a login takeover.
    pub fn rebind_session(&mut self, from: SessionId, to: SessionId) {
        if let Some(state) = self.engagements.remove(&from) {
            self.engagements.insert(to, state);
        }
        if let Some(effects) = self.effects.remove(&from) {
            self.effects.insert(to, effects);
        }
        let moved: Vec<(String, u64)> = self
            .cooldowns
            .iter()
            .filter(|((s, _), _)| *s == from)
            .map(|((_, spell), at)| (spell.clone(), *at))
            .collect();
        self.cooldowns.retain(|(s, _), _| *s != from);
        for (spell, at) in moved {
            self.cooldowns.insert((to, spell), at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn system() -> CombatSystem {
        CombatSystem::new(CombatConfig::default())
    }

    #[test]
    fn engage_sets_next_swing() {
        let mut combat = system();
        combat.engage(SessionId(1), MobId(7), 1_000, 2);
        let state = combat.state(SessionId(1)).unwrap();
        assert_eq!(state.target, MobId(7));
        assert_eq!(state.next_swing_due_at_ms, 3_000);
        assert_eq!(state.defense, 2);
    }

    #[test]
    fn attackers_of_lists_engaged_sessions() {
        let mut combat = system();
        combat.engage(SessionId(2), MobId(7), 0, 0);
        combat.engage(SessionId(1), MobId(7), 0, 0);
        combat.engage(SessionId(3), MobId(8), 0, 0);
        assert_eq!(combat.attackers_of(MobId(7)), vec![SessionId(1), SessionId(2)]);
    }

    #[test]
    fn damage_roll_stays_in_range() {
        let combat = system();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let roll = combat.roll_damage(&mut rng, 0);
            assert!((1..=4).contains(&roll));
        }
        let boosted = combat.roll_damage(&mut rng, 3);
        assert!((4..=7).contains(&boosted));
    }

    #[test]
    fn cooldowns_expire_with_the_clock() {
        let mut combat = system();
        let ember = CombatSystem::find_spell("ember").unwrap();
        assert!(combat.spell_ready(SessionId(1), "ember", 0).is_ok());
        combat.start_cooldown(SessionId(1), ember, 0);
        assert_eq!(combat.spell_ready(SessionId(1), "ember", 1_000), Err(3_000));
        assert!(combat.spell_ready(SessionId(1), "ember", 4_000).is_ok());
    }

    #[test]
    fn effects_expire_and_stack_by_name() {
        let mut combat = system();
        let sid = SessionId(1);
        combat.add_effect(
            sid,
            ActiveEffect {
                name: "aegis".into(),
                defense: 2,
                expires_at_ms: 5_000,
            },
        );
        // Re-applying replaces rather than stacking.
        combat.add_effect(
            sid,
            ActiveEffect {
                name: "aegis".into(),
                defense: 2,
                expires_at_ms: 8_000,
            },
        );
        assert_eq!(combat.effect_defense_bonus(sid, 1_000), 2);
        assert_eq!(combat.effect_defense_bonus(sid, 8_000), 0);
        assert!(combat.active_effects(sid, 9_000).is_empty());
    }

    #[test]
    fn clear_session_forgets_everything() {
        let mut combat = system();
        let sid = SessionId(1);
        combat.engage(sid, MobId(1), 0, 0);
        let ember = CombatSystem::find_spell("ember").unwrap();
        combat.start_cooldown(sid, ember, 0);
        combat.clear_session(sid);
        assert!(!combat.is_engaged(sid));
        assert!(combat.spell_ready(sid, "ember", 0).is_ok());
    }
}
