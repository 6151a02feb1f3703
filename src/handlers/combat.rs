//! Fighting: engagement, swings, fleeing, spells, effects.
//!
//! Swings are scheduler actions; each execution re-resolves its referents
//! and quietly stops when the fight has ended, the mob is gone, or the
//! rooms no longer match.

use rand::Rng;

use crate::combat::{ActiveEffect, CombatSystem, SpellKind};
use crate::engine::{Engine, TickAction};
use crate::handlers::navigation;
use crate::types::{Direction, MobId, SessionId};

pub async fn kill(engine: &mut Engine, session: SessionId, keyword: &str) {
    if engine.combat.is_engaged(session) {
        engine
            .bus
            .send_error(session, "You are already fighting!")
            .await;
        return;
    }
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    player.dialogue = None;
    let room = player.room.clone();
    let name = player.name.clone();

    let Some(mob) = engine.mobs.find_in_room(&room, keyword) else {
        engine
            .bus
            .send_error(session, "You don't see that here.")
            .await;
        return;
    };
    let mob_id = mob.id;
    let mob_name = mob.name.clone();

    engage(engine, session, mob_id).await;
    engine
        .bus
        .send_text(session, format!("You attack {}!", mob_name))
        .await;
    engine
        .broadcast_room(&room, Some(session), &format!("{} attacks {}!", name, mob_name))
        .await;
}

/// Start a fight: combat state plus the two swing chains.
async fn engage(engine: &mut Engine, session: SessionId, mob_id: MobId) {
    let now = engine.now();
    let armor = engine.items.equipped_armor_total(session);
    engine.combat.engage(session, mob_id, now, armor);
    let swing_in = engine.combat.config().swing_interval_ms;
    let mob_swing_in = engine.combat.config().mob_swing_interval_ms;
    engine
        .scheduler
        .schedule_in(now, swing_in, TickAction::PlayerSwing { session });
    engine.scheduler.schedule_in(
        now,
        mob_swing_in,
        TickAction::MobSwing {
            mob: mob_id,
            target: session,
        },
    );
}

/// One player swing: scheduled by `engage`, reschedules itself while the
/// fight lasts.
pub async fn player_swing(engine: &mut Engine, session: SessionId) {
    let Some(state) = engine.combat.state(session) else {
        return;
    };
    let mob_id = state.target;
    let Some(player) = engine.players.get(session) else {
        engine.combat.disengage(session);
        return;
    };
    let room = player.room.clone();
    let name = player.name.clone();

    let Some(mob) = engine.mobs.get(mob_id) else {
        engine.combat.disengage(session);
        return;
    };
    if mob.room != room {
        engine.combat.disengage(session);
        return;
    }
    let mob_name = mob.name.clone();
    let mob_defense = mob.defense;

    let weapon = engine.items.equipped_weapon_damage(session);
    let roll = engine.combat.roll_damage(&mut engine.rng, weapon);
    let damage = (roll - mob_defense).max(0);

    let dead = {
        let Some(mob) = engine.mobs.get_mut(mob_id) else {
            return;
        };
        mob.hp -= damage;
        mob.hp <= 0
    };

    if damage > 0 {
        engine
            .bus
            .send_text(session, format!("You hit {} for {}.", mob_name, damage))
            .await;
        engine
            .broadcast_room(&room, Some(session), &format!("{} hits {}.", name, mob_name))
            .await;
    } else {
        engine
            .bus
            .send_text(session, format!("Your blow glances off {}.", mob_name))
            .await;
    }

    if dead {
        engine.resolve_mob_death(session, mob_id).await;
        return;
    }

    // The cooldown advances by a full interval whatever the outcome.
    let interval = engine.combat.config().swing_interval_ms;
    if let Some(state) = engine.combat.state_mut(session) {
        state.next_swing_due_at_ms += interval;
        let due = state.next_swing_due_at_ms;
        engine
            .scheduler
            .schedule_at(due, TickAction::PlayerSwing { session });
    }
}

/// One mob counter-swing.
pub async fn mob_swing(engine: &mut Engine, mob_id: MobId, target: SessionId) {
    // The chain dies silently when the engagement has ended.
    if engine.combat.target_of(target) != Some(mob_id) {
        return;
    }
    let Some(mob) = engine.mobs.get(mob_id) else {
        return;
    };
    let mob_name = mob.name.clone();
    let mob_room = mob.room.clone();
    let mob_damage = mob.damage;

    let Some(player) = engine.players.get(target) else {
        return;
    };
    if player.room != mob_room {
        return;
    }

    let now = engine.now();
    let armor = engine
        .combat
        .state(target)
        .map(|s| s.defense)
        .unwrap_or(0);
    let bonus = engine.combat.effect_defense_bonus(target, now);
    let damage = (mob_damage - armor - bonus).max(0);

    let dead = {
        let Some(player) = engine.players.get_mut(target) else {
            return;
        };
        player.hp -= damage;
        player.hp <= 0
    };

    if damage > 0 {
        engine
            .bus
            .send_text(target, format!("{} hits you for {}.", mob_name, damage))
            .await;
    } else {
        engine
            .bus
            .send_text(target, format!("{} fails to hurt you.", mob_name))
            .await;
    }

    if dead {
        engine.resolve_player_death(target).await;
        return;
    }

    let interval = engine.combat.config().mob_swing_interval_ms;
    engine.scheduler.schedule_in(
        now,
        interval,
        TickAction::MobSwing {
            mob: mob_id,
            target,
        },
    );
}

pub async fn flee(engine: &mut Engine, session: SessionId) {
    if !engine.combat.is_engaged(session) {
        engine
            .bus
            .send_error(session, "You aren't fighting anyone.")
            .await;
        return;
    }
    let escaped = engine.combat.roll_flee(&mut engine.rng);
    if !escaped {
        engine.bus.send_text(session, "You fail to flee.").await;
        return;
    }

    engine.combat.disengage(session);
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();

    let exits: Vec<Direction> = engine
        .world
        .room(&room)
        .map(|r| {
            Direction::ALL
                .iter()
                .copied()
                .filter(|d| r.exit(*d).is_some())
                .collect()
        })
        .unwrap_or_default();
    if exits.is_empty() {
        engine
            .bus
            .send_text(session, "You scramble out of reach.")
            .await;
        return;
    }
    let dir = exits[engine.rng.gen_range(0..exits.len())];
    engine
        .bus
        .send_text(session, format!("You flee {}!", dir))
        .await;
    navigation::move_player(engine, session, dir).await;
}

pub async fn cast(
    engine: &mut Engine,
    session: SessionId,
    spell_name: &str,
    target: Option<&str>,
) {
    let Some(spell) = CombatSystem::find_spell(spell_name) else {
        engine
            .bus
            .send_error(session, "You don't know that spell.")
            .await;
        return;
    };
    let now = engine.now();
    if let Err(remaining) = engine.combat.spell_ready(session, spell.name, now) {
        engine
            .bus
            .send_error(
                session,
                format!("{} is not ready ({}s).", spell.name, remaining.div_ceil(1_000)),
            )
            .await;
        return;
    }

    match spell.kind {
        SpellKind::Damage => {
            let Some(player) = engine.players.get(session) else {
                return;
            };
            let room = player.room.clone();

            let mob_id = match target {
                Some(keyword) => engine.mobs.find_in_room(&room, keyword).map(|m| m.id),
                None => engine.combat.target_of(session),
            };
            let Some(mob_id) = mob_id else {
                engine.bus.send_error(session, "Cast it at what?").await;
                return;
            };
            let Some(mob) = engine.mobs.get(mob_id) else {
                engine.bus.send_error(session, "Cast it at what?").await;
                return;
            };
            let mob_name = mob.name.clone();

            let damage = engine.rng.gen_range(spell.min..=spell.max);
            engine.combat.start_cooldown(session, spell, now);
            let dead = {
                let Some(mob) = engine.mobs.get_mut(mob_id) else {
                    return;
                };
                mob.hp -= damage;
                mob.hp <= 0
            };
            engine
                .bus
                .send_text(
                    session,
                    format!("Your {} sears {} for {}.", spell.name, mob_name, damage),
                )
                .await;
            if dead {
                engine.resolve_mob_death(session, mob_id).await;
            } else if !engine.combat.is_engaged(session) {
                // Hostile magic starts a fight like a weapon would.
                engage(engine, session, mob_id).await;
            }
        }
        SpellKind::Heal => {
            let amount = engine.rng.gen_range(spell.min..=spell.max);
            engine.combat.start_cooldown(session, spell, now);
            if let Some(player) = engine.players.get_mut(session) {
                player.hp = (player.hp + amount).min(player.max_hp);
            }
            engine
                .bus
                .send_text(session, format!("Warmth knits your wounds (+{}).", amount))
                .await;
        }
        SpellKind::Buff {
            defense,
            duration_ms,
        } => {
            engine.combat.start_cooldown(session, spell, now);
            engine.combat.add_effect(
                session,
                ActiveEffect {
                    name: spell.name.to_string(),
                    defense,
                    expires_at_ms: now + duration_ms,
                },
            );
            engine
                .bus
                .send_text(session, format!("A shimmering {} surrounds you.", spell.name))
                .await;
        }
    }
}

pub async fn spells(engine: &mut Engine, session: SessionId) {
    engine.bus.send_text(session, "You know:").await;
    for spell in CombatSystem::spells() {
        let kind = match spell.kind {
            SpellKind::Damage => format!("damage {}-{}", spell.min, spell.max),
            SpellKind::Heal => format!("heal {}-{}", spell.min, spell.max),
            SpellKind::Buff { defense, .. } => format!("+{} defense", defense),
        };
        engine
            .bus
            .send_text(
                session,
                format!(
                    "  {:<8} {} ({}s cooldown)",
                    spell.name,
                    kind,
                    spell.cooldown_ms / 1_000
                ),
            )
            .await;
    }
}

pub async fn effects(engine: &mut Engine, session: SessionId) {
    let now = engine.now();
    let active = engine.combat.active_effects(session, now);
    if active.is_empty() {
        engine
            .bus
            .send_text(session, "You feel quite ordinary.")
            .await;
        return;
    }
    for effect in active {
        let remaining_secs = (effect.expires_at_ms.saturating_sub(now)).div_ceil(1_000);
        engine
            .bus
            .send_text(
                session,
                format!(
                    "  {} (+{} defense, {}s left)",
                    effect.name, effect.defense, remaining_secs
                ),
            )
            .await;
    }
}

pub async fn dispel(engine: &mut Engine, session: SessionId, name: &str) {
    if engine.combat.remove_effect(session, name) {
        engine
            .bus
            .send_text(session, format!("You dispel {}.", name))
            .await;
    } else {
        engine
            .bus
            .send_error(session, "No such effect clings to you.")
            .await;
    }
}
