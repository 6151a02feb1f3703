//! Staff commands. Every one of them is gated on `is_staff`.

use std::sync::Arc;

use tracing::info;

use crate::bus::InterEngineMessage;
use crate::engine::Engine;
use crate::handlers::ui;
use crate::parser::AdminCommand;
use crate::phase::PhaseResult;
use crate::types::{RoomId, RoomSpec, SessionId};

pub async fn handle(engine: &mut Engine, session: SessionId, command: AdminCommand) {
    let staff = engine
        .players
        .get(session)
        .map(|p| p.is_staff)
        .unwrap_or(false);
    if !staff {
        engine.bus.send_error(session, "You are not staff.").await;
        return;
    }
    match command {
        AdminCommand::Goto(spec) => goto(engine, session, &spec).await,
        AdminCommand::Transfer { name, room } => transfer(engine, session, &name, &room).await,
        AdminCommand::Spawn(template) => spawn(engine, session, &template).await,
        AdminCommand::Shutdown => shutdown(engine, session).await,
        AdminCommand::Smite(target) => smite(engine, session, &target).await,
        AdminCommand::Kick(name) => kick(engine, session, &name).await,
        AdminCommand::SetLevel { name, level } => set_level(engine, session, &name, level).await,
        AdminCommand::Phase(target) => phase(engine, session, target.as_deref()).await,
    }
}

/// Resolve a staff-typed room reference against the world: `zone:local`,
/// bare `local` in the caller's zone, or `zone:` for any room of the zone.
pub(crate) fn resolve_room(engine: &Engine, caller_zone: &str, spec: &str) -> Option<RoomId> {
    match RoomSpec::parse(spec)? {
        RoomSpec::Full(id) => engine.world.room(&id).map(|r| r.id.clone()),
        RoomSpec::Local(local) => {
            let id = RoomId::new(caller_zone, &local).ok()?;
            engine.world.room(&id).map(|r| r.id.clone())
        }
        RoomSpec::Zone(zone) => engine
            .world
            .rooms_in_zone(&zone)
            .first()
            .map(|r| r.id.clone()),
    }
}

/// Teleport a player with arrival/departure announcements and a fresh look.
pub(crate) async fn force_move(engine: &mut Engine, session: SessionId, target: &RoomId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let name = player.name.clone();
    let from = player.room.clone();
    if from == *target {
        ui::send_room_look(engine, session).await;
        return;
    }
    engine.combat.disengage(session);
    engine
        .broadcast_room(&from, Some(session), &format!("{} vanishes in a wisp of smoke.", name))
        .await;
    engine.players.move_to(session, target.clone());
    engine.players.mark_dirty(session);
    engine
        .broadcast_room(target, Some(session), &format!("{} appears in a wisp of smoke.", name))
        .await;
    ui::send_room_look(engine, session).await;
}

async fn goto(engine: &mut Engine, session: SessionId, spec: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let zone = player.room.zone().to_string();
    let Some(target) = resolve_room(engine, &zone, spec) else {
        engine.bus.send_error(session, "No such room.").await;
        return;
    };
    force_move(engine, session, &target).await;
}

async fn transfer(engine: &mut Engine, session: SessionId, name: &str, room_spec: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let staff_name = player.name.clone();
    let zone = player.room.zone().to_string();
    let Some(target_room) = resolve_room(engine, &zone, room_spec) else {
        engine.bus.send_error(session, "No such room.").await;
        return;
    };

    if let Some(target_session) = engine.players.session_by_name(name) {
        engine
            .bus
            .send_info(target_session, "A greater power relocates you.")
            .await;
        force_move(engine, target_session, &target_room).await;
        engine
            .bus
            .send_info(session, format!("{} transferred.", name))
            .await;
        return;
    }

    // Not here: every engine gets the request; the holder applies it.
    match &engine.inter_bus {
        Some(bus) => {
            bus.broadcast(InterEngineMessage::TransferRequest {
                staff_name,
                target_player_name: name.to_string(),
                target_room,
                source_engine_id: engine.engine_id().clone(),
            });
            engine
                .bus
                .send_info(session, format!("Transfer request for {} broadcast.", name))
                .await;
        }
        None => {
            engine.bus.send_error(session, "No such player.").await;
        }
    }
}

async fn spawn(engine: &mut Engine, session: SessionId, template_id: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();
    let world = Arc::clone(&engine.world);
    let Some(template) = world.mob_template(template_id) else {
        engine.bus.send_error(session, "No such template.").await;
        return;
    };
    engine.mobs.spawn(template, room.clone());
    info!(template = %template_id, room = %room, "mob spawned by staff");
    engine
        .broadcast_room(&room, None, &format!("{} arrives in a flash of light.", template.name))
        .await;
}

async fn shutdown(engine: &mut Engine, session: SessionId) {
    let name = engine.players.get(session).map(|p| p.name.clone());
    engine.begin_shutdown(name).await;
}

async fn smite(engine: &mut Engine, session: SessionId, target: &str) {
    let staff_room = match engine.players.get(session) {
        Some(p) => p.room.clone(),
        None => return,
    };

    // Players anywhere on this engine; mobs only in the same room.
    if let Some(target_session) = engine.players.session_by_name(target) {
        let Some(victim) = engine.players.get_mut(target_session) else {
            return;
        };
        victim.hp = 1;
        let victim_name = victim.name.clone();
        let victim_room = victim.room.clone();
        let start = engine.world.start_room.clone();
        engine.combat.clear_session(target_session);
        engine
            .bus
            .send_text(target_session, "A bolt from the heavens strikes you down!")
            .await;
        engine
            .broadcast_room(
                &victim_room,
                Some(target_session),
                &format!("Lightning hurls {} into the sky.", victim_name),
            )
            .await;
        engine.players.move_to(target_session, start.clone());
        engine.players.mark_dirty(target_session);
        engine
            .broadcast_room(
                &start,
                Some(target_session),
                &format!("{} falls from the sky, smoking.", victim_name),
            )
            .await;
        ui::send_room_look(engine, target_session).await;
        engine
            .bus
            .send_info(session, format!("{} smitten.", victim_name))
            .await;
        return;
    }

    if let Some(mob) = engine.mobs.find_in_room(&staff_room, target) {
        let mob_id = mob.id;
        let mob_name = mob.name.clone();
        for attacker in engine.combat.attackers_of(mob_id) {
            engine.combat.disengage(attacker);
        }
        engine.mobs.remove(mob_id);
        info!(mob = %mob_name, "mob smitten by staff");
        engine
            .broadcast_room(&staff_room, None, &format!("A bolt of light obliterates {}.", mob_name))
            .await;
        return;
    }

    engine.bus.send_error(session, "No such target.").await;
}

async fn kick(engine: &mut Engine, session: SessionId, name: &str) {
    let self_name = engine
        .players
        .get(session)
        .map(|p| p.name.clone())
        .unwrap_or_default();
    if self_name.eq_ignore_ascii_case(name) {
        engine
            .bus
            .send_error(session, "You cannot kick yourself.")
            .await;
        return;
    }

    if let Some(target_session) = engine.players.session_by_name(name) {
        engine
            .bus
            .send_text(target_session, "You have been removed by staff.")
            .await;
        engine.bus.close(target_session).await;
        engine
            .bus
            .send_info(session, format!("{} kicked.", name))
            .await;
        return;
    }

    match &engine.inter_bus {
        Some(bus) => {
            bus.broadcast(InterEngineMessage::KickRequest {
                target_player_name: name.to_string(),
                source_engine_id: engine.engine_id().clone(),
            });
            engine
                .bus
                .send_info(session, format!("Kick request for {} broadcast.", name))
                .await;
        }
        None => {
            engine.bus.send_error(session, "No such player.").await;
        }
    }
}

async fn set_level(engine: &mut Engine, session: SessionId, name: &str, level: u32) {
    let Some(target_session) = engine.players.session_by_name(name) else {
        engine.bus.send_error(session, "No such player.").await;
        return;
    };
    let clamped = level.clamp(1, engine.progression.max_level());
    let xp = engine.progression.total_xp_for_level(clamped);
    let Some(target) = engine.players.get_mut(target_session) else {
        return;
    };
    target.level = clamped;
    target.xp_total = xp;
    let target_name = target.name.clone();
    engine.players.mark_dirty(target_session);
    info!(player = %target_name, level = clamped, "level set by staff");
    engine
        .bus
        .send_info(target_session, format!("You are now level {}.", clamped))
        .await;
    engine
        .bus
        .send_info(session, format!("{} set to level {}.", target_name, clamped))
        .await;
}

async fn phase(engine: &mut Engine, session: SessionId, target: Option<&str>) {
    match target {
        None => {
            let instances = engine.phases.list(engine.players.len());
            if instances.is_empty() {
                engine
                    .bus
                    .send_text(session, "This engine stands alone.")
                    .await;
                return;
            }
            engine.bus.send_text(session, "Instances:").await;
            for instance in instances {
                engine
                    .bus
                    .send_text(
                        session,
                        format!(
                            "  {}{} ({}) zone {} - {} players",
                            instance.engine_id,
                            if instance.current { " *" } else { "" },
                            instance.address,
                            instance.zone_id,
                            instance.player_count,
                        ),
                    )
                    .await;
            }
        }
        Some(target) => {
            let in_combat = engine.combat.is_engaged(session);
            match engine.phases.switch(target, in_combat) {
                PhaseResult::InCombat => {
                    engine.bus.send_text(session, "You are in combat.").await;
                }
                PhaseResult::NoOp(reason) => {
                    engine.bus.send_info(session, reason).await;
                }
                PhaseResult::Initiated { target } => {
                    let room = match engine.players.get(session) {
                        Some(p) => p.room.clone(),
                        None => return,
                    };
                    engine
                        .bus
                        .send_info(session, format!("Phasing to {}...", target))
                        .await;
                    engine.hand_off(session, target, room).await;
                }
                PhaseResult::InstanceList(_) => {}
            }
        }
    }
}
