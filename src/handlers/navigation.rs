//! Movement between rooms, directional looking, and recall.

use std::sync::Arc;

use crate::constants::RECALL_COOLDOWN_MS;
use crate::engine::Engine;
use crate::handlers::ui;
use crate::types::{feature_id, Direction, DoorState, SessionId};
use crate::world::FeatureDef;

pub async fn move_player(engine: &mut Engine, session: SessionId, dir: Direction) {
    if engine.combat.is_engaged(session) {
        engine
            .bus
            .send_error(session, "You can't leave while fighting!")
            .await;
        return;
    }

    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    player.dialogue = None;
    let from = player.room.clone();
    let name = player.name.clone();

    let world = Arc::clone(&engine.world);
    let Some(room) = world.room(&from) else {
        return;
    };
    let Some(exit) = room.exit(dir) else {
        engine
            .bus
            .send_text(session, "You can't go that way.")
            .await;
        return;
    };
    let target = exit.to.clone();

    // A cross-zone exit may leave this engine entirely.
    if target.zone() != from.zone() {
        if let Some(remote_engine) = engine.is_remote_zone(target.zone()) {
            engine.hand_off(session, remote_engine, target).await;
            return;
        }
    }

    // Doors gate passage unless standing open.
    if let Some(door_local) = &exit.door {
        if let Some(def) = room.feature_by_id(door_local) {
            if let FeatureDef::Door { keyword, .. } = def {
                let fid = feature_id(&from, door_local);
                match engine.world_state.door_state(&fid, def) {
                    DoorState::Open => {}
                    DoorState::Locked => {
                        engine
                            .bus
                            .send_error(session, format!("The {} is locked.", keyword))
                            .await;
                        return;
                    }
                    DoorState::Closed => {
                        engine
                            .bus
                            .send_error(session, format!("The {} is closed.", keyword))
                            .await;
                        return;
                    }
                }
            }
        }
    }

    engine
        .broadcast_room(&from, Some(session), &format!("{} leaves.", name))
        .await;
    engine.players.move_to(session, target.clone());
    engine.players.mark_dirty(session);
    engine
        .broadcast_room(&target, Some(session), &format!("{} enters.", name))
        .await;
    ui::send_room_look(engine, session).await;
}

pub async fn look_dir(engine: &mut Engine, session: SessionId, dir: Direction) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room_id = player.room.clone();
    let world = Arc::clone(&engine.world);
    let target_title = world
        .room(&room_id)
        .and_then(|r| r.exit(dir))
        .and_then(|e| world.room(&e.to))
        .map(|r| r.title.clone());
    match target_title {
        Some(title) => {
            engine
                .bus
                .send_text(session, format!("To the {} you see: {}", dir, title))
                .await;
        }
        None => {
            engine
                .bus
                .send_error(session, "There is nothing that way.")
                .await;
        }
    }
}

pub async fn recall(engine: &mut Engine, session: SessionId) {
    if engine.combat.is_engaged(session) {
        engine
            .bus
            .send_error(session, "You can't recall while fighting!")
            .await;
        return;
    }
    let now = engine.now();
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    if now < player.recall_ready_at_ms {
        let remaining_secs = (player.recall_ready_at_ms - now).div_ceil(1_000);
        engine
            .bus
            .send_text(session, format!("{} seconds remaining", remaining_secs))
            .await;
        return;
    }
    player.recall_ready_at_ms = now + RECALL_COOLDOWN_MS;
    player.dialogue = None;
    let name = player.name.clone();
    let from = player.room.clone();
    let target = player
        .recall_room
        .clone()
        .unwrap_or_else(|| engine.world.start_room.clone());

    engine
        .broadcast_room(&from, Some(session), &format!("{} shimmers and vanishes.", name))
        .await;
    engine.players.move_to(session, target.clone());
    engine.players.mark_dirty(session);
    engine
        .broadcast_room(&target, Some(session), &format!("{} shimmers into being.", name))
        .await;
    engine.bus.send_text(session, "You recall.").await;
    ui::send_room_look(engine, session).await;
}
