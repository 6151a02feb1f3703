//! Speech in every radius: room, zone, global, targeted, and cross-engine.

use crate::bus::{BroadcastKind, InterEngineMessage};
use crate::engine::Engine;
use crate::types::SessionId;
use crate::validation::validate_chat_message;

/// Shared precondition: a valid message and the sender's name and room.
async fn sender_context(
    engine: &mut Engine,
    session: SessionId,
    message: &str,
) -> Option<(String, crate::types::RoomId)> {
    if let Err(e) = validate_chat_message(message) {
        engine.bus.send_error(session, e.message).await;
        return None;
    }
    let player = engine.players.get(session)?;
    Some((player.name.clone(), player.room.clone()))
}

pub async fn say(engine: &mut Engine, session: SessionId, message: &str) {
    let Some((name, room)) = sender_context(engine, session, message).await else {
        return;
    };
    engine
        .bus
        .send_text(session, format!("You say: {}", message))
        .await;
    engine
        .broadcast_room(&room, Some(session), &format!("{} says: {}", name, message))
        .await;
}

pub async fn tell(engine: &mut Engine, session: SessionId, to: &str, message: &str) {
    let Some((name, _)) = sender_context(engine, session, message).await else {
        return;
    };

    if let Some(target) = engine.players.session_by_name(to) {
        let target_name = engine
            .players
            .get(target)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| to.to_string());
        engine
            .bus
            .send_text(session, format!("You tell {}: {}", target_name, message))
            .await;
        engine
            .bus
            .send_text(target, format!("{} tells you: {}", name, message))
            .await;
        return;
    }

    // Not online here: try the other engines before giving up.
    let Some(bus) = &engine.inter_bus else {
        engine.bus.send_error(session, "No such player.").await;
        return;
    };
    let message_out = InterEngineMessage::Tell {
        from_name: name,
        to_name: to.to_string(),
        text: message.to_string(),
        source_engine_id: engine.engine_id().clone(),
    };
    let routed = engine
        .location_index
        .as_ref()
        .and_then(|index| index.lookup_engine_id(to));
    match routed {
        Some(remote) if &remote != engine.engine_id() => bus.send_to(&remote, message_out),
        _ => bus.broadcast(message_out),
    }
    engine
        .bus
        .send_text(session, format!("You tell {}: {}", to, message))
        .await;
}

pub async fn gossip(engine: &mut Engine, session: SessionId, message: &str) {
    let Some((name, _)) = sender_context(engine, session, message).await else {
        return;
    };
    engine
        .bus
        .send_text(session, format!("You gossip: {}", message))
        .await;
    engine
        .broadcast_all(Some(session), &format!("{} gossips: {}", name, message))
        .await;
    if let Some(bus) = &engine.inter_bus {
        bus.broadcast(InterEngineMessage::GlobalBroadcast {
            kind: BroadcastKind::Gossip,
            sender_name: name,
            text: message.to_string(),
            source_engine_id: engine.engine_id().clone(),
        });
    }
}

pub async fn whisper(engine: &mut Engine, session: SessionId, to: &str, message: &str) {
    let Some((name, room)) = sender_context(engine, session, message).await else {
        return;
    };

    let target = engine
        .players
        .players_in_room(&room)
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(to))
        .map(|p| (p.session, p.name.clone()));
    match target {
        Some((target_session, _)) if target_session == session => {
            engine
                .bus
                .send_info(session, "You mutter quietly to yourself.")
                .await;
        }
        Some((target_session, target_name)) => {
            engine
                .bus
                .send_text(session, format!("You whisper to {}: {}", target_name, message))
                .await;
            engine
                .bus
                .send_text(target_session, format!("{} whispers: {}", name, message))
                .await;
        }
        None => {
            engine.bus.send_error(session, "They aren't here.").await;
        }
    }
}

pub async fn shout(engine: &mut Engine, session: SessionId, message: &str) {
    let Some((name, room)) = sender_context(engine, session, message).await else {
        return;
    };
    engine
        .bus
        .send_text(session, format!("You shout: {}", message))
        .await;
    let zone = room.zone().to_string();
    engine
        .broadcast_zone(&zone, Some(session), &format!("[SHOUT] {}: {}", name, message))
        .await;
}

pub async fn ooc(engine: &mut Engine, session: SessionId, message: &str) {
    let Some((name, _)) = sender_context(engine, session, message).await else {
        return;
    };
    let line = format!("[OOC] {}: {}", name, message);
    engine.bus.send_text(session, line.clone()).await;
    engine.broadcast_all(Some(session), &line).await;
    if let Some(bus) = &engine.inter_bus {
        bus.broadcast(InterEngineMessage::GlobalBroadcast {
            kind: BroadcastKind::Ooc,
            sender_name: name,
            text: message.to_string(),
            source_engine_id: engine.engine_id().clone(),
        });
    }
}

pub async fn pose(engine: &mut Engine, session: SessionId, text: &str) {
    let Some((name, room)) = sender_context(engine, session, text).await else {
        return;
    };
    // A pose must actually feature the poser.
    if !text.contains(&name) {
        engine
            .bus
            .send_error(session, "Your pose must include your name.")
            .await;
        return;
    }
    engine.bus.send_text(session, text.to_string()).await;
    engine.broadcast_room(&room, Some(session), text).await;
}
