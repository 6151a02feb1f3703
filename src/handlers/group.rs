//! Party commands: invite, accept, decline, leave, kick, list, gtell.

use crate::engine::Engine;
use crate::parser::GroupCommand;
use crate::types::{GroupId, SessionId};

pub async fn handle(engine: &mut Engine, session: SessionId, command: GroupCommand) {
    match command {
        GroupCommand::Invite(name) => invite(engine, session, &name).await,
        GroupCommand::Accept => accept(engine, session).await,
        GroupCommand::Decline => decline(engine, session).await,
        GroupCommand::Leave => leave(engine, session).await,
        GroupCommand::Kick(name) => kick(engine, session, &name).await,
        GroupCommand::List => list(engine, session).await,
    }
}

/// Fan a line out to every online member.
async fn broadcast_group(engine: &Engine, group_id: GroupId, text: &str) {
    for member in engine.groups.members(group_id) {
        engine.bus.broadcast_text(member, text);
    }
}

pub(crate) async fn announce_departure(engine: &Engine, group_id: GroupId, leaver: SessionId) {
    let Some(name) = engine.players.get(leaver).map(|p| p.name.clone()) else {
        return;
    };
    for member in engine.groups.members(group_id) {
        if member != leaver {
            engine
                .bus
                .broadcast_text(member, format!("{} leaves the group.", name));
        }
    }
}

async fn invite(engine: &mut Engine, session: SessionId, name: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let inviter_name = player.name.clone();
    let group_id = player.group_id;

    let Some(target) = engine.players.by_name(name) else {
        engine.bus.send_error(session, "No such player.").await;
        return;
    };
    if target.session == session {
        engine
            .bus
            .send_error(session, "You are already in your own company.")
            .await;
        return;
    }
    if target.group_id.is_some() {
        engine
            .bus
            .send_error(session, "They are already in a group.")
            .await;
        return;
    }
    let target_session = target.session;
    let target_name = target.name.clone();

    // First invite creates the group with the inviter leading.
    let group_id = match group_id {
        Some(id) => {
            if !engine.groups.is_leader(id, session) {
                engine
                    .bus
                    .send_error(session, "Only the leader can invite.")
                    .await;
                return;
            }
            id
        }
        None => {
            let id = engine.groups.create(session);
            if let Some(player) = engine.players.get_mut(session) {
                player.group_id = Some(id);
            }
            id
        }
    };

    engine.groups.invite(group_id, &target_name);
    engine
        .bus
        .send_info(session, format!("You invite {} to your group.", target_name))
        .await;
    engine
        .bus
        .send_info(
            target_session,
            format!("{} invites you to a group. (group accept)", inviter_name),
        )
        .await;
}

async fn accept(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let name = player.name.clone();
    if player.group_id.is_some() {
        engine
            .bus
            .send_error(session, "You are already in a group.")
            .await;
        return;
    }
    let Some(group_id) = engine.groups.find_invite(&name) else {
        engine
            .bus
            .send_error(session, "Nobody has invited you.")
            .await;
        return;
    };
    if !engine.groups.accept(group_id, &name, session) {
        engine
            .bus
            .send_error(session, "Nobody has invited you.")
            .await;
        return;
    }
    if let Some(player) = engine.players.get_mut(session) {
        player.group_id = Some(group_id);
    }
    broadcast_group(engine, group_id, &format!("{} joins the group.", name)).await;
}

async fn decline(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let name = player.name.clone();
    let Some(group_id) = engine.groups.find_invite(&name) else {
        engine
            .bus
            .send_error(session, "Nobody has invited you.")
            .await;
        return;
    };
    engine.groups.decline(group_id, &name);
    engine.bus.send_info(session, "Invitation declined.").await;
}

async fn leave(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let Some(group_id) = player.group_id else {
        engine
            .bus
            .send_error(session, "You aren't in a group.")
            .await;
        return;
    };

    announce_departure(engine, group_id, session).await;
    let new_leader = engine.groups.remove_member(group_id, session);
    if let Some(player) = engine.players.get_mut(session) {
        player.group_id = None;
    }
    engine.bus.send_info(session, "You leave the group.").await;
    if let Some(leader) = new_leader {
        if let Some(name) = engine.players.get(leader).map(|p| p.name.clone()) {
            broadcast_group(engine, group_id, &format!("{} now leads the group.", name)).await;
        }
    }
}

async fn kick(engine: &mut Engine, session: SessionId, name: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let Some(group_id) = player.group_id else {
        engine
            .bus
            .send_error(session, "You aren't in a group.")
            .await;
        return;
    };
    if !engine.groups.is_leader(group_id, session) {
        engine
            .bus
            .send_error(session, "Only the leader can kick.")
            .await;
        return;
    }

    let target = engine
        .players
        .by_name(name)
        .filter(|p| p.group_id == Some(group_id))
        .map(|p| (p.session, p.name.clone()));
    let Some((target_session, target_name)) = target else {
        engine
            .bus
            .send_error(session, "They aren't in your group.")
            .await;
        return;
    };
    if target_session == session {
        engine
            .bus
            .send_error(session, "Leave the group instead.")
            .await;
        return;
    }

    engine.groups.remove_member(group_id, target_session);
    if let Some(target) = engine.players.get_mut(target_session) {
        target.group_id = None;
    }
    engine
        .bus
        .send_info(target_session, "You have been removed from the group.")
        .await;
    broadcast_group(
        engine,
        group_id,
        &format!("{} was removed from the group.", target_name),
    )
    .await;
}

async fn list(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let Some(group_id) = player.group_id else {
        engine
            .bus
            .send_error(session, "You aren't in a group.")
            .await;
        return;
    };
    engine.bus.send_text(session, "Your group:").await;
    let lines: Vec<String> = engine
        .groups
        .members(group_id)
        .iter()
        .filter_map(|m| engine.players.get(*m))
        .map(|p| {
            if engine.groups.is_leader(group_id, p.session) {
                format!("  {} (leader)", p.name)
            } else {
                format!("  {}", p.name)
            }
        })
        .collect();
    for line in lines {
        engine.bus.send_text(session, line).await;
    }
}

pub async fn gtell(engine: &mut Engine, session: SessionId, message: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let name = player.name.clone();
    let Some(group_id) = player.group_id else {
        engine
            .bus
            .send_error(session, "You aren't in a group.")
            .await;
        return;
    };
    broadcast_group(engine, group_id, &format!("[Group] {}: {}", name, message)).await;
}
