//! Guild commands: lifecycle, ranks, MOTD, roster, chat.
//!
//! Rank policy: invites need Officer or better, promote/demote/disband are
//! Leader-only, and a leader with subjects cannot simply walk out.

use crate::engine::Engine;
use crate::guilds::GuildError;
use crate::parser::GuildCommand;
use crate::types::{GuildRank, SessionId};

pub async fn handle(engine: &mut Engine, session: SessionId, command: GuildCommand) {
    match command {
        GuildCommand::Create { name, tag } => create(engine, session, &name, &tag).await,
        GuildCommand::Invite(name) => invite(engine, session, &name).await,
        GuildCommand::Accept => accept(engine, session).await,
        GuildCommand::Leave => leave(engine, session).await,
        GuildCommand::Kick(name) => kick(engine, session, &name).await,
        GuildCommand::Promote(name) => set_rank(engine, session, &name, GuildRank::Officer).await,
        GuildCommand::Demote(name) => set_rank(engine, session, &name, GuildRank::Member).await,
        GuildCommand::Disband => disband(engine, session).await,
        GuildCommand::Motd(text) => motd(engine, session, text).await,
        GuildCommand::Roster => roster(engine, session).await,
        GuildCommand::Info => info(engine, session).await,
    }
}

/// The caller's guild slug and rank, or an error event.
async fn membership(engine: &mut Engine, session: SessionId) -> Option<(String, GuildRank)> {
    let player = engine.players.get(session)?;
    match (&player.guild_id, player.guild_rank) {
        (Some(slug), Some(rank)) => Some((slug.clone(), rank)),
        _ => {
            engine
                .bus
                .send_error(session, "You aren't in a guild.")
                .await;
            None
        }
    }
}

/// Echo a line to every online member of a guild.
async fn broadcast_guild(engine: &Engine, slug: &str, text: &str) {
    for player in engine.players.all() {
        if player.guild_id.as_deref() == Some(slug) {
            engine.bus.broadcast_text(player.session, text);
        }
    }
}

async fn create(engine: &mut Engine, session: SessionId, name: &str, tag: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    if player.guild_id.is_some() {
        engine
            .bus
            .send_error(session, "You are already in a guild.")
            .await;
        return;
    }
    let founder = player.name.clone();

    let created = engine
        .guilds
        .create(name, tag, &founder, engine.guild_repo.clone().as_ref());
    match created {
        Ok(guild) => {
            let slug = guild.id.clone();
            let display = guild.display_name.clone();
            if let Some(player) = engine.players.get_mut(session) {
                player.guild_id = Some(slug);
                player.guild_rank = Some(GuildRank::Leader);
            }
            engine.players.mark_dirty(session);
            engine
                .bus
                .send_info(session, format!("You found {}.", display))
                .await;
        }
        Err(GuildError::NameTaken) => {
            engine
                .bus
                .send_error(session, "A guild by that name already exists.")
                .await;
        }
        Err(GuildError::Invalid(reason)) => {
            engine.bus.send_error(session, reason).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "guild create failed");
            engine.bus.send_error(session, "Internal error.").await;
        }
    }
}

async fn invite(engine: &mut Engine, session: SessionId, name: &str) {
    let Some((slug, rank)) = membership(engine, session).await else {
        return;
    };
    if rank == GuildRank::Member {
        engine
            .bus
            .send_error(session, "Only officers can invite.")
            .await;
        return;
    }
    let inviter = engine
        .players
        .get(session)
        .map(|p| p.name.clone())
        .unwrap_or_default();

    let target = engine
        .players
        .by_name(name)
        .map(|p| (p.session, p.name.clone(), p.guild_id.is_some()));
    let Some((target_session, target_name, in_guild)) = target else {
        engine.bus.send_error(session, "No such player.").await;
        return;
    };
    if in_guild {
        engine
            .bus
            .send_error(session, "They already serve a guild.")
            .await;
        return;
    }

    if engine.guilds.invite(&slug, &target_name).is_err() {
        engine.bus.send_error(session, "Internal error.").await;
        return;
    }
    let guild_name = engine
        .guilds
        .get(&slug)
        .map(|g| g.display_name.clone())
        .unwrap_or_default();
    engine
        .bus
        .send_info(session, format!("You invite {} to {}.", target_name, guild_name))
        .await;
    engine
        .bus
        .send_info(
            target_session,
            format!("{} invites you to {}. (guild accept)", inviter, guild_name),
        )
        .await;
}

async fn accept(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    if player.guild_id.is_some() {
        engine
            .bus
            .send_error(session, "You are already in a guild.")
            .await;
        return;
    }
    let name = player.name.clone();

    let Some(slug) = engine.guilds.accept_invite(&name) else {
        engine
            .bus
            .send_error(session, "No guild has invited you.")
            .await;
        return;
    };
    if let Some(player) = engine.players.get_mut(session) {
        player.guild_id = Some(slug.clone());
        player.guild_rank = Some(GuildRank::Member);
    }
    engine.players.mark_dirty(session);
    let display = engine
        .guilds
        .get(&slug)
        .map(|g| g.display_name.clone())
        .unwrap_or_default();
    engine
        .bus
        .send_info(session, format!("You join {}.", display))
        .await;
    broadcast_guild(engine, &slug, &format!("{} joins the guild.", name)).await;
}

async fn leave(engine: &mut Engine, session: SessionId) {
    let Some((slug, rank)) = membership(engine, session).await else {
        return;
    };
    let name = engine
        .players
        .get(session)
        .map(|p| p.name.clone())
        .unwrap_or_default();

    if rank == GuildRank::Leader {
        let members = engine.guilds.get(&slug).map(|g| g.roster.len()).unwrap_or(0);
        if members > 1 {
            engine
                .bus
                .send_error(session, "Leaders must disband the guild or pass leadership first.")
                .await;
            return;
        }
        // A lone leader leaving dissolves the guild.
        let _ = engine.guilds.disband(&slug, engine.guild_repo.clone().as_ref());
    } else {
        engine.guilds.remove_member(&slug, &name);
    }

    if let Some(player) = engine.players.get_mut(session) {
        player.guild_id = None;
        player.guild_rank = None;
    }
    engine.players.mark_dirty(session);
    engine.bus.send_info(session, "You leave the guild.").await;
    broadcast_guild(engine, &slug, &format!("{} leaves the guild.", name)).await;
}

async fn kick(engine: &mut Engine, session: SessionId, name: &str) {
    let Some((slug, rank)) = membership(engine, session).await else {
        return;
    };
    if rank == GuildRank::Member {
        engine
            .bus
            .send_error(session, "Only officers can kick.")
            .await;
        return;
    }
    let target_rank = engine.guilds.get(&slug).and_then(|g| g.rank_of(name));
    match target_rank {
        None => {
            engine
                .bus
                .send_error(session, "They aren't in your guild.")
                .await;
            return;
        }
        Some(GuildRank::Leader) => {
            engine
                .bus
                .send_error(session, "The leader cannot be kicked.")
                .await;
            return;
        }
        Some(GuildRank::Officer) if rank != GuildRank::Leader => {
            engine
                .bus
                .send_error(session, "Only the leader can kick officers.")
                .await;
            return;
        }
        Some(_) => {}
    }

    engine.guilds.remove_member(&slug, name);
    if let Some(target_session) = engine.players.session_by_name(name) {
        if let Some(target) = engine.players.get_mut(target_session) {
            target.guild_id = None;
            target.guild_rank = None;
        }
        engine.players.mark_dirty(target_session);
        engine
            .bus
            .send_info(target_session, "You have been expelled from the guild.")
            .await;
    }
    broadcast_guild(engine, &slug, &format!("{} was expelled from the guild.", name)).await;
}

async fn set_rank(engine: &mut Engine, session: SessionId, name: &str, rank: GuildRank) {
    let Some((slug, caller_rank)) = membership(engine, session).await else {
        return;
    };
    if caller_rank != GuildRank::Leader {
        engine
            .bus
            .send_error(session, "Only the leader can change ranks.")
            .await;
        return;
    }
    let target_rank = engine.guilds.get(&slug).and_then(|g| g.rank_of(name));
    match target_rank {
        None => {
            engine
                .bus
                .send_error(session, "They aren't in your guild.")
                .await;
            return;
        }
        Some(GuildRank::Leader) => {
            engine
                .bus
                .send_error(session, "The leader outranks everyone.")
                .await;
            return;
        }
        Some(current) if current == rank => {
            engine
                .bus
                .send_error(session, format!("They are already {}.", rank))
                .await;
            return;
        }
        Some(_) => {}
    }

    engine.guilds.set_rank(&slug, name, rank);
    if let Some(target_session) = engine.players.session_by_name(name) {
        if let Some(target) = engine.players.get_mut(target_session) {
            target.guild_rank = Some(rank);
        }
        engine.players.mark_dirty(target_session);
        engine
            .bus
            .send_info(target_session, format!("You are now {} of the guild.", rank))
            .await;
    }
    engine
        .bus
        .send_info(session, format!("{} is now {}.", name, rank))
        .await;
}

async fn disband(engine: &mut Engine, session: SessionId) {
    let Some((slug, rank)) = membership(engine, session).await else {
        return;
    };
    if rank != GuildRank::Leader {
        engine
            .bus
            .send_error(session, "Only the leader can disband the guild.")
            .await;
        return;
    }
    let display = engine
        .guilds
        .get(&slug)
        .map(|g| g.display_name.clone())
        .unwrap_or_default();
    broadcast_guild(engine, &slug, &format!("{} has been disbanded.", display)).await;

    match engine.guilds.disband(&slug, engine.guild_repo.clone().as_ref()) {
        Ok(members) => {
            for member in members {
                if let Some(member_session) = engine.players.session_by_name(&member) {
                    if let Some(player) = engine.players.get_mut(member_session) {
                        player.guild_id = None;
                        player.guild_rank = None;
                    }
                    engine.players.mark_dirty(member_session);
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "guild disband failed");
            engine.bus.send_error(session, "Internal error.").await;
        }
    }
}

async fn motd(engine: &mut Engine, session: SessionId, text: Option<String>) {
    let Some((slug, rank)) = membership(engine, session).await else {
        return;
    };
    match text {
        None => {
            let motd = engine.guilds.get(&slug).map(|g| g.motd.clone()).unwrap_or_default();
            if motd.is_empty() {
                engine
                    .bus
                    .send_text(session, "Your guild has no message of the day.")
                    .await;
            } else {
                engine.bus.send_text(session, format!("MOTD: {}", motd)).await;
            }
        }
        Some(text) => {
            if rank == GuildRank::Member {
                engine
                    .bus
                    .send_error(session, "Only officers can set the MOTD.")
                    .await;
                return;
            }
            engine.guilds.set_motd(&slug, &text);
            engine.bus.send_info(session, "MOTD set.").await;
            broadcast_guild(engine, &slug, &format!("Guild MOTD: {}", text)).await;
        }
    }
}

async fn roster(engine: &mut Engine, session: SessionId) {
    let Some((slug, _)) = membership(engine, session).await else {
        return;
    };
    let lines: Vec<String> = match engine.guilds.get(&slug) {
        Some(guild) => guild
            .sorted_roster()
            .iter()
            .map(|(name, rank)| format!("  {:<16} {}", name, rank))
            .collect(),
        None => Vec::new(),
    };
    engine.bus.send_text(session, "Guild roster:").await;
    for line in lines {
        engine.bus.send_text(session, line).await;
    }
}

async fn info(engine: &mut Engine, session: SessionId) {
    let Some((slug, _)) = membership(engine, session).await else {
        return;
    };
    let Some(guild) = engine.guilds.get(&slug) else {
        return;
    };
    let lines = vec![
        format!("{} [{}]", guild.display_name, guild.tag),
        format!("Members: {}", guild.roster.len()),
        if guild.motd.is_empty() {
            "No message of the day.".to_string()
        } else {
            format!("MOTD: {}", guild.motd)
        },
    ];
    for line in lines {
        engine.bus.send_text(session, line).await;
    }
}

pub async fn gchat(engine: &mut Engine, session: SessionId, message: &str) {
    let Some((slug, _)) = membership(engine, session).await else {
        return;
    };
    let (name, tag) = {
        let name = engine
            .players
            .get(session)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let tag = engine
            .guilds
            .get(&slug)
            .map(|g| g.tag.clone())
            .unwrap_or_default();
        (name, tag)
    };
    // Sender gets an info echo; members get the broadcast line.
    engine
        .bus
        .send_info(session, format!("[{}] You: {}", tag, message))
        .await;
    let line = format!("[{}] {}: {}", tag, name, message);
    for player in engine.players.all() {
        if player.session != session && player.guild_id.as_deref() == Some(slug.as_str()) {
            engine.bus.broadcast_text(player.session, line.as_str());
        }
    }
}
