//! Look, score, who, inventory, help, prompt, quit.

use crate::engine::Engine;
use crate::types::{Direction, SessionId};

/// Full room view: title, description, exits, occupants, floor items.
pub async fn send_room_look(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room_id = player.room.clone();
    let Some(room) = engine.world.room(&room_id) else {
        engine.bus.send_error(session, "You are nowhere.").await;
        return;
    };

    engine.bus.send_text(session, room.title.clone()).await;
    engine.bus.send_text(session, room.description.clone()).await;
    engine.bus.send_text(session, exit_line(engine, &room_id)).await;

    for mob in engine.mobs.mobs_in_room(&room_id) {
        engine
            .bus
            .send_text(session, format!("{} is here.", mob.name))
            .await;
    }
    let others: Vec<String> = engine
        .players
        .players_in_room(&room_id)
        .iter()
        .filter(|p| p.session != session)
        .map(|p| p.name.clone())
        .collect();
    for name in others {
        engine
            .bus
            .send_text(session, format!("{} is here.", name))
            .await;
    }
    let floor: Vec<String> = engine
        .items
        .room_items(&room_id)
        .iter()
        .map(|i| i.item.display_name.clone())
        .collect();
    for name in floor {
        engine
            .bus
            .send_text(session, format!("{} lies here.", name))
            .await;
    }
}

fn exit_line(engine: &Engine, room_id: &crate::types::RoomId) -> String {
    let Some(room) = engine.world.room(room_id) else {
        return "Exits: none.".to_string();
    };
    let mut names: Vec<String> = Direction::ALL
        .iter()
        .filter(|d| room.exit(**d).is_some())
        .map(|d| d.to_string())
        .collect();
    if names.is_empty() {
        return "Exits: none.".to_string();
    }
    names.sort();
    format!("Exits: {}.", names.join(", "))
}

pub async fn look(engine: &mut Engine, session: SessionId) {
    // Looking around breaks off any conversation.
    if let Some(player) = engine.players.get_mut(session) {
        player.dialogue = None;
    }
    send_room_look(engine, session).await;
}

pub async fn exits(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room_id = player.room.clone();
    let line = exit_line(engine, &room_id);
    engine.bus.send_text(session, line).await;
}

pub async fn who(engine: &mut Engine, session: SessionId) {
    engine.bus.send_text(session, "Online:").await;
    let lines: Vec<String> = engine
        .players
        .all()
        .iter()
        .map(|p| {
            if p.group_id.is_some() {
                format!("  [G] {}", p.name)
            } else {
                format!("  {}", p.name)
            }
        })
        .collect();
    for line in lines {
        engine.bus.send_text(session, line).await;
    }
    for name in engine.remote_who() {
        engine
            .bus
            .send_text(session, format!("  {} (elsewhere)", name))
            .await;
    }
}

pub async fn score(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let next_at = engine.progression.total_xp_for_level(player.level + 1);
    let mut lines = vec![
        format!("{}, level {}", player.name, player.level),
        format!("HP: {}/{}", player.hp, player.max_hp),
        format!("XP: {} (next level at {})", player.xp_total, next_at),
        format!("Gold: {}", player.gold),
    ];
    if let Some(slug) = &player.guild_id {
        if let Some(guild) = engine.guilds.get(slug) {
            let rank = player
                .guild_rank
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Member".to_string());
            lines.push(format!("Guild: {} ({})", guild.display_name, rank));
        }
    }
    if player.is_staff {
        lines.push("You are staff.".to_string());
    }
    for line in lines {
        engine.bus.send_text(session, line).await;
    }
}

pub async fn inventory(engine: &mut Engine, session: SessionId) {
    let items: Vec<String> = engine
        .items
        .inventory(session)
        .iter()
        .map(|i| {
            if i.item.consumable {
                format!("  {} ({} charges)", i.item.display_name, i.item.charges)
            } else {
                format!("  {}", i.item.display_name)
            }
        })
        .collect();
    if items.is_empty() {
        engine
            .bus
            .send_text(session, "You are carrying nothing.")
            .await;
        return;
    }
    engine.bus.send_text(session, "You are carrying:").await;
    for line in items {
        engine.bus.send_text(session, line).await;
    }
}

pub async fn equipment(engine: &mut Engine, session: SessionId) {
    let worn: Vec<String> = engine
        .items
        .equipment_of(session)
        .iter()
        .map(|(slot, i)| format!("  {:<7} {}", slot.to_string(), i.item.display_name))
        .collect();
    if worn.is_empty() {
        engine
            .bus
            .send_text(session, "You are wearing nothing of note.")
            .await;
        return;
    }
    engine.bus.send_text(session, "You are wearing:").await;
    for line in worn {
        engine.bus.send_text(session, line).await;
    }
}

pub async fn help(engine: &mut Engine, session: SessionId) {
    const HELP: &[&str] = &[
        "Movement: north south east west up down (n s e w u d), recall",
        "World:    look [dir], exits, who, score, inventory, equipment",
        "Speech:   say 'msg, tell <name> <msg>, whisper, gossip, shout, ooc, pose",
        "Items:    get, drop, give <item> <name>, use, wear, remove <slot>",
        "Shops:    list, buy <item>, sell <item>, balance",
        "Combat:   kill <target>, flee, cast <spell> [target], spells, effects, dispel",
        "Features: open/close/unlock <thing>, search, get <i> from <c>, put <i> in <c>, pull, read",
        "Social:   group ..., gtell, guild ..., gchat, mail ..., talk <npc>",
        "Misc:     prompt <format>, quit",
    ];
    for line in HELP {
        engine.bus.send_text(session, *line).await;
    }
}

pub async fn set_prompt(engine: &mut Engine, session: SessionId, format: Option<String>) {
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    match format {
        Some(format) => {
            player.prompt_format = Some(format);
            engine.bus.send_info(session, "Prompt set.").await;
        }
        None => {
            player.prompt_format = None;
            engine.bus.send_info(session, "Prompt reset.").await;
        }
    }
}

pub async fn quit(engine: &mut Engine, session: SessionId) {
    engine.bus.send_text(session, "Farewell.").await;
    engine.logout(session).await;
    engine.end_session(session);
    engine.bus.close(session).await;
}
