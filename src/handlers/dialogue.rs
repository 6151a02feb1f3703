//! Talking to NPCs and stepping their dialogue trees.

use std::sync::Arc;

use crate::dialogue::{render_node, DialogueState};
use crate::engine::Engine;
use crate::types::SessionId;
use crate::world::DialogueAction;

pub async fn talk(engine: &mut Engine, session: SessionId, npc: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();

    let Some(mob) = engine.mobs.find_in_room(&room, npc) else {
        engine.bus.send_error(session, "They aren't here.").await;
        return;
    };
    let mob_id = mob.id;
    let template_id = mob.template_id.clone();
    let mob_name = mob.name.clone();

    let world = Arc::clone(&engine.world);
    let tree = world
        .mob_template(&template_id)
        .and_then(|t| t.dialogue.as_ref());
    let Some(tree) = tree else {
        engine
            .bus
            .send_text(session, format!("{} has nothing to say.", mob_name))
            .await;
        return;
    };

    let state = DialogueState::new(mob_id, tree);
    let lines = state.current(tree).map(render_node).unwrap_or_default();
    if let Some(player) = engine.players.get_mut(session) {
        player.dialogue = Some(state);
    }
    for line in lines {
        engine.bus.send_info(session, line).await;
    }
}

pub async fn choose(engine: &mut Engine, session: SessionId, n: u8) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let Some(state) = player.dialogue.clone() else {
        // A bare digit outside a conversation means nothing.
        engine.bus.send_text(session, "Huh?").await;
        return;
    };
    let room = player.room.clone();

    // The NPC must still be present; otherwise the conversation is over.
    let npc_present = engine
        .mobs
        .get(state.npc)
        .map(|m| m.room == room)
        .unwrap_or(false);
    if !npc_present {
        if let Some(player) = engine.players.get_mut(session) {
            player.dialogue = None;
        }
        engine
            .bus
            .send_text(session, "Your interlocutor has gone.")
            .await;
        return;
    }

    let world = Arc::clone(&engine.world);
    let template_id = match engine.mobs.get(state.npc) {
        Some(mob) => mob.template_id.clone(),
        None => return,
    };
    let Some(tree) = world
        .mob_template(&template_id)
        .and_then(|t| t.dialogue.as_ref())
    else {
        return;
    };

    let Some(choice) = state.choice(tree, n) else {
        engine
            .bus
            .send_error(session, "That isn't one of the choices.")
            .await;
        return;
    };
    let actions = choice.actions.clone();
    let next = choice.next.clone();

    for action in actions {
        match action {
            DialogueAction::GiveItem { template } => {
                if let Some(item) = world.item_template(&template) {
                    let instance = engine.items.mint(item);
                    let display = instance.item.display_name.clone();
                    engine.items.add_to_inventory(session, instance);
                    engine.players.mark_dirty(session);
                    engine
                        .bus
                        .send_info(session, format!("You receive {}.", display))
                        .await;
                }
            }
            DialogueAction::GrantXp { amount } => {
                engine.grant_xp(session, amount).await;
            }
            DialogueAction::SetRecall => {
                if let Some(player) = engine.players.get_mut(session) {
                    player.recall_room = Some(player.room.clone());
                }
                engine.players.mark_dirty(session);
                engine
                    .bus
                    .send_info(session, "You feel anchored to this place.")
                    .await;
            }
        }
    }

    match next {
        Some(next_node) => {
            let lines = {
                let mut advanced = state.clone();
                advanced.advance(&next_node);
                let lines = advanced.current(tree).map(render_node);
                if let Some(player) = engine.players.get_mut(session) {
                    player.dialogue = Some(advanced);
                }
                lines
            };
            match lines {
                Some(lines) => {
                    for line in lines {
                        engine.bus.send_info(session, line).await;
                    }
                }
                None => {
                    // The tree names a missing node; end cleanly.
                    if let Some(player) = engine.players.get_mut(session) {
                        player.dialogue = None;
                    }
                    engine
                        .bus
                        .send_text(session, "The conversation trails off.")
                        .await;
                }
            }
        }
        None => {
            if let Some(player) = engine.players.get_mut(session) {
                player.dialogue = None;
            }
            engine.bus.send_text(session, "The conversation ends.").await;
        }
    }
}
