//! Picking up, dropping, giving, using, wearing, and removing items.
//!
//! Equipment changes keep the stat invariant: `max_hp` moves by the armor
//! delta and `hp` moves with it, clamped into `[1, max_hp]`.

use crate::engine::Engine;
use crate::types::{ItemSlot, SessionId};
use crate::world::OnUse;

/// Apply an armor delta from equipping or unequipping.
pub(crate) async fn apply_armor_delta(engine: &mut Engine, session: SessionId, delta: i32) {
    if delta == 0 {
        return;
    }
    if let Some(player) = engine.players.get_mut(session) {
        player.max_hp += delta;
        player.hp = (player.hp + delta).clamp(1, player.max_hp);
    }
    let armor = engine.items.equipped_armor_total(session);
    engine.combat.refresh_defense(session, armor);
    engine.players.mark_dirty(session);
}

pub async fn get(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();
    let name = player.name.clone();

    let Some(instance) = engine.items.take_from_room(&room, keyword) else {
        engine
            .bus
            .send_error(session, "You don't see that here.")
            .await;
        return;
    };
    let display = instance.item.display_name.clone();
    engine.items.add_to_inventory(session, instance);
    engine.players.mark_dirty(session);
    engine
        .bus
        .send_text(session, format!("You pick up {}.", display))
        .await;
    engine
        .broadcast_room(&room, Some(session), &format!("{} picks up {}.", name, display))
        .await;
}

pub async fn drop_item(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();
    let name = player.name.clone();

    let Some(instance) = engine.items.take_from_inventory(session, keyword) else {
        engine
            .bus
            .send_error(session, "You aren't carrying that.")
            .await;
        return;
    };
    let display = instance.item.display_name.clone();
    engine.items.put_in_room(room.clone(), instance);
    engine.players.mark_dirty(session);
    engine
        .bus
        .send_text(session, format!("You drop {}.", display))
        .await;
    engine
        .broadcast_room(&room, Some(session), &format!("{} drops {}.", name, display))
        .await;
}

pub async fn wear(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(instance) = engine.items.take_wear_candidate(session, keyword) else {
        engine
            .bus
            .send_error(session, "You aren't carrying that.")
            .await;
        return;
    };
    if instance.item.slot.is_none() {
        let display = instance.item.display_name.clone();
        engine.items.add_to_inventory(session, instance);
        engine
            .bus
            .send_error(session, format!("You can't wear {}.", display))
            .await;
        return;
    }

    let display = instance.item.display_name.clone();
    let armor = instance.item.armor;
    // An occupied slot implicitly unequips into the inventory first.
    if let Some(prior) = engine.items.equip(session, instance) {
        let prior_display = prior.item.display_name.clone();
        let prior_armor = prior.item.armor;
        engine.items.add_to_inventory(session, prior);
        apply_armor_delta(engine, session, -prior_armor).await;
        engine
            .bus
            .send_text(session, format!("You take off {}.", prior_display))
            .await;
    }
    apply_armor_delta(engine, session, armor).await;
    engine.players.mark_dirty(session);
    engine
        .bus
        .send_text(session, format!("You wear {}.", display))
        .await;
}

pub async fn remove(engine: &mut Engine, session: SessionId, slot: ItemSlot) {
    let Some(instance) = engine.items.unequip(session, slot) else {
        engine
            .bus
            .send_error(session, "You aren't wearing anything there.")
            .await;
        return;
    };
    let display = instance.item.display_name.clone();
    let armor = instance.item.armor;
    engine.items.add_to_inventory(session, instance);
    apply_armor_delta(engine, session, -armor).await;
    engine.players.mark_dirty(session);
    engine
        .bus
        .send_text(session, format!("You remove {}.", display))
        .await;
}

pub async fn give(engine: &mut Engine, session: SessionId, keyword: &str, to: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();
    let name = player.name.clone();

    let target = engine
        .players
        .players_in_room(&room)
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(to) && p.session != session)
        .map(|p| (p.session, p.name.clone()));
    let Some((target_session, target_name)) = target else {
        engine.bus.send_error(session, "They aren't here.").await;
        return;
    };

    // Inventory first; an equipped match is unequipped on the way out.
    let instance = match engine.items.take_from_inventory(session, keyword) {
        Some(instance) => instance,
        None => {
            let Some((_, equipped)) = engine.items.find_equipped(session, keyword) else {
                engine
                    .bus
                    .send_error(session, "You aren't carrying that.")
                    .await;
                return;
            };
            let id = equipped.id;
            let Some(instance) = engine.items.unequip_by_id(session, id) else {
                engine.bus.send_error(session, "Internal error.").await;
                return;
            };
            apply_armor_delta(engine, session, -instance.item.armor).await;
            instance
        }
    };

    let display = instance.item.display_name.clone();
    engine.items.add_to_inventory(target_session, instance);
    engine.players.mark_dirty(session);
    engine.players.mark_dirty(target_session);
    engine
        .bus
        .send_text(session, format!("You give {} to {}.", display, target_name))
        .await;
    engine
        .bus
        .send_text(target_session, format!("{} gives you {}.", name, display))
        .await;
    engine
        .broadcast_room(
            &room,
            Some(session),
            &format!("{} gives {} to {}.", name, display, target_name),
        )
        .await;
}

pub async fn use_item(engine: &mut Engine, session: SessionId, keyword: &str) {
    let in_inventory = engine.items.find_in_inventory(session, keyword).is_some();
    let equipped = engine.items.find_equipped(session, keyword).is_some();
    if !in_inventory && !equipped {
        engine
            .bus
            .send_error(session, "You aren't carrying that.")
            .await;
        return;
    }

    let (display, effects, consumable, remaining) = {
        let instance = if in_inventory {
            engine.items.inventory_item_mut(session, keyword)
        } else {
            engine.items.equipped_item_mut(session, keyword)
        };
        let Some(instance) = instance else {
            engine.bus.send_error(session, "Internal error.").await;
            return;
        };

        if instance.item.on_use.is_empty() {
            let display = instance.item.display_name.clone();
            engine
                .bus
                .send_error(session, format!("You can't use {}.", display))
                .await;
            return;
        }
        if instance.item.consumable {
            instance.item.charges = instance.item.charges.saturating_sub(1);
        }
        (
            instance.item.display_name.clone(),
            instance.item.on_use.clone(),
            instance.item.consumable,
            instance.item.charges,
        )
    };

    for effect in effects {
        match effect {
            OnUse::HealHp { amount } => {
                if let Some(player) = engine.players.get_mut(session) {
                    player.hp = (player.hp + amount).min(player.max_hp);
                }
                engine
                    .bus
                    .send_text(session, format!("You feel restored by {}.", display))
                    .await;
            }
        }
    }

    // Consumables burn out at zero charges; equipped ones come off first.
    if consumable && remaining == 0 {
        let destroyed = match engine.items.take_from_inventory(session, keyword) {
            Some(instance) => Some(instance),
            None => {
                let id = engine.items.find_equipped(session, keyword).map(|(_, i)| i.id);
                match id {
                    Some(id) => {
                        let instance = engine.items.unequip_by_id(session, id);
                        if let Some(instance) = &instance {
                            apply_armor_delta(engine, session, -instance.item.armor).await;
                        }
                        instance
                    }
                    None => None,
                }
            }
        };
        if destroyed.is_some() {
            engine
                .bus
                .send_text(session, format!("{} crumbles to nothing.", display))
                .await;
        }
    }
    engine.players.mark_dirty(session);
}
