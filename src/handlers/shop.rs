//! Buying and selling where the room has a shop.

use std::sync::Arc;

use crate::engine::Engine;
use crate::types::SessionId;

pub async fn list(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();
    let world = Arc::clone(&engine.world);
    let Some(shop) = engine.shops.shop_in(&world, &room) else {
        engine
            .bus
            .send_text(session, "There is no shop here.")
            .await;
        return;
    };

    engine.bus.send_text(session, shop.name.clone()).await;
    for keyword in &shop.stock {
        if let Some(item) = world.item_template(keyword) {
            let price = engine.shops.buy_price(item);
            engine
                .bus
                .send_text(
                    session,
                    format!("  {} - {} gold", item.display_name, price),
                )
                .await;
        }
    }
}

pub async fn buy(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();
    let world = Arc::clone(&engine.world);
    let Some(shop) = engine.shops.shop_in(&world, &room) else {
        engine
            .bus
            .send_text(session, "There is no shop here.")
            .await;
        return;
    };

    let template = shop
        .stock
        .iter()
        .find(|kw| kw.eq_ignore_ascii_case(keyword))
        .and_then(|kw| world.item_template(kw));
    let Some(template) = template else {
        engine
            .bus
            .send_text(session, "This shop doesn't sell that.")
            .await;
        return;
    };

    let price = engine.shops.buy_price(template);
    let Some(player) = engine.players.get_mut(session) else {
        return;
    };
    if player.gold < price {
        engine
            .bus
            .send_text(session, "You can't afford that.")
            .await;
        return;
    }
    player.gold -= price;

    let instance = engine.items.mint(template);
    let display = instance.item.display_name.clone();
    engine.items.add_to_inventory(session, instance);
    engine.players.mark_dirty(session);
    engine
        .bus
        .send_text(session, format!("You buy {} for {} gold.", display, price))
        .await;
}

pub async fn sell(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let room = player.room.clone();
    if engine.shops.shop_in(&engine.world, &room).is_none() {
        engine
            .bus
            .send_text(session, "There is no shop here.")
            .await;
        return;
    }

    let Some(price) = engine
        .items
        .find_in_inventory(session, keyword)
        .map(|i| engine.shops.sell_price(&i.item))
    else {
        engine
            .bus
            .send_error(session, "You aren't carrying that.")
            .await;
        return;
    };
    let Some(price) = price else {
        engine
            .bus
            .send_text(session, "That's worthless.")
            .await;
        return;
    };

    // The instance is destroyed; shops restock from templates.
    let Some(instance) = engine.items.take_from_inventory(session, keyword) else {
        engine.bus.send_error(session, "Internal error.").await;
        return;
    };
    let display = instance.item.display_name.clone();
    if let Some(player) = engine.players.get_mut(session) {
        player.gold += price;
    }
    engine.players.mark_dirty(session);
    engine
        .bus
        .send_text(session, format!("You sell {} for {} gold.", display, price))
        .await;
}

pub async fn balance(engine: &mut Engine, session: SessionId) {
    let Some(player) = engine.players.get(session) else {
        return;
    };
    let gold = player.gold;
    engine
        .bus
        .send_text(session, format!("You have {} gold.", gold))
        .await;
}
