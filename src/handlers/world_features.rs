//! Doors, containers, levers, and signs.
//!
//! Static feature definitions live in the world; this handler materializes
//! and mutates their live state in the world-state registry and keeps the
//! dirty flags fed for the persistence flush.

use std::sync::Arc;

use crate::engine::Engine;
use crate::registry::FeatureState;
use crate::types::{feature_id, ContainerState, DoorState, LeverState, RoomId, SessionId};
use crate::world::{FeatureDef, World};

/// Resolve a feature by player-facing keyword in the player's current room.
fn resolve(
    world: &World,
    room_id: &RoomId,
    keyword: &str,
) -> Option<(String, FeatureDef)> {
    let room = world.room(room_id)?;
    let def = room.feature_by_keyword(keyword)?;
    Some((feature_id(room_id, def.local_id()), def.clone()))
}

/// Materialize live state for a door/container/lever, minting initial
/// container contents on first touch.
fn touch<'e>(
    engine: &'e mut Engine,
    fid: &str,
    def: &FeatureDef,
) -> &'e mut FeatureState {
    let minted = match def {
        FeatureDef::Container { contents, .. } if engine.world_state.get(fid).is_none() => {
            let world = Arc::clone(&engine.world);
            contents
                .iter()
                .filter_map(|kw| world.item_template(kw))
                .map(|template| engine.items.mint(template))
                .collect()
        }
        _ => Vec::new(),
    };
    engine.world_state.get_or_init(fid, def, move || minted)
}

fn player_room(engine: &Engine, session: SessionId) -> Option<RoomId> {
    engine.players.get(session).map(|p| p.room.clone())
}

pub async fn open(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((fid, def)) = resolve(&world, &room, keyword) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    match &def {
        FeatureDef::Door { keyword, .. } => {
            match engine.world_state.door_state(&fid, &def) {
                DoorState::Locked => {
                    engine
                        .bus
                        .send_error(session, format!("The {} is locked.", keyword))
                        .await;
                }
                DoorState::Open => {
                    engine
                        .bus
                        .send_text(session, format!("The {} is already open.", keyword))
                        .await;
                }
                DoorState::Closed => {
                    engine.world_state.set_door_state(&fid, DoorState::Open);
                    engine
                        .bus
                        .send_text(session, format!("You open the {}.", keyword))
                        .await;
                }
            }
        }
        FeatureDef::Container { keyword, .. } => {
            let state = touch(engine, &fid, &def);
            match state {
                FeatureState::Container { state, .. } => match state {
                    ContainerState::Open => {
                        engine
                            .bus
                            .send_text(session, format!("The {} is already open.", keyword))
                            .await;
                    }
                    ContainerState::Closed => {
                        *state = ContainerState::Open;
                        engine.world_state.mark_dirty(&fid);
                        engine
                            .bus
                            .send_text(session, format!("You open the {}.", keyword))
                            .await;
                    }
                },
                _ => {}
            }
        }
        _ => {
            engine
                .bus
                .send_error(session, "You can't open that.")
                .await;
        }
    }
}

pub async fn close(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((fid, def)) = resolve(&world, &room, keyword) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    match &def {
        FeatureDef::Door { keyword, .. } => {
            match engine.world_state.door_state(&fid, &def) {
                DoorState::Open => {
                    engine.world_state.set_door_state(&fid, DoorState::Closed);
                    engine
                        .bus
                        .send_text(session, format!("You close the {}.", keyword))
                        .await;
                }
                _ => {
                    engine
                        .bus
                        .send_text(session, format!("The {} isn't open.", keyword))
                        .await;
                }
            }
        }
        FeatureDef::Container { keyword, .. } => {
            let state = touch(engine, &fid, &def);
            match state {
                FeatureState::Container { state, .. } => match state {
                    ContainerState::Closed => {
                        engine
                            .bus
                            .send_text(session, format!("The {} isn't open.", keyword))
                            .await;
                    }
                    ContainerState::Open => {
                        *state = ContainerState::Closed;
                        engine.world_state.mark_dirty(&fid);
                        engine
                            .bus
                            .send_text(session, format!("You close the {}.", keyword))
                            .await;
                    }
                },
                _ => {}
            }
        }
        _ => {
            engine
                .bus
                .send_error(session, "You can't close that.")
                .await;
        }
    }
}

pub async fn unlock(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((fid, def)) = resolve(&world, &room, keyword) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    let FeatureDef::Door {
        keyword, key_item, ..
    } = &def
    else {
        engine
            .bus
            .send_error(session, "You can't unlock that.")
            .await;
        return;
    };

    if engine.world_state.door_state(&fid, &def) != DoorState::Locked {
        engine
            .bus
            .send_text(session, format!("The {} isn't locked.", keyword))
            .await;
        return;
    }
    let has_key = match key_item {
        Some(key) => engine.items.find_in_inventory(session, key).is_some(),
        None => false,
    };
    if !has_key {
        engine
            .bus
            .send_error(session, "You don't have the key.")
            .await;
        return;
    }
    engine.world_state.set_door_state(&fid, DoorState::Closed);
    engine
        .bus
        .send_text(session, format!("You unlock the {}.", keyword))
        .await;
}

pub async fn search(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((fid, def)) = resolve(&world, &room, keyword) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    let FeatureDef::Container { keyword, .. } = &def else {
        engine
            .bus
            .send_error(session, "You can't search that.")
            .await;
        return;
    };

    let listing: Result<Vec<String>, ()> = match touch(engine, &fid, &def) {
        FeatureState::Container { state, contents } => match state {
            ContainerState::Closed => Err(()),
            ContainerState::Open => Ok(contents
                .iter()
                .map(|i| i.item.display_name.clone())
                .collect()),
        },
        _ => Ok(Vec::new()),
    };
    match listing {
        Err(()) => {
            engine
                .bus
                .send_error(session, format!("The {} is closed.", keyword))
                .await;
        }
        Ok(names) if names.is_empty() => {
            engine
                .bus
                .send_text(session, format!("The {} is empty.", keyword))
                .await;
        }
        Ok(names) => {
            engine
                .bus
                .send_text(session, format!("The {} contains:", keyword))
                .await;
            for name in names {
                engine.bus.send_text(session, format!("  {}", name)).await;
            }
        }
    }
}

pub async fn get_from(engine: &mut Engine, session: SessionId, item: &str, container: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((fid, def)) = resolve(&world, &room, container) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    let FeatureDef::Container {
        keyword: container_kw,
        ..
    } = &def
    else {
        engine
            .bus
            .send_error(session, "You can't look inside that.")
            .await;
        return;
    };

    let taken = match touch(engine, &fid, &def) {
        FeatureState::Container { state, contents } => match state {
            ContainerState::Closed => Err(format!("The {} is closed.", container_kw)),
            ContainerState::Open => {
                match contents.iter().position(|i| i.matches(item)) {
                    Some(at) => Ok(contents.remove(at)),
                    None => Err(format!("There is no {} in the {}.", item, container_kw)),
                }
            }
        },
        _ => return,
    };
    match taken {
        Err(message) => {
            engine.bus.send_error(session, message).await;
        }
        Ok(instance) => {
            engine.world_state.mark_dirty(&fid);
            let display = instance.item.display_name.clone();
            engine.items.add_to_inventory(session, instance);
            engine.players.mark_dirty(session);
            engine
                .bus
                .send_text(
                    session,
                    format!("You take {} from the {}.", display, container_kw),
                )
                .await;
        }
    }
}

pub async fn put_in(engine: &mut Engine, session: SessionId, item: &str, container: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((fid, def)) = resolve(&world, &room, container) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    let FeatureDef::Container {
        keyword: container_kw,
        ..
    } = &def
    else {
        engine
            .bus
            .send_error(session, "You can't put things in that.")
            .await;
        return;
    };

    let open = matches!(
        touch(engine, &fid, &def),
        FeatureState::Container {
            state: ContainerState::Open,
            ..
        }
    );
    if !open {
        engine
            .bus
            .send_error(session, format!("The {} is closed.", container_kw))
            .await;
        return;
    }
    let Some(instance) = engine.items.take_from_inventory(session, item) else {
        engine
            .bus
            .send_error(session, "You aren't carrying that.")
            .await;
        return;
    };
    let display = instance.item.display_name.clone();
    if let FeatureState::Container { contents, .. } = touch(engine, &fid, &def) {
        contents.push(instance);
    }
    engine.world_state.mark_dirty(&fid);
    engine.players.mark_dirty(session);
    engine
        .bus
        .send_text(
            session,
            format!("You put {} in the {}.", display, container_kw),
        )
        .await;
}

pub async fn pull(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((fid, def)) = resolve(&world, &room, keyword) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    let FeatureDef::Lever {
        keyword: lever_kw,
        opens_door,
        ..
    } = &def
    else {
        engine
            .bus
            .send_error(session, "You can't pull that.")
            .await;
        return;
    };

    let new_state = match touch(engine, &fid, &def) {
        FeatureState::Lever { state } => {
            *state = state.toggled();
            *state
        }
        _ => return,
    };
    engine.world_state.mark_dirty(&fid);
    engine
        .bus
        .send_text(
            session,
            format!(
                "You pull the {} {}.",
                lever_kw,
                match new_state {
                    LeverState::Down => "down",
                    LeverState::Up => "up",
                }
            ),
        )
        .await;

    // A linked door follows the lever: down opens, up closes.
    if let Some(door_fid) = opens_door {
        let door_state = match new_state {
            LeverState::Down => DoorState::Open,
            LeverState::Up => DoorState::Closed,
        };
        engine.world_state.set_door_state(door_fid, door_state);
        let name = engine
            .players
            .get(session)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        engine
            .bus
            .send_text(session, "Somewhere, a mechanism grinds.")
            .await;
        engine
            .broadcast_room(
                &room,
                Some(session),
                &format!("{} pulls the {}. Somewhere, a mechanism grinds.", name, lever_kw),
            )
            .await;
    }
}

pub async fn read(engine: &mut Engine, session: SessionId, keyword: &str) {
    let Some(room) = player_room(engine, session) else {
        return;
    };
    let world = Arc::clone(&engine.world);
    let Some((_, def)) = resolve(&world, &room, keyword) else {
        engine
            .bus
            .send_error(session, "You see nothing like that here.")
            .await;
        return;
    };
    match &def {
        FeatureDef::Sign { text, .. } => {
            engine.bus.send_text(session, format!("It reads: {}", text)).await;
        }
        _ => {
            engine
                .bus
                .send_error(session, "There is nothing written on that.")
                .await;
        }
    }
}
