//! Built-in demo world, used when no world file is configured.
//!
//! Small on purpose: one town zone exercising every feature kind (door,
//! container, lever, sign), a shop, a dialogue NPC, and one hostile mob,
//! plus a second zone so cross-zone movement has somewhere to go.

use std::collections::HashMap;

use crate::types::{Direction, ItemSlot, RoomId};

use super::{
    DialogueAction, DialogueChoice, DialogueNode, DialogueTree, Exit, FeatureDef, Item, ItemSpawn,
    MobSpawn, MobTemplate, OnUse, Room, ShopDef, World, WorldBuilder, WorldError,
};

fn rid(s: &str) -> RoomId {
    s.parse().expect("demo room ids are static")
}

fn room(
    id: &str,
    title: &str,
    description: &str,
    exits: Vec<(Direction, &str, Option<&str>)>,
    features: Vec<FeatureDef>,
) -> Room {
    let exits: HashMap<Direction, Exit> = exits
        .into_iter()
        .map(|(dir, to, door)| {
            (
                dir,
                Exit {
                    to: rid(to),
                    door: door.map(String::from),
                },
            )
        })
        .collect();
    Room {
        id: rid(id),
        title: title.to_string(),
        description: description.to_string(),
        exits,
        features,
    }
}

pub fn demo_world() -> Result<World, WorldError> {
    WorldBuilder::new(rid("town:square"))
        .room(room(
            "town:square",
            "Thornvale Square",
            "Cobblestones radiate from a dry fountain. Shopfronts lean over the \
             square on every side.",
            vec![
                (Direction::North, "town:gate", None),
                (Direction::East, "town:armory", None),
                (Direction::West, "town:temple", None),
                (Direction::Down, "town:cellar", Some("cellar_door")),
            ],
            vec![FeatureDef::Door {
                id: "cellar_door".into(),
                keyword: "trapdoor".into(),
                key_item: Some("rusty_key".into()),
                starts_locked: true,
            }],
        ))
        .room(room(
            "town:gate",
            "The North Gate",
            "A heavy portcullis stands raised. Beyond it the road runs into the wilds.",
            vec![
                (Direction::South, "town:square", None),
                (Direction::North, "wilds:road", None),
            ],
            vec![FeatureDef::Sign {
                id: "notice".into(),
                keyword: "sign".into(),
                text: "Travellers beyond this gate do so at their own risk.".into(),
            }],
        ))
        .room(room(
            "town:armory",
            "Garrick's Armory",
            "Racks of dented weapons and second-hand armor fill the shop.",
            vec![(Direction::West, "town:square", None)],
            vec![FeatureDef::Container {
                id: "crate".into(),
                keyword: "crate".into(),
                starts_open: false,
                contents: vec!["cap".into()],
            }],
        ))
        .room(room(
            "town:temple",
            "Temple of the Dawn",
            "Candlelight pools beneath a high rose window.",
            vec![(Direction::East, "town:square", None)],
            vec![],
        ))
        .room(room(
            "town:cellar",
            "The Old Cellar",
            "Damp stone arches over broken barrels. Something scrabbles in the dark.",
            vec![(Direction::Up, "town:square", None)],
            vec![FeatureDef::Lever {
                id: "winch".into(),
                keyword: "winch".into(),
                opens_door: Some("town:square/cellar_door".into()),
            }],
        ))
        .room(room(
            "wilds:road",
            "The Wilds Road",
            "Ruts and weeds. Thornvale's walls shrink behind you.",
            vec![(Direction::South, "town:gate", None)],
            vec![],
        ))
        .item(Item {
            keyword: "sword".into(),
            display_name: "a short sword".into(),
            slot: Some(ItemSlot::Weapon),
            armor: 0,
            damage: 3,
            consumable: false,
            charges: 0,
            base_price: 50,
            on_use: vec![],
        })
        .item(Item {
            keyword: "cap".into(),
            display_name: "a leather cap".into(),
            slot: Some(ItemSlot::Head),
            armor: 1,
            damage: 0,
            consumable: false,
            charges: 0,
            base_price: 10,
            on_use: vec![],
        })
        .item(Item {
            keyword: "bread".into(),
            display_name: "a loaf of black bread".into(),
            slot: None,
            armor: 0,
            damage: 0,
            consumable: true,
            charges: 2,
            base_price: 4,
            on_use: vec![OnUse::HealHp { amount: 3 }],
        })
        .item(Item {
            keyword: "rusty_key".into(),
            display_name: "a rusty iron key".into(),
            slot: None,
            armor: 0,
            damage: 0,
            consumable: false,
            charges: 0,
            base_price: 0,
            on_use: vec![],
        })
        .item(Item {
            keyword: "pelt".into(),
            display_name: "a matted rat pelt".into(),
            slot: None,
            armor: 0,
            damage: 0,
            consumable: false,
            charges: 0,
            base_price: 6,
            on_use: vec![],
        })
        .mob(MobTemplate {
            id: "cellar_rat".into(),
            name: "a giant rat".into(),
            keyword: "rat".into(),
            max_hp: 8,
            damage: 2,
            defense: 0,
            threat: 1,
            xp_reward: 50,
            loot: vec!["pelt".into()],
            dialogue: None,
        })
        .mob(MobTemplate {
            id: "priest".into(),
            name: "Sister Maren".into(),
            keyword: "priest".into(),
            max_hp: 30,
            damage: 0,
            defense: 5,
            threat: 0,
            xp_reward: 0,
            loot: vec![],
            dialogue: Some(DialogueTree {
                start: "greet".into(),
                nodes: HashMap::from([
                    (
                        "greet".into(),
                        DialogueNode {
                            prompt: "Sister Maren inclines her head. \"Welcome to the Dawn. \
                                     What do you seek?\""
                                .into(),
                            choices: vec![
                                DialogueChoice {
                                    label: "Bind my soul here.".into(),
                                    actions: vec![DialogueAction::SetRecall],
                                    next: Some("bound".into()),
                                },
                                DialogueChoice {
                                    label: "Is there work for me?".into(),
                                    actions: vec![],
                                    next: Some("task".into()),
                                },
                                DialogueChoice {
                                    label: "Nothing, thank you.".into(),
                                    actions: vec![],
                                    next: None,
                                },
                            ],
                        },
                    ),
                    (
                        "bound".into(),
                        DialogueNode {
                            prompt: "\"The Dawn will call you back here when you recall.\"".into(),
                            choices: vec![DialogueChoice {
                                label: "Farewell.".into(),
                                actions: vec![],
                                next: None,
                            }],
                        },
                    ),
                    (
                        "task".into(),
                        DialogueNode {
                            prompt: "\"Rats gnaw at the cellar stores. Thin them out and the \
                                     Dawn will remember it.\""
                                .into(),
                            choices: vec![DialogueChoice {
                                label: "I will see it done.".into(),
                                actions: vec![DialogueAction::GrantXp { amount: 25 }],
                                next: None,
                            }],
                        },
                    ),
                ]),
            }),
        })
        .shop(ShopDef {
            name: "Garrick's Armory".into(),
            room: rid("town:armory"),
            stock: vec!["sword".into(), "cap".into(), "bread".into()],
        })
        .mob_spawn(MobSpawn {
            template: "cellar_rat".into(),
            room: rid("town:cellar"),
            respawn_ms: Some(60_000),
        })
        .mob_spawn(MobSpawn {
            template: "priest".into(),
            room: rid("town:temple"),
            respawn_ms: None,
        })
        .item_spawn(ItemSpawn {
            template: "rusty_key".into(),
            room: rid("town:gate"),
        })
        .build()
}
