//! Live mob instances and the per-room mob index.
//!
//! The room index preserves insertion order so target resolution ("kill
//! rat") is deterministic: first spawned, first matched.

use std::collections::HashMap;

use crate::types::{MobId, RoomId};
use crate::world::MobTemplate;

#[derive(Debug, Clone)]
pub struct MobState {
    pub id: MobId,
    pub template_id: String,
    pub name: String,
    pub keyword: String,
    pub room: RoomId,
    pub hp: i32,
    pub max_hp: i32,
    pub damage: i32,
    pub defense: i32,
    pub threat: i32,
    pub xp_reward: u64,
}

#[derive(Default)]
pub struct MobRegistry {
    mobs: HashMap<MobId, MobState>,
    by_room: HashMap<RoomId, Vec<MobId>>,
    next_id: u64,
}

impl MobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, template: &MobTemplate, room: RoomId) -> MobId {
        self.next_id += 1;
        let id = MobId(self.next_id);
        let state = MobState {
            id,
            template_id: template.id.clone(),
            name: template.name.clone(),
            keyword: template.keyword.clone(),
            room: room.clone(),
            hp: template.max_hp,
            max_hp: template.max_hp,
            damage: template.damage,
            defense: template.defense,
            threat: template.threat,
            xp_reward: template.xp_reward,
        };
        self.by_room.entry(room).or_default().push(id);
        self.mobs.insert(id, state);
        id
    }

    pub fn remove(&mut self, id: MobId) -> Option<MobState> {
        let state = self.mobs.remove(&id)?;
        if let Some(index) = self.by_room.get_mut(&state.room) {
            index.retain(|m| *m != id);
            if index.is_empty() {
                self.by_room.remove(&state.room);
            }
        }
        Some(state)
    }

    pub fn get(&self, id: MobId) -> Option<&MobState> {
        self.mobs.get(&id)
    }

    pub fn get_mut(&mut self, id: MobId) -> Option<&mut MobState> {
        self.mobs.get_mut(&id)
    }

    /// Mobs in a room, in spawn-insertion order.
    pub fn mobs_in_room(&self, room: &RoomId) -> Vec<&MobState> {
        self.by_room
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|id| self.mobs.get(id))
            .collect()
    }

    /// First mob in the room whose keyword or name matches, insertion order.
    pub fn find_in_room(&self, room: &RoomId, keyword: &str) -> Option<&MobState> {
        self.mobs_in_room(room).into_iter().find(|m| {
            m.keyword.eq_ignore_ascii_case(keyword)
                || m.name.to_lowercase().contains(&keyword.to_lowercase())
        })
    }

    /// Whether a live instance of `template_id` is in `room`.
    pub fn template_present(&self, room: &RoomId, template_id: &str) -> bool {
        self.mobs_in_room(room)
            .iter()
            .any(|m| m.template_id == template_id)
    }

    pub fn len(&self) -> usize {
        self.mobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mobs.is_empty()
    }
}
