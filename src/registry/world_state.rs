//! Mutable feature state overlaid on the immutable world.
//!
//! Doors, containers, and levers start from their static defaults and are
//! materialized into this registry on first touch. Every mutation marks the
//! feature dirty; the scheduler's flush action drains the dirty set.

use std::collections::{HashMap, HashSet};

use crate::registry::items::ItemInstance;
use crate::types::{ContainerState, DoorState, LeverState};
use crate::world::FeatureDef;

/// Live state of one feature, keyed by `"zone:room/feature"`.
#[derive(Debug)]
pub enum FeatureState {
    Door {
        state: DoorState,
    },
    Container {
        state: ContainerState,
        contents: Vec<ItemInstance>,
    },
    Lever {
        state: LeverState,
    },
}

#[derive(Default)]
pub struct WorldStateRegistry {
    features: HashMap<String, FeatureState>,
    dirty: HashSet<String>,
}

impl WorldStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up live state, materializing the static default on first touch.
    /// `mint_contents` supplies the initial container items (instances must
    /// be minted by the item registry, which this registry cannot reach).
    pub fn get_or_init(
        &mut self,
        id: &str,
        def: &FeatureDef,
        mint_contents: impl FnOnce() -> Vec<ItemInstance>,
    ) -> &mut FeatureState {
        self.features.entry(id.to_string()).or_insert_with(|| match def {
            FeatureDef::Door { starts_locked, .. } => FeatureState::Door {
                state: if *starts_locked {
                    DoorState::Locked
                } else {
                    DoorState::Closed
                },
            },
            FeatureDef::Container { starts_open, .. } => FeatureState::Container {
                state: if *starts_open {
                    ContainerState::Open
                } else {
                    ContainerState::Closed
                },
                contents: mint_contents(),
            },
            FeatureDef::Lever { .. } => FeatureState::Lever {
                state: LeverState::Up,
            },
            // Signs carry no mutable state and never reach this registry.
            FeatureDef::Sign { .. } => unreachable!("signs have no mutable state"),
        })
    }

    /// Peek at live state without materializing.
    pub fn get(&self, id: &str) -> Option<&FeatureState> {
        self.features.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut FeatureState> {
        self.features.get_mut(id)
    }

    /// Current door state, falling back to the static default when the door
    /// has never been touched.
    pub fn door_state(&self, id: &str, def: &FeatureDef) -> DoorState {
        match self.features.get(id) {
            Some(FeatureState::Door { state }) => *state,
            _ => match def {
                FeatureDef::Door {
                    starts_locked: true,
                    ..
                } => DoorState::Locked,
                _ => DoorState::Closed,
            },
        }
    }

    pub fn set_door_state(&mut self, id: &str, state: DoorState) {
        self.features
            .insert(id.to_string(), FeatureState::Door { state });
        self.mark_dirty(id);
    }

    pub fn mark_dirty(&mut self, id: &str) {
        self.dirty.insert(id.to_string());
    }

    /// Drain the dirty set for a persistence flush.
    pub fn take_dirty(&mut self) -> Vec<String> {
        let mut ids: Vec<String> = self.dirty.drain().collect();
        ids.sort();
        ids
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Count of instances held inside containers, for conservation checks.
    pub fn contained_item_count(&self) -> usize {
        self.features
            .values()
            .map(|f| match f {
                FeatureState::Container { contents, .. } => contents.len(),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn door_def(locked: bool) -> FeatureDef {
        FeatureDef::Door {
            id: "gate".into(),
            keyword: "gate".into(),
            key_item: None,
            starts_locked: locked,
        }
    }

    #[test]
    fn doors_materialize_from_static_default() {
        let mut reg = WorldStateRegistry::new();
        assert_eq!(reg.door_state("town:a/gate", &door_def(true)), DoorState::Locked);
        assert_eq!(
            reg.door_state("town:a/gate2", &door_def(false)),
            DoorState::Closed
        );
    }

    #[test]
    fn door_mutation_sticks_and_marks_dirty() {
        let mut reg = WorldStateRegistry::new();
        reg.set_door_state("town:a/gate", DoorState::Open);
        assert_eq!(reg.door_state("town:a/gate", &door_def(true)), DoorState::Open);
        assert_eq!(reg.take_dirty(), vec!["town:a/gate".to_string()]);
        assert_eq!(reg.dirty_count(), 0);
    }

    #[test]
    fn containers_materialize_with_minted_contents() {
        let mut reg = WorldStateRegistry::new();
        let def = FeatureDef::Container {
            id: "crate".into(),
            keyword: "crate".into(),
            starts_open: false,
            contents: vec!["cap".into()],
        };
        let state = reg.get_or_init("town:a/crate", &def, Vec::new);
        match state {
            FeatureState::Container { state, contents } => {
                assert_eq!(*state, ContainerState::Closed);
                assert!(contents.is_empty());
            }
            _ => panic!("expected container"),
        }
    }
}
