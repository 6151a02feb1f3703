//! Zone instance listing and phase switching.
//!
//! `phase` shows the known engine instances with the current one marked;
//! `phase <engine>` starts a handoff unless combat or a same-instance
//! target blocks it. The actual migration is the engine's handoff path;
//! this module only decides.

use std::collections::HashMap;

use crate::config::InstanceConfig;
use crate::types::EngineId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInstance {
    pub engine_id: EngineId,
    pub address: String,
    pub zone_id: String,
    pub player_count: usize,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    InstanceList(Vec<ZoneInstance>),
    InCombat,
    NoOp(String),
    Initiated { target: EngineId },
}

pub struct PhaseManager {
    current: EngineId,
    instances: Vec<InstanceConfig>,
    /// Last known population per engine; the local count is authoritative,
    /// remote counts are whatever was gossiped most recently.
    player_counts: HashMap<EngineId, usize>,
}

impl PhaseManager {
    pub fn new(current: EngineId, instances: Vec<InstanceConfig>) -> Self {
        Self {
            current,
            instances,
            player_counts: HashMap::new(),
        }
    }

    pub fn record_player_count(&mut self, engine: &EngineId, count: usize) {
        self.player_counts.insert(engine.clone(), count);
    }

    pub fn list(&self, local_player_count: usize) -> Vec<ZoneInstance> {
        let mut out = Vec::new();
        for instance in &self.instances {
            let current = instance.engine_id == self.current;
            let count = if current {
                local_player_count
            } else {
                self.player_counts
                    .get(&instance.engine_id)
                    .copied()
                    .unwrap_or(0)
            };
            for zone in &instance.zones {
                out.push(ZoneInstance {
                    engine_id: instance.engine_id.clone(),
                    address: instance.address.clone(),
                    zone_id: zone.clone(),
                    player_count: count,
                    current,
                });
            }
        }
        out
    }

    pub fn switch(&self, target: &str, in_combat: bool) -> PhaseResult {
        if in_combat {
            return PhaseResult::InCombat;
        }
        if target == self.current {
            return PhaseResult::NoOp("already on that instance".to_string());
        }
        match self.instances.iter().find(|i| i.engine_id == target) {
            Some(instance) => PhaseResult::Initiated {
                target: instance.engine_id.clone(),
            },
            None => PhaseResult::NoOp(format!("no such instance: {}", target)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PhaseManager {
        PhaseManager::new(
            "e1".into(),
            vec![
                InstanceConfig {
                    engine_id: "e1".into(),
                    address: "127.0.0.1:4000".into(),
                    zones: vec!["town".into()],
                },
                InstanceConfig {
                    engine_id: "e2".into(),
                    address: "127.0.0.1:4200".into(),
                    zones: vec!["wilds".into()],
                },
            ],
        )
    }

    #[test]
    fn list_marks_the_current_instance() {
        let mut manager = manager();
        manager.record_player_count(&"e2".to_string(), 7);
        let list = manager.list(3);
        assert_eq!(list.len(), 2);
        assert!(list[0].current);
        assert_eq!(list[0].player_count, 3);
        assert!(!list[1].current);
        assert_eq!(list[1].player_count, 7);
    }

    #[test]
    fn switch_preconditions() {
        let manager = manager();
        assert_eq!(manager.switch("e2", true), PhaseResult::InCombat);
        assert_eq!(
            manager.switch("e1", false),
            PhaseResult::NoOp("already on that instance".into())
        );
        assert_eq!(
            manager.switch("e2", false),
            PhaseResult::Initiated {
                target: "e2".into()
            }
        );
        assert!(matches!(manager.switch("ghost", false), PhaseResult::NoOp(_)));
    }
}
