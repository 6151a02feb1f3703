//! Inter-engine message bus and the player location index.
//!
//! Engines exchange best-effort, at-most-once messages; every message
//! carries its origin so receivers can discard their own broadcasts. The
//! in-process network here is what tests and single-host multi-engine
//! deployments use; a networked transport implements the same trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::mail::MailMessage;
use crate::types::{EngineId, GuildRank, ItemSlot, RoomId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastKind {
    Gossip,
    Shutdown,
    Ooc,
}

/// A serializable item for zone handoff: template keyword plus the one
/// mutable field an instance carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub template: String,
    pub charges: u32,
}

/// Everything needed to rebuild a player on another engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub session: SessionId,
    pub name: String,
    pub secret: String,
    pub hp: i32,
    pub level: u32,
    pub xp_total: u64,
    pub gold: u64,
    pub is_staff: bool,
    pub recall_room: Option<RoomId>,
    pub guild_id: Option<String>,
    pub guild_rank: Option<GuildRank>,
    pub inbox: Vec<MailMessage>,
    pub inventory: Vec<SnapshotItem>,
    pub equipment: Vec<(ItemSlot, SnapshotItem)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InterEngineMessage {
    GlobalBroadcast {
        kind: BroadcastKind,
        sender_name: String,
        text: String,
        source_engine_id: EngineId,
    },
    Tell {
        from_name: String,
        to_name: String,
        text: String,
        source_engine_id: EngineId,
    },
    KickRequest {
        target_player_name: String,
        source_engine_id: EngineId,
    },
    TransferRequest {
        staff_name: String,
        target_player_name: String,
        target_room: RoomId,
        source_engine_id: EngineId,
    },
    ZoneHandoff {
        player_name: String,
        target_room: RoomId,
        snapshot: PlayerSnapshot,
        source_engine_id: EngineId,
    },
}

impl InterEngineMessage {
    pub fn source(&self) -> &EngineId {
        match self {
            InterEngineMessage::GlobalBroadcast {
                source_engine_id, ..
            }
            | InterEngineMessage::Tell {
                source_engine_id, ..
            }
            | InterEngineMessage::KickRequest {
                source_engine_id, ..
            }
            | InterEngineMessage::TransferRequest {
                source_engine_id, ..
            }
            | InterEngineMessage::ZoneHandoff {
                source_engine_id, ..
            } => source_engine_id,
        }
    }
}

/// Transport contract. Delivery is at-most-once; ordering across engines is
/// undefined.
pub trait InterEngineBus: Send + Sync {
    /// Deliver to exactly one engine, dropping the message if it is unknown.
    fn send_to(&self, target: &EngineId, message: InterEngineMessage);

    /// Deliver to every registered engine, the sender included; receivers
    /// drop self-origin messages.
    fn broadcast(&self, message: InterEngineMessage);
}

/// Optional name -> engine hint. `None` forces the broadcast fallback.
pub trait PlayerLocationIndex: Send + Sync {
    fn lookup_engine_id(&self, name: &str) -> Option<EngineId>;
}

/// Index that never knows anything; every cross-engine send broadcasts.
pub struct NullLocationIndex;

impl PlayerLocationIndex for NullLocationIndex {
    fn lookup_engine_id(&self, _name: &str) -> Option<EngineId> {
        None
    }
}

/// Shared-map index for in-process deployments.
#[derive(Default)]
pub struct MemoryLocationIndex {
    map: Mutex<HashMap<String, EngineId>>,
}

impl MemoryLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, engine: EngineId) {
        self.map.lock().unwrap().insert(name.to_lowercase(), engine);
    }

    pub fn remove(&self, name: &str) {
        self.map.lock().unwrap().remove(&name.to_lowercase());
    }
}

impl PlayerLocationIndex for MemoryLocationIndex {
    fn lookup_engine_id(&self, name: &str) -> Option<EngineId> {
        self.map.lock().unwrap().get(&name.to_lowercase()).cloned()
    }
}

/// In-process bus network: one registered channel per engine.
#[derive(Default)]
pub struct LocalBusNetwork {
    peers: Mutex<HashMap<EngineId, mpsc::UnboundedSender<InterEngineMessage>>>,
}

impl LocalBusNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an engine, returning its incoming message stream.
    pub fn register(&self, engine: EngineId) -> mpsc::UnboundedReceiver<InterEngineMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().insert(engine, tx);
        rx
    }

    pub fn handle(self: &Arc<Self>, engine: EngineId) -> LocalBusHandle {
        LocalBusHandle {
            network: Arc::clone(self),
            engine,
        }
    }
}

/// One engine's sending handle on a `LocalBusNetwork`.
pub struct LocalBusHandle {
    network: Arc<LocalBusNetwork>,
    engine: EngineId,
}

impl InterEngineBus for LocalBusHandle {
    fn send_to(&self, target: &EngineId, message: InterEngineMessage) {
        let peers = self.network.peers.lock().unwrap();
        match peers.get(target) {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => {
                debug!(from = %self.engine, %target, "dropping bus message for unknown engine")
            }
        }
    }

    fn broadcast(&self, message: InterEngineMessage) {
        let peers = self.network.peers.lock().unwrap();
        for tx in peers.values() {
            let _ = tx.send(message.clone());
        }
    }
}
