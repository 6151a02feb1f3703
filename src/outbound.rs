//! Per-session outbound event queues.
//!
//! Handlers push ordered events keyed by session; the I/O layer owns the
//! receiving half of each queue and serializes events to the wire. For one
//! session, delivery order is push order. Broadcast-class traffic degrades
//! (drops) once a session's queue passes the high-water mark; prompts,
//! errors, and direct responses always go through.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::constants::{OUTBOUND_HIGH_WATER, OUTBOUND_QUEUE_CAPACITY};
use crate::types::SessionId;

/// One event destined for a single session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Plain world text, newline-terminated on the wire.
    Text { session: SessionId, text: String },
    /// Informational/system text.
    Info { session: SessionId, text: String },
    /// An error the player caused.
    Error { session: SessionId, text: String },
    /// Prompt; written without a trailing newline, ends the batch.
    Prompt { session: SessionId, text: String },
    /// Flush pending output, then tear the session down.
    Close { session: SessionId },
}

impl OutboundEvent {
    pub fn session(&self) -> SessionId {
        match self {
            OutboundEvent::Text { session, .. }
            | OutboundEvent::Info { session, .. }
            | OutboundEvent::Error { session, .. }
            | OutboundEvent::Prompt { session, .. }
            | OutboundEvent::Close { session } => *session,
        }
    }
}

/// Multi-producer, single-consumer-per-session event sink.
pub struct OutboundBus {
    sessions: DashMap<SessionId, mpsc::Sender<OutboundEvent>>,
    capacity: usize,
    high_water: usize,
}

impl OutboundBus {
    pub fn new() -> Self {
        Self::with_capacity(OUTBOUND_QUEUE_CAPACITY, OUTBOUND_HIGH_WATER)
    }

    pub fn with_capacity(capacity: usize, high_water: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
            high_water,
        }
    }

    /// Register a session and hand back the receiving half of its queue.
    pub fn register(&self, session: SessionId) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.insert(session, tx);
        rx
    }

    /// Drop a session's queue. Pending events in the channel remain readable
    /// by the I/O task until it drops the receiver.
    pub fn unregister(&self, session: SessionId) {
        self.sessions.remove(&session);
    }

    pub fn is_registered(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    async fn push(&self, event: OutboundEvent) {
        let tx = match self.sessions.get(&event.session()) {
            Some(tx) => tx.clone(),
            None => return,
        };
        if tx.send(event).await.is_err() {
            // Session tore down mid-handler; emission is best-effort.
            debug!("outbound queue closed mid-send");
        }
    }

    /// Push a broadcast-class event, dropping it if the session is congested.
    fn push_lossy(&self, event: OutboundEvent) {
        let session = event.session();
        let tx = match self.sessions.get(&session) {
            Some(tx) => tx.clone(),
            None => return,
        };
        let depth = self.capacity - tx.capacity();
        if depth >= self.high_water {
            debug!(%session, depth, "dropping broadcast for congested session");
            return;
        }
        let _ = tx.try_send(event);
    }

    pub async fn send_text(&self, session: SessionId, text: impl Into<String>) {
        self.push(OutboundEvent::Text {
            session,
            text: text.into(),
        })
        .await;
    }

    pub async fn send_info(&self, session: SessionId, text: impl Into<String>) {
        self.push(OutboundEvent::Info {
            session,
            text: text.into(),
        })
        .await;
    }

    pub async fn send_error(&self, session: SessionId, text: impl Into<String>) {
        self.push(OutboundEvent::Error {
            session,
            text: text.into(),
        })
        .await;
    }

    pub async fn send_prompt(&self, session: SessionId, text: impl Into<String>) {
        self.push(OutboundEvent::Prompt {
            session,
            text: text.into(),
        })
        .await;
    }

    pub async fn close(&self, session: SessionId) {
        self.push(OutboundEvent::Close { session }).await;
    }

    /// Room/zone/global chatter; dropped for sessions over the high-water mark.
    pub fn broadcast_text(&self, session: SessionId, text: impl Into<String>) {
        self.push_lossy(OutboundEvent::Text {
            session,
            text: text.into(),
        });
    }
}

impl Default for OutboundBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_push_order() {
        let bus = OutboundBus::new();
        let sid = SessionId(1);
        let mut rx = bus.register(sid);

        bus.send_text(sid, "first").await;
        bus.send_error(sid, "second").await;
        bus.send_prompt(sid, "> ").await;

        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::Text {
                session: sid,
                text: "first".into()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::Error {
                session: sid,
                text: "second".into()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::Prompt {
                session: sid,
                text: "> ".into()
            }
        );
    }

    #[tokio::test]
    async fn close_arrives_after_pending_events() {
        let bus = OutboundBus::new();
        let sid = SessionId(2);
        let mut rx = bus.register(sid);

        bus.send_text(sid, "goodbye").await;
        bus.close(sid).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            OutboundEvent::Text { .. }
        ));
        assert_eq!(rx.recv().await.unwrap(), OutboundEvent::Close { session: sid });
    }

    #[tokio::test]
    async fn broadcasts_drop_past_high_water_but_essentials_survive() {
        let bus = OutboundBus::with_capacity(8, 2);
        let sid = SessionId(3);
        let mut rx = bus.register(sid);

        bus.broadcast_text(sid, "a");
        bus.broadcast_text(sid, "b");
        // Queue depth is now at the high-water mark; broadcasts drop.
        bus.broadcast_text(sid, "dropped");
        // Essential traffic still goes through.
        bus.send_error(sid, "kept").await;

        let mut texts = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            match ev {
                OutboundEvent::Text { text, .. } | OutboundEvent::Error { text, .. } => {
                    texts.push(text)
                }
                _ => {}
            }
        }
        assert_eq!(texts, vec!["a", "b", "kept"]);
    }

    #[tokio::test]
    async fn unknown_session_is_a_no_op() {
        let bus = OutboundBus::new();
        bus.send_text(SessionId(99), "into the void").await;
        bus.broadcast_text(SessionId(99), "also void");
    }
}
