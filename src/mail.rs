//! Mail messages and the per-player compose buffer.
//!
//! Inboxes live on `PlayerState` ordered by send time ascending; delivery to
//! offline players goes through the `PlayerRepository`. Composing is a tiny
//! state machine: `mail send <name>` opens the buffer, raw lines append, a
//! lone `.` finishes.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_MAIL_BODY_LINES, MAX_MAIL_LINE_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: Uuid,
    pub from_name: String,
    pub body: String,
    pub sent_at_epoch_ms: u64,
    pub read: bool,
}

impl MailMessage {
    pub fn new(from_name: impl Into<String>, body: impl Into<String>, sent_at_epoch_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_name: from_name.into(),
            body: body.into(),
            sent_at_epoch_ms,
            read: false,
        }
    }

    /// Human-readable send time for inbox listings.
    pub fn sent_at_display(&self) -> String {
        match Utc.timestamp_millis_opt(self.sent_at_epoch_ms as i64).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => "????-??-??".to_string(),
        }
    }
}

/// Insert keeping the inbox ordered by send time ascending; equal timestamps
/// keep arrival order (stable).
pub fn deliver(inbox: &mut Vec<MailMessage>, message: MailMessage) {
    let at = inbox
        .iter()
        .rposition(|m| m.sent_at_epoch_ms <= message.sent_at_epoch_ms)
        .map(|i| i + 1)
        .unwrap_or(0);
    inbox.insert(at, message);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    TooManyLines,
    LineTooLong,
}

/// An in-progress mail composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailCompose {
    pub recipient_name: String,
    pub lines: Vec<String>,
}

impl MailCompose {
    pub fn new(recipient_name: impl Into<String>) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            lines: Vec::new(),
        }
    }

    pub fn push_line(&mut self, line: &str) -> Result<(), ComposeError> {
        if self.lines.len() >= MAX_MAIL_BODY_LINES {
            return Err(ComposeError::TooManyLines);
        }
        if line.len() > MAX_MAIL_LINE_LENGTH {
            return Err(ComposeError::LineTooLong);
        }
        self.lines.push(line.to_string());
        Ok(())
    }

    /// The finished body, or `None` if nothing was written.
    pub fn body(&self) -> Option<String> {
        if self.lines.iter().all(|l| l.trim().is_empty()) {
            None
        } else {
            Some(self.lines.join("\n"))
        }
    }
}
