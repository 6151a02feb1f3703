//! Engine-wide constants.
//!
//! Tunables that operators are expected to change live in `config`; the
//! values here are part of the engine contract.

// =============================================================================
// SERVER CONFIGURATION
// =============================================================================

pub const DEFAULT_PORT: u16 = 4000;
pub const MAX_TOTAL_CONNECTIONS: usize = 500;
pub const MAX_CONNECTIONS_PER_IP: usize = 5;

// =============================================================================
// PLAYER LIMITS
// =============================================================================

pub const MIN_NAME_LENGTH: usize = 3;
pub const MAX_NAME_LENGTH: usize = 16;
pub const MAX_CHAT_LENGTH: usize = 512;

pub const MIN_GUILD_NAME_LENGTH: usize = 3;
pub const MAX_GUILD_NAME_LENGTH: usize = 24;
pub const MAX_GUILD_TAG_LENGTH: usize = 5;

/// Hit points of a fresh level-1 player before any equipment.
pub const BASE_MAX_HP: i32 = 10;

// =============================================================================
// TIMING
// =============================================================================

/// Cooldown between uses of `recall`.
pub const RECALL_COOLDOWN_MS: u64 = 300_000;

/// Period of the persistence flush scheduler action.
pub const PERSIST_FLUSH_INTERVAL_MS: u64 = 30_000;

/// How long the shutdown warning precedes the close of all sessions.
pub const SHUTDOWN_GRACE_MS: u64 = 5_000;

// =============================================================================
// MAIL
// =============================================================================

pub const MAX_MAIL_BODY_LINES: usize = 40;
pub const MAX_MAIL_LINE_LENGTH: usize = 256;

// =============================================================================
// OUTBOUND QUEUES
// =============================================================================

/// Capacity of each session's outbound event channel.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Above this queue depth, broadcast-class events are dropped for the
/// session. Prompts, errors, and direct command responses are never dropped.
pub const OUTBOUND_HIGH_WATER: usize = 192;
