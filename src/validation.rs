//! Server-side validation of player-supplied names and text.
//!
//! Everything a client types is untrusted; these checks run before any
//! registry mutation. SQL injection is not a concern (there is no SQL in the
//! core), but control characters and absurd lengths are.

use crate::constants::*;

/// Validation failure with the field it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a player name: length-bounded, letters only, no whitespace.
pub fn validate_player_name(name: &str) -> ValidationResult<()> {
    if name.len() < MIN_NAME_LENGTH {
        return Err(ValidationError::new(
            "name",
            format!("Names must be at least {} characters.", MIN_NAME_LENGTH),
        ));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::new(
            "name",
            format!("Names must be at most {} characters.", MAX_NAME_LENGTH),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::new(
            "name",
            "Names may contain letters only.",
        ));
    }
    Ok(())
}

/// Validate a guild display name.
pub fn validate_guild_name(name: &str) -> ValidationResult<()> {
    if name.len() < MIN_GUILD_NAME_LENGTH {
        return Err(ValidationError::new(
            "guild_name",
            format!(
                "Guild names must be at least {} characters.",
                MIN_GUILD_NAME_LENGTH
            ),
        ));
    }
    if name.len() > MAX_GUILD_NAME_LENGTH {
        return Err(ValidationError::new(
            "guild_name",
            format!(
                "Guild names must be at most {} characters.",
                MAX_GUILD_NAME_LENGTH
            ),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '\'')
    {
        return Err(ValidationError::new(
            "guild_name",
            "Guild names may contain letters, digits, spaces and apostrophes only.",
        ));
    }
    Ok(())
}

/// Validate a guild tag shown in rosters.
pub fn validate_guild_tag(tag: &str) -> ValidationResult<()> {
    if tag.is_empty() || tag.len() > MAX_GUILD_TAG_LENGTH {
        return Err(ValidationError::new(
            "guild_tag",
            format!("Guild tags must be 1-{} characters.", MAX_GUILD_TAG_LENGTH),
        ));
    }
    if !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::new(
            "guild_tag",
            "Guild tags may contain letters and digits only.",
        ));
    }
    Ok(())
}

/// Validate free chat text: non-empty, bounded, no control characters.
pub fn validate_chat_message(message: &str) -> ValidationResult<&str> {
    if message.is_empty() {
        return Err(ValidationError::new("message", "Say what?"));
    }
    if message.len() > MAX_CHAT_LENGTH {
        return Err(ValidationError::new("message", "That message is too long."));
    }
    if message.chars().any(|c| c.is_control()) {
        return Err(ValidationError::new(
            "message",
            "Messages may not contain control characters.",
        ));
    }
    Ok(message)
}

/// Turn a guild display name into its slug id: lowercase, spaces collapsed
/// to single underscores, apostrophes dropped.
pub fn guild_slug(name: &str) -> String {
    name.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
