//! Persistence boundary.
//!
//! The engine talks to storage only through the repository traits below.
//! The shipped implementations are in-memory; a real driver plugs in behind
//! the same traits without touching the core.

mod guilds;
mod players;

pub use guilds::*;
pub use players::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("storage failure: {0}")]
    Storage(String),
}
