//! Authoritative mutable state, owned by the engine task.
//!
//! Each registry is a plain-`HashMap` structure with no interior locking;
//! the single-threaded tick discipline is the synchronization.

pub mod items;
pub mod mobs;
pub mod players;
pub mod shops;
pub mod world_state;

pub use items::ItemRegistry;
pub use mobs::MobRegistry;
pub use players::{LoginOutcome, PlayerRegistry, PlayerState};
pub use shops::ShopRegistry;
pub use world_state::{FeatureState, WorldStateRegistry};
