//! Shared game model.
//!
//! Used identically by client-side prediction and server-side authority,
//! so both apply the same movement-legality rule.

pub mod entity;
pub mod map;
pub mod mapgen;
pub mod rng;
pub mod store;

// Re-export core types
pub use entity::{Entity, EntityId, MapId, Position, CAMERA_ID};
pub use map::{Tile, TileMap};
pub use rng::DeterministicRng;
pub use store::EntityStore;
