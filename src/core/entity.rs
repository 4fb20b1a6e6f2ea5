//! Entity Definitions
//!
//! Positioned, identified game objects. Mutation methods here are
//! unconditional; movement legality is checked by the caller against
//! [`TileMap::is_walkable`](crate::core::map::TileMap::is_walkable).

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// IDS
// =============================================================================

/// Unique entity identifier, assigned by the server and never reused.
///
/// `0` is reserved for the client-side camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

/// Camera entity id. Exists only on the client and is never transmitted.
pub const CAMERA_ID: EntityId = EntityId(0);

impl EntityId {
    /// Whether this is the reserved camera id.
    pub fn is_camera(self) -> bool {
        self == CAMERA_ID
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Map identifier. The special id `world` is the overworld location an
/// entity occupies before it has been deployed onto a field map.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(pub String);

impl MapId {
    /// Id of the overworld location.
    pub const WORLD: &'static str = "world";

    /// The overworld location.
    pub fn world() -> Self {
        Self(Self::WORLD.to_string())
    }

    /// Whether this id names the overworld rather than a field map.
    pub fn is_world(&self) -> bool {
        self.0 == Self::WORLD
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MapId {
    fn default() -> Self {
        Self::world()
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// POSITION
// =============================================================================

/// Map-local grid coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position offset by `(dx, dy)`.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// A named, positioned game object (player, camera or NPC).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique id
    pub eid: EntityId,
    /// Display name
    pub name: String,
    /// Texture key for the renderer
    pub texture_key: String,
    /// Position in map-local coordinates
    #[serde(default)]
    pub pos: Position,
    /// Owning map
    #[serde(default)]
    pub map: MapId,
}

impl Entity {
    /// Create an entity at the origin of the overworld.
    pub fn new(eid: EntityId, name: impl Into<String>, texture_key: impl Into<String>) -> Self {
        Self {
            eid,
            name: name.into(),
            texture_key: texture_key.into(),
            pos: Position::default(),
            map: MapId::world(),
        }
    }

    /// Builder-style position.
    pub fn at(mut self, pos: Position) -> Self {
        self.pos = pos;
        self
    }

    /// Candidate position after moving by `(dx, dy)`. Does not mutate.
    pub fn next_pos(&self, dx: i32, dy: i32) -> Position {
        self.pos.offset(dx, dy)
    }

    /// Move by `(dx, dy)` unconditionally.
    pub fn move_by(&mut self, dx: i32, dy: i32) {
        self.pos = self.pos.offset(dx, dy);
    }

    /// Set position unconditionally.
    pub fn set_pos(&mut self, x: i32, y: i32) {
        self.pos = Position::new(x, y);
    }

    /// Set position from a position value.
    pub fn set_pos_obj(&mut self, pos: Position) {
        self.pos = pos;
    }

    /// Map this entity currently belongs to.
    pub fn map(&self) -> &MapId {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_and_set() {
        let mut e = Entity::new(EntityId(7), "Vex", "officer");
        e.move_by(2, -1);
        assert_eq!(e.pos, Position::new(2, -1));
        assert_eq!(e.next_pos(1, 1), Position::new(3, 0));
        // next_pos never mutates
        assert_eq!(e.pos, Position::new(2, -1));

        e.set_pos(5, 5);
        assert_eq!(e.pos, Position::new(5, 5));
        e.set_pos_obj(Position::new(0, 9));
        assert_eq!(e.pos, Position::new(0, 9));
    }

    #[test]
    fn test_camera_id() {
        assert!(CAMERA_ID.is_camera());
        assert!(!EntityId(1).is_camera());
    }

    #[test]
    fn test_entity_json_shape() {
        let e = Entity::new(EntityId(3), "Ash", "officer").at(Position::new(4, 2));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["eid"], 3);
        assert_eq!(json["pos"]["x"], 4);
        assert_eq!(json["map"], "world");
    }
}
