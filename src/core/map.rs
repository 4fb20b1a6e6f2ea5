//! Tile Map
//!
//! Grid of typed tiles with a walkability predicate, a spawn point and the
//! set of entities currently present. Membership is kept in sync with
//! each entity's `map` field by whoever owns both (the server guild or the
//! client state).

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::entity::{EntityId, MapId, Position};

/// Tile type of a single cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tile {
    /// Open ground.
    #[default]
    Grass,
    /// Paved floor.
    Floor,
    /// Solid wall.
    Wall,
    /// Deep water.
    Water,
}

impl Tile {
    /// Whether an entity may stand on this tile.
    #[inline]
    pub fn is_walkable(self) -> bool {
        matches!(self, Tile::Grass | Tile::Floor)
    }
}

/// Map construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MapError {
    /// Tile vector length does not match `width * height`.
    #[error("expected {expected} tiles for a {width}x{height} map, got {actual}")]
    DimensionMismatch {
        /// Map width.
        width: u32,
        /// Map height.
        height: u32,
        /// `width * height`.
        expected: usize,
        /// Provided tile count.
        actual: usize,
    },
}

/// A rectangular tile map. Deserialization goes through [`TileMap::from_tiles`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTileMap")]
pub struct TileMap {
    /// Map id
    pub id: MapId,
    /// Width in cells
    pub width: u32,
    /// Height in cells
    pub height: u32,
    /// Row-major tiles
    tiles: Vec<Tile>,
    /// Spawn coordinate
    pub spawn: Position,
    /// Entities currently on this map
    #[serde(skip)]
    members: BTreeSet<EntityId>,
}

/// Wire shape of a [`TileMap`] before the dimension check.
#[derive(Deserialize)]
struct RawTileMap {
    id: MapId,
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
    spawn: Position,
}

impl TryFrom<RawTileMap> for TileMap {
    type Error = MapError;

    fn try_from(raw: RawTileMap) -> Result<Self, Self::Error> {
        Self::from_tiles(raw.id, raw.width, raw.height, raw.tiles, raw.spawn)
    }
}

impl TileMap {
    /// Create a map filled with a single tile type. Spawn is the centre.
    pub fn filled(id: MapId, width: u32, height: u32, tile: Tile) -> Self {
        Self {
            id,
            width,
            height,
            tiles: vec![tile; width as usize * height as usize],
            spawn: Position::new((width / 2) as i32, (height / 2) as i32),
            members: BTreeSet::new(),
        }
    }

    /// Create a map from row-major tiles.
    pub fn from_tiles(
        id: MapId,
        width: u32,
        height: u32,
        tiles: Vec<Tile>,
        spawn: Position,
    ) -> Result<Self, MapError> {
        let expected = width as usize * height as usize;
        if tiles.len() != expected {
            return Err(MapError::DimensionMismatch {
                width,
                height,
                expected,
                actual: tiles.len(),
            });
        }
        Ok(Self {
            id,
            width,
            height,
            tiles,
            spawn,
            members: BTreeSet::new(),
        })
    }

    /// Placeholder overworld the client holds before a field map is loaded.
    pub fn overworld() -> Self {
        Self::filled(MapId::world(), 40, 40, Tile::Grass)
    }

    #[inline]
    fn index(&self, pos: Position) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 {
            return None;
        }
        let (x, y) = (pos.x as u32, pos.y as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Whether `pos` lies inside `[0, width) x [0, height)`.
    pub fn in_bounds(&self, pos: Position) -> bool {
        self.index(pos).is_some()
    }

    /// Tile at `pos`, `None` when out of bounds.
    pub fn tile(&self, pos: Position) -> Option<Tile> {
        self.index(pos).and_then(|i| self.tiles.get(i).copied())
    }

    /// Overwrite the tile at `pos`. Returns false when out of bounds.
    pub fn set_tile(&mut self, pos: Position, tile: Tile) -> bool {
        match self.index(pos).and_then(|i| self.tiles.get_mut(i)) {
            Some(slot) => {
                *slot = tile;
                true
            }
            None => false,
        }
    }

    /// False for out-of-bounds coordinates and impassable tiles.
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.tile(pos).is_some_and(Tile::is_walkable)
    }

    /// Row-major tiles.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Add an entity to membership. Returns true if newly added.
    pub fn add_member(&mut self, eid: EntityId) -> bool {
        self.members.insert(eid)
    }

    /// Remove an entity from membership. Returns true if it was present.
    pub fn remove_member(&mut self, eid: EntityId) -> bool {
        self.members.remove(&eid)
    }

    /// Whether an entity is on this map.
    pub fn has_member(&self, eid: EntityId) -> bool {
        self.members.contains(&eid)
    }

    /// Member ids in ascending order.
    pub fn members(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn three_by_three_with_wall() -> TileMap {
        let mut map = TileMap::filled(MapId("MIDtest".into()), 3, 3, Tile::Grass);
        map.set_tile(Position::new(2, 2), Tile::Wall);
        map
    }

    #[test]
    fn test_walkable_tiles() {
        let map = three_by_three_with_wall();
        assert!(map.is_walkable(Position::new(0, 0)));
        assert!(map.is_walkable(Position::new(1, 2)));
        assert!(!map.is_walkable(Position::new(2, 2)));
    }

    #[test]
    fn test_out_of_bounds_not_walkable() {
        let map = three_by_three_with_wall();
        assert!(!map.is_walkable(Position::new(-1, 0)));
        assert!(!map.is_walkable(Position::new(0, -1)));
        assert!(!map.is_walkable(Position::new(3, 0)));
        assert!(!map.is_walkable(Position::new(0, 3)));
    }

    #[test]
    fn test_from_tiles_dimension_check() {
        let err = TileMap::from_tiles(MapId::world(), 2, 2, vec![Tile::Grass; 3], Position::new(0, 0));
        assert!(matches!(err, Err(MapError::DimensionMismatch { expected: 4, actual: 3, .. })));
    }

    #[test]
    fn test_membership() {
        let mut map = three_by_three_with_wall();
        assert!(map.add_member(EntityId(1)));
        assert!(!map.add_member(EntityId(1)));
        assert!(map.has_member(EntityId(1)));
        assert_eq!(map.member_count(), 1);
        assert!(map.remove_member(EntityId(1)));
        assert!(!map.has_member(EntityId(1)));
    }

    #[test]
    fn test_members_not_serialized() {
        let mut map = three_by_three_with_wall();
        map.add_member(EntityId(4));
        let json = serde_json::to_string(&map).unwrap();
        let back: TileMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.member_count(), 0);
        assert_eq!(back.tiles(), map.tiles());
    }

    #[test]
    fn test_truncated_tiles_rejected_on_decode() {
        let json = r#"{"id":"MIDtest","width":3,"height":3,"tiles":["grass"],"spawn":{"x":1,"y":1}}"#;
        let err = serde_json::from_str::<TileMap>(json).unwrap_err();
        assert!(err.to_string().contains("expected 9 tiles"));

        let full = serde_json::to_string(&three_by_three_with_wall()).unwrap();
        let back: TileMap = serde_json::from_str(&full).unwrap();
        assert!(!back.is_walkable(Position::new(2, 2)));
    }

    proptest! {
        #[test]
        fn prop_outside_bounds_never_walkable(
            w in 1u32..32,
            h in 1u32..32,
            x in -64i32..64,
            y in -64i32..64,
        ) {
            let map = TileMap::filled(MapId::world(), w, h, Tile::Grass);
            let inside = x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h;
            if !inside {
                prop_assert!(!map.is_walkable(Position::new(x, y)));
            } else {
                prop_assert!(map.is_walkable(Position::new(x, y)));
            }
        }
    }
}
