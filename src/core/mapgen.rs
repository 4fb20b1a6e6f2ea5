//! Field Map Generation
//!
//! Stand-in for the procedural content collaborator: produces tile data for
//! a field map from a seed. The same seed and index always yield the same
//! map.

use crate::core::entity::{MapId, Position};
use crate::core::map::{Tile, TileMap};
use crate::core::rng::DeterministicRng;

/// Percent of interior cells turned into obstacles.
const OBSTACLE_PERCENT: u32 = 12;

/// Smallest field that still leaves an interior inside the border walls.
pub const MIN_FIELD_SIZE: u32 = 5;

/// Generate a walled field map.
///
/// The outer ring is wall, the interior is grass with scattered walls and
/// water, and the spawn point (centre) plus its four neighbours are kept
/// clear so a freshly spawned entity can always move.
pub fn generate_field(id: MapId, seed: &[u8; 32], index: u32, width: u32, height: u32) -> TileMap {
    let width = width.max(MIN_FIELD_SIZE);
    let height = height.max(MIN_FIELD_SIZE);

    let mut rng = DeterministicRng::from_seed_bytes(seed);
    // Decorrelate successive maps of the same guild
    for _ in 0..index {
        rng.next_u64();
    }

    let mut map = TileMap::filled(id, width, height, Tile::Grass);
    let spawn = map.spawn;

    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let pos = Position::new(x, y);
            let border = x == 0 || y == 0 || x == width as i32 - 1 || y == height as i32 - 1;
            let tile = if border {
                Tile::Wall
            } else if rng.chance(OBSTACLE_PERCENT) {
                *rng.choose(&[Tile::Wall, Tile::Water]).unwrap_or(&Tile::Wall)
            } else {
                Tile::Grass
            };
            map.set_tile(pos, tile);
        }
    }

    map.set_tile(spawn, Tile::Floor);
    for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
        map.set_tile(spawn.offset(dx, dy), Tile::Grass);
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let seed = [9u8; 32];
        let a = generate_field(MapId("MIDa".into()), &seed, 0, 20, 16);
        let b = generate_field(MapId("MIDa".into()), &seed, 0, 20, 16);
        assert_eq!(a.tiles(), b.tiles());

        let c = generate_field(MapId("MIDa".into()), &seed, 1, 20, 16);
        assert_ne!(a.tiles(), c.tiles());
    }

    #[test]
    fn test_border_is_wall_and_spawn_clear() {
        let map = generate_field(MapId("MIDb".into()), &[3u8; 32], 0, 12, 10);
        for x in 0..12 {
            assert!(!map.is_walkable(Position::new(x, 0)));
            assert!(!map.is_walkable(Position::new(x, 9)));
        }
        assert!(map.is_walkable(map.spawn));
        assert!(map.is_walkable(map.spawn.offset(1, 0)));
        assert!(map.is_walkable(map.spawn.offset(0, -1)));
    }

    #[test]
    fn test_tiny_sizes_are_clamped() {
        let map = generate_field(MapId("MIDc".into()), &[1u8; 32], 0, 1, 1);
        assert_eq!(map.width, MIN_FIELD_SIZE);
        assert!(map.is_walkable(map.spawn));
    }
}
