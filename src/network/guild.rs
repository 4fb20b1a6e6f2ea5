//! Guild
//!
//! Server-side aggregate for one station area. Owns the authoritative
//! record of every member entity and every field map its members have
//! opened. Maps are never shared across guilds.
//!
//! Membership is kept symmetric here: an entity whose `map` names a field
//! map is in that map's member set, and nowhere else.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::core::entity::{Entity, EntityId, MapId, Position};
use crate::core::map::TileMap;
use crate::core::mapgen::generate_field;
use crate::core::rng::{derive_seed, DeterministicRng};

const NAME_DOMAIN: &[u8] = b"tilesync.guild.name";
const SEED_DOMAIN: &[u8] = b"tilesync.guild.seed";
const MAP_ID_DOMAIN: &[u8] = b"tilesync.guild.map";

const ADJECTIVES: &[&str] = &[
    "Iron", "Silent", "Amber", "Hollow", "Crimson", "Northern", "Ashen", "Vigilant",
];
const NOUNS: &[&str] = &[
    "Wardens", "Lanterns", "Watch", "Compact", "Circle", "Vanguard", "Sentinels", "Lodge",
];

/// Outcome of a move request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Applied; the entity now stands here.
    Applied(Position),
    /// Refused; the entity stays here.
    Rejected(Position),
}

/// Generated guild name for a location.
pub fn guild_name(location: &str) -> String {
    let seed = derive_seed(NAME_DOMAIN, &[location.as_bytes()]);
    let mut rng = DeterministicRng::from_seed_bytes(&seed);
    let adjective = rng.choose(ADJECTIVES).copied().unwrap_or("Iron");
    let noun = rng.choose(NOUNS).copied().unwrap_or("Watch");
    format!("{} {} {}", location, adjective, noun)
}

/// Named aggregate of members and their maps.
#[derive(Debug, Clone)]
pub struct Guild {
    /// `"{location} {generated name}"`
    pub name: String,
    /// Station area this guild serves.
    pub location: String,
    seed: [u8; 32],
    members: BTreeMap<EntityId, Entity>,
    maps: BTreeMap<MapId, TileMap>,
    maps_opened: u32,
    field_size: (u32, u32),
}

impl Guild {
    /// Found a guild for `location`. Field maps are `width` x `height`.
    pub fn new(location: &str, width: u32, height: u32) -> Self {
        let name = guild_name(location);
        let seed = derive_seed(SEED_DOMAIN, &[name.as_bytes()]);
        info!(guild = %name, "Guild created");
        Self {
            name,
            location: location.to_string(),
            seed,
            members: BTreeMap::new(),
            maps: BTreeMap::new(),
            maps_opened: 0,
            field_size: (width, height),
        }
    }

    /// Seed for this guild's procedural content.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Enrol an entity. It starts on the overworld. Returns false if the id
    /// is already a member.
    pub fn new_member(&mut self, mut entity: Entity) -> bool {
        if self.members.contains_key(&entity.eid) {
            return false;
        }
        entity.map = MapId::world();
        self.members.insert(entity.eid, entity);
        true
    }

    /// Drop a member, taking it off its map.
    pub fn remove_member(&mut self, eid: EntityId) -> Option<Entity> {
        let entity = self.members.remove(&eid)?;
        if let Some(map) = self.maps.get_mut(&entity.map) {
            map.remove_member(eid);
        }
        Some(entity)
    }

    /// Member by id.
    pub fn member(&self, eid: EntityId) -> Option<&Entity> {
        self.members.get(&eid)
    }

    /// Map by id.
    pub fn get_map(&self, id: &MapId) -> Option<&TileMap> {
        self.maps.get(id)
    }

    /// Number of open maps.
    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Ids of open maps.
    pub fn map_ids(&self) -> impl Iterator<Item = &MapId> + '_ {
        self.maps.keys()
    }

    /// Open a fresh field map and put `eid` on its spawn point.
    pub fn new_map(&mut self, eid: EntityId) -> Option<MapId> {
        if !self.members.contains_key(&eid) {
            return None;
        }
        let index = self.maps_opened;
        self.maps_opened += 1;

        let digest = derive_seed(MAP_ID_DOMAIN, &[&self.seed, &index.to_le_bytes()]);
        let id = MapId(format!("MID{}", hex::encode(&digest[..6])));
        let (width, height) = self.field_size;
        let map = generate_field(id.clone(), &self.seed, index, width, height);
        let spawn = map.spawn;
        debug!(guild = %self.name, map = %id, "Opened field map");

        self.maps.insert(id.clone(), map);
        self.place(eid, &id, spawn);
        Some(id)
    }

    /// Field map the member stands on, opening one on first request.
    pub fn map_for(&mut self, eid: EntityId) -> Option<&TileMap> {
        let current = self.members.get(&eid)?.map.clone();
        let id = if self.maps.contains_key(&current) {
            current
        } else {
            self.new_map(eid)?
        };
        self.maps.get(&id)
    }

    /// Move a member onto `map_id` at `pos`, keeping membership symmetric.
    /// `map_id` may be the overworld. Returns false for unknown ids.
    pub fn place(&mut self, eid: EntityId, map_id: &MapId, pos: Position) -> bool {
        if !map_id.is_world() && !self.maps.contains_key(map_id) {
            return false;
        }
        let Some(entity) = self.members.get_mut(&eid) else {
            return false;
        };
        if let Some(old) = self.maps.get_mut(&entity.map) {
            old.remove_member(eid);
        }
        entity.map = map_id.clone();
        entity.set_pos_obj(pos);
        if let Some(new) = self.maps.get_mut(map_id) {
            new.add_member(eid);
        }
        true
    }

    /// Authoritative step. On a field map the target must be walkable; the
    /// overworld has no tiles to check.
    pub fn try_move(&mut self, eid: EntityId, dx: i32, dy: i32) -> Option<MoveOutcome> {
        let entity = self.members.get(&eid)?;
        let target = entity.next_pos(dx, dy);
        let legal = match self.maps.get(&entity.map) {
            Some(map) => map.is_walkable(target),
            None => entity.map.is_world(),
        };
        if !legal {
            return Some(MoveOutcome::Rejected(entity.pos));
        }
        let entity = self.members.get_mut(&eid)?;
        entity.set_pos_obj(target);
        Some(MoveOutcome::Applied(target))
    }

    /// Set a member's position on its current map if the cell is legal.
    pub fn set_position(&mut self, eid: EntityId, pos: Position) -> bool {
        let Some(entity) = self.members.get(&eid) else {
            return false;
        };
        let legal = match self.maps.get(&entity.map) {
            Some(map) => map.is_walkable(pos),
            None => entity.map.is_world(),
        };
        if legal {
            if let Some(entity) = self.members.get_mut(&eid) {
                entity.set_pos_obj(pos);
            }
        }
        legal
    }

    /// Members standing on `map_id`.
    pub fn members_on<'a>(&'a self, map_id: &'a MapId) -> impl Iterator<Item = &'a Entity> + 'a {
        self.maps
            .get(map_id)
            .into_iter()
            .flat_map(|map| map.members())
            .filter_map(move |eid| self.members.get(&eid))
    }

    /// Close a map and send its members back to the overworld.
    pub fn close_map(&mut self, map_id: &MapId) -> Vec<EntityId> {
        let Some(map) = self.maps.remove(map_id) else {
            return Vec::new();
        };
        let evicted: Vec<EntityId> = map.members().collect();
        for eid in &evicted {
            if let Some(entity) = self.members.get_mut(eid) {
                entity.map = MapId::world();
                entity.set_pos_obj(Position::default());
            }
        }
        info!(guild = %self.name, map = %map_id, evicted = evicted.len(), "Closed field map");
        evicted
    }

    /// Every member's map lists it, and every map lists only members that
    /// point back at it.
    pub fn membership_consistent(&self) -> bool {
        let forward = self.members.values().all(|e| match self.maps.get(&e.map) {
            Some(map) => map.has_member(e.eid),
            None => e.map.is_world(),
        });
        let backward = self.maps.values().all(|map| {
            map.members()
                .all(|eid| self.members.get(&eid).is_some_and(|e| e.map == map.id))
        });
        forward && backward
    }
}
