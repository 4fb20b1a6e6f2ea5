//! Client State
//!
//! Everything the event handlers and mode entries read and mutate: the local
//! entity projection, the current map, UI state and the channel handle.

use serde_json::Value;
use tracing::debug;

use crate::core::entity::{Entity, EntityId, Position, CAMERA_ID};
use crate::core::map::TileMap;
use crate::core::store::EntityStore;
use crate::game::events::Signal;
use crate::game::input::InputMode;
use crate::game::ui::{Console, MenuAction, UiState};
use crate::network::channel::SyncChannel;
use crate::network::protocol::{GameEventMessage, SessionId};

/// Texture key of the camera.
pub const CAMERA_TEXTURE: &str = "blank";

/// What the renderer should draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum View {
    /// Title menu.
    #[default]
    Menu,
    /// Console prompt.
    Console,
    /// Map around the camera.
    Field,
    /// Base menu over the overworld.
    Base,
}

/// Mutable client context threaded through every handler.
#[derive(Debug)]
pub struct ClientState {
    /// Local projection of entities, camera included.
    pub entities: EntityStore,
    /// Current map.
    pub map: TileMap,
    /// Controlled entity, once loaded.
    pub player: Option<EntityId>,
    /// Session, once known.
    pub session: Option<SessionId>,
    /// Persistent channel, once the entity is loaded.
    pub channel: Option<SyncChannel>,
    /// Menu and text input.
    pub ui: UiState,
    /// Console text.
    pub console: Console,
    /// How input is interpreted.
    pub input_mode: InputMode,
    /// Active view.
    pub view: View,
    /// Set by handlers that need a full redraw.
    pub dirty: bool,
    /// Menu actions chosen since the controller last looked.
    pub selections: Vec<MenuAction>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    /// Fresh state holding only the camera, on the overworld.
    pub fn new() -> Self {
        let mut entities = EntityStore::new();
        entities.insert(Entity::new(CAMERA_ID, "Camera", CAMERA_TEXTURE));
        Self {
            entities,
            map: TileMap::overworld(),
            player: None,
            session: None,
            channel: None,
            ui: UiState::default(),
            console: Console::default(),
            input_mode: InputMode::Ui,
            view: View::Menu,
            dirty: false,
            selections: Vec::new(),
        }
    }

    /// Add an entity. When it stands on the current map it becomes a member.
    /// Returns false if the id is already known.
    pub fn add_entity(&mut self, entity: Entity) -> bool {
        let eid = entity.eid;
        let on_map = entity.map == self.map.id;
        if !self.entities.insert(entity) {
            return false;
        }
        if on_map && !eid.is_camera() {
            self.map.add_member(eid);
        }
        true
    }

    /// Adopt the entity this client controls.
    pub fn set_player(&mut self, entity: Entity) {
        let eid = entity.eid;
        if self.entities.contains(eid) {
            self.entities.remove(eid);
            self.map.remove_member(eid);
        }
        self.add_entity(entity);
        self.player = Some(eid);
    }

    /// Controlled entity.
    pub fn player_entity(&self) -> Option<&Entity> {
        self.entities.get(self.player?)
    }

    /// Camera entity.
    pub fn camera(&self) -> Option<&Entity> {
        self.entities.get(CAMERA_ID)
    }

    /// Replace the current map. The player moves onto it; other entities
    /// from the previous map are forgotten.
    pub fn install_map(&mut self, map: TileMap) {
        let stale: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|e| !e.eid.is_camera() && Some(e.eid) != self.player)
            .map(|e| e.eid)
            .collect();
        for eid in stale {
            self.entities.remove(eid);
        }

        self.map = map;
        if let Some(eid) = self.player {
            if let Some(player) = self.entities.get_mut(eid) {
                player.map = self.map.id.clone();
            }
            self.map.add_member(eid);
        }
        self.dirty = true;
    }

    /// Put the camera on the player.
    pub fn center_camera(&mut self) {
        let Some(pos) = self.player_entity().map(|e| e.pos) else {
            return;
        };
        if let Some(camera) = self.entities.get_mut(CAMERA_ID) {
            camera.set_pos_obj(pos);
        }
    }

    /// Whether an entity may stand at `pos` on the current map.
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.map.is_walkable(pos)
    }

    /// Emit over the channel. False if there is no open channel.
    pub fn emit(&self, signal: Signal, params: Vec<Value>) -> bool {
        match &self.channel {
            Some(channel) => channel.emit(GameEventMessage::new(signal, params)),
            None => {
                debug!("No channel for {}", signal);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::MapId;
    use crate::core::map::Tile;

    #[test]
    fn test_camera_exists_from_start() {
        let state = ClientState::new();
        let camera = state.camera().unwrap();
        assert_eq!(camera.name, "Camera");
        assert_eq!(camera.texture_key, CAMERA_TEXTURE);
        assert_eq!(state.map.member_count(), 0);
    }

    #[test]
    fn test_install_map_moves_player_and_drops_others() {
        let mut state = ClientState::new();
        state.set_player(Entity::new(EntityId(3), "Ash", "officer"));
        state.add_entity(Entity::new(EntityId(4), "Other", "officer"));
        assert!(state.map.has_member(EntityId(4)));

        let field = TileMap::filled(MapId("MIDf".into()), 8, 8, Tile::Grass);
        state.install_map(field);

        assert!(state.map.has_member(EntityId(3)));
        assert!(!state.entities.contains(EntityId(4)));
        assert!(state.entities.contains(CAMERA_ID));
        assert_eq!(state.player_entity().unwrap().map, MapId("MIDf".into()));
        assert!(state.dirty);
    }

    #[test]
    fn test_center_camera() {
        let mut state = ClientState::new();
        state.set_player(Entity::new(EntityId(3), "Ash", "officer").at(Position::new(5, 6)));
        state.center_camera();
        assert_eq!(state.camera().unwrap().pos, Position::new(5, 6));
    }

    #[test]
    fn test_emit_without_channel() {
        let state = ClientState::new();
        assert!(!state.emit(Signal::Rerender, vec![]));
    }
}
