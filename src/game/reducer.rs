//! Event Handlers
//!
//! One handler per signal, registered on the client's event queue. Local
//! player moves are predicted here and forwarded over the channel; moves
//! that arrive from the channel are applied without being sent back.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::core::entity::{Entity, EntityId, Position};
use crate::game::events::{decode_args, EventError, Origin, Signal};
use crate::game::input::{CODE_DELETE, CODE_NEXT, CODE_PREV};
use crate::game::queue::{Dispatch, EventQueue};
use crate::game::state::ClientState;

/// Register every handler.
pub fn install(queue: &mut EventQueue<ClientState>) {
    queue.define_handler(Signal::NewEntity, new_entity);
    queue.define_handler(Signal::MoveEntity, move_entity);
    queue.define_handler(Signal::MoveTo, move_to);
    queue.define_handler(Signal::Rerender, |state, _| {
        state.dirty = true;
        Ok(())
    });
    queue.define_handler(Signal::ToggleUi, |state, _| {
        state.ui.hidden = !state.ui.hidden;
        state.dirty = true;
        Ok(())
    });
    queue.define_handler(Signal::InitMap, init_map);
    queue.define_handler(Signal::DebugMsg, debug_msg);
    queue.define_handler(Signal::UiSelect, ui_select);
    queue.define_handler(Signal::UiInput, ui_input);
    queue.define_handler(Signal::UpdateEntity, |_, d| {
        debug!("UPDATE_ENTITY {:?}", d.params);
        Ok(())
    });
}

fn unknown(signal: Signal, eid: EntityId) -> EventError {
    EventError::UnknownEntity { signal, eid: eid.0 }
}

/// `NEW_ENTITY(eid, name, textureKey, pos)`
fn new_entity(state: &mut ClientState, d: &Dispatch<'_>) -> Result<(), EventError> {
    let (eid, name, texture, pos): (EntityId, String, String, Position) = decode_args(d.signal, d.params)?;
    if eid.is_camera() {
        debug!("Ignoring NEW_ENTITY for the camera id");
        return Ok(());
    }

    if let Some(entity) = state.entities.get_mut(eid) {
        entity.set_pos_obj(pos);
        if Some(eid) == state.player {
            state.center_camera();
        }
        return Ok(());
    }

    let mut entity = Entity::new(eid, name, texture).at(pos);
    entity.map = state.map.id.clone();
    state.add_entity(entity);
    state.dirty = true;
    Ok(())
}

/// `MOVE_ENTITY(eid, dx, dy)`
fn move_entity(state: &mut ClientState, d: &Dispatch<'_>) -> Result<(), EventError> {
    let (eid, dx, dy): (EntityId, i32, i32) = decode_args(d.signal, d.params)?;
    if eid.is_camera() && d.origin == Origin::Remote {
        return Ok(());
    }

    let entity = state.entities.get(eid).ok_or_else(|| unknown(d.signal, eid))?;
    let target = entity.next_pos(dx, dy);
    if !state.is_walkable(target) {
        debug!("Dropping move of {} to {}", eid, target);
        return Ok(());
    }

    if let Some(entity) = state.entities.get_mut(eid) {
        entity.set_pos_obj(target);
    }

    if Some(eid) == state.player {
        state.center_camera();
        // Remote moves of our own entity are not echoed
        if d.origin == Origin::Local {
            state.emit(Signal::MoveEntity, vec![json!(eid.0), json!(dx), json!(dy)]);
        }
    }
    Ok(())
}

/// `MOVE_TO(eid, x, y)`
fn move_to(state: &mut ClientState, d: &Dispatch<'_>) -> Result<(), EventError> {
    let (eid, x, y): (EntityId, i32, i32) = decode_args(d.signal, d.params)?;
    let target = Position::new(x, y);
    if !state.is_walkable(target) {
        debug!("Dropping MOVE_TO of {} to {}", eid, target);
        return Ok(());
    }

    let entity = state.entities.get_mut(eid).ok_or_else(|| unknown(d.signal, eid))?;
    entity.set_pos_obj(target);
    if Some(eid) == state.player {
        state.center_camera();
    }
    Ok(())
}

/// `INIT_MAP()`: put the player on the spawn point of the current map.
fn init_map(state: &mut ClientState, d: &Dispatch<'_>) -> Result<(), EventError> {
    let Some(eid) = state.player else {
        debug!("INIT_MAP without a player");
        return Ok(());
    };
    let spawn = state.map.spawn;
    let map_id = state.map.id.clone();
    let entity = state.entities.get_mut(eid).ok_or_else(|| unknown(d.signal, eid))?;
    entity.set_pos_obj(spawn);
    entity.map = map_id;
    state.map.add_member(eid);
    state.center_camera();
    state.dirty = true;

    if d.origin == Origin::Local {
        state.emit(Signal::InitMap, vec![]);
    }
    Ok(())
}

/// `DEBUG_MSG(text)`: log the local projection. Local messages are shared
/// with the map.
fn debug_msg(state: &mut ClientState, d: &Dispatch<'_>) -> Result<(), EventError> {
    let text = d.params.first().cloned().unwrap_or(Value::Null);
    let entities: Vec<String> = state
        .entities
        .iter()
        .map(|e| format!("{} {} {}", e.eid, e.name, e.pos))
        .collect();
    info!(origin = ?d.origin, "DEBUG_MSG {}: {:?}", text, entities);

    if d.origin == Origin::Local {
        state.emit(Signal::DebugMsg, d.params.to_vec());
    }
    Ok(())
}

/// `UI_SELECT(code)`
fn ui_select(state: &mut ClientState, d: &Dispatch<'_>) -> Result<(), EventError> {
    let (code,): (i64,) = decode_args(d.signal, d.params)?;
    match code {
        CODE_PREV => state.ui.prev(),
        CODE_NEXT => state.ui.next(),
        _ => {
            if let Some(action) = state.ui.select() {
                state.selections.push(action);
            }
        }
    }
    state.dirty = true;
    Ok(())
}

/// `UI_INPUT(char | code)`
fn ui_input(state: &mut ClientState, d: &Dispatch<'_>) -> Result<(), EventError> {
    let (input,): (Value,) = decode_args(d.signal, d.params)?;
    match input {
        Value::String(text) => state.ui.push_str(&text),
        other => {
            let (code,): (i64,) = decode_args(d.signal, &[other])?;
            match code {
                CODE_DELETE => state.ui.backspace(),
                CODE_PREV => state.ui.prev(),
                CODE_NEXT => state.ui.next(),
                _ => {
                    if let Some(action) = state.ui.select() {
                        state.selections.push(action);
                    }
                }
            }
        }
    }
    state.dirty = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{MapId, CAMERA_ID};
    use crate::core::map::{Tile, TileMap};
    use crate::game::queue::QueuedEvent;
    use crate::game::ui::{MenuAction, MenuOption};
    use crate::network::channel::{ChannelEndpoint, SyncChannel};
    use crate::network::protocol::{ClientMessage, GameEventMessage, SessionId};

    /// 5x5 grass field with a wall at (3, 2); player #1 at (2, 2).
    fn setup() -> (EventQueue<ClientState>, ClientState, ChannelEndpoint) {
        let mut queue = EventQueue::new();
        install(&mut queue);

        let mut state = ClientState::new();
        let mut map = TileMap::filled(MapId("MIDt".into()), 5, 5, Tile::Grass);
        map.set_tile(Position::new(3, 2), Tile::Wall);
        state.install_map(map);
        let mut player = Entity::new(EntityId(1), "Ash", "officer").at(Position::new(2, 2));
        player.map = MapId("MIDt".into());
        state.set_player(player);
        state.dirty = false;

        let (channel, mut endpoint) = SyncChannel::pair(SessionId("s".into()));
        endpoint.open();
        endpoint.frames.try_recv().unwrap();
        state.channel = Some(channel);
        (queue, state, endpoint)
    }

    fn sent(endpoint: &mut ChannelEndpoint) -> Vec<GameEventMessage> {
        let mut out = Vec::new();
        while let Ok(ClientMessage::GameEvent(event)) = endpoint.frames.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_local_move_predicts_and_emits() {
        let (mut queue, mut state, mut endpoint) = setup();
        queue.enqueue(Signal::MoveEntity, vec![json!(1), json!(0), json!(-1)]);
        queue.advance(&mut state);

        assert_eq!(state.player_entity().unwrap().pos, Position::new(2, 1));
        assert_eq!(state.camera().unwrap().pos, Position::new(2, 1));
        assert_eq!(
            sent(&mut endpoint),
            vec![GameEventMessage::new(Signal::MoveEntity, vec![json!(1), json!(0), json!(-1)])]
        );
    }

    #[test]
    fn test_move_into_wall_is_dropped() {
        let (mut queue, mut state, mut endpoint) = setup();
        queue.enqueue(Signal::MoveEntity, vec![json!(1), json!(1), json!(0)]);
        let report = queue.advance(&mut state);

        assert_eq!(report.failed, 0);
        assert_eq!(state.player_entity().unwrap().pos, Position::new(2, 2));
        assert!(sent(&mut endpoint).is_empty());
    }

    #[test]
    fn test_step_into_corner_wall_leaves_entity_in_place() {
        let (mut queue, mut state, mut endpoint) = setup();
        let mut map = TileMap::filled(MapId("MIDt".into()), 3, 3, Tile::Grass);
        map.set_tile(Position::new(2, 2), Tile::Wall);
        state.install_map(map);
        let mut player = Entity::new(EntityId(1), "Ash", "officer").at(Position::new(1, 2));
        player.map = MapId("MIDt".into());
        state.set_player(player);

        queue.enqueue(Signal::MoveEntity, vec![json!(1), json!(1), json!(0)]);
        let report = queue.advance(&mut state);

        assert_eq!(report.failed, 0);
        assert_eq!(state.player_entity().unwrap().pos, Position::new(1, 2));
        assert!(sent(&mut endpoint).is_empty());
    }

    #[test]
    fn test_move_off_map_is_dropped() {
        let (mut queue, mut state, _endpoint) = setup();
        for _ in 0..4 {
            queue.enqueue(Signal::MoveEntity, vec![json!(1), json!(-1), json!(0)]);
        }
        queue.advance(&mut state);
        assert_eq!(state.player_entity().unwrap().pos, Position::new(0, 2));
    }

    #[test]
    fn test_remote_move_of_player_not_echoed() {
        let (mut queue, mut state, mut endpoint) = setup();
        queue.push(QueuedEvent::remote(Signal::MoveEntity, vec![json!(1), json!(-1), json!(0)]));
        queue.advance(&mut state);

        assert_eq!(state.player_entity().unwrap().pos, Position::new(1, 2));
        assert!(sent(&mut endpoint).is_empty());
    }

    #[test]
    fn test_remote_entity_appears_then_moves() {
        let (mut queue, mut state, mut endpoint) = setup();
        queue.push(QueuedEvent::remote(
            Signal::NewEntity,
            vec![json!(9), json!("Vex"), json!("officer"), json!({"x": 0, "y": 0})],
        ));
        queue.push(QueuedEvent::remote(Signal::MoveEntity, vec![json!(9), json!(1), json!(1)]));
        queue.advance(&mut state);

        let other = state.entities.get(EntityId(9)).unwrap();
        assert_eq!(other.pos, Position::new(1, 1));
        assert!(state.map.has_member(EntityId(9)));
        assert!(state.dirty);
        // Camera follows only the player
        assert_eq!(state.camera().unwrap().pos, Position::new(0, 0));
        assert!(sent(&mut endpoint).is_empty());
    }

    #[test]
    fn test_new_entity_twice_keeps_single_record() {
        let (mut queue, mut state, _endpoint) = setup();
        let before = state.entities.len();
        queue.push(QueuedEvent::remote(
            Signal::NewEntity,
            vec![json!(9), json!("Vex"), json!("officer"), json!({"x": 0, "y": 0})],
        ));
        queue.push(QueuedEvent::remote(
            Signal::NewEntity,
            vec![json!(9), json!("Renamed"), json!("other"), json!({"x": 4, "y": 4})],
        ));
        queue.advance(&mut state);

        assert_eq!(state.entities.len(), before + 1);
        let other = state.entities.get(EntityId(9)).unwrap();
        assert_eq!(other.name, "Vex");
        assert_eq!(other.pos, Position::new(4, 4));
    }

    #[test]
    fn test_new_entity_for_camera_ignored() {
        let (mut queue, mut state, _endpoint) = setup();
        queue.push(QueuedEvent::remote(
            Signal::NewEntity,
            vec![json!(0), json!("Spoof"), json!("x"), json!({"x": 3, "y": 3})],
        ));
        queue.advance(&mut state);
        assert_eq!(state.entities.get(CAMERA_ID).unwrap().name, "Camera");
    }

    #[test]
    fn test_move_to_correction() {
        let (mut queue, mut state, _endpoint) = setup();
        queue.push(QueuedEvent::remote(Signal::MoveTo, vec![json!(1), json!(4), json!(4)]));
        queue.push(QueuedEvent::remote(Signal::MoveTo, vec![json!(1), json!(3), json!(2)]));
        queue.advance(&mut state);

        // Second target is a wall
        assert_eq!(state.player_entity().unwrap().pos, Position::new(4, 4));
        assert_eq!(state.camera().unwrap().pos, Position::new(4, 4));
    }

    #[test]
    fn test_unknown_entity_move_is_a_logged_failure() {
        let (mut queue, mut state, _endpoint) = setup();
        queue.push(QueuedEvent::remote(Signal::MoveEntity, vec![json!(77), json!(1), json!(0)]));
        queue.enqueue(Signal::Rerender, vec![]);
        let report = queue.advance(&mut state);
        assert_eq!(report.failed, 1);
        assert!(state.dirty);
    }

    #[test]
    fn test_init_map_places_player_at_spawn_and_emits() {
        let (mut queue, mut state, mut endpoint) = setup();
        state.entities.get_mut(EntityId(1)).unwrap().set_pos(0, 0);
        queue.enqueue(Signal::InitMap, vec![]);
        queue.advance(&mut state);

        assert_eq!(state.player_entity().unwrap().pos, state.map.spawn);
        assert_eq!(state.camera().unwrap().pos, state.map.spawn);
        assert!(state.dirty);
        assert_eq!(sent(&mut endpoint), vec![GameEventMessage::new(Signal::InitMap, vec![])]);
    }

    #[test]
    fn test_toggle_ui() {
        let (mut queue, mut state, mut endpoint) = setup();
        queue.enqueue(Signal::ToggleUi, vec![]);
        queue.advance(&mut state);
        assert!(state.ui.hidden);
        assert!(state.dirty);
        assert!(sent(&mut endpoint).is_empty());
    }

    #[test]
    fn test_ui_select_and_input() {
        let (mut queue, mut state, _endpoint) = setup();
        state.ui.set_menu(vec![
            MenuOption::new("deploy", MenuAction::Deploy),
            MenuOption::new("armory", MenuAction::Armory),
        ]);

        queue.enqueue(Signal::UiSelect, vec![json!(2)]);
        queue.enqueue(Signal::UiSelect, vec![json!(0)]);
        queue.enqueue(Signal::UiInput, vec![json!("A")]);
        queue.enqueue(Signal::UiInput, vec![json!("b")]);
        queue.enqueue(Signal::UiInput, vec![json!(-1)]);
        queue.advance(&mut state);

        assert_eq!(state.selections, vec![MenuAction::Armory]);
        assert_eq!(state.ui.input(), "A");
    }
}
