//! Input Translation
//!
//! Discrete input events become queued game events. What an event means
//! depends on the current input mode.

use serde_json::json;

use crate::core::entity::EntityId;
use crate::game::events::Signal;
use crate::game::queue::QueuedEvent;

/// How input is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Menu navigation.
    #[default]
    Ui,
    /// Typing into a prompt.
    Text,
    /// Moving the player on the map.
    Field,
}

/// Device-independent input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// Arrow / direction key.
    Direction {
        /// Column delta.
        dx: i32,
        /// Row delta.
        dy: i32,
    },
    /// Enter.
    Confirm,
    /// Previous option.
    Prev,
    /// Next option.
    Next,
    /// Printable character.
    Char(char),
    /// Delete last character.
    Backspace,
    /// Show/hide the UI overlay.
    ToggleUi,
}

/// `UI_SELECT` / `UI_INPUT` code for "select".
pub const CODE_SELECT: i64 = 0;
/// Code for "previous".
pub const CODE_PREV: i64 = 1;
/// Code for "next".
pub const CODE_NEXT: i64 = 2;
/// `UI_INPUT` code for "delete".
pub const CODE_DELETE: i64 = -1;

/// Translate one input event. `None` when it means nothing in this mode.
pub fn translate(event: InputEvent, mode: InputMode, player: Option<EntityId>) -> Option<QueuedEvent> {
    use InputEvent::*;

    if event == ToggleUi {
        return Some(QueuedEvent::local(Signal::ToggleUi, vec![]));
    }

    let (signal, arg) = match (mode, event) {
        (InputMode::Field, Direction { dx, dy }) => {
            let eid = player?;
            return Some(QueuedEvent::local(Signal::MoveEntity, vec![json!(eid.0), json!(dx), json!(dy)]));
        }
        (InputMode::Field, _) => return None,

        (InputMode::Ui, Direction { dy, .. }) if dy < 0 => (Signal::UiSelect, json!(CODE_PREV)),
        (InputMode::Ui, Direction { dy, .. }) if dy > 0 => (Signal::UiSelect, json!(CODE_NEXT)),
        (InputMode::Ui, Prev) => (Signal::UiSelect, json!(CODE_PREV)),
        (InputMode::Ui, Next) => (Signal::UiSelect, json!(CODE_NEXT)),
        (InputMode::Ui, Confirm) => (Signal::UiSelect, json!(CODE_SELECT)),
        (InputMode::Ui, _) => return None,

        (InputMode::Text, Char(c)) => (Signal::UiInput, json!(c.to_string())),
        (InputMode::Text, Backspace) => (Signal::UiInput, json!(CODE_DELETE)),
        (InputMode::Text, Prev) => (Signal::UiInput, json!(CODE_PREV)),
        (InputMode::Text, Next) => (Signal::UiInput, json!(CODE_NEXT)),
        (InputMode::Text, Confirm) => (Signal::UiInput, json!(CODE_SELECT)),
        (InputMode::Text, _) => return None,
    };
    Some(QueuedEvent::local(signal, vec![arg]))
}
