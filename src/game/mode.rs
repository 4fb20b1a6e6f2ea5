//! Client Modes
//!
//! The client runs in exactly one mode at a time. Modes change only through
//! [`transition`], a pure table from (mode, trigger) to the next mode.
//!
//! ```text
//! Bootstrap ──no entity──────────────► MainMenu ──new officer──► CharacterCreation
//!     │ entity on world ─► WorldMap ◄──────────── start game (world) ──┘   │
//!     │ entity on field ─► FieldMode ◄─────────── start game (field) ──────┘
//!                          WorldMap ──entry done──► BaseMenu ──deploy──► FieldMode
//! ```

use std::fmt;

use crate::game::ui::MenuAction;

/// Client mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Checking the session and loading the entity.
    Bootstrap,
    /// Title menu.
    MainMenu,
    /// Name and area prompt.
    CharacterCreation,
    /// Overworld.
    WorldMap,
    /// Base menu.
    BaseMenu,
    /// Field map.
    FieldMode,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Bootstrap => "bootstrap",
            Mode::MainMenu => "main menu",
            Mode::CharacterCreation => "character creation",
            Mode::WorldMap => "world map",
            Mode::BaseMenu => "base menu",
            Mode::FieldMode => "field",
        };
        f.write_str(name)
    }
}

/// Whether a mode's entry has run yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Entry pending; runs once on the next tick.
    Entry,
    /// Per-tick play loop.
    Play,
}

/// Something that may move the controller to another mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Session has no bound entity.
    NoEntity,
    /// Entity loaded during bootstrap.
    EntityLoaded {
        /// Entity stands on the overworld.
        on_world: bool,
    },
    /// A menu option was chosen.
    Selected(MenuAction),
    /// "Start game" chosen after creation.
    StartGame {
        /// Entity stands on the overworld.
        on_world: bool,
    },
    /// Mode entry finished and hands over immediately.
    EntryDone,
    /// A lookup failed or timed out.
    LookupFailed,
}

/// Next mode for `trigger` in `mode`, or `None` if the trigger means
/// nothing there.
pub fn transition(mode: Mode, trigger: Trigger) -> Option<Mode> {
    use Mode::*;

    let next = match (mode, trigger) {
        (Bootstrap, Trigger::NoEntity) => MainMenu,
        (Bootstrap, Trigger::EntityLoaded { on_world: true }) => WorldMap,
        (Bootstrap, Trigger::EntityLoaded { on_world: false }) => FieldMode,
        (Bootstrap, Trigger::LookupFailed) => MainMenu,

        (MainMenu, Trigger::Selected(MenuAction::NewOfficer)) => CharacterCreation,

        (CharacterCreation, Trigger::StartGame { on_world: true }) => WorldMap,
        (CharacterCreation, Trigger::StartGame { on_world: false }) => FieldMode,
        (CharacterCreation, Trigger::LookupFailed) => MainMenu,

        (WorldMap, Trigger::EntryDone) => BaseMenu,

        (BaseMenu, Trigger::Selected(MenuAction::Deploy)) => FieldMode,

        (FieldMode, Trigger::LookupFailed) => BaseMenu,

        _ => return None,
    };
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_edges() {
        assert_eq!(transition(Mode::Bootstrap, Trigger::NoEntity), Some(Mode::MainMenu));
        assert_eq!(transition(Mode::Bootstrap, Trigger::EntityLoaded { on_world: true }), Some(Mode::WorldMap));
        assert_eq!(transition(Mode::Bootstrap, Trigger::EntityLoaded { on_world: false }), Some(Mode::FieldMode));
        assert_eq!(transition(Mode::Bootstrap, Trigger::LookupFailed), Some(Mode::MainMenu));
    }

    #[test]
    fn test_menu_edges() {
        assert_eq!(
            transition(Mode::MainMenu, Trigger::Selected(MenuAction::NewOfficer)),
            Some(Mode::CharacterCreation)
        );
        assert_eq!(transition(Mode::BaseMenu, Trigger::Selected(MenuAction::Deploy)), Some(Mode::FieldMode));
        assert_eq!(transition(Mode::BaseMenu, Trigger::Selected(MenuAction::Armory)), None);
        assert_eq!(transition(Mode::WorldMap, Trigger::EntryDone), Some(Mode::BaseMenu));
    }

    #[test]
    fn test_failures() {
        assert_eq!(transition(Mode::CharacterCreation, Trigger::LookupFailed), Some(Mode::MainMenu));
        assert_eq!(transition(Mode::FieldMode, Trigger::LookupFailed), Some(Mode::BaseMenu));
        assert_eq!(transition(Mode::BaseMenu, Trigger::LookupFailed), None);
    }

    #[test]
    fn test_no_way_back_to_bootstrap() {
        let modes = [
            Mode::Bootstrap,
            Mode::MainMenu,
            Mode::CharacterCreation,
            Mode::WorldMap,
            Mode::BaseMenu,
            Mode::FieldMode,
        ];
        let triggers = [
            Trigger::NoEntity,
            Trigger::EntityLoaded { on_world: true },
            Trigger::EntityLoaded { on_world: false },
            Trigger::Selected(MenuAction::NewOfficer),
            Trigger::Selected(MenuAction::Deploy),
            Trigger::StartGame { on_world: true },
            Trigger::StartGame { on_world: false },
            Trigger::EntryDone,
            Trigger::LookupFailed,
        ];
        for mode in modes {
            for trigger in triggers {
                assert_ne!(transition(mode, trigger), Some(Mode::Bootstrap));
                if mode == Mode::FieldMode {
                    assert_ne!(transition(mode, trigger), Some(Mode::MainMenu));
                }
            }
        }
    }
}
