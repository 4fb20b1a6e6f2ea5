//! Client Game Module
//!
//! Everything that runs inside the client's frame callback. Single
//! threaded: all mutation happens while the event queue drains.
//!
//! ## Module Structure
//!
//! - `events`: Signal vocabulary and argument decoding
//! - `queue`: Deferred, delay-aware event queue
//! - `state`: Client context (entities, map, UI, channel)
//! - `reducer`: One handler per signal
//! - `input`: Input event translation
//! - `ui`: Menus and console
//! - `mode`: Modes and the transition table
//! - `controller`: Mode controller and play loop

pub mod controller;
pub mod events;
pub mod input;
pub mod mode;
pub mod queue;
pub mod reducer;
pub mod state;
pub mod ui;

// Re-export key types
pub use controller::{ModeController, Render, TickReport};
pub use events::{Origin, Signal};
pub use input::{InputEvent, InputMode};
pub use mode::{Mode, Phase, Trigger};
pub use queue::{EventQueue, QueuedEvent};
pub use state::{ClientState, View};
