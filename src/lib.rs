//! # Tilesync
//!
//! Synchronization core of a multiplayer tile game: a client-side mode
//! controller driven by a deferred event queue, coupled over a persistent
//! WebSocket to a server-side authoritative registry of sessions, guilds,
//! maps and entities.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         TILESYNC                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared model (client + server)            │
//! │  ├── entity.rs   - Entity, ids, positions                    │
//! │  ├── store.rs    - Entity arena with id index                │
//! │  ├── map.rs      - Tile grid, walkability, membership        │
//! │  ├── rng.rs      - Seeded Xorshift128+                       │
//! │  └── mapgen.rs   - Field map generation                      │
//! │                                                              │
//! │  game/           - Client (single-threaded, tick driven)     │
//! │  ├── queue.rs    - Deferred event queue                      │
//! │  ├── events.rs   - Signal vocabulary                         │
//! │  ├── state.rs    - Client context                            │
//! │  ├── reducer.rs  - Event handlers                            │
//! │  ├── input.rs    - Input event translation                   │
//! │  ├── ui.rs       - Menus and console                         │
//! │  ├── mode.rs     - Modes and transition table                │
//! │  └── controller.rs - Mode controller / play loop             │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── config.rs   - Server and client configuration           │
//! │  ├── channel.rs  - Client synchronization channel            │
//! │  ├── lookup.rs   - Session/entity/map requests               │
//! │  ├── guild.rs    - Guild aggregate                           │
//! │  ├── registry.rs - Authoritative session registry            │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Local and remote mutations flow through the same reducer: inbound
//! channel events are enqueued exactly like local input, so handlers never
//! need to know where a mutation came from.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::entity::{Entity, EntityId, MapId, Position, CAMERA_ID};
pub use core::map::{Tile, TileMap};
pub use core::store::EntityStore;
pub use game::controller::{ModeController, TickReport};
pub use game::mode::Mode;
pub use game::queue::EventQueue;
pub use network::registry::SessionRegistry;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed service port for the event channel and lookups.
pub const SERVICE_PORT: u16 = 3001;

/// Client tick rate (Hz).
pub const TICK_RATE: u32 = 60;
