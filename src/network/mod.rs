//! Network Layer
//!
//! WebSocket plumbing on both sides: the client's channel and lookups, and
//! the server's registry and accept loop. Game rules live in `core/`.

pub mod channel;
pub mod config;
pub mod guild;
pub mod lookup;
pub mod protocol;
pub mod registry;
pub mod server;

pub use channel::{ChannelError, LinkStatus, SyncChannel};
pub use config::{ClientConfig, OrphanMapPolicy, ServerConfig};
pub use guild::Guild;
pub use lookup::{LookupError, SessionBackend, WsBackend};
pub use protocol::{ClientMessage, ErrorCode, GameEventMessage, ServerMessage, SessionId};
pub use registry::{RegistryError, SessionRegistry};
pub use server::{GameServer, GameServerError};
