//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames tagged by `type`.

use std::fmt;

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::entity::Entity;
use crate::core::map::TileMap;
use crate::game::events::{Signal, UnknownSignal};

/// Opaque session identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Short prefix for logs.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{signal, params}` event carried over the channel in both directions.
///
/// The signal stays a string on the wire so an unknown name from a newer
/// peer does not fail the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEventMessage {
    /// Event name
    pub signal: String,
    /// Positional arguments
    #[serde(default)]
    pub params: Vec<Value>,
}

impl GameEventMessage {
    /// Build from a known signal.
    pub fn new(signal: Signal, params: Vec<Value>) -> Self {
        Self {
            signal: signal.as_str().to_string(),
            params,
        }
    }

    /// Parse the signal name.
    pub fn signal(&self) -> Result<Signal, UnknownSignal> {
        self.signal.parse()
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session existence check. An absent or unknown id creates a session.
    Session {
        /// Previously issued session id, if any.
        session_id: Option<SessionId>,
    },

    /// Fetch the entity bound to a session.
    GetEntity {
        /// Caller's session.
        session_id: SessionId,
    },

    /// Create an entity and bind it to the session.
    CreateEntity {
        /// Caller's session.
        session_id: SessionId,
        /// Officer name.
        name: String,
        /// Station area; selects (or founds) the guild.
        area: String,
    },

    /// Fetch (lazily creating) the caller's field map.
    GetMap {
        /// Caller's session.
        session_id: SessionId,
    },

    /// First frame on a persistent channel.
    Join {
        /// Caller's session.
        session_id: SessionId,
    },

    /// Game event.
    GameEvent(GameEventMessage),

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp.
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Wrap a game event.
    pub fn game_event(signal: Signal, params: Vec<Value>) -> Self {
        Self::GameEvent(GameEventMessage::new(signal, params))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session check result.
    Session {
        /// Session id to use from now on.
        session_id: SessionId,
        /// Whether the session already has a bound entity.
        found: bool,
    },

    /// Entity record.
    Entity {
        /// The entity.
        entity: Entity,
    },

    /// Field map.
    Map {
        /// The map.
        map: TileMap,
    },

    /// Game event.
    GameEvent(GameEventMessage),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall clock (ms since epoch).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

impl ServerMessage {
    /// Wrap a game event.
    pub fn game_event(signal: Signal, params: Vec<Value>) -> Self {
        Self::GameEvent(GameEventMessage::new(signal, params))
    }

    /// Build an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ServerError {
            code,
            message: message.into(),
        })
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Error message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message.
    InvalidInput,
    /// Session id not known to the server.
    UnknownSession,
    /// Session has no bound entity.
    NoEntity,
    /// Session already has an entity.
    AlreadyBound,
    /// Channel has not joined a session.
    NotJoined,
    /// Internal server error.
    InternalError,
}

/// Current wall clock in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
