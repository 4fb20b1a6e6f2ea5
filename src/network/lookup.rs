//! Session Lookups
//!
//! Request/response collaborator used by the mode controller: session
//! check, entity fetch and creation, field map fetch. Every call is a
//! future so the controller can run it off the frame loop.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, instrument};

use crate::core::entity::Entity;
use crate::core::map::TileMap;
use crate::network::channel::SyncChannel;
use crate::network::config::ClientConfig;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage, SessionId};

/// Lookup failures.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Could not reach the service.
    #[error("transport error: {0}")]
    Transport(String),

    /// No reply within the configured bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with an error.
    #[error("server error {code:?}: {message}")]
    Rejected {
        /// Error code.
        code: ErrorCode,
        /// Error message.
        message: String,
    },

    /// The service answered with the wrong message.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for LookupError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(e: serde_json::Error) -> Self {
        Self::UnexpectedReply(e.to_string())
    }
}

/// Result of a session check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Session to use from now on.
    pub session_id: SessionId,
    /// Whether an entity is already bound to it.
    pub found: bool,
}

/// Everything the client needs from the service.
pub trait SessionBackend: Clone + Send + Sync + 'static {
    /// Check (or create) a session.
    fn check_session(
        &self,
        session: Option<SessionId>,
    ) -> impl Future<Output = Result<SessionStatus, LookupError>> + Send;

    /// Entity bound to a session.
    fn fetch_entity(&self, session: SessionId) -> impl Future<Output = Result<Entity, LookupError>> + Send;

    /// Create and bind an entity.
    fn create_entity(
        &self,
        session: SessionId,
        name: String,
        area: String,
    ) -> impl Future<Output = Result<Entity, LookupError>> + Send;

    /// Field map of the session's entity.
    fn fetch_map(&self, session: SessionId) -> impl Future<Output = Result<TileMap, LookupError>> + Send;

    /// Open the persistent channel for a session.
    fn open_channel(&self, session: SessionId) -> SyncChannel;
}

/// Backend speaking the JSON protocol over one short-lived WebSocket per
/// request.
#[derive(Debug, Clone)]
pub struct WsBackend {
    url: String,
}

impl WsBackend {
    /// Backend for the configured host and service port.
    pub fn new(config: &ClientConfig) -> Self {
        Self { url: config.url() }
    }

    /// Send one request and wait for the first reply frame.
    #[instrument(skip(self, request), fields(url = %self.url))]
    async fn request(&self, request: ClientMessage) -> Result<ServerMessage, LookupError> {
        let (ws, _) = connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();
        sink.send(Message::Text(request.to_json()?)).await?;

        while let Some(msg) = stream.next().await {
            match msg? {
                Message::Text(text) => {
                    let reply = ServerMessage::from_json(&text)?;
                    let _ = sink.close().await;
                    return match reply {
                        ServerMessage::Error(err) => Err(LookupError::Rejected {
                            code: err.code,
                            message: err.message,
                        }),
                        reply => Ok(reply),
                    };
                }
                Message::Close(_) => break,
                other => debug!("Skipping non-text frame {:?}", other),
            }
        }
        Err(LookupError::Transport("connection closed before reply".into()))
    }

    async fn entity_request(&self, request: ClientMessage) -> Result<Entity, LookupError> {
        match self.request(request).await? {
            ServerMessage::Entity { entity } => Ok(entity),
            other => Err(LookupError::UnexpectedReply(format!("{:?}", other))),
        }
    }
}

impl SessionBackend for WsBackend {
    async fn check_session(&self, session: Option<SessionId>) -> Result<SessionStatus, LookupError> {
        match self.request(ClientMessage::Session { session_id: session }).await? {
            ServerMessage::Session { session_id, found } => Ok(SessionStatus { session_id, found }),
            other => Err(LookupError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    async fn fetch_entity(&self, session: SessionId) -> Result<Entity, LookupError> {
        self.entity_request(ClientMessage::GetEntity { session_id: session }).await
    }

    async fn create_entity(&self, session: SessionId, name: String, area: String) -> Result<Entity, LookupError> {
        self.entity_request(ClientMessage::CreateEntity {
            session_id: session,
            name,
            area,
        })
        .await
    }

    async fn fetch_map(&self, session: SessionId) -> Result<TileMap, LookupError> {
        match self.request(ClientMessage::GetMap { session_id: session }).await? {
            ServerMessage::Map { map } => Ok(map),
            other => Err(LookupError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    fn open_channel(&self, session: SessionId) -> SyncChannel {
        SyncChannel::connect(self.url.clone(), session)
    }
}
