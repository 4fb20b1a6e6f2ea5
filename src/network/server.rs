//! WebSocket Game Server
//!
//! Async WebSocket server on the service port. Every connection can issue
//! lookups (session, entity, map) and, after `join`, act as a persistent
//! synchronization channel. All state lives in one [`SessionRegistry`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::network::config::ServerConfig;
use crate::network::protocol::{now_millis, ClientMessage, ErrorCode, ServerMessage};
use crate::network::registry::{ChannelId, RegistryError, SessionRegistry};

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Registry rejected a request.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Connected client state.
struct ConnectedClient {
    /// Registry handle for this connection.
    channel: ChannelId,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Closes the connection when fired or dropped.
    kick: oneshot::Sender<()>,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Authoritative state.
    registry: Arc<RwLock<SessionRegistry>>,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            registry: Arc::new(RwLock::new(SessionRegistry::new(&config))),
            config,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Shared registry.
    pub fn registry(&self) -> Arc<RwLock<SessionRegistry>> {
        self.registry.clone()
    }

    /// Bind and serve until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accept connections on `listener` until shutdown.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let cleanup_clients = self.clients.clone();
        let cleanup_registry = self.registry.clone();
        let cleanup_config = self.config.clone();

        // Spawn cleanup task
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_registry, cleanup_config).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let capacity = self.config.channel_capacity;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(capacity);
            let (kick, mut kicked) = oneshot::channel::<()>();

            // Register client
            let channel = registry.write().await.attach(msg_tx.clone());
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    channel,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    kick,
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(channel, client_msg, &registry, &msg_tx).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = &mut kicked => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Idle timeout".to_string(),
                        }).await;
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            registry.write().await.detach(channel);
            let connected_for = clients
                .write()
                .await
                .remove(&addr)
                .map(|c| c.connected_at.elapsed());
            // Let queued frames (including Shutdown) flush
            drop(msg_tx);
            if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Sender for {} did not drain in time", addr);
            }

            debug!(channel, ?connected_for, "Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        channel: ChannelId,
        msg: ClientMessage,
        registry: &Arc<RwLock<SessionRegistry>>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let reply = match msg {
            ClientMessage::Session { session_id } => {
                let (session_id, found) = registry.write().await.resolve_session(session_id);
                Some(ServerMessage::Session { session_id, found })
            }
            ClientMessage::GetEntity { session_id } => {
                let result = registry.read().await.entity_for(&session_id);
                Some(reply_or_error(result.map(|entity| ServerMessage::Entity { entity })))
            }
            ClientMessage::CreateEntity { session_id, name, area } => {
                let result = registry.write().await.create_entity(&session_id, &name, &area);
                Some(reply_or_error(result.map(|entity| ServerMessage::Entity { entity })))
            }
            ClientMessage::GetMap { session_id } => {
                let result = registry.write().await.map_for(&session_id);
                Some(reply_or_error(result.map(|map| ServerMessage::Map { map })))
            }
            ClientMessage::Join { session_id } => {
                let result = registry.write().await.join(channel, session_id);
                result.err().map(rejection)
            }
            ClientMessage::GameEvent(event) => {
                let signal = event.signal.clone();
                let result = registry.write().await.handle_event(channel, event);
                result.err().map(|e| {
                    debug!(channel, %signal, "Event rejected: {}", e);
                    rejection(e)
                })
            }
            ClientMessage::Ping { timestamp } => Some(ServerMessage::Pong {
                timestamp,
                server_time: now_millis(),
            }),
        };

        if let Some(reply) = reply {
            let _ = sender.send(reply).await;
        }
    }

    /// Periodic cleanup: idle connections, then orphaned maps.
    async fn run_cleanup_loop(clients: Clients, registry: Arc<RwLock<SessionRegistry>>, config: ServerConfig) {
        let mut interval = interval(config.cleanup_interval);

        loop {
            interval.tick().await;

            // Cleanup idle connections
            let now = Instant::now();
            let idle: Vec<_> = {
                let mut clients = clients.write().await;
                let addrs: Vec<SocketAddr> = clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > config.idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect();
                addrs
                    .into_iter()
                    .filter_map(|addr| clients.remove(&addr).map(|c| (addr, c)))
                    .collect()
            };

            for (addr, client) in idle {
                let _ = client.kick.send(());
                info!("Removed idle client {}", addr);
            }

            let closed = registry.write().await.sweep_orphaned_maps(config.orphan_maps);
            if closed > 0 {
                info!(closed, "Closed orphaned field maps");
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

fn rejection(e: RegistryError) -> ServerMessage {
    ServerMessage::error(e.code(), e.to_string())
}

fn reply_or_error(result: Result<ServerMessage, RegistryError>) -> ServerMessage {
    result.unwrap_or_else(rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Entity;
    use crate::game::events::Signal;
    use crate::network::channel::{LinkStatus, SyncChannel};
    use crate::network::config::ClientConfig;
    use crate::network::lookup::{LookupError, SessionBackend, WsBackend};
    use crate::network::protocol::{GameEventMessage, SessionId};
    use serde_json::json;

    async fn start() -> (Arc<GameServer>, WsBackend) {
        let server = Arc::new(GameServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            field_width: 12,
            field_height: 10,
            ..Default::default()
        }));
        let listener = server.bind().await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });

        let backend = WsBackend::new(&ClientConfig {
            host: "127.0.0.1".into(),
            service_port: port,
            ..ClientConfig::default()
        });
        (server, backend)
    }

    fn presence(entity: &Entity) -> GameEventMessage {
        GameEventMessage::new(
            Signal::NewEntity,
            vec![json!(entity.eid.0), json!(entity.name), json!(entity.texture_key), json!(entity.pos)],
        )
    }

    async fn wait_open(channel: &SyncChannel) {
        for _ in 0..200 {
            if channel.is_open() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("channel never opened");
    }

    async fn wait_for(channel: &mut SyncChannel, signal: &str) -> GameEventMessage {
        for _ in 0..200 {
            if let Some(event) = channel.drain_inbound().into_iter().find(|e| e.signal == signal) {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {} received", signal);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        });
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.registry().read().await.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_lookups_over_websocket() {
        let (server, backend) = start().await;

        let status = backend.check_session(None).await.unwrap();
        assert!(!status.found);
        let session = status.session_id;

        let err = backend.fetch_entity(session.clone()).await.unwrap_err();
        assert!(matches!(err, LookupError::Rejected { code: ErrorCode::NoEntity, .. }));

        let entity = backend
            .create_entity(session.clone(), "Ash".into(), "Dock".into())
            .await
            .unwrap();
        assert_eq!(entity.name, "Ash");
        assert!(backend.check_session(Some(session.clone())).await.unwrap().found);

        let map = backend.fetch_map(session.clone()).await.unwrap();
        let fetched = backend.fetch_entity(session.clone()).await.unwrap();
        assert_eq!(fetched.map, map.id);
        assert_eq!(fetched.pos, map.spawn);

        let err = backend.fetch_map(SessionId("unknown".into())).await.unwrap_err();
        assert!(matches!(err, LookupError::Rejected { code: ErrorCode::UnknownSession, .. }));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_channels_see_each_other() {
        let (server, backend) = start().await;

        let a = backend.check_session(None).await.unwrap().session_id;
        let ash = backend.create_entity(a.clone(), "Ash".into(), "Dock".into()).await.unwrap();
        let b = backend.check_session(None).await.unwrap().session_id;
        let birch = backend.create_entity(b.clone(), "Birch".into(), "Dock".into()).await.unwrap();

        let mut chan_a = backend.open_channel(a);
        chan_a.emit_on_connect(presence(&ash));
        wait_open(&chan_a).await;

        let mut chan_b = backend.open_channel(b);
        chan_b.emit_on_connect(presence(&birch));
        wait_open(&chan_b).await;

        // Whichever presence lands second, each side learns of the other
        let seen_by_a = wait_for(&mut chan_a, "NEW_ENTITY").await;
        assert_eq!(seen_by_a.params[0], json!(birch.eid.0));
        let seen_by_b = wait_for(&mut chan_b, "NEW_ENTITY").await;
        assert_eq!(seen_by_b.params[0], json!(ash.eid.0));

        assert!(chan_a.emit(GameEventMessage::new(
            Signal::MoveEntity,
            vec![json!(ash.eid.0), json!(1), json!(0)],
        )));
        let moved = wait_for(&mut chan_b, "MOVE_ENTITY").await;
        assert_eq!(moved.params, vec![json!(ash.eid.0), json!(1), json!(0)]);

        server.shutdown();
        for _ in 0..200 {
            if chan_a.status() == LinkStatus::Closed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(chan_a.status(), LinkStatus::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_stops_serving() {
        let server = Arc::new(GameServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }));
        let listener = server.bind().await.unwrap();
        let serving = server.clone();
        let handle = tokio::spawn(async move { serving.serve(listener).await });

        // The accept loop must be subscribed before the signal goes out
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
