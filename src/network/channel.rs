//! Synchronization Channel
//!
//! Client end of the persistent connection to the service. Outbound game
//! events are fire-and-forget: emitting while the link is not open drops
//! the message. A single message may be parked with `emit_on_connect` and
//! goes out right after the `join` frame once the link opens.
//!
//! The transport half ([`ChannelEndpoint`]) is separate from the handle the
//! game holds, so the same handle works over a real WebSocket or an
//! in-process pair in tests.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::network::protocol::{ClientMessage, GameEventMessage, ServerMessage, SessionId};

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Connection could not be established or broke.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Server closed the session.
    #[error("Server shut down: {0}")]
    Shutdown(String),
}

/// Link state as seen by the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Connection attempt in progress.
    Connecting,
    /// Connected; emits go out.
    Open,
    /// Gone for good.
    Closed,
}

#[derive(Debug)]
struct Link {
    status: LinkStatus,
    on_connect: Option<GameEventMessage>,
}

fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    // Link has no multi-step updates, so a poisoned value is still whole
    link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Game-side handle of the persistent channel.
#[derive(Debug)]
pub struct SyncChannel {
    session: SessionId,
    link: Arc<Mutex<Link>>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    inbound: mpsc::UnboundedReceiver<GameEventMessage>,
}

/// Transport-side half of a [`SyncChannel`].
#[derive(Debug)]
pub struct ChannelEndpoint {
    session: SessionId,
    link: Arc<Mutex<Link>>,
    frames_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Frames to put on the wire, in order.
    pub frames: mpsc::UnboundedReceiver<ClientMessage>,
    inbound: mpsc::UnboundedSender<GameEventMessage>,
}

impl SyncChannel {
    /// Unconnected handle plus its transport half.
    pub fn pair(session: SessionId) -> (SyncChannel, ChannelEndpoint) {
        let link = Arc::new(Mutex::new(Link {
            status: LinkStatus::Connecting,
            on_connect: None,
        }));
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let channel = SyncChannel {
            session: session.clone(),
            link: link.clone(),
            outbound: out_tx.clone(),
            inbound: in_rx,
        };
        let endpoint = ChannelEndpoint {
            session,
            link,
            frames_tx: out_tx,
            frames: out_rx,
            inbound: in_tx,
        };
        (channel, endpoint)
    }

    /// Open a channel to `url` on a background task. Returns immediately in
    /// the `Connecting` state.
    pub fn connect(url: String, session: SessionId) -> SyncChannel {
        let (channel, endpoint) = Self::pair(session);
        tokio::spawn(async move {
            if let Err(e) = endpoint.run(&url).await {
                warn!("Channel to {} ended: {}", url, e);
            }
        });
        channel
    }

    /// Session this channel belongs to.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        lock(&self.link).status
    }

    /// Whether emits currently go out.
    pub fn is_open(&self) -> bool {
        self.status() == LinkStatus::Open
    }

    /// Send an event now. Dropped (returns false) unless the link is open.
    pub fn emit(&self, event: GameEventMessage) -> bool {
        let link = lock(&self.link);
        if link.status != LinkStatus::Open {
            debug!("Dropping {} emitted while link is {:?}", event.signal, link.status);
            return false;
        }
        self.outbound.send(ClientMessage::GameEvent(event)).is_ok()
    }

    /// Send `event` as soon as the link opens, or now if it already is.
    /// Only one message is buffered; a second call replaces the first.
    pub fn emit_on_connect(&self, event: GameEventMessage) {
        let mut link = lock(&self.link);
        match link.status {
            LinkStatus::Open => {
                let _ = self.outbound.send(ClientMessage::GameEvent(event));
            }
            LinkStatus::Connecting => {
                if let Some(old) = link.on_connect.replace(event) {
                    debug!("Replaced buffered {}", old.signal);
                }
            }
            LinkStatus::Closed => debug!("Dropping {}: link closed", event.signal),
        }
    }

    /// Take every event received since the last call.
    pub fn drain_inbound(&mut self) -> Vec<GameEventMessage> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbound.try_recv() {
            events.push(event);
        }
        events
    }
}

impl ChannelEndpoint {
    /// Mark the link open and queue `join` followed by the buffered message.
    /// Holding the link lock keeps both ahead of any concurrent emit.
    pub fn open(&self) {
        let mut link = lock(&self.link);
        if link.status != LinkStatus::Connecting {
            return;
        }
        link.status = LinkStatus::Open;
        let _ = self.frames_tx.send(ClientMessage::Join {
            session_id: self.session.clone(),
        });
        if let Some(event) = link.on_connect.take() {
            let _ = self.frames_tx.send(ClientMessage::GameEvent(event));
        }
    }

    /// Mark the link closed. Later emits are dropped.
    pub fn close(&self) {
        let mut link = lock(&self.link);
        link.status = LinkStatus::Closed;
        link.on_connect = None;
    }

    /// Hand an inbound event to the game. False once the handle is gone.
    pub fn deliver(&self, event: GameEventMessage) -> bool {
        self.inbound.send(event).is_ok()
    }

    /// Drive the link over a WebSocket until either side goes away.
    pub async fn run(mut self, url: &str) -> Result<(), ChannelError> {
        let (ws, _) = match connect_async(url).await {
            Ok(ok) => ok,
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        };
        info!("Channel open to {} for session {}", url, self.session.short());

        let (mut sink, mut stream) = ws.split();
        self.open();

        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = self.inbound.closed() => {
                    // Handle dropped
                    break;
                }
                frame = self.frames.recv() => {
                    let Some(frame) = frame else {
                        break;
                    };
                    let text = match frame.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            result = Err(e.into());
                            break;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        result = Err(e.into());
                        break;
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                            Ok(ServerMessage::GameEvent(event)) => {
                                if self.inbound.send(event).is_err() {
                                    break;
                                }
                            }
                            Ok(ServerMessage::Shutdown { reason }) => {
                                result = Err(ChannelError::Shutdown(reason));
                                break;
                            }
                            Ok(ServerMessage::Error(err)) => {
                                warn!("Server rejected channel frame: {:?} {}", err.code, err.message);
                            }
                            Ok(other) => debug!("Ignoring {:?} on channel", other),
                            Err(e) => debug!("Undecodable frame: {}", e),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            result = Err(e.into());
                            break;
                        }
                    }
                }
            }
        }

        self.close();
        let _ = sink.close().await;
        info!("Channel closed for session {}", self.session.short());
        result
    }
}
