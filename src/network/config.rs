//! Runtime Configuration
//!
//! Server and client settings with defaults and environment overrides.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::network::protocol::SessionId;
use crate::{SERVICE_PORT, TICK_RATE};

/// What to do with field maps nobody is subscribed to any more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanMapPolicy {
    /// Keep them forever.
    #[default]
    Retain,
    /// Drop them on the cleanup sweep and return their members to the world.
    Collect,
}

impl FromStr for OrphanMapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "collect" => Ok(Self::Collect),
            other => Err(format!("unknown orphan map policy: {}", other)),
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for longer than this are dropped.
    pub idle_timeout: Duration,
    /// Period of the cleanup loop.
    pub cleanup_interval: Duration,
    /// Outbound queue depth per connection.
    pub channel_capacity: usize,
    /// Generated field width.
    pub field_width: u32,
    /// Generated field height.
    pub field_height: u32,
    /// Orphaned map handling.
    pub orphan_maps: OrphanMapPolicy,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], SERVICE_PORT)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            channel_capacity: 64,
            field_width: 32,
            field_height: 24,
            orphan_maps: OrphanMapPolicy::Retain,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TILESYNC_*` environment variables.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse::<SocketAddr>("TILESYNC_BIND") {
            config.bind_addr = addr;
        }
        if let Some(max) = env_parse::<usize>("TILESYNC_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(secs) = env_parse::<u64>("TILESYNC_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Ok(size) = std::env::var("TILESYNC_FIELD_SIZE") {
            match parse_size(&size) {
                Some((w, h)) => {
                    config.field_width = w;
                    config.field_height = h;
                }
                None => warn!("Ignoring TILESYNC_FIELD_SIZE={:?}, expected WxH", size),
            }
        }
        if let Some(policy) = env_parse::<OrphanMapPolicy>("TILESYNC_ORPHAN_MAPS") {
            config.orphan_maps = policy;
        }

        config
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name.
    pub host: String,
    /// Fixed service port.
    pub service_port: u16,
    /// Session to resume, if any.
    pub session_id: Option<SessionId>,
    /// Upper bound on a single lookup.
    pub lookup_timeout: Duration,
    /// Frames per second the host drives `tick` at.
    pub tick_rate: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            service_port: SERVICE_PORT,
            session_id: None,
            lookup_timeout: Duration::from_secs(5),
            tick_rate: TICK_RATE,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `TILESYNC_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("TILESYNC_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse::<u16>("TILESYNC_PORT") {
            config.service_port = port;
        }
        config.session_id = std::env::var("TILESYNC_SESSION")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SessionId);
        if let Some(ms) = env_parse::<u64>("TILESYNC_LOOKUP_TIMEOUT_MS") {
            config.lookup_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// WebSocket URL of the service: host plus fixed port.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.service_port)
    }

    /// Duration of one frame at `tick_rate`.
    pub fn frame_time(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

/// Parse `WxH`.
fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_service_port() {
        assert_eq!(ServerConfig::default().bind_addr.port(), SERVICE_PORT);
        assert_eq!(ClientConfig::default().url(), "ws://127.0.0.1:3001");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("32x24"), Some((32, 24)));
        assert_eq!(parse_size(" 10 X 8 "), Some((10, 8)));
        assert_eq!(parse_size("32"), None);
        assert_eq!(parse_size("ax4"), None);
    }

    #[test]
    fn test_orphan_policy_parse() {
        assert_eq!("retain".parse::<OrphanMapPolicy>(), Ok(OrphanMapPolicy::Retain));
        assert_eq!("COLLECT".parse::<OrphanMapPolicy>(), Ok(OrphanMapPolicy::Collect));
        assert!("sometimes".parse::<OrphanMapPolicy>().is_err());
    }

    #[test]
    fn test_frame_time() {
        let config = ClientConfig { tick_rate: 50, ..ClientConfig::default() };
        assert_eq!(config.frame_time(), Duration::from_millis(20));
    }
}
