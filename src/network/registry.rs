//! Session Registry
//!
//! Authoritative server state: sessions, guilds (keyed by area) and the
//! channels subscribed to each map. Every mutation requested by a client
//! passes through here; clients never write authoritative state directly.
//!
//! Fanout goes to every *other* channel subscribed to the same map. The
//! originating channel has already applied its own change locally, except
//! for rejected moves, which get a `MOVE_TO` correction back.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::entity::{Entity, EntityId, MapId, Position};
use crate::core::map::TileMap;
use crate::game::events::{decode_args, EventError, Signal, UnknownSignal};
use crate::network::config::{OrphanMapPolicy, ServerConfig};
use crate::network::guild::{Guild, MoveOutcome};
use crate::network::protocol::{ErrorCode, GameEventMessage, ServerMessage, SessionId};

/// Texture key given to newly created officers.
pub const OFFICER_TEXTURE: &str = "officer";

/// Connection handle inside the registry.
pub type ChannelId = u64;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Session id not issued by this server.
    #[error("unknown session")]
    UnknownSession,

    /// Session has no entity yet.
    #[error("no entity bound to session")]
    NoEntity,

    /// Session already has an entity.
    #[error("session already has an entity")]
    AlreadyBound,

    /// Channel has not sent `join`.
    #[error("channel has not joined a session")]
    NotJoined,

    /// Channel id not attached.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// Event names an entity the caller does not control.
    #[error("entity {0} is not controlled by this session")]
    NotOwner(EntityId),

    /// Entity is not on a field map.
    #[error("entity is not on a field map")]
    NotOnMap,

    /// Signal name not recognized.
    #[error(transparent)]
    UnknownSignal(#[from] UnknownSignal),

    /// Malformed event arguments.
    #[error(transparent)]
    BadEvent(#[from] EventError),

    /// Empty name or area.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl RegistryError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownSession => ErrorCode::UnknownSession,
            Self::NoEntity => ErrorCode::NoEntity,
            Self::AlreadyBound => ErrorCode::AlreadyBound,
            Self::NotJoined | Self::UnknownChannel(_) => ErrorCode::NotJoined,
            Self::NotOwner(_)
            | Self::NotOnMap
            | Self::UnknownSignal(_)
            | Self::BadEvent(_)
            | Self::Empty(_) => ErrorCode::InvalidInput,
        }
    }
}

#[derive(Debug, Clone)]
struct User {
    entity: Option<EntityId>,
    /// Guild key (area).
    guild: Option<String>,
    created_at: DateTime<Utc>,
}

/// A map is only unique within its guild; the overworld id is shared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MapKey {
    guild: String,
    map: MapId,
}

#[derive(Debug)]
struct Subscriber {
    sender: mpsc::Sender<ServerMessage>,
    session: Option<SessionId>,
    map: Option<MapKey>,
}

/// Who is asking, resolved from a joined channel.
struct Caller {
    eid: EntityId,
    guild: String,
}

/// Authoritative session, guild and subscription state.
#[derive(Debug)]
pub struct SessionRegistry {
    users: BTreeMap<SessionId, User>,
    guilds: BTreeMap<String, Guild>,
    channels: BTreeMap<ChannelId, Subscriber>,
    next_eid: u64,
    next_channel: ChannelId,
    field_size: (u32, u32),
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            users: BTreeMap::new(),
            guilds: BTreeMap::new(),
            channels: BTreeMap::new(),
            // 0 is the client camera
            next_eid: 1,
            next_channel: 1,
            field_size: (config.field_width, config.field_height),
        }
    }

    // =========================================================================
    // SESSIONS AND LOOKUPS
    // =========================================================================

    /// Known session and whether it has an entity. An absent or unknown id
    /// gets a fresh session.
    pub fn resolve_session(&mut self, requested: Option<SessionId>) -> (SessionId, bool) {
        if let Some(id) = requested {
            if let Some(user) = self.users.get(&id) {
                return (id, user.entity.is_some());
            }
            debug!(session = id.short(), "Unknown session, issuing a new one");
        }
        let id = SessionId::generate();
        self.users.insert(
            id.clone(),
            User {
                entity: None,
                guild: None,
                created_at: Utc::now(),
            },
        );
        info!(session = id.short(), "Session created");
        (id, false)
    }

    /// When a session was first seen.
    pub fn session_created_at(&self, session: &SessionId) -> Option<DateTime<Utc>> {
        self.users.get(session).map(|u| u.created_at)
    }

    /// Entity bound to a session.
    pub fn entity_for(&self, session: &SessionId) -> Result<Entity, RegistryError> {
        let (eid, guild) = self.bound(session)?;
        self.guilds
            .get(&guild)
            .and_then(|g| g.member(eid))
            .cloned()
            .ok_or(RegistryError::NoEntity)
    }

    /// Create an entity, bind it to the session and enrol it in the guild
    /// for `area`, founding that guild on first use.
    pub fn create_entity(&mut self, session: &SessionId, name: &str, area: &str) -> Result<Entity, RegistryError> {
        let name = name.trim();
        let area = area.trim();
        if name.is_empty() {
            return Err(RegistryError::Empty("name"));
        }
        if area.is_empty() {
            return Err(RegistryError::Empty("area"));
        }
        let user = self.users.get_mut(session).ok_or(RegistryError::UnknownSession)?;
        if user.entity.is_some() {
            return Err(RegistryError::AlreadyBound);
        }

        let eid = EntityId(self.next_eid);
        self.next_eid += 1;
        let entity = Entity::new(eid, name, OFFICER_TEXTURE);

        let (width, height) = self.field_size;
        let guild = self
            .guilds
            .entry(area.to_string())
            .or_insert_with(|| Guild::new(area, width, height));
        guild.new_member(entity.clone());

        user.entity = Some(eid);
        user.guild = Some(area.to_string());
        info!(session = session.short(), %eid, officer = name, guild = %guild.name, "Officer created");
        Ok(entity)
    }

    /// The caller's field map, opened on first request.
    pub fn map_for(&mut self, session: &SessionId) -> Result<TileMap, RegistryError> {
        let (eid, guild) = self.bound(session)?;
        self.guilds
            .get_mut(&guild)
            .and_then(|g| g.map_for(eid))
            .cloned()
            .ok_or(RegistryError::NoEntity)
    }

    fn bound(&self, session: &SessionId) -> Result<(EntityId, String), RegistryError> {
        let user = self.users.get(session).ok_or(RegistryError::UnknownSession)?;
        match (user.entity, &user.guild) {
            (Some(eid), Some(guild)) => Ok((eid, guild.clone())),
            _ => Err(RegistryError::NoEntity),
        }
    }

    // =========================================================================
    // CHANNELS
    // =========================================================================

    /// Register a connection. It receives nothing until it joins a map.
    pub fn attach(&mut self, sender: mpsc::Sender<ServerMessage>) -> ChannelId {
        let id = self.next_channel;
        self.next_channel += 1;
        self.channels.insert(
            id,
            Subscriber {
                sender,
                session: None,
                map: None,
            },
        );
        id
    }

    /// Bind a channel to a session.
    pub fn join(&mut self, channel: ChannelId, session: SessionId) -> Result<(), RegistryError> {
        if !self.users.contains_key(&session) {
            return Err(RegistryError::UnknownSession);
        }
        let sub = self
            .channels
            .get_mut(&channel)
            .ok_or(RegistryError::UnknownChannel(channel))?;
        debug!(channel, session = session.short(), "Channel joined");
        sub.session = Some(session);
        Ok(())
    }

    /// Forget a connection. Its entity stays where it is.
    pub fn detach(&mut self, channel: ChannelId) -> bool {
        self.channels.remove(&channel).is_some()
    }

    /// Number of attached connections.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Guild serving `area`.
    pub fn guild(&self, area: &str) -> Option<&Guild> {
        self.guilds.get(area)
    }

    /// All guilds.
    pub fn guilds(&self) -> impl Iterator<Item = &Guild> + '_ {
        self.guilds.values()
    }

    // =========================================================================
    // GAME EVENTS
    // =========================================================================

    /// Apply one event received on `channel`.
    pub fn handle_event(&mut self, channel: ChannelId, event: GameEventMessage) -> Result<(), RegistryError> {
        let signal = event.signal()?;
        let params = event.params;

        match signal {
            Signal::NewEntity => self.on_presence(channel, &params),
            Signal::MoveEntity => self.on_move(channel, &params),
            Signal::InitMap => self.on_init_map(channel),
            Signal::Rerender | Signal::DebugMsg => {
                let key = self.subscriber(channel)?.map.clone();
                if let Some(key) = key {
                    self.fan_out(&key, Some(channel), ServerMessage::game_event(signal, params));
                }
                Ok(())
            }
            other => {
                debug!(channel, signal = %other, "Not relayed");
                Ok(())
            }
        }
    }

    fn subscriber(&self, channel: ChannelId) -> Result<&Subscriber, RegistryError> {
        self.channels.get(&channel).ok_or(RegistryError::UnknownChannel(channel))
    }

    fn caller(&self, channel: ChannelId) -> Result<Caller, RegistryError> {
        let session = self.subscriber(channel)?.session.as_ref().ok_or(RegistryError::NotJoined)?;
        let (eid, guild) = self.bound(session)?;
        Ok(Caller { eid, guild })
    }

    /// `NEW_ENTITY(eid, name, texture, pos)` from the owner: refresh the
    /// position and subscribe the channel to the entity's map.
    fn on_presence(&mut self, channel: ChannelId, params: &[Value]) -> Result<(), RegistryError> {
        let (eid, _name, _texture, pos): (EntityId, String, String, Position) =
            decode_args(Signal::NewEntity, params)?;
        let caller = self.caller(channel)?;
        if eid != caller.eid {
            return Err(RegistryError::NotOwner(eid));
        }

        let guild = self.guilds.get_mut(&caller.guild).ok_or(RegistryError::NoEntity)?;
        let accepted = guild.set_position(eid, pos);
        let (map, at) = guild.member(eid).map(|e| (e.map.clone(), e.pos)).ok_or(RegistryError::NoEntity)?;
        self.subscribe(channel, &caller, map);
        if !accepted {
            debug!(%eid, %pos, "Presence position not legal, correcting origin");
            self.send(channel, move_to_event(eid, at));
        }
        Ok(())
    }

    /// `MOVE_ENTITY(eid, dx, dy)`: validate, apply, fan out to others or
    /// correct the origin.
    fn on_move(&mut self, channel: ChannelId, params: &[Value]) -> Result<(), RegistryError> {
        let (eid, dx, dy): (EntityId, i32, i32) = decode_args(Signal::MoveEntity, params)?;
        let caller = self.caller(channel)?;
        if eid != caller.eid {
            return Err(RegistryError::NotOwner(eid));
        }

        let guild = self.guilds.get_mut(&caller.guild).ok_or(RegistryError::NoEntity)?;
        let map = guild.member(eid).map(|e| e.map.clone()).ok_or(RegistryError::NoEntity)?;
        let outcome = if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) {
            warn!(%eid, dx, dy, "Step too large");
            guild.member(eid).map(|e| MoveOutcome::Rejected(e.pos))
        } else {
            guild.try_move(eid, dx, dy)
        };

        let key = MapKey { guild: caller.guild, map };
        match outcome {
            Some(MoveOutcome::Applied(_)) => {
                self.fan_out(
                    &key,
                    Some(channel),
                    ServerMessage::game_event(Signal::MoveEntity, vec![json!(eid.0), json!(dx), json!(dy)]),
                );
            }
            Some(MoveOutcome::Rejected(at)) => {
                debug!(%eid, dx, dy, "Move rejected, correcting origin");
                self.send(channel, move_to_event(eid, at));
            }
            None => return Err(RegistryError::NoEntity),
        }
        Ok(())
    }

    /// `INIT_MAP()`: the caller entered its field map at the spawn point.
    fn on_init_map(&mut self, channel: ChannelId) -> Result<(), RegistryError> {
        let caller = self.caller(channel)?;
        let guild = self.guilds.get_mut(&caller.guild).ok_or(RegistryError::NoEntity)?;
        let map = guild.member(caller.eid).map(|e| e.map.clone()).ok_or(RegistryError::NoEntity)?;
        let spawn = guild.get_map(&map).ok_or(RegistryError::NotOnMap)?.spawn;
        guild.place(caller.eid, &map, spawn);
        self.subscribe(channel, &caller, map);
        Ok(())
    }

    /// Point `channel` at `map`, announce the caller to everyone already
    /// there and send the caller the roster.
    fn subscribe(&mut self, channel: ChannelId, caller: &Caller, map: MapId) {
        let key = MapKey { guild: caller.guild.clone(), map };
        if let Some(sub) = self.channels.get_mut(&channel) {
            sub.map = Some(key.clone());
        }

        let Some(guild) = self.guilds.get(&caller.guild) else {
            return;
        };
        let Some(me) = guild.member(caller.eid).cloned() else {
            return;
        };
        self.fan_out(&key, Some(channel), new_entity_event(&me));

        let mut roster: BTreeSet<EntityId> = guild.members_on(&key.map).map(|e| e.eid).collect();
        for sub in self.channels.values() {
            if sub.map.as_ref() != Some(&key) {
                continue;
            }
            if let Some(eid) = sub.session.as_ref().and_then(|s| self.users.get(s)).and_then(|u| u.entity) {
                roster.insert(eid);
            }
        }
        roster.remove(&caller.eid);

        for eid in roster {
            if let Some(other) = guild.member(eid) {
                self.send(channel, new_entity_event(other));
            }
        }
    }

    fn send(&self, channel: ChannelId, msg: ServerMessage) {
        if let Some(sub) = self.channels.get(&channel) {
            if let Err(e) = sub.sender.try_send(msg) {
                warn!(channel, "Dropping outbound message: {}", e);
            }
        }
    }

    fn fan_out(&self, key: &MapKey, except: Option<ChannelId>, msg: ServerMessage) {
        for (id, sub) in &self.channels {
            if Some(*id) == except || sub.map.as_ref() != Some(key) {
                continue;
            }
            if let Err(e) = sub.sender.try_send(msg.clone()) {
                warn!(channel = id, "Dropping fanout message: {}", e);
            }
        }
    }

    // =========================================================================
    // MAP LIFECYCLE
    // =========================================================================

    /// Close field maps no channel is subscribed to. Returns how many
    /// closed; `Retain` never closes any.
    pub fn sweep_orphaned_maps(&mut self, policy: OrphanMapPolicy) -> usize {
        if policy == OrphanMapPolicy::Retain {
            return 0;
        }

        let watched: BTreeSet<&MapKey> = self.channels.values().filter_map(|s| s.map.as_ref()).collect();
        let mut orphaned = Vec::new();
        for (area, guild) in &self.guilds {
            for map in guild.map_ids() {
                let key = MapKey { guild: area.clone(), map: map.clone() };
                if !watched.contains(&key) {
                    orphaned.push(key);
                }
            }
        }

        for key in &orphaned {
            if let Some(guild) = self.guilds.get_mut(&key.guild) {
                guild.close_map(&key.map);
            }
        }
        orphaned.len()
    }
}

fn new_entity_event(entity: &Entity) -> ServerMessage {
    ServerMessage::game_event(
        Signal::NewEntity,
        vec![
            json!(entity.eid.0),
            json!(entity.name),
            json!(entity.texture_key),
            json!(entity.pos),
        ],
    )
}

fn move_to_event(eid: EntityId, at: Position) -> ServerMessage {
    ServerMessage::game_event(Signal::MoveTo, vec![json!(eid.0), json!(at.x), json!(at.y)])
}
