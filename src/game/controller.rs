//! Mode Controller
//!
//! Drives the client once per frame. Each mode runs its entry exactly once
//! after a transition, then every tick falls through to the shared play
//! loop:
//!
//! 1. apply finished lookups (stale ones are dropped)
//! 2. move inbound channel events onto the queue
//! 3. drain the queue
//! 4. act on menu selections
//! 5. report what the renderer should do
//!
//! Lookups run as tokio tasks bounded by the configured timeout. Each one
//! carries the epoch it was started in; leaving a mode bumps the epoch, so a
//! late answer meant for a previous mode is ignored.

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::entity::Entity;
use crate::core::map::TileMap;
use crate::game::events::Signal;
use crate::game::input::{self, InputEvent, InputMode};
use crate::game::mode::{transition, Mode, Phase, Trigger};
use crate::game::queue::{EventQueue, QueuedEvent};
use crate::game::reducer;
use crate::game::state::{ClientState, View};
use crate::game::ui::{MenuAction, MenuOption};
use crate::network::config::ClientConfig;
use crate::network::lookup::{LookupError, SessionBackend};
use crate::network::protocol::{GameEventMessage, SessionId};

/// What the renderer should do after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Render {
    /// Nothing settled.
    Idle,
    /// A batch settled without structural changes; refresh positions.
    Update,
    /// Full redraw.
    Rerender,
}

/// Result of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Mode after the tick.
    pub mode: Mode,
    /// Render request.
    pub render: Render,
    /// Incremented on every full redraw.
    pub generation: u64,
    /// Events dispatched this tick.
    pub dispatched: usize,
}

/// Result of a finished lookup.
#[derive(Debug)]
enum Outcome {
    NoEntity { session: SessionId },
    Loaded { session: SessionId, entity: Entity },
    Created { session: SessionId, entity: Entity },
    MapLoaded { map: TileMap },
    Failed(LookupError),
}

#[derive(Debug)]
struct Completion {
    epoch: u64,
    outcome: Outcome,
}

/// Character creation prompt progress.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Creation {
    Name,
    Area { name: String },
    Submitted,
}

/// Client mode state machine.
pub struct ModeController<B: SessionBackend> {
    mode: Mode,
    phase: Phase,
    epoch: u64,
    generation: u64,
    elapsed: Duration,
    creation: Creation,
    queue: EventQueue<ClientState>,
    state: ClientState,
    backend: B,
    config: ClientConfig,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl<B: SessionBackend> ModeController<B> {
    /// Controller in `Bootstrap`, entry pending.
    pub fn new(backend: B, config: ClientConfig) -> Self {
        let mut queue = EventQueue::new();
        reducer::install(&mut queue);
        let (completions_tx, completions) = mpsc::unbounded_channel();

        Self {
            mode: Mode::Bootstrap,
            phase: Phase::Entry,
            epoch: 0,
            generation: 0,
            elapsed: Duration::ZERO,
            creation: Creation::Name,
            queue,
            state: ClientState::new(),
            backend,
            config,
            completions_tx,
            completions,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Entry pending or playing.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Client state, for the renderer.
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Full redraws so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time accumulated over all ticks.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Queue a local event.
    pub fn enqueue(&mut self, signal: Signal, params: Vec<Value>) -> bool {
        self.queue.enqueue(signal, params)
    }

    /// Translate and queue an input event.
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        match input::translate(event, self.state.input_mode, self.state.player) {
            Some(queued) => self.queue.push(queued),
            None => false,
        }
    }

    /// Advance one frame.
    pub fn tick(&mut self, delta: Duration) -> TickReport {
        self.elapsed += delta;

        if self.phase == Phase::Entry {
            self.enter();
        }

        self.apply_completions();
        self.pull_channel();
        let drain = self.queue.advance(&mut self.state);
        for action in std::mem::take(&mut self.state.selections) {
            self.on_selected(action);
        }

        let render = if !self.queue.is_empty() {
            Render::Idle
        } else if self.state.dirty {
            self.state.dirty = false;
            self.generation += 1;
            Render::Rerender
        } else if drain.drained {
            Render::Update
        } else {
            Render::Idle
        };

        TickReport {
            mode: self.mode,
            render,
            generation: self.generation,
            dispatched: drain.dispatched,
        }
    }

    fn fire(&mut self, trigger: Trigger) -> bool {
        match transition(self.mode, trigger) {
            Some(next) => {
                info!(from = %self.mode, to = %next, "Mode transition");
                self.mode = next;
                self.phase = Phase::Entry;
                self.epoch += 1;
                true
            }
            None => {
                debug!(mode = %self.mode, ?trigger, "Trigger ignored");
                false
            }
        }
    }

    // ===== MODE ENTRIES =====

    fn enter(&mut self) {
        debug!(mode = %self.mode, "Entering mode");
        self.phase = Phase::Play;
        match self.mode {
            Mode::Bootstrap => self.enter_bootstrap(),
            Mode::MainMenu => self.enter_main_menu(),
            Mode::CharacterCreation => self.enter_character_creation(),
            Mode::WorldMap => self.enter_world_map(),
            Mode::BaseMenu => self.enter_base_menu(),
            Mode::FieldMode => self.enter_field_mode(),
        }
    }

    fn enter_bootstrap(&mut self) {
        self.state.view = View::Menu;
        self.state.input_mode = InputMode::Ui;
        self.state.console.set("> CONNECTING...\n");
        self.state.dirty = true;

        let backend = self.backend.clone();
        let requested = self.config.session_id.clone();
        self.spawn_lookup(async move {
            let status = backend.check_session(requested).await?;
            if !status.found {
                return Ok(Outcome::NoEntity { session: status.session_id });
            }
            let entity = backend.fetch_entity(status.session_id.clone()).await?;
            Ok::<_, LookupError>(Outcome::Loaded { session: status.session_id, entity })
        });
    }

    fn enter_main_menu(&mut self) {
        self.state.view = View::Menu;
        self.state.input_mode = InputMode::Ui;
        self.state.ui.set_menu(vec![MenuOption::new("new officer", MenuAction::NewOfficer)]);
        self.state.dirty = true;
    }

    fn enter_character_creation(&mut self) {
        self.creation = Creation::Name;
        self.state.view = View::Console;
        self.state.input_mode = InputMode::Text;
        self.state.ui.take_input();
        self.state.ui.set_menu(vec![MenuOption::new("create officer", MenuAction::SubmitCreation)]);
        self.state.console.set("> NEW OFFICER NAME:\n> ");
        self.state.dirty = true;
    }

    fn enter_world_map(&mut self) {
        self.state.view = View::Field;
        self.state.input_mode = InputMode::Field;
        self.state.center_camera();
        self.state.dirty = true;
        self.fire(Trigger::EntryDone);
    }

    fn enter_base_menu(&mut self) {
        self.state.view = View::Base;
        self.state.input_mode = InputMode::Ui;
        self.state.ui.set_menu(vec![
            MenuOption::new("deploy", MenuAction::Deploy),
            MenuOption::new("case files", MenuAction::CaseFiles),
            MenuOption::new("personnel", MenuAction::Personnel),
            MenuOption::new("r&d", MenuAction::Research),
            MenuOption::new("armory", MenuAction::Armory),
            MenuOption::new("cafeteria", MenuAction::Cafeteria),
        ]);
        self.state.dirty = true;
    }

    fn enter_field_mode(&mut self) {
        self.state.view = View::Field;
        self.state.input_mode = InputMode::Field;
        self.state.ui.clear();
        self.state.dirty = true;

        let Some(session) = self.state.session.clone() else {
            warn!("Field mode without a session");
            self.fire(Trigger::LookupFailed);
            return;
        };
        let backend = self.backend.clone();
        self.spawn_lookup(async move {
            let map = backend.fetch_map(session).await?;
            Ok::<_, LookupError>(Outcome::MapLoaded { map })
        });
    }

    // ===== LOOKUPS =====

    fn spawn_lookup<F>(&self, lookup: F)
    where
        F: Future<Output = Result<Outcome, LookupError>> + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        let epoch = self.epoch;
        let limit = self.config.lookup_timeout;
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(limit, lookup).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => Outcome::Failed(e),
                Err(_) => Outcome::Failed(LookupError::Timeout(limit)),
            };
            let _ = tx.send(Completion { epoch, outcome });
        });
    }

    fn apply_completions(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            if completion.epoch != self.epoch {
                debug!(
                    epoch = completion.epoch,
                    current = self.epoch,
                    "Dropping lookup result from a previous mode"
                );
                continue;
            }
            self.on_outcome(completion.outcome);
        }
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::NoEntity { session } => {
                info!(session = session.short(), "No officer on file");
                self.state.session = Some(session);
                self.fire(Trigger::NoEntity);
            }
            Outcome::Loaded { session, entity } => {
                let on_world = entity.map.is_world();
                self.load_player(session, entity);
                self.fire(Trigger::EntityLoaded { on_world });
            }
            Outcome::Created { session, entity } => {
                self.state
                    .console
                    .append(&format!("> WELCOME, OFFICER {}\n", entity.name.to_uppercase()));
                self.load_player(session, entity);
                self.state.ui.set_menu(vec![MenuOption::new("start game", MenuAction::StartGame)]);
                self.state.dirty = true;
            }
            Outcome::MapLoaded { map } => {
                info!(map = %map.id, "Field map loaded");
                self.state.install_map(map);
                self.queue.enqueue(Signal::InitMap, vec![]);
            }
            Outcome::Failed(e) => {
                warn!(mode = %self.mode, "Lookup failed: {}", e);
                self.state.console.append(&format!("> ERROR: {}\n", e));
                self.fire(Trigger::LookupFailed);
            }
        }
    }

    /// Adopt the entity and open its channel. The presence announcement is
    /// parked until the channel connects.
    fn load_player(&mut self, session: SessionId, entity: Entity) {
        info!(eid = %entity.eid, name = %entity.name, map = %entity.map, "Officer loaded");
        let presence = GameEventMessage::new(
            Signal::NewEntity,
            vec![
                json!(entity.eid.0),
                json!(entity.name),
                json!(entity.texture_key),
                json!(entity.pos),
            ],
        );
        let channel = self.backend.open_channel(session.clone());
        channel.emit_on_connect(presence);

        self.state.session = Some(session);
        self.state.set_player(entity);
        self.state.channel = Some(channel);
    }

    // ===== PLAY =====

    fn pull_channel(&mut self) {
        let Some(channel) = self.state.channel.as_mut() else {
            return;
        };
        for event in channel.drain_inbound() {
            match event.signal() {
                Ok(signal) => {
                    self.queue.push(QueuedEvent::remote(signal, event.params));
                }
                Err(e) => debug!("Ignoring inbound event: {}", e),
            }
        }
    }

    fn on_selected(&mut self, action: MenuAction) {
        match action {
            MenuAction::NewOfficer | MenuAction::Deploy => {
                if self.fire(Trigger::Selected(action)) {
                    self.state.ui.clear();
                }
            }
            MenuAction::SubmitCreation => self.submit_creation(),
            MenuAction::StartGame => {
                let on_world = self.state.player_entity().map_or(true, |e| e.map.is_world());
                if self.fire(Trigger::StartGame { on_world }) {
                    self.state.ui.clear();
                }
            }
            other => {
                info!(?other, "Menu option has no destination");
                self.state.console.append(&format!("> {:?}: NOTHING HERE YET\n", other));
                self.state.dirty = true;
            }
        }
    }

    fn submit_creation(&mut self) {
        if self.mode != Mode::CharacterCreation {
            return;
        }
        let input = self.state.ui.take_input().trim().to_string();
        if input.is_empty() {
            return;
        }

        match std::mem::replace(&mut self.creation, Creation::Submitted) {
            Creation::Name => {
                self.state.console.append(&format!("{}\n> STATION AREA:\n> ", input));
                self.creation = Creation::Area { name: input };
            }
            Creation::Area { name } => {
                self.state.console.append(&format!("{}\n> REGISTERING...\n", input));
                self.state.ui.clear();
                self.state.input_mode = InputMode::Ui;

                let backend = self.backend.clone();
                let session = self.state.session.clone();
                self.spawn_lookup(async move {
                    let session = match session {
                        Some(session) => session,
                        None => backend.check_session(None).await?.session_id,
                    };
                    let entity = backend.create_entity(session.clone(), name, input).await?;
                    Ok::<_, LookupError>(Outcome::Created { session, entity })
                });
            }
            Creation::Submitted => {}
        }
        self.state.dirty = true;
    }
}
