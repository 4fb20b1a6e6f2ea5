//! Tilesync Probe
//!
//! Headless client: drives a [`ModeController`] against a live server at the
//! configured tick rate, answers the menus with a fixed script and then
//! random-walks its officer on the field map.
//!
//! ```text
//! tilesync-probe [name] [area] [moves]
//! ```

use std::time::Duration;

use anyhow::Context;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tilesync::core::rng::{derive_seed, DeterministicRng};
use tilesync::game::controller::Render;
use tilesync::game::input::InputEvent;
use tilesync::game::ui::MenuAction;
use tilesync::network::{ClientConfig, WsBackend};
use tilesync::{Mode, ModeController, VERSION};

/// Frames between scripted inputs.
const ACT_EVERY: u64 = 6;

const STEPS: &[(i32, i32)] = &[(1, 0), (-1, 0), (0, 1), (0, -1)];

struct Script {
    name: String,
    area: String,
    moves: u32,
    max_moves: u32,
    rng: DeterministicRng,
}

impl Script {
    fn new(name: String, area: String, max_moves: u32) -> Self {
        let seed = derive_seed(b"tilesync.probe", &[name.as_bytes(), area.as_bytes()]);
        Self {
            name,
            area,
            moves: 0,
            max_moves,
            rng: DeterministicRng::from_seed_bytes(&seed),
        }
    }

    fn done(&self) -> bool {
        self.moves >= self.max_moves
    }

    /// Inputs for this frame, read off what the controller is showing.
    fn inputs(&mut self, controller: &ModeController<WsBackend>) -> Vec<InputEvent> {
        let state = controller.state();
        let first_option = state.ui.options().first().map(|o| o.action);

        match controller.mode() {
            Mode::MainMenu | Mode::BaseMenu => vec![InputEvent::Confirm],
            Mode::CharacterCreation => {
                let console = state.console.text();
                if first_option == Some(MenuAction::StartGame) {
                    vec![InputEvent::Confirm]
                } else if console.ends_with("NAME:\n> ") {
                    typed(&self.name)
                } else if console.ends_with("AREA:\n> ") {
                    typed(&self.area)
                } else {
                    Vec::new()
                }
            }
            Mode::FieldMode if state.map.id.is_world() => Vec::new(),
            Mode::FieldMode => {
                let Some(&(dx, dy)) = self.rng.choose(STEPS) else {
                    return Vec::new();
                };
                self.moves += 1;
                vec![InputEvent::Direction { dx, dy }]
            }
            Mode::Bootstrap | Mode::WorldMap => Vec::new(),
        }
    }
}

fn typed(text: &str) -> Vec<InputEvent> {
    text.chars()
        .map(InputEvent::Char)
        .chain(std::iter::once(InputEvent::Confirm))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "Probe".to_string());
    let area = args.next().unwrap_or_else(|| "Dock".to_string());
    let max_moves = match args.next() {
        Some(raw) => raw.parse().with_context(|| format!("moves must be a number, got {:?}", raw))?,
        None => 200,
    };

    let config = ClientConfig::from_env();
    info!("Tilesync Probe v{} -> {}", VERSION, config.url());

    let frame = config.frame_time();
    let backend = WsBackend::new(&config);
    let mut controller = ModeController::new(backend, config);
    let mut script = Script::new(name, area, max_moves);

    let mut ticker = interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frame_no: u64 = 0;
    let mut last_mode = controller.mode();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
        }
        frame_no += 1;

        let report = controller.tick(frame);
        if report.mode != last_mode {
            info!(mode = %report.mode, "Now in {}", report.mode);
            last_mode = report.mode;
        }
        if report.render == Render::Rerender {
            debug!(generation = report.generation, "Rerender");
        }

        if frame_no % ACT_EVERY == 0 {
            for input in script.inputs(&controller) {
                controller.handle_input(input);
            }
        }
        if script.done() {
            break;
        }
    }

    // Let the last moves leave before the channel drops
    tokio::time::sleep(Duration::from_millis(200)).await;

    let state = controller.state();
    match state.player_entity() {
        Some(player) => info!(
            eid = %player.eid,
            map = %player.map,
            pos = %player.pos,
            moves = script.moves,
            elapsed = ?controller.elapsed(),
            "Probe finished"
        ),
        None => info!(mode = %controller.mode(), "Probe finished without an officer"),
    }
    Ok(())
}
