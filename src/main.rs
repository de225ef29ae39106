//! Bomber Arena Server
//!
//! `bomber-arena-server serve [settings.json]` hosts a lockstep game.
//! Without arguments it runs a scripted demo match and verifies that a
//! replay of the recorded actions reaches the same state hash.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bomber_arena::{
    core::rng::DeterministicRng,
    game::{
        action::{ClientActions, ControlKey, KeyTransition},
        config::{ClientInfo, GameSettings, PlayerSettings},
        events::GameEventData,
        tick::replay_hash,
        ActionLog, World,
    },
    network::{AuthConfig, GameServer, ServerConfig},
    VERSION,
};

/// Ticks the demo runs at most.
const DEMO_TICKS: u32 = 30 * 60 * 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Bomber Arena Server v{}", VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("serve") => serve(args.get(1).map(String::as_str)).await,
        Some("demo") | None => demo_match(),
        Some(other) => bail!("unknown command {other}; expected `serve [settings.json]` or `demo`"),
    }
}

/// Host a game until Ctrl-C.
async fn serve(settings_path: Option<&str>) -> Result<()> {
    let settings = match settings_path {
        Some(path) => GameSettings::from_file(path).with_context(|| format!("loading {path}"))?,
        None => GameSettings::default(),
    };
    info!(
        port = settings.game_port,
        frequency = settings.game_cycle_frequency,
        latency = ?settings.network_latency,
        "Hosting game"
    );

    let config = ServerConfig {
        bind_addr: ([0, 0, 0, 0], settings.game_port).into(),
        auth: AuthConfig::for_game(&settings),
        settings,
        ..Default::default()
    };
    let server = std::sync::Arc::new(GameServer::new(config));

    let running = server.clone();
    let handle = tokio::spawn(async move { running.run().await });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    server.shutdown();
    handle.await.context("server task panicked")??;
    Ok(())
}

/// Demo function to test the simulation.
fn demo_match() -> Result<()> {
    info!("=== Starting Demo Match ===");

    let seed = 12345u64;
    let settings = GameSettings::default();
    let clients = vec![
        ClientInfo::new("north", vec![PlayerSettings::new("ann", 0), PlayerSettings::new("bert", 1)]),
        ClientInfo::new("south", vec![PlayerSettings::new("cleo", 2), PlayerSettings::new("dan", 3)]),
    ];

    let mut world = World::new(settings.clone(), clients.clone(), seed)?;
    let mut log = ActionLog::new(seed);
    // Scripted input comes from its own stream so the world's stays untouched
    let mut script = DeterministicRng::new(seed ^ 0x5EED);

    world.start_round();
    info!("Seed: {}, board {}x{}", seed, settings.level.width, settings.level.height);

    let mut total_events = 0;
    while world.tick_count() < DEMO_TICKS {
        let batch = scripted_batch(&mut script, &clients);
        log.record(world.tick_count(), &batch);

        let result = world.tick(Some(&batch));
        total_events += result.events.len();

        for event in &result.events {
            match &event.data {
                GameEventData::PlayerDied { victim, killer } => {
                    info!("Tick {}: {:?} died, killer {:?}", event.tick, victim, killer);
                }
                GameEventData::RoundEnded { round, winners } => {
                    info!("Round {} over, winners {:?}", round, winners);
                }
                _ => {}
            }
        }

        if result.round_ended {
            if world.game_ended() {
                info!("Game ended at tick {}", world.tick_count());
                break;
            }
            world.start_round();
        }
    }

    // Print final results
    info!("=== Results ===");
    for handle in world.handles() {
        if let Some(player) = world.get_player(handle) {
            info!("{} ({:?}): {} points", player.settings.name, handle, player.points);
        }
    }
    info!("Total events: {}, recorded batches: {}", total_events, log.len());

    let hash = world.compute_hash();
    info!("Final State Hash: {}", hex::encode(hash));

    // Verify determinism by replaying
    info!("=== Verifying Determinism ===");
    let replayed = replay_hash(settings, clients, &log, world.tick_count())?;
    info!("Replay State Hash: {}", hex::encode(replayed));

    if hash != replayed {
        bail!("DETERMINISM FAILURE: Hashes differ!");
    }
    info!("DETERMINISM VERIFIED: Hashes match!");
    Ok(())
}

/// Random key presses and releases for every seat.
fn scripted_batch(rng: &mut DeterministicRng, clients: &[ClientInfo]) -> String {
    let mut batch = String::new();
    for (client_index, client) in clients.iter().enumerate() {
        let mut transitions = Vec::new();
        for seat in 0..client.players.len() {
            if !rng.chance_percent(20) {
                continue;
            }
            let ordinal = rng.next_int(ControlKey::ALL.len() as u32) as usize;
            if let Some(key) = ControlKey::from_index(ordinal) {
                transitions.push(KeyTransition::new(seat, key, rng.chance_percent(60)));
            }
        }
        if !transitions.is_empty() {
            batch.push_str(&ClientActions { client_index, transitions }.to_group());
        }
    }
    batch
}
