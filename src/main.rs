use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::{
    signal,
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use arena_core::{
    config::ConfigLoader,
    ecs::EntityFlags,
    net::{ClientSession, SessionSettings},
    protocol::input_flags,
    server::{ConnectionId, LoopbackTransport, Room},
    snapshot::SnapshotWriter,
    systems::wander_target,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Authoritative arena simulation runner")]
struct Cli {
    /// Path to the arena YAML file
    #[arg(long, default_value = "scenarios/arena.yaml")]
    config: PathBuf,

    /// Override tick count (uses the config value when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override world dump interval in ticks
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for world dumps
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Pace ticks at the configured tick rate instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Number of simulated client connections
    #[arg(long, default_value_t = 2)]
    clients: u32,
}

/// What a simulated player wants to do next.
#[derive(Debug, Clone, Copy, Default)]
struct Intent {
    conn: ConnectionId,
    target_x: f32,
    target_y: f32,
    flags: u8,
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Emit a fresh wander target for every client a few times per second.
async fn drive_intents(
    tx: mpsc::Sender<Intent>,
    clients: u32,
    map_radius: f32,
    seed: u64,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut ticker = time::interval(Duration::from_millis(200));
    loop {
        ticker.tick().await;
        for conn in 1..=clients {
            let (target_x, target_y) = wander_target(&mut rng, map_radius * 0.9);
            let flags = if rng.gen_bool(0.1) {
                input_flags::SKILL
            } else {
                0
            };
            let intent = Intent {
                conn,
                target_x,
                target_y,
                flags,
            };
            if tx.send(intent).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new(".").load(&cli.config)?;
    init_tracing(&config.logging.level)?;

    let ticks = config.ticks(cli.ticks);
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(config.snapshot_interval_ticks);
    let snapshot_dir = cli
        .snapshot_dir
        .or_else(|| config.snapshot_dir.clone())
        .unwrap_or_else(|| PathBuf::from("snapshots"));
    let writer = SnapshotWriter::new(&snapshot_dir, &config.name, snapshot_interval)?;

    let mut room = Room::new(&config, LoopbackTransport::new())?.with_snapshot_writer(writer);
    let mut sessions = Vec::with_capacity(cli.clients as usize);
    for conn in 1..=cli.clients {
        room.transport_mut().open(conn);
        room.on_join(conn);
        let mut session = ClientSession::new(SessionSettings::from_config(&config))?;
        session.connection_mut().connect()?;
        session.connection_mut().opened()?;
        sessions.push((
            session,
            Intent {
                conn,
                ..Intent::default()
            },
        ));
    }

    let (tx, mut rx) = mpsc::channel(256);
    let producer = tokio::spawn(drive_intents(
        tx,
        cli.clients,
        config.map_radius,
        config.seed,
    ));

    let dt = config.tick_seconds();
    let mut pacer = cli.realtime.then(|| {
        let mut interval = time::interval(Duration::from_secs_f32(dt));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    info!(
        arena = %config.name,
        ticks,
        clients = cli.clients,
        realtime = cli.realtime,
        "starting run"
    );

    for _ in 0..ticks {
        match pacer.as_mut() {
            Some(pacer) => {
                tokio::select! {
                    _ = pacer.tick() => {}
                    _ = signal::ctrl_c() => {
                        info!("interrupted");
                        break;
                    }
                }
            }
            None => tokio::task::yield_now().await,
        }

        while let Ok(update) = rx.try_recv() {
            if let Some((_, intent)) = sessions
                .iter_mut()
                .find(|(_, intent)| intent.conn == update.conn)
            {
                intent.target_x = update.target_x;
                intent.target_y = update.target_y;
                intent.flags |= update.flags;
            }
        }

        for (session, intent) in &mut sessions {
            for packet in room.transport_mut().drain(intent.conn) {
                session.receive(&packet);
            }
            session.flush_inbound();
            if let Some(bytes) = session.step(intent.target_x, intent.target_y, intent.flags, dt) {
                room.on_message(intent.conn, bytes);
            }
            intent.flags = 0;
        }

        let summary = room.tick()?;
        if summary.tick % u64::from(config.tick_rate) == 0 {
            debug!(
                tick = summary.tick,
                reaped = summary.reaped,
                grid_overflow = summary.grid.overflowed,
                "second elapsed"
            );
        }
    }
    producer.abort();

    let world = room.world();
    info!(
        arena = %config.name,
        ticks = world.tick(),
        players = world.count_matching(EntityFlags::PLAYER),
        bots = world.count_matching(EntityFlags::BOT),
        food = world.count_matching(EntityFlags::FOOD),
        rejected_packets = room.rejected_packets(),
        "run complete"
    );
    for (session, intent) in &sessions {
        info!(
            conn = intent.conn,
            snaps = session.predictor().snap_count(),
            rejected = session.rejected_packets(),
            "client summary"
        );
    }
    Ok(())
}
