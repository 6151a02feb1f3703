//! Thornvale MUD server.
//!
//! One engine task owns the world; this binary wires it to the outside:
//! logging, configuration, the TCP accept loop, per-connection reader and
//! writer halves, and signal handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod bus;
mod clock;
mod combat;
mod config;
mod constants;
mod db;
mod dialogue;
mod engine;
mod groups;
mod guilds;
mod handlers;
mod mail;
mod outbound;
mod parser;
mod phase;
mod progression;
mod rate_limit;
mod registry;
mod scheduler;
mod types;
mod validation;
mod world;

use clock::SystemClock;
use config::EngineConfig;
use db::{MemoryGuildRepository, MemoryPlayerRepository};
use engine::{Engine, EngineDeps, EngineInput};
use outbound::{OutboundBus, OutboundEvent};
use rate_limit::{FloodLimiter, FloodVerdict};
use types::SessionId;
use world::{demo_world, World};

/// Shared state for the accept loop and connection tasks.
struct Listener {
    inputs: mpsc::Sender<EngineInput>,
    bus: Arc<OutboundBus>,
    next_session: AtomicU64,
    active: DashMap<SessionId, String>,
    connections_by_ip: DashMap<String, usize>,
    max_connections: usize,
    max_connections_per_ip: usize,
}

impl Listener {
    fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn ip_count(&self, ip: &str) -> usize {
        self.connections_by_ip.get(ip).map(|c| *c).unwrap_or(0)
    }

    fn add_ip(&self, ip: &str) {
        self.connections_by_ip
            .entry(ip.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(1);
    }

    fn remove_ip(&self, ip: &str) {
        if let Some(mut count) = self.connections_by_ip.get_mut(ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                drop(count);
                self.connections_by_ip.remove(ip);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Thornvale server v{}", env!("CARGO_PKG_VERSION"));

    let config = match EngineConfig::load("config") {
        Ok(config) => {
            info!("Loaded configuration from config/engine.toml");
            config
        }
        Err(config::ConfigError::Io { .. }) => {
            info!("No config/engine.toml; using defaults");
            EngineConfig::default()
        }
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    let world = match &config.server.world_file {
        Some(path) => {
            let world = World::load(path)?;
            info!(rooms = world.rooms.len(), "World loaded from {}", path);
            world
        }
        None => {
            let world = demo_world()?;
            info!(rooms = world.rooms.len(), "Using built-in demo world");
            world
        }
    };

    let bus = Arc::new(OutboundBus::new());
    let (inputs_tx, inputs_rx) = mpsc::channel::<EngineInput>(1024);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let motd = config.server.motd.clone();
    let max_connections = config.server.max_connections;
    let max_connections_per_ip = config.server.max_connections_per_ip;

    let engine = Engine::new(EngineDeps {
        config,
        world: Arc::new(world),
        clock: Arc::new(SystemClock::new()),
        bus: Arc::clone(&bus),
        player_repo: Arc::new(MemoryPlayerRepository::new()),
        guild_repo: Arc::new(MemoryGuildRepository::new()),
        inter_bus: None,
        location_index: None,
        rng_seed: None,
    })?;
    tokio::spawn(engine.run(inputs_rx, None));

    // Ctrl-C feeds the same shutdown path as the in-game command.
    let shutdown_inputs = inputs_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_inputs.send(EngineInput::Shutdown).await;
        }
    });

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    info!("MOTD: {}", motd);

    let shared = Arc::new(Listener {
        inputs: inputs_tx,
        bus,
        next_session: AtomicU64::new(0),
        active: DashMap::new(),
        connections_by_ip: DashMap::new(),
        max_connections,
        max_connections_per_ip,
    });

    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let shared = Arc::clone(&shared);
                let ip = addr.ip().to_string();

                if shared.active.len() >= shared.max_connections {
                    warn!("Connection limit reached, rejecting {}", addr);
                    continue;
                }
                if shared.ip_count(&ip) >= shared.max_connections_per_ip {
                    warn!("Per-IP connection limit reached for {}", ip);
                    continue;
                }

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, ip, shared).await {
                        warn!("Connection task error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Serialize one outbound event to the socket. Returns `false` when the
/// session should close.
async fn write_event(writer: &mut OwnedWriteHalf, event: OutboundEvent) -> Result<bool> {
    match event {
        OutboundEvent::Text { text, .. }
        | OutboundEvent::Info { text, .. }
        | OutboundEvent::Error { text, .. } => {
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\r\n").await?;
        }
        OutboundEvent::Prompt { text, .. } => {
            // Prompts terminate a batch and carry no newline.
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
        }
        OutboundEvent::Close { .. } => {
            writer.flush().await?;
            return Ok(false);
        }
    }
    Ok(true)
}

/// One task per socket: lines in, events out, flood limiting in between.
async fn handle_connection(stream: TcpStream, ip: String, shared: Arc<Listener>) -> Result<()> {
    let session = shared.next_session_id();
    shared.active.insert(session, ip.clone());
    shared.add_ip(&ip);
    info!(%session, %ip, "connection opened");

    let mut events = shared.bus.register(session);
    shared
        .inputs
        .send(EngineInput::Connected { session })
        .await?;

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut limiter = FloodLimiter::new();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match limiter.check(Instant::now()) {
                    FloodVerdict::Allow => {
                        shared
                            .inputs
                            .send(EngineInput::Line { session, line })
                            .await?;
                    }
                    FloodVerdict::Drop => {
                        write_half
                            .write_all(b"You are doing that too often.\r\n")
                            .await?;
                    }
                    FloodVerdict::Disconnect => {
                        warn!(%session, %ip, "session flooded out");
                        break;
                    }
                },
                Ok(None) | Err(_) => break,
            },
            event = events.recv() => match event {
                Some(event) => {
                    if !write_event(&mut write_half, event).await? {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    shared
        .inputs
        .send(EngineInput::Disconnected { session })
        .await?;
    shared.active.remove(&session);
    shared.remove_ip(&ip);
    info!(%session, "connection closed");
    Ok(())
}
