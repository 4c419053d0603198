mod config;
mod game;
mod net;
mod tui;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;

use arena::ClientState;
use config::ClientConfig;
use net::{InputState, NetworkClient};

#[derive(Parser)]
#[command(name = "arena-client")]
#[command(about = "Arena game client")]
struct Args {
    #[arg(short, long, help = "Server address to connect to (e.g., 127.0.0.1:5000)")]
    server: Option<String>,

    #[arg(short, long, help = "TOML settings file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Run without the terminal UI, logging to stderr")]
    headless: bool,

    #[arg(long, help = "Headless: create a room once in the lobby")]
    create: bool,

    #[arg(long, help = "Headless: join this room once in the lobby")]
    join: Option<u32>,

    #[arg(long, help = "Headless: stop after this many seconds")]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(server) = &args.server {
        config.server = server.clone();
    }
    let server = resolve(&config.server)?;

    let client = NetworkClient::connect(server, config.session.clone())?;

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        run_headless(client, &config, &args)?;
    } else {
        tui::run(client, config.tick_rate)?;
    }

    Ok(())
}

fn resolve(server: &str) -> Result<SocketAddr> {
    server
        .to_socket_addrs()
        .with_context(|| format!("invalid server address {server}"))?
        .next()
        .with_context(|| format!("{server} did not resolve"))
}

/// Scripted client: enters a room if asked, then circles the arena firing
/// now and then.
fn run_headless(mut client: NetworkClient, config: &ClientConfig, args: &Args) -> Result<()> {
    let frame = Duration::from_secs_f64(1.0 / f64::from(config.tick_rate.max(1)));
    let started = Instant::now();
    let deadline = args.duration.map(|secs| started + Duration::from_secs(secs));
    let mut last_state = ClientState::Unconnected;
    let mut requested = false;
    let mut frames: u64 = 0;

    log::info!("connecting to {}", client.server());

    loop {
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }

        let state = client.view().state;
        if state != last_state {
            log::info!("state: {} -> {}", last_state.as_str(), state.as_str());
            if state == ClientState::InLobby {
                requested = false;
            }
            last_state = state;
        }

        if state == ClientState::InLobby && !requested {
            requested = if args.create {
                client.create_room()
            } else if let Some(room) = args.join {
                client.join_room(room)
            } else {
                true
            };
        }

        let angle = started.elapsed().as_secs_f32() * 0.5;
        let input = InputState {
            move_direction: Vec2::from_angle(angle),
            fire: state == ClientState::InGame && frames % 60 == 0,
        };
        client.update(&input)?;
        frames += 1;

        std::thread::sleep(frame);
    }

    let stats = client.stats();
    log::info!(
        "sent {} packets, received {}, {} malformed",
        stats.packets_sent,
        stats.packets_received,
        stats.packets_malformed
    );
    Ok(())
}
