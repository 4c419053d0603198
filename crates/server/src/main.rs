mod config;
mod server;
mod tui;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use arena::{PacketLossSimulation, ServerEvent};
use config::ServerConfig;
use server::GameServer;
use tui::TuiState;

#[derive(Parser)]
#[command(name = "arena-server")]
#[command(about = "Arena game server")]
struct Args {
    #[arg(short, long, help = "TOML settings file")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    bind: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(short, long)]
    max_clients: Option<usize>,

    #[arg(long)]
    max_rooms: Option<usize>,

    #[arg(long)]
    kills_to_win: Option<u8>,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable outbound packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if let Some(max_clients) = self.max_clients {
            config.session.max_clients = max_clients;
        }
        if let Some(max_rooms) = self.max_rooms {
            config.session.max_rooms = max_rooms;
        }
        if let Some(kills_to_win) = self.kills_to_win {
            config.session.kills_to_win = kills_to_win;
        }
        if self.simulate_packet_loss {
            config.packet_loss = PacketLossSimulation::lossy(self.loss_percent / 100.0);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let mut server = GameServer::new(&config)
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("Server started on {}", server.local_addr());
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    tui_state.log_info(format!("Server started on {}", server.local_addr()));

    while running.load(Ordering::SeqCst) {
        server.tick_once();
        tui_state.set_uptime(server.stats().uptime_secs);

        for event in server.drain_events() {
            log_event(&mut tui_state, event);
        }

        if let Some(id) = tui_state.take_pending_kick() {
            server.kick(id);
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let connections = server.connection_infos();
                    let on_connections = tui_state.active_tab() == tui::Tab::Connections;

                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::SeqCst);
                        }
                        KeyCode::Tab => tui_state.next_tab(),
                        KeyCode::BackTab => tui_state.prev_tab(),
                        KeyCode::PageUp => tui_state.scroll_up(),
                        KeyCode::PageDown => tui_state.scroll_down(),
                        KeyCode::End => tui_state.scroll_to_bottom(),
                        KeyCode::Up if on_connections => tui_state.select_prev(connections.len()),
                        KeyCode::Down if on_connections => tui_state.select_next(connections.len()),
                        KeyCode::Char('k') | KeyCode::Char('K') if on_connections => {
                            tui_state.request_kick(&connections);
                        }
                        _ => {}
                    }
                }
            }
        }

        let stats = server.stats();
        let connections = server.connection_infos();
        let rooms = server.room_infos();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &connections, &rooms);
        })?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}

fn log_event(tui_state: &mut TuiState, event: ServerEvent) {
    match event {
        ServerEvent::ClientConnected { id, addr, player } => {
            tui_state.log_info(format!("Connection {} from {} is player {}", id, addr, player));
        }
        ServerEvent::ClientDisconnected { id, reason } => {
            tui_state.log_info(format!("Connection {} {}", id, reason.as_str()));
        }
        ServerEvent::ConnectionDenied { addr, reason } => {
            tui_state.log_warn(format!("Connection denied to {}: {}", addr, reason));
        }
        ServerEvent::RoomCreated { room, founder } => {
            tui_state.log_info(format!("Connection {} founded room {}", founder, room));
        }
        ServerEvent::RoomJoined { room, id } => {
            tui_state.log_info(format!("Connection {} joined room {}", id, room));
        }
        ServerEvent::RoomLeft { room, id } => {
            tui_state.log_info(format!("Connection {} left room {}", id, room));
        }
        ServerEvent::RoomClosed { room } => {
            tui_state.log_info(format!("Room {} closed", room));
        }
        ServerEvent::RequestRefused { id, reason } => {
            tui_state.log_warn(format!("Refused connection {}: {}", id, reason));
        }
        ServerEvent::Victory { room, winner } => {
            tui_state.log_info(format!("Player {} won room {}", winner, room));
        }
        ServerEvent::Error { message } => {
            tui_state.log_error(message);
        }
    }
}
