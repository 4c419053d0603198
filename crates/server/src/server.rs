use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arena::{
    ConnectionId, ConnectionInfo, NetworkEndpoint, NetworkStats, PacketLossSimulation, RoomInfo,
    ServerEvent, ServerSession,
};

use crate::config::ServerConfig;

pub struct GameServer {
    endpoint: NetworkEndpoint,
    session: ServerSession,
    tick: u64,
    tick_duration: Duration,
    max_datagrams: usize,
    last_tick_time: Instant,
    accumulator: Duration,
    running: Arc<AtomicBool>,
    start_time: Instant,
}

impl GameServer {
    pub fn new(config: &ServerConfig) -> io::Result<Self> {
        let mut endpoint = NetworkEndpoint::bind(config.bind_addr())?;
        endpoint.set_loss_simulation(config.packet_loss.clone());

        Ok(Self {
            endpoint,
            session: ServerSession::new(config.session.clone()),
            tick: 0,
            tick_duration: config.tick_duration(),
            max_datagrams: config.session.max_datagrams_per_tick,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.session.drain_events()
    }

    /// Headless loop. Events were already logged by the session.
    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            self.session.drain_events().for_each(drop);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.accumulator += now - self.last_tick_time;
        self.last_tick_time = now;

        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.tick(now);
        }
    }

    fn tick(&mut self, now: Instant) {
        let batch = match self.endpoint.drain(self.max_datagrams) {
            Ok(batch) => batch,
            Err(e) => {
                log::error!("receive failed: {e}");
                self.session.push_event(ServerEvent::Error {
                    message: format!("Network error: {e}"),
                });
                Vec::new()
            }
        };

        self.session.tick(batch, now);
        self.flush();
        self.tick += 1;
    }

    fn flush(&mut self) {
        for out in self.session.drain_outbox() {
            if let Err(e) = self.endpoint.send_to(&out.packet, out.to) {
                log::warn!("failed to send {} to {}: {e}", out.packet.kind(), out.to);
                self.session.push_event(ServerEvent::Error {
                    message: format!("Failed to send to {}: {e}", out.to),
                });
            }
        }
    }

    pub fn kick(&mut self, id: ConnectionId) {
        self.session.kick(id, Instant::now());
        self.flush();
    }

    pub fn set_packet_loss(&mut self, loss: PacketLossSimulation) {
        self.endpoint.set_loss_simulation(loss);
    }

    pub fn stats(&self) -> ServerStats {
        let settings = self.session.settings();
        ServerStats {
            tick: self.tick,
            uptime_secs: self.start_time.elapsed().as_secs(),
            client_count: self.session.connections().len(),
            max_clients: settings.max_clients,
            room_count: self.session.rooms().room_count(),
            max_rooms: settings.room_limit(),
            network_stats: self.endpoint.stats().clone(),
        }
    }

    pub fn connection_infos(&self) -> Vec<ConnectionInfo> {
        self.session.connection_infos(Instant::now())
    }

    pub fn room_infos(&self) -> Vec<RoomInfo> {
        self.session.room_infos()
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u64,
    pub uptime_secs: u64,
    pub client_count: usize,
    pub max_clients: usize,
    pub room_count: usize,
    pub max_rooms: usize,
    pub network_stats: NetworkStats,
}
