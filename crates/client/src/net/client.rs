use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use arena::net::RoomId;
use arena::{
    ClientSession, ClientSettings, ClientView, MovementController, NetworkEndpoint, NetworkStats,
};

use super::input::InputState;
use crate::game;

/// Socket, protocol session and local movement for one client.
pub struct NetworkClient {
    endpoint: NetworkEndpoint,
    session: ClientSession,
    controller: MovementController,
    max_datagrams: usize,
    last_update: Instant,
}

impl NetworkClient {
    pub fn connect(server: SocketAddr, settings: ClientSettings) -> io::Result<Self> {
        let endpoint = NetworkEndpoint::bind("0.0.0.0:0")?;
        log::info!("bound {} for server {}", endpoint.local_addr(), server);

        let now = Instant::now();
        Ok(Self {
            endpoint,
            controller: MovementController::new(settings.movement),
            max_datagrams: settings.max_datagrams_per_tick,
            session: ClientSession::new(server, settings, now),
            last_update: now,
        })
    }

    pub fn update(&mut self, input: &InputState) -> io::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32().min(0.1);
        self.last_update = now;

        let batch = self.endpoint.drain(self.max_datagrams)?;
        self.session.handle_packets(batch, now);

        self.session
            .advance_local(&mut self.controller, input.move_direction, dt);
        if input.fire {
            self.fire(now);
        }

        self.session.tick(now);
        self.flush();
        Ok(())
    }

    fn fire(&mut self, now: Instant) {
        if !self.session.fire(now) {
            return;
        }
        let view = self.session.view();
        for target in game::find_targets(&view.local, &view.remotes) {
            log::debug!("hit player {target}");
            self.session.report_hit(target, game::SHOT_DAMAGE, now);
        }
    }

    fn flush(&mut self) {
        let server = self.session.server();
        for packet in self.session.drain_outbox() {
            if let Err(e) = self.endpoint.send_to(&packet, server) {
                log::warn!("failed to send {} to {server}: {e}", packet.kind());
            }
        }
    }

    pub fn create_room(&mut self) -> bool {
        self.session.create_room(Instant::now())
    }

    pub fn join_room(&mut self, room: RoomId) -> bool {
        self.session.join_room(room, Instant::now())
    }

    pub fn leave_room(&mut self) -> bool {
        self.session.leave_room(Instant::now())
    }

    pub fn view(&self) -> ClientView {
        self.session.view()
    }

    pub fn server(&self) -> SocketAddr {
        self.session.server()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }
}
