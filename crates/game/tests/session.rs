use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use arena::{
    ClientSession, ClientSettings, ClientState, NetworkEndpoint, PacketLossSimulation,
    ServerEvent, ServerSession, ServerSettings,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

struct Client {
    endpoint: NetworkEndpoint,
    session: ClientSession,
    muted: bool,
}

struct Harness {
    endpoint: NetworkEndpoint,
    server: ServerSession,
    server_muted: bool,
    clients: Vec<Client>,
    events: Vec<ServerEvent>,
}

impl Harness {
    fn new(settings: ServerSettings) -> Self {
        let port = next_port();
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        Self {
            endpoint: NetworkEndpoint::bind(addr).unwrap(),
            server: ServerSession::new(settings),
            server_muted: false,
            clients: Vec::new(),
            events: Vec::new(),
        }
    }

    fn add_client(&mut self, settings: ClientSettings) -> usize {
        let endpoint = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        let session = ClientSession::new(self.endpoint.local_addr(), settings, Instant::now());
        self.clients.push(Client {
            endpoint,
            session,
            muted: false,
        });
        self.clients.len() - 1
    }

    fn client(&self, index: usize) -> &ClientSession {
        &self.clients[index].session
    }

    fn client_mut(&mut self, index: usize) -> &mut ClientSession {
        &mut self.clients[index].session
    }

    /// One round trip: clients send, the server ticks and replies, clients
    /// apply whatever arrived.
    fn pump(&mut self) {
        let now = Instant::now();

        for client in self.clients.iter_mut().filter(|c| !c.muted) {
            client.session.tick(now);
            let server = client.session.server();
            for packet in client.session.drain_outbox() {
                let _ = client.endpoint.send_to(&packet, server);
            }
        }

        if !self.server_muted {
            let batch = self.endpoint.drain(256).unwrap();
            self.server.tick(batch, now);
            for out in self.server.drain_outbox() {
                let _ = self.endpoint.send_to(&out.packet, out.to);
            }
            self.events.extend(self.server.drain_events());
        }

        for client in self.clients.iter_mut().filter(|c| !c.muted) {
            let batch = client.endpoint.drain(256).unwrap();
            client.session.handle_packets(batch, now);
        }
    }

    fn wait_for(&mut self, timeout_ms: u64, mut done: impl FnMut(&Harness) -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            self.pump();
            if done(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn connect(&mut self, index: usize) {
        assert!(
            self.wait_for(1000, |h| h.client(index).state() == ClientState::InLobby),
            "client {index} never reached the lobby"
        );
    }

    fn enter_room(&mut self, index: usize, create: bool, room: u32) {
        let now = Instant::now();
        let sent = if create {
            self.client_mut(index).create_room(now)
        } else {
            self.client_mut(index).join_room(room, now)
        };
        assert!(sent);
        assert!(
            self.wait_for(1000, |h| h.client(index).state() == ClientState::InGame),
            "client {index} never entered a room"
        );
    }
}

#[test]
fn test_handshake_reaches_lobby() {
    let mut harness = Harness::new(ServerSettings::default());
    let client = harness.add_client(ClientSettings::default());

    harness.connect(client);

    assert_eq!(harness.server.connections().len(), 1);
    assert!(
        harness
            .events
            .iter()
            .any(|e| matches!(e, ServerEvent::ClientConnected { player: 1, .. }))
    );
}

#[test]
fn test_rooms_isolate_game_updates() {
    let mut harness = Harness::new(ServerSettings::default());
    let a = harness.add_client(ClientSettings::default());
    let b = harness.add_client(ClientSettings::default());
    let c = harness.add_client(ClientSettings::default());
    for index in [a, b, c] {
        harness.connect(index);
    }

    harness.enter_room(a, true, 0);
    let room = harness.client(a).room();
    harness.enter_room(b, false, room);
    harness.enter_room(c, true, 0);
    assert_ne!(harness.client(c).room(), room);

    let b_player = harness.client(b).player();
    assert!(harness.wait_for(1000, |h| {
        h.client(a).view().remotes.iter().any(|r| r.player == b_player)
    }));

    // Let several broadcasts go by.
    harness.wait_for(200, |_| false);
    let a_view = harness.client(a).view();
    assert!(a_view.remotes.iter().all(|r| r.player == b_player));
    assert!(harness.client(c).view().remotes.is_empty());
}

#[test]
fn test_lobby_lists_rooms() {
    let mut harness = Harness::new(ServerSettings::default());
    let a = harness.add_client(ClientSettings::default());
    let b = harness.add_client(ClientSettings::default());
    harness.connect(a);
    harness.connect(b);

    harness.enter_room(a, true, 0);
    let room = harness.client(a).room();

    assert!(harness.wait_for(1000, |h| {
        h.client(b)
            .view()
            .rooms
            .iter()
            .any(|slot| slot.room == room && slot.players == 1)
    }));
}

#[test]
fn test_join_survives_packet_loss() {
    let mut harness = Harness::new(ServerSettings::default());
    harness.endpoint.set_loss_simulation(PacketLossSimulation::lossy(0.3));
    let client = harness.add_client(ClientSettings {
        retransmit_interval_secs: 0.05,
        ..Default::default()
    });
    harness.clients[client]
        .endpoint
        .set_loss_simulation(PacketLossSimulation::lossy(0.3));

    assert!(harness.wait_for(5000, |h| h.client(client).state() == ClientState::InLobby));
    assert!(harness.client_mut(client).create_room(Instant::now()));
    assert!(harness.wait_for(5000, |h| h.client(client).state() == ClientState::InGame));
}

#[test]
fn test_refused_join_returns_to_lobby() {
    let mut harness = Harness::new(ServerSettings::default());
    let client = harness.add_client(ClientSettings::default());
    harness.connect(client);

    assert!(harness.client_mut(client).join_room(42, Instant::now()));
    assert!(harness.wait_for(1000, |h| h.client(client).view().last_refusal.is_some()));
    harness.wait_for(100, |_| false);

    assert_eq!(harness.client(client).state(), ClientState::InLobby);
    assert!(
        harness
            .events
            .iter()
            .any(|e| matches!(e, ServerEvent::RequestRefused { .. }))
    );
}

#[test]
fn test_founder_timeout_closes_room() {
    let mut harness = Harness::new(ServerSettings {
        inactivity_timeout_secs: 0.5,
        ..Default::default()
    });
    let founder = harness.add_client(ClientSettings::default());
    let member = harness.add_client(ClientSettings::default());
    harness.connect(founder);
    harness.connect(member);

    harness.enter_room(founder, true, 0);
    let room = harness.client(founder).room();
    harness.enter_room(member, false, room);

    harness.clients[founder].muted = true;
    assert!(harness.wait_for(3000, |h| h.client(member).state() == ClientState::InLobby));

    assert_eq!(harness.server.rooms().room_count(), 0);
    assert_eq!(harness.server.connections().len(), 1);
    assert!(
        harness
            .events
            .iter()
            .any(|e| matches!(e, ServerEvent::RoomClosed { room: r } if *r == room))
    );
}

#[test]
fn test_victory_resets_match() {
    let mut harness = Harness::new(ServerSettings {
        kills_to_win: 1,
        spawn_protection_secs: 0.0,
        ..Default::default()
    });
    let a = harness.add_client(ClientSettings::default());
    let b = harness.add_client(ClientSettings::default());
    harness.connect(a);
    harness.connect(b);
    harness.enter_room(a, true, 0);
    let room = harness.client(a).room();
    harness.enter_room(b, false, room);

    let a_player = harness.client(a).player();
    let b_player = harness.client(b).player();
    assert!(harness.client_mut(a).report_hit(b_player, 1, Instant::now()));

    assert!(harness.wait_for(2000, |h| {
        h.events
            .iter()
            .any(|e| matches!(e, ServerEvent::Victory { winner, .. } if *winner == a_player))
    }));
    harness.wait_for(200, |_| false);

    for index in [a, b] {
        let view = harness.client(index).view();
        assert_eq!(view.state, ClientState::InGame);
        assert_eq!(view.room, room);
        assert_eq!(view.local.score, 0);
        assert!(view.local.is_alive());
    }
    let infos = harness.server.connection_infos(Instant::now());
    assert!(infos.iter().all(|info| info.score == 0));
}

#[test]
fn test_client_detects_silent_server() {
    let mut harness = Harness::new(ServerSettings::default());
    let client = harness.add_client(ClientSettings {
        server_timeout_secs: 0.3,
        ..Default::default()
    });
    harness.connect(client);
    harness.enter_room(client, true, 0);
    let old_room = harness.client(client).room();

    harness.server_muted = true;
    assert!(harness.wait_for(2000, |h| h.client(client).state() == ClientState::Unconnected));

    // The server still holds the old session when the client starts over.
    harness.server_muted = false;
    harness.connect(client);
    harness.enter_room(client, true, 0);

    assert_ne!(harness.client(client).room(), old_room);
    assert!(harness.events.iter().any(|e| matches!(
        e,
        ServerEvent::RoomClosed { room } if *room == old_room
    )));
    assert_eq!(harness.server.rooms().room_count(), 1);
}
