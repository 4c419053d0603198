mod state;

pub use state::{ClientEvent, ClientState, RoomRequest};

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use glam::Vec2;

use crate::config::ClientSettings;
use crate::net::{
    AckInfo, Acknowledgement, ErrorCode, GameReset, Hit, LOBBY, NO_PLAYER, Packet, PacketKind,
    PacketPayload, PlayerId, Received, Refusal, ReliabilityEngine, RoomId, RoomSlot,
};
use crate::player::{KinematicSource, Kinematics, MAX_HEALTH, PlayerState};

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub player: PlayerId,
    pub state: PlayerState,
    pub shots_fired: u32,
    pub hits_taken: u32,
}

impl RemotePlayer {
    fn new(player: PlayerId) -> Self {
        Self {
            player,
            state: PlayerState::default(),
            shots_fired: 0,
            hits_taken: 0,
        }
    }
}

/// Read-only snapshot for renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientView {
    pub state: ClientState,
    pub player: PlayerId,
    pub room: RoomId,
    pub local: PlayerState,
    pub objective: Option<Vec2>,
    pub remotes: Vec<RemotePlayer>,
    pub rooms: Vec<RoomSlot>,
    pub last_refusal: Option<ErrorCode>,
    pub rtt_ms: f32,
}

fn due(last: Option<Instant>, now: Instant, period: Duration) -> bool {
    last.is_none_or(|at| now.duration_since(at) >= period)
}

/// Client half of the protocol: connection state machine, lobby listing,
/// and the remote players of the current match. Owns no socket.
#[derive(Debug)]
pub struct ClientSession {
    settings: ClientSettings,
    server: SocketAddr,
    state: ClientState,
    engine: ReliabilityEngine,
    player: PlayerId,
    room: RoomId,
    local: PlayerState,
    objective: Option<Vec2>,
    remotes: BTreeMap<PlayerId, RemotePlayer>,
    remote_seen: BTreeMap<PlayerId, Instant>,
    rooms: Vec<RoomSlot>,
    requests: BTreeMap<u32, RoomRequest>,
    awaiting: Option<u32>,
    held_reset: Option<GameReset>,
    placement: Option<Kinematics>,
    last_refusal: Option<ErrorCode>,
    outbox: Vec<Packet>,
    last_receive: Instant,
    last_join: Option<Instant>,
    last_keep_alive: Option<Instant>,
    last_update: Option<Instant>,
}

impl ClientSession {
    pub fn new(server: SocketAddr, settings: ClientSettings, now: Instant) -> Self {
        Self {
            settings,
            server,
            state: ClientState::Unconnected,
            engine: ReliabilityEngine::new(),
            player: NO_PLAYER,
            room: LOBBY,
            local: PlayerState::default(),
            objective: None,
            remotes: BTreeMap::new(),
            remote_seen: BTreeMap::new(),
            rooms: Vec::new(),
            requests: BTreeMap::new(),
            awaiting: None,
            held_reset: None,
            placement: None,
            last_refusal: None,
            outbox: Vec::new(),
            last_receive: now,
            last_join: None,
            last_keep_alive: None,
            last_update: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn local(&self) -> &PlayerState {
        &self.local
    }

    pub fn handle_packets(&mut self, batch: Vec<Received>, now: Instant) {
        for received in batch {
            self.handle_packet(received.packet, received.from, now);
        }
    }

    pub fn handle_packet(&mut self, packet: Packet, from: SocketAddr, now: Instant) {
        if from != self.server {
            log::trace!("ignoring {} from {from}", packet.kind());
            return;
        }
        self.last_receive = now;

        // Reliable traffic before the handshake is acknowledged belongs to a
        // stale session; anything current is retransmitted.
        if self.state == ClientState::Unconnected
            && !matches!(packet.kind(), PacketKind::Ack | PacketKind::Nack)
        {
            log::trace!("not connected, ignoring {}", packet.kind());
            return;
        }

        let inbound = self.engine.receive(packet, now);
        if let Some(ack) = inbound.reply_ack {
            self.send(PacketPayload::Ack(AckInfo::new(ack.kind, ack.sequence)), now);
        }
        if let Some(ack) = inbound.acknowledged {
            self.on_acknowledged(ack);
        }
        if let Some(refusal) = inbound.refused {
            self.on_refused(refusal);
        }
        for packet in inbound.deliver {
            self.apply(packet, now);
        }
    }

    /// Periodic work: silence detection, keep-alives, state reports and the
    /// retransmission sweep.
    pub fn tick(&mut self, now: Instant) {
        if self.state != ClientState::Unconnected
            && now.duration_since(self.last_receive) >= self.settings.server_timeout()
        {
            log::warn!(
                "no traffic from {} in {:?}, reconnecting",
                self.server,
                self.settings.server_timeout()
            );
            self.transition(ClientEvent::ServerLost);
            self.reset_connection(now);
        }

        match self.state {
            ClientState::Unconnected => {
                let outstanding = self.requests.values().any(|r| *r == RoomRequest::Lobby);
                if !outstanding && due(self.last_join, now, self.settings.join_resend()) {
                    self.last_join = Some(now);
                    self.request(RoomRequest::Lobby, now);
                }
            }
            ClientState::InLobby | ClientState::AwaitingReset => self.keep_alive(now),
            ClientState::InGame => {
                self.keep_alive(now);
                self.expire_remotes(now);
                if due(self.last_update, now, self.settings.update_interval()) {
                    self.last_update = Some(now);
                    self.send(PacketPayload::GameUpdate(self.local.to_update()), now);
                }
            }
        }

        for packet in self.engine.collect_resends(now, self.settings.retransmit_interval()) {
            log::debug!("resending {} #{}", packet.kind(), packet.sequence());
            self.outbox.push(packet);
        }
    }

    fn keep_alive(&mut self, now: Instant) {
        if due(self.last_keep_alive, now, self.settings.keep_alive()) {
            self.last_keep_alive = Some(now);
            self.send(PacketPayload::KeepAlive, now);
        }
    }

    pub fn create_room(&mut self, now: Instant) -> bool {
        if self.state != ClientState::InLobby || self.room_request_outstanding() {
            return false;
        }
        self.request(RoomRequest::Create, now);
        true
    }

    pub fn join_room(&mut self, room: RoomId, now: Instant) -> bool {
        if room == LOBBY || self.state != ClientState::InLobby || self.room_request_outstanding() {
            return false;
        }
        self.request(RoomRequest::Join(room), now);
        true
    }

    pub fn leave_room(&mut self, now: Instant) -> bool {
        if self.state != ClientState::InGame {
            return false;
        }
        self.request(RoomRequest::Lobby, now);
        true
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        if self.state != ClientState::InGame {
            return false;
        }
        self.send(PacketPayload::Fire { instigator: self.player }, now);
        true
    }

    pub fn report_hit(&mut self, target: PlayerId, damage: u8, now: Instant) -> bool {
        if self.state != ClientState::InGame || target == self.player {
            return false;
        }
        let hit = Hit {
            instigator: self.player,
            target,
            damage,
        };
        self.send(PacketPayload::Hit(hit), now);
        true
    }

    /// Moves the local player. Spawn points from the server are pushed into
    /// `source` first.
    pub fn advance_local<K: KinematicSource + ?Sized>(
        &mut self,
        source: &mut K,
        input: Vec2,
        dt: f32,
    ) {
        if let Some(spawn) = self.placement.take() {
            source.place(spawn.position, spawn.orientation_degrees);
        }
        if self.state == ClientState::InGame && self.local.is_alive() {
            self.local.kinematics = source.advance(input, dt);
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    pub fn view(&self) -> ClientView {
        ClientView {
            state: self.state,
            player: self.player,
            room: self.room,
            local: self.local,
            objective: self.objective,
            remotes: self.remotes.values().cloned().collect(),
            rooms: self.rooms.clone(),
            last_refusal: self.last_refusal,
            rtt_ms: self.engine.sender().srtt(),
        }
    }

    fn room_request_outstanding(&self) -> bool {
        self.awaiting.is_some()
            || self
                .requests
                .values()
                .any(|r| matches!(r, RoomRequest::Create | RoomRequest::Join(_)))
    }

    fn request(&mut self, request: RoomRequest, now: Instant) {
        let payload = match request {
            RoomRequest::Lobby => PacketPayload::JoinRoom { room: LOBBY },
            RoomRequest::Create => PacketPayload::CreateRoom,
            RoomRequest::Join(room) => PacketPayload::JoinRoom { room },
        };
        let packet = self.send(payload, now);
        self.requests.insert(packet.sequence(), request);
    }

    fn send(&mut self, payload: PacketPayload, now: Instant) -> Packet {
        let packet = self.engine.stamp(Packet::new(self.player, payload), now);
        self.outbox.push(packet);
        packet
    }

    fn transition(&mut self, event: ClientEvent) {
        let next = self.state.on_event(&event);
        if next != self.state {
            log::info!("{} -> {} ({event:?})", self.state.as_str(), next.as_str());
        }
        self.state = next;
    }

    fn on_acknowledged(&mut self, ack: Acknowledgement) {
        if !matches!(ack.kind, PacketKind::JoinRoom | PacketKind::CreateRoom) {
            return;
        }
        let Some(request) = self.requests.remove(&ack.sequence) else {
            return;
        };

        let before = self.state;
        self.transition(ClientEvent::RequestAcked(request));

        match (before, self.state) {
            (ClientState::Unconnected, ClientState::InLobby) => {
                self.room = LOBBY;
                self.last_refusal = None;
            }
            (ClientState::InLobby, ClientState::AwaitingReset) => {
                self.awaiting = Some(ack.sequence);
                if let Some(reset) = self.held_reset.take() {
                    self.apply_reset(&reset);
                    self.transition(ClientEvent::ResetReceived);
                }
            }
            (ClientState::InGame, ClientState::InLobby) => self.enter_lobby(),
            _ => {}
        }
    }

    fn on_refused(&mut self, refusal: Refusal) {
        let known = self.requests.remove(&refusal.sequence).is_some();
        let awaited = self.awaiting == Some(refusal.sequence);
        if !known && !awaited {
            return;
        }

        log::warn!("request #{} refused: {}", refusal.sequence, refusal.error.as_str());
        self.last_refusal = Some(refusal.error);
        if awaited {
            self.awaiting = None;
            self.transition(ClientEvent::RequestRefused);
        }
    }

    fn apply(&mut self, packet: Packet, now: Instant) {
        let in_game = self.state == ClientState::InGame;

        match *packet.payload() {
            PacketPayload::LobbyUpdate(update) => {
                self.rooms = update.occupancy().collect();
            }
            PacketPayload::GameReset(reset) => match self.state {
                ClientState::AwaitingReset | ClientState::InGame => {
                    self.apply_reset(&reset);
                    self.transition(ClientEvent::ResetReceived);
                }
                ClientState::Unconnected | ClientState::InLobby => {
                    log::debug!("holding reset for room {}", reset.room);
                    self.held_reset = Some(reset);
                }
            },
            PacketPayload::Respawn(respawn) if in_game => {
                self.local.apply_respawn(&respawn);
                self.placement = Some(self.local.kinematics);
            }
            PacketPayload::GameUpdate(update) if in_game => {
                let sender = packet.sender();
                if sender != NO_PLAYER && sender != self.player {
                    self.remote_seen.insert(sender, now);
                    self.remote_mut(sender, now).state = PlayerState::from_update(&update);
                }
            }
            PacketPayload::Hit(hit) if in_game => self.apply_hit(hit, now),
            PacketPayload::Fire { instigator } if in_game && instigator != self.player => {
                self.remote_seen.insert(instigator, now);
                self.remote_mut(instigator, now).shots_fired += 1;
            }
            PacketPayload::ReturnToLobby => {
                self.transition(ClientEvent::ReturnToLobby);
                if self.state == ClientState::InLobby {
                    // Whatever room an unacknowledged request led to is gone.
                    self.requests.retain(|_, request| *request == RoomRequest::Lobby);
                    self.enter_lobby();
                }
            }
            _ => {}
        }
    }

    fn apply_reset(&mut self, reset: &GameReset) {
        if reset.room != self.room {
            self.remotes.clear();
            self.remote_seen.clear();
        }
        for remote in self.remotes.values_mut() {
            remote.state.score = 0;
            remote.state.health = MAX_HEALTH;
        }

        self.player = reset.player;
        self.room = reset.room;
        self.local.apply_reset(reset);
        self.objective = Some(Vec2::from_array(reset.objective));
        self.placement = Some(self.local.kinematics);
        self.awaiting = None;
        log::info!("spawned as player {} in room {}", self.player, self.room);
    }

    fn remote_mut(&mut self, player: PlayerId, now: Instant) -> &mut RemotePlayer {
        self.remote_seen.entry(player).or_insert(now);
        self.remotes
            .entry(player)
            .or_insert_with(|| RemotePlayer::new(player))
    }

    /// Drops players the server stopped reporting, which covers members
    /// that left or timed out.
    fn expire_remotes(&mut self, now: Instant) {
        let timeout = self.settings.remote_timeout();
        let seen = &mut self.remote_seen;
        self.remotes.retain(|&player, _| {
            let fresh = seen
                .get(&player)
                .is_some_and(|&at| now.duration_since(at) < timeout);
            if !fresh {
                log::debug!("player {player} went quiet, dropping");
                seen.remove(&player);
            }
            fresh
        });
    }

    /// Mirrors the server's scoring from the relayed hit.
    fn apply_hit(&mut self, hit: Hit, now: Instant) {
        let killed = if hit.target == self.player {
            self.local.take_damage(hit.damage)
        } else {
            let target = self.remote_mut(hit.target, now);
            target.hits_taken += 1;
            target.state.take_damage(hit.damage)
        };
        if !killed {
            return;
        }

        if hit.instigator == self.player {
            self.local.score = self.local.score.saturating_add(1);
        } else {
            let instigator = self.remote_mut(hit.instigator, now);
            instigator.state.score = instigator.state.score.saturating_add(1);
        }
    }

    fn enter_lobby(&mut self) {
        self.room = LOBBY;
        self.remotes.clear();
        self.remote_seen.clear();
        self.objective = None;
        self.held_reset = None;
        self.awaiting = None;
        self.local = PlayerState::default();
    }

    fn reset_connection(&mut self, now: Instant) {
        self.engine = ReliabilityEngine::new();
        self.enter_lobby();
        self.requests.clear();
        self.rooms.clear();
        self.outbox.clear();
        self.player = NO_PLAYER;
        self.last_receive = now;
        self.last_join = None;
        self.last_keep_alive = None;
        self.last_update = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{GameUpdate, LobbyUpdate, NackInfo, Respawn};
    use crate::player::MovementController;

    struct FakeServer {
        addr: SocketAddr,
        engine: ReliabilityEngine,
    }

    impl FakeServer {
        fn new() -> Self {
            Self {
                addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
                engine: ReliabilityEngine::new(),
            }
        }

        fn deliver(
            &mut self,
            client: &mut ClientSession,
            sender: PlayerId,
            payload: PacketPayload,
            now: Instant,
        ) {
            let packet = self.engine.stamp(Packet::new(sender, payload), now);
            client.handle_packet(packet, self.addr, now);
        }

        fn ack(&mut self, client: &mut ClientSession, packet: &Packet, now: Instant) {
            let payload = PacketPayload::Ack(AckInfo::new(packet.kind(), packet.sequence()));
            self.deliver(client, NO_PLAYER, payload, now);
        }
    }

    fn reset(room: RoomId, player: PlayerId) -> GameReset {
        GameReset {
            position: [100.0, 200.0],
            orientation_degrees: 0.0,
            objective: [300.0, 300.0],
            player,
            room,
        }
    }

    fn connected(server: &mut FakeServer, now: Instant) -> ClientSession {
        let mut client = ClientSession::new(server.addr, ClientSettings::default(), now);
        client.tick(now);
        let join = client.drain_outbox()[0];
        server.ack(&mut client, &join, now);
        client.drain_outbox();
        client
    }

    fn in_room(server: &mut FakeServer, now: Instant) -> ClientSession {
        let mut client = connected(server, now);
        client.join_room(1, now);
        let join = client.drain_outbox()[0];
        server.ack(&mut client, &join, now);
        server.deliver(&mut client, NO_PLAYER, PacketPayload::GameReset(reset(1, 2)), now);
        client.drain_outbox();
        client
    }

    #[test]
    fn test_unconnected_sends_lobby_join() {
        let now = Instant::now();
        let server = FakeServer::new();
        let mut client = ClientSession::new(server.addr, ClientSettings::default(), now);

        client.tick(now);
        let sent = client.drain_outbox();
        assert_eq!(sent.len(), 1);
        assert_eq!(*sent[0].payload(), PacketPayload::JoinRoom { room: LOBBY });

        // Outstanding request is retransmitted, not duplicated.
        client.tick(now + Duration::from_millis(100));
        assert!(client.drain_outbox().is_empty());
        client.tick(now + Duration::from_secs(1));
        assert_eq!(client.drain_outbox(), vec![sent[0]]);
    }

    #[test]
    fn test_ack_moves_to_lobby() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let client = connected(&mut server, now);
        assert_eq!(client.state(), ClientState::InLobby);
    }

    #[test]
    fn test_packets_from_strangers_are_ignored() {
        let now = Instant::now();
        let server = FakeServer::new();
        let mut client = ClientSession::new(server.addr, ClientSettings::default(), now);
        client.tick(now);
        let join = client.drain_outbox()[0];

        let payload = PacketPayload::Ack(AckInfo::new(PacketKind::JoinRoom, join.sequence()));
        let ack = Packet::new(0, payload);
        client.handle_packet(ack, SocketAddr::from(([10, 0, 0, 1], 5000)), now);
        assert_eq!(client.state(), ClientState::Unconnected);
    }

    #[test]
    fn test_lobby_update_refreshes_listing_and_is_acked() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = connected(&mut server, now);

        let update = LobbyUpdate::from_occupancy([(4, 2)]);
        server.deliver(&mut client, NO_PLAYER, PacketPayload::LobbyUpdate(update), now);

        assert_eq!(client.view().rooms, vec![RoomSlot { room: 4, players: 2 }]);
        let sent = client.drain_outbox();
        assert!(matches!(
            sent[0].payload(),
            PacketPayload::Ack(ack) if ack.acked_kind() == Some(PacketKind::LobbyUpdate)
        ));
    }

    #[test]
    fn test_ack_then_reset_enters_game() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = connected(&mut server, now);

        assert!(client.create_room(now));
        assert!(!client.create_room(now));
        let create = client.drain_outbox()[0];
        server.ack(&mut client, &create, now);
        assert_eq!(client.state(), ClientState::AwaitingReset);

        server.deliver(&mut client, NO_PLAYER, PacketPayload::GameReset(reset(7, 3)), now);
        assert_eq!(client.state(), ClientState::InGame);
        assert_eq!(client.room(), 7);
        assert_eq!(client.player(), 3);
        assert_eq!(client.local().kinematics.position, Vec2::new(100.0, 200.0));
    }

    #[test]
    fn test_reset_before_ack_is_held() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = connected(&mut server, now);

        client.join_room(2, now);
        let join = client.drain_outbox()[0];
        server.deliver(&mut client, NO_PLAYER, PacketPayload::GameReset(reset(2, 4)), now);
        assert_eq!(client.state(), ClientState::InLobby);

        server.ack(&mut client, &join, now);
        assert_eq!(client.state(), ClientState::InGame);
        assert_eq!(client.room(), 2);
    }

    #[test]
    fn test_nack_returns_to_lobby() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = connected(&mut server, now);

        client.join_room(9, now);
        let join = client.drain_outbox()[0];
        server.ack(&mut client, &join, now);
        assert_eq!(client.state(), ClientState::AwaitingReset);

        let nack = NackInfo::new(PacketKind::JoinRoom, join.sequence(), ErrorCode::RoomFull);
        server.deliver(&mut client, NO_PLAYER, PacketPayload::Nack(nack), now);
        assert_eq!(client.state(), ClientState::InLobby);
        assert_eq!(client.view().last_refusal, Some(ErrorCode::RoomFull));
    }

    #[test]
    fn test_nack_before_ack_keeps_lobby() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = connected(&mut server, now);

        client.join_room(9, now);
        let join = client.drain_outbox()[0];
        let nack = NackInfo::new(PacketKind::JoinRoom, join.sequence(), ErrorCode::RoomEmpty);
        server.deliver(&mut client, NO_PLAYER, PacketPayload::Nack(nack), now);
        server.ack(&mut client, &join, now);
        assert_eq!(client.state(), ClientState::InLobby);
    }

    #[test]
    fn test_remote_updates_and_return_to_lobby() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);

        let update = GameUpdate {
            position: [5.0, 6.0],
            health: 1,
            ..Default::default()
        };
        server.deliver(&mut client, 1, PacketPayload::GameUpdate(update), now);
        server.deliver(&mut client, 2, PacketPayload::GameUpdate(update), now);
        let view = client.view();
        assert_eq!(view.remotes.len(), 1);
        assert_eq!(view.remotes[0].player, 1);
        assert_eq!(view.remotes[0].state.kinematics.position, Vec2::new(5.0, 6.0));

        server.deliver(&mut client, NO_PLAYER, PacketPayload::ReturnToLobby, now);
        let view = client.view();
        assert_eq!(view.state, ClientState::InLobby);
        assert_eq!(view.room, LOBBY);
        assert!(view.remotes.is_empty());
    }

    #[test]
    fn test_stale_game_update_is_dropped() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);

        let update = |x: f32| {
            PacketPayload::GameUpdate(GameUpdate {
                position: [x, x],
                ..Default::default()
            })
        };
        let newer = server.engine.stamp(Packet::new(1, update(2.0)), now);
        let mut stale = Packet::new(1, update(9.0));
        stale.set_sequence(newer.sequence().wrapping_sub(1));

        client.handle_packet(newer, server.addr, now);
        client.handle_packet(stale, server.addr, now);

        assert_eq!(client.view().remotes[0].state.kinematics.position, Vec2::splat(2.0));
    }

    #[test]
    fn test_hits_mirror_scores_and_respawn_heals() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);

        let hit = Hit {
            instigator: 2,
            target: 1,
            damage: 1,
        };
        server.deliver(&mut client, 2, PacketPayload::Hit(hit), now);
        assert_eq!(client.local().score, 1);

        let hit = Hit {
            instigator: 1,
            target: 2,
            damage: 1,
        };
        server.deliver(&mut client, 1, PacketPayload::Hit(hit), now);
        assert_eq!(client.local().health, 0);

        let mut controller = MovementController::default();
        client.advance_local(&mut controller, Vec2::X, 0.1);
        let respawn = Respawn {
            position: [50.0, 60.0],
            orientation_degrees: 0.0,
        };
        server.deliver(&mut client, NO_PLAYER, PacketPayload::Respawn(respawn), now);
        assert_eq!(client.local().health, MAX_HEALTH);

        client.advance_local(&mut controller, Vec2::ZERO, 0.1);
        assert_eq!(client.local().kinematics.position, Vec2::new(50.0, 60.0));
    }

    #[test]
    fn test_victory_reset_zeroes_scores() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);
        let hit = Hit {
            instigator: 2,
            target: 1,
            damage: 1,
        };
        server.deliver(&mut client, 2, PacketPayload::Hit(hit), now);
        assert_eq!(client.local().score, 1);

        server.deliver(&mut client, NO_PLAYER, PacketPayload::GameReset(reset(1, 2)), now);
        let view = client.view();
        assert_eq!(view.state, ClientState::InGame);
        assert_eq!(view.local.score, 0);
        assert!(view.remotes.iter().all(|r| r.state.score == 0));
    }

    #[test]
    fn test_in_game_reports_state() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);

        client.tick(now);
        let kinds: Vec<PacketKind> = client.drain_outbox().iter().map(Packet::kind).collect();
        assert!(kinds.contains(&PacketKind::GameUpdate));
        assert!(client.fire(now));
        assert!(!client.report_hit(2, 1, now));
    }

    #[test]
    fn test_explicit_leave() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);

        assert!(client.leave_room(now));
        let leave = client.drain_outbox()[0];
        assert_eq!(*leave.payload(), PacketPayload::JoinRoom { room: LOBBY });
        server.ack(&mut client, &leave, now);
        assert_eq!(client.state(), ClientState::InLobby);
        assert_eq!(client.room(), LOBBY);
    }

    #[test]
    fn test_server_silence_restarts_handshake() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);

        let later = now + ClientSettings::default().server_timeout();
        client.tick(later);
        assert_eq!(client.state(), ClientState::Unconnected);

        let sent = client.drain_outbox();
        assert_eq!(sent.len(), 1);
        assert_eq!(*sent[0].payload(), PacketPayload::JoinRoom { room: LOBBY });
        assert_eq!(sent[0].sequence(), 0);
        assert!(client.view().remotes.is_empty());
    }

    #[test]
    fn test_return_to_lobby_cancels_unacked_request() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = connected(&mut server, now);

        client.join_room(1, now);
        let join = client.drain_outbox()[0];
        // The Ack is late: the room starts and closes before it lands.
        server.deliver(&mut client, NO_PLAYER, PacketPayload::GameReset(reset(1, 2)), now);
        server.deliver(&mut client, NO_PLAYER, PacketPayload::ReturnToLobby, now);
        server.ack(&mut client, &join, now);

        assert_eq!(client.state(), ClientState::InLobby);
        assert_eq!(client.room(), LOBBY);
        assert!(client.join_room(3, now));
    }

    #[test]
    fn test_reliable_traffic_waits_for_the_handshake() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = ClientSession::new(server.addr, ClientSettings::default(), now);
        client.tick(now);
        let join = client.drain_outbox()[0];

        let update = LobbyUpdate::from_occupancy([(4, 2)]);
        let listing = server
            .engine
            .stamp(Packet::new(NO_PLAYER, PacketPayload::LobbyUpdate(update)), now);
        client.handle_packet(listing, server.addr, now);
        assert!(client.view().rooms.is_empty());
        assert!(client.drain_outbox().is_empty());

        server.ack(&mut client, &join, now);
        client.handle_packet(listing, server.addr, now);
        assert_eq!(client.view().rooms, vec![RoomSlot { room: 4, players: 2 }]);
    }

    #[test]
    fn test_quiet_remotes_expire() {
        let now = Instant::now();
        let mut server = FakeServer::new();
        let mut client = in_room(&mut server, now);
        let timeout = ClientSettings::default().remote_timeout();

        let update = PacketPayload::GameUpdate(GameUpdate::default());
        server.deliver(&mut client, 1, update, now);
        server.deliver(&mut client, 3, update, now);
        assert_eq!(client.view().remotes.len(), 2);

        // Player 1 left the room; player 3 keeps reporting.
        server.deliver(&mut client, 3, update, now + timeout / 2);
        client.tick(now + timeout);

        let remaining: Vec<PlayerId> = client.view().remotes.iter().map(|r| r.player).collect();
        assert_eq!(remaining, vec![3]);
    }
}
