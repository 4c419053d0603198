mod events;

pub use events::{DisconnectReason, ServerEvent};

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use glam::Vec2;

use crate::config::ServerSettings;
use crate::lobby::{Departure, RoomError, RoomManager};
use crate::net::{
    AckInfo, ConnectionId, ConnectionRegistry, GameReset, GameUpdate, Hit, LOBBY, LobbyUpdate,
    NO_PLAYER, NackInfo, Packet, PacketKind, PacketPayload, PlayerId, Received, Respawn, RoomId,
};
use crate::player::{PlayerState, SpawnGenerator};

/// A stamped packet waiting to be written to the socket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outgoing {
    pub packet: Packet,
    pub to: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub player: PlayerId,
    pub room: RoomId,
    pub idle: Duration,
    pub pending: usize,
    pub srtt_ms: f32,
    pub health: u8,
    pub score: u8,
}

#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub id: RoomId,
    pub players: Vec<PlayerId>,
    pub objective: Option<Vec2>,
}

/// Authoritative server state: connections, rooms and match bookkeeping.
/// Owns no socket; the caller feeds it decoded datagrams and flushes the
/// outbox after every tick.
#[derive(Debug)]
pub struct ServerSession {
    settings: ServerSettings,
    connections: ConnectionRegistry,
    rooms: RoomManager,
    spawns: SpawnGenerator,
    outbox: Vec<Outgoing>,
    events: VecDeque<ServerEvent>,
    last_broadcast: Option<Instant>,
}

fn is_handshake(packet: &Packet) -> bool {
    matches!(packet.payload(), PacketPayload::JoinRoom { room } if *room == LOBBY)
}

impl ServerSession {
    pub fn new(settings: ServerSettings) -> Self {
        let spawns = SpawnGenerator::new(settings.arena());
        Self::with_spawns(settings, spawns)
    }

    pub fn with_spawns(settings: ServerSettings, spawns: SpawnGenerator) -> Self {
        Self {
            connections: ConnectionRegistry::new(settings.max_clients),
            rooms: RoomManager::new(settings.room_limit(), settings.max_players_per_room),
            spawns,
            outbox: Vec::new(),
            events: VecDeque::new(),
            last_broadcast: None,
            settings,
        }
    }

    /// One server tick: apply the batch, age out silent peers, resend
    /// unacknowledged packets, then fan out match state.
    pub fn tick(&mut self, batch: Vec<Received>, now: Instant) {
        for received in batch {
            self.handle_packet(received.packet, received.from, now);
        }
        self.sweep_inactive(now);
        self.retransmit(now);
        self.broadcast_updates(now);
    }

    pub fn handle_packet(&mut self, packet: Packet, from: SocketAddr, now: Instant) {
        if let Some(id) = self.connections.id_for(&from) {
            if self.is_restart(id, &packet) {
                log::info!("connection {id} ({from}) rejoined from sequence 0");
                self.drop_connection(id, DisconnectReason::Restarted, now);
            }
        }

        let id = match self.connections.id_for(&from) {
            Some(id) => id,
            None if is_handshake(&packet) => match self.open_connection(from, now) {
                Some(id) => id,
                None => return,
            },
            None => {
                log::trace!("dropping {} from unknown endpoint {}", packet.kind(), from);
                return;
            }
        };
        self.connections.touch(id, now);

        let Some(connection) = self.connections.get_mut(id) else {
            return;
        };
        connection.newest_timestamp = connection.newest_timestamp.max(packet.timestamp());
        let inbound = connection.reliability.receive(packet, now);

        if let Some(ack) = inbound.reply_ack {
            let payload = PacketPayload::Ack(AckInfo::new(ack.kind, ack.sequence));
            self.send(id, payload, NO_PLAYER, now);
        }
        if let Some(ack) = inbound.acknowledged {
            log::debug!("connection {id} acknowledged {} #{}", ack.kind, ack.sequence);
        }
        if let Some(refusal) = inbound.refused {
            log::debug!(
                "connection {id} refused #{}: {}",
                refusal.sequence,
                refusal.error.as_str()
            );
        }

        for packet in inbound.deliver {
            self.apply(id, packet, now);
        }
    }

    /// A peer that lost its session starts over with a fresh handshake
    /// numbered 0. A delayed copy of its first handshake carries an older
    /// send time than packets already seen and is left to the duplicate path.
    fn is_restart(&self, id: ConnectionId, packet: &Packet) -> bool {
        if !is_handshake(packet) || packet.sequence() != 0 {
            return false;
        }
        self.connections.get(id).is_some_and(|c| {
            c.reliability.receiver().next_expected() != 0
                && packet.timestamp() > c.newest_timestamp
        })
    }

    /// The handshake that opened the connection is answered by the lobby
    /// join it carries.
    fn open_connection(&mut self, addr: SocketAddr, now: Instant) -> Option<ConnectionId> {
        match self.connections.find_or_create(addr, now) {
            Ok((id, _)) => {
                let player = self.connections.get(id).map_or(NO_PLAYER, |c| c.player);
                self.rooms.enter_lobby(id);
                log::info!("connection {id} from {addr} joined the lobby as player {player}");
                self.events
                    .push_back(ServerEvent::ClientConnected { id, addr, player });
                Some(id)
            }
            Err(e) => {
                log::warn!("refusing {addr}: {e}");
                self.events.push_back(ServerEvent::ConnectionDenied {
                    addr,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn apply(&mut self, id: ConnectionId, packet: Packet, now: Instant) {
        let Some(room) = self.rooms.room_of(id) else {
            return;
        };

        match *packet.payload() {
            PacketPayload::Ack(_) | PacketPayload::Nack(_) => {}
            PacketPayload::KeepAlive => {
                if room == LOBBY {
                    self.send_lobby_update(id, now);
                } else {
                    self.send(id, PacketPayload::KeepAlive, NO_PLAYER, now);
                }
            }
            PacketPayload::CreateRoom => self.create_room(id, packet.sequence(), now),
            PacketPayload::JoinRoom { room: target } => {
                self.join_room(id, room, target, packet.sequence(), now)
            }
            PacketPayload::GameUpdate(update) => self.record_update(id, room, &update),
            PacketPayload::Hit(hit) => self.apply_hit(id, room, hit, now),
            PacketPayload::Fire { .. } => self.relay_fire(id, room, now),
            PacketPayload::LobbyUpdate(_)
            | PacketPayload::GameReset(_)
            | PacketPayload::Respawn(_)
            | PacketPayload::ReturnToLobby => {
                log::trace!("ignoring {} from connection {id}", packet.kind());
            }
        }
    }

    fn create_room(&mut self, id: ConnectionId, sequence: u32, now: Instant) {
        match self.rooms.create_room(id) {
            Ok(room) => {
                let objective = self.spawns.objective();
                if let Some(created) = self.rooms.room_mut(room) {
                    created.objective = Some(objective);
                }
                log::info!("connection {id} founded room {room}");
                self.events
                    .push_back(ServerEvent::RoomCreated { room, founder: id });
                self.send_reset(id, room, objective, now);
                self.broadcast_lobby(now);
            }
            Err(e) => self.refuse(id, PacketKind::CreateRoom, sequence, e, now),
        }
    }

    fn join_room(
        &mut self,
        id: ConnectionId,
        current: RoomId,
        target: RoomId,
        sequence: u32,
        now: Instant,
    ) {
        if target == LOBBY {
            if current == LOBBY {
                self.send_lobby_update(id, now);
            } else {
                self.leave(id, now);
            }
            return;
        }

        match self.rooms.join_room(id, target) {
            Ok(()) => {
                let objective = self
                    .rooms
                    .room(target)
                    .and_then(|room| room.objective)
                    .unwrap_or_else(|| self.spawns.objective());
                log::info!("connection {id} joined room {target}");
                self.events
                    .push_back(ServerEvent::RoomJoined { room: target, id });
                self.send_reset(id, target, objective, now);
                self.broadcast_lobby(now);
            }
            Err(e) => self.refuse(id, PacketKind::JoinRoom, sequence, e, now),
        }
    }

    fn refuse(
        &mut self,
        id: ConnectionId,
        kind: PacketKind,
        sequence: u32,
        error: RoomError,
        now: Instant,
    ) {
        log::warn!("connection {id}: {kind} refused: {error}");
        self.events.push_back(ServerEvent::RequestRefused {
            id,
            reason: error.to_string(),
        });
        let payload = PacketPayload::Nack(NackInfo::new(kind, sequence, error.code()));
        self.send(id, payload, NO_PLAYER, now);
    }

    /// Explicit leave back to the lobby.
    fn leave(&mut self, id: ConnectionId, now: Instant) {
        if let Some(departure) = self.rooms.leave_room(id) {
            log::info!("connection {id} left room {}", departure.room);
            if let Some(connection) = self.connections.get_mut(id) {
                connection.state = PlayerState::default();
            }
            self.events.push_back(ServerEvent::RoomLeft {
                room: departure.room,
                id,
            });
            self.finish_departure(departure, now);
        }
    }

    fn finish_departure(&mut self, departure: Departure, now: Instant) {
        if departure.disbanded {
            log::info!("room {} closed", departure.room);
            self.events.push_back(ServerEvent::RoomClosed {
                room: departure.room,
            });
        }

        for member in departure.returned {
            if let Some(connection) = self.connections.get_mut(member) {
                connection.state = PlayerState::default();
            }
            self.send(member, PacketPayload::ReturnToLobby, NO_PLAYER, now);
        }

        self.broadcast_lobby(now);
    }

    fn send_reset(&mut self, id: ConnectionId, room: RoomId, objective: Vec2, now: Instant) {
        let spawn = self.spawns.spawn_point();
        let protection = self.settings.spawn_protection();
        let Some(connection) = self.connections.get_mut(id) else {
            return;
        };
        connection.state = PlayerState::spawned(spawn, 0.0);
        connection.protected_until = Some(now + protection);

        let reset = GameReset {
            position: spawn.to_array(),
            orientation_degrees: 0.0,
            objective: objective.to_array(),
            player: connection.player,
            room,
        };
        self.send(id, PacketPayload::GameReset(reset), NO_PLAYER, now);
    }

    /// Kinematics come from the peer; health and score stay server-side.
    fn record_update(&mut self, id: ConnectionId, room: RoomId, update: &GameUpdate) {
        if room == LOBBY {
            return;
        }
        if let Some(connection) = self.connections.get_mut(id) {
            connection.state.kinematics = PlayerState::from_update(update).kinematics;
        }
    }

    fn apply_hit(&mut self, id: ConnectionId, room: RoomId, hit: Hit, now: Instant) {
        if room == LOBBY {
            return;
        }
        let Some(instigator) = self.connections.get(id).map(|c| c.player) else {
            return;
        };
        if hit.instigator != instigator || hit.target == instigator {
            log::trace!("ignoring hit {hit:?} from player {instigator}");
            return;
        }

        let members = self.rooms.members(room).to_vec();
        let target = members.iter().copied().find(|&member| {
            self.connections
                .get(member)
                .is_some_and(|c| c.player == hit.target)
        });
        let Some(target) = target else {
            log::trace!("hit target {} is not in room {room}", hit.target);
            return;
        };
        if self
            .connections
            .get(target)
            .is_some_and(|c| c.is_protected(now))
        {
            log::trace!("player {} is spawn protected", hit.target);
            return;
        }

        for &member in &members {
            self.send(member, PacketPayload::Hit(hit), instigator, now);
        }

        let killed = self
            .connections
            .get_mut(target)
            .is_some_and(|c| c.state.take_damage(hit.damage));
        if !killed {
            return;
        }

        let Some(score) = self.connections.get_mut(id).map(|c| {
            c.state.score = c.state.score.saturating_add(1);
            c.state.score
        }) else {
            return;
        };
        log::debug!(
            "player {instigator} scored on {} in room {room} ({score})",
            hit.target
        );

        let respawn = Respawn {
            position: self.spawns.spawn_point().to_array(),
            orientation_degrees: 0.0,
        };
        let protection = self.settings.spawn_protection();
        if let Some(connection) = self.connections.get_mut(target) {
            connection.state.apply_respawn(&respawn);
            connection.protected_until = Some(now + protection);
        }
        self.send(target, PacketPayload::Respawn(respawn), NO_PLAYER, now);

        if score >= self.settings.kills_to_win {
            self.reset_match(room, instigator, now);
        }
    }

    fn reset_match(&mut self, room: RoomId, winner: PlayerId, now: Instant) {
        let objective = self.spawns.objective();
        if let Some(current) = self.rooms.room_mut(room) {
            current.objective = Some(objective);
        }
        log::info!("player {winner} won room {room}");
        self.events.push_back(ServerEvent::Victory { room, winner });

        for member in self.rooms.members(room).to_vec() {
            self.send_reset(member, room, objective, now);
        }
    }

    fn relay_fire(&mut self, id: ConnectionId, room: RoomId, now: Instant) {
        if room == LOBBY {
            return;
        }
        let Some(instigator) = self.connections.get(id).map(|c| c.player) else {
            return;
        };
        let payload = PacketPayload::Fire { instigator };
        for member in self.rooms.members(room).to_vec() {
            if member != id {
                self.send(member, payload, instigator, now);
            }
        }
    }

    fn send(&mut self, id: ConnectionId, payload: PacketPayload, sender: PlayerId, now: Instant) {
        let Some(connection) = self.connections.get_mut(id) else {
            log::trace!("dropping {} for unknown connection {id}", payload.kind());
            return;
        };
        let packet = connection
            .reliability
            .stamp(Packet::new(sender, payload), now);
        self.outbox.push(Outgoing {
            packet,
            to: connection.addr,
        });
    }

    fn send_lobby_update(&mut self, id: ConnectionId, now: Instant) {
        let update = LobbyUpdate::from_occupancy(self.rooms.occupancy());
        self.send(id, PacketPayload::LobbyUpdate(update), NO_PLAYER, now);
    }

    fn broadcast_lobby(&mut self, now: Instant) {
        let update = LobbyUpdate::from_occupancy(self.rooms.occupancy());
        for id in self.rooms.lobby_members().to_vec() {
            self.send(id, PacketPayload::LobbyUpdate(update), NO_PLAYER, now);
        }
    }

    pub fn sweep_inactive(&mut self, now: Instant) {
        let threshold = self.settings.inactivity_timeout();
        for connection in self.connections.sweep_inactive(now, threshold) {
            log::info!("connection {} ({}) timed out", connection.id, connection.addr);
            self.events.push_back(ServerEvent::ClientDisconnected {
                id: connection.id,
                reason: DisconnectReason::Timeout,
            });
            if let Some(departure) = self.rooms.remove_connection(connection.id) {
                self.finish_departure(departure, now);
            }
        }
    }

    pub fn retransmit(&mut self, now: Instant) {
        let interval = self.settings.retransmit_interval();
        for connection in self.connections.iter_mut() {
            for packet in connection.reliability.collect_resends(now, interval) {
                log::debug!(
                    "resending {} #{} to connection {}",
                    packet.kind(),
                    packet.sequence(),
                    connection.id
                );
                self.outbox.push(Outgoing {
                    packet,
                    to: connection.addr,
                });
            }
        }
    }

    /// Sends every room member's recorded state to the other members.
    pub fn broadcast_updates(&mut self, now: Instant) {
        if let Some(last) = self.last_broadcast {
            if now.duration_since(last) < self.settings.broadcast_interval() {
                return;
            }
        }
        self.last_broadcast = Some(now);

        let rooms: Vec<Vec<ConnectionId>> =
            self.rooms.rooms().map(|room| room.members.clone()).collect();

        for members in rooms {
            for &subject in &members {
                let Some((player, update)) = self
                    .connections
                    .get(subject)
                    .map(|c| (c.player, c.state.to_update()))
                else {
                    continue;
                };
                for &other in members.iter().filter(|&&m| m != subject) {
                    self.send(other, PacketPayload::GameUpdate(update), player, now);
                }
            }
        }
    }

    pub fn kick(&mut self, id: ConnectionId, now: Instant) {
        self.drop_connection(id, DisconnectReason::Kicked, now);
    }

    fn drop_connection(&mut self, id: ConnectionId, reason: DisconnectReason, now: Instant) {
        let Some(connection) = self.connections.remove(id) else {
            return;
        };
        log::info!("connection {id} ({}) {}", connection.addr, reason.as_str());
        self.events
            .push_back(ServerEvent::ClientDisconnected { id, reason });
        if let Some(departure) = self.rooms.remove_connection(id) {
            self.finish_departure(departure, now);
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.events.drain(..)
    }

    pub fn push_event(&mut self, event: ServerEvent) {
        self.events.push_back(event);
    }

    pub fn connection_infos(&self, now: Instant) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|c| ConnectionInfo {
                id: c.id,
                addr: c.addr,
                player: c.player,
                room: self.rooms.room_of(c.id).unwrap_or(LOBBY),
                idle: now.duration_since(c.last_receive),
                pending: c.reliability.pending_count(),
                srtt_ms: c.reliability.sender().srtt(),
                health: c.state.health,
                score: c.state.score,
            })
            .collect()
    }

    pub fn room_infos(&self) -> Vec<RoomInfo> {
        self.rooms
            .rooms()
            .map(|room| RoomInfo {
                id: room.id,
                players: room
                    .members
                    .iter()
                    .filter_map(|&m| self.connections.get(m).map(|c| c.player))
                    .collect(),
                objective: room.objective,
            })
            .collect()
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}
