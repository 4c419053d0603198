use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::protocol::{NO_PLAYER, PlayerId};
use super::reliability::ReliabilityEngine;
use crate::player::PlayerState;

pub type ConnectionId = u32;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub player: PlayerId,
    pub connected_at: Instant,
    pub last_receive: Instant,
    pub reliability: ReliabilityEngine,
    pub state: PlayerState,
    /// Highest send time the peer stamped on a packet, in its own clock.
    pub newest_timestamp: f64,
    /// Hits on this player are ignored until then.
    pub protected_until: Option<Instant>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, player: PlayerId, now: Instant) -> Self {
        Self {
            id,
            addr,
            player,
            connected_at: now,
            last_receive: now,
            reliability: ReliabilityEngine::new(),
            state: PlayerState::default(),
            newest_timestamp: 0.0,
            protected_until: None,
        }
    }

    pub fn is_inactive(&self, now: Instant, threshold: Duration) -> bool {
        now.duration_since(self.last_receive) >= threshold
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_receive = now;
    }

    pub fn is_protected(&self, now: Instant) -> bool {
        self.protected_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("server full ({0} connections)")]
    Full(usize),
    #[error("no free player id")]
    NoPlayerId,
}

/// Server-side table of known peers, keyed by endpoint.
#[derive(Debug)]
pub struct ConnectionRegistry {
    by_addr: HashMap<SocketAddr, ConnectionId>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: ConnectionId,
    max_clients: usize,
}

impl ConnectionRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            by_addr: HashMap::new(),
            connections: BTreeMap::new(),
            next_id: 1,
            max_clients,
        }
    }

    /// Returns the id of the connection for `addr`, creating it on first
    /// contact. The flag is true when the connection was just created.
    pub fn find_or_create(
        &mut self,
        addr: SocketAddr,
        now: Instant,
    ) -> Result<(ConnectionId, bool), RegistryError> {
        if let Some(&id) = self.by_addr.get(&addr) {
            return Ok((id, false));
        }

        if self.connections.len() >= self.max_clients {
            return Err(RegistryError::Full(self.connections.len()));
        }
        let player = self.free_player_id().ok_or(RegistryError::NoPlayerId)?;

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        self.by_addr.insert(addr, id);
        self.connections.insert(id, Connection::new(id, addr, player, now));
        Ok((id, true))
    }

    fn free_player_id(&self) -> Option<PlayerId> {
        (NO_PLAYER + 1..=PlayerId::MAX)
            .find(|candidate| !self.connections.values().any(|c| c.player == *candidate))
    }

    pub fn id_for(&self, addr: &SocketAddr) -> Option<ConnectionId> {
        self.by_addr.get(addr).copied()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&Connection> {
        self.by_addr.get(addr).and_then(|id| self.connections.get(id))
    }

    pub fn touch(&mut self, id: ConnectionId, now: Instant) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.touch(now);
        }
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        self.by_addr.remove(&connection.addr);
        Some(connection)
    }

    /// Removes and returns every connection silent for at least `threshold`.
    pub fn sweep_inactive(&mut self, now: Instant, threshold: Duration) -> Vec<Connection> {
        let inactive: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.is_inactive(now, threshold))
            .map(|c| c.id)
            .collect();

        inactive.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }
}
