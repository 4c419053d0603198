use std::collections::{BTreeMap, HashMap};

use glam::Vec2;

use crate::net::{ConnectionId, ErrorCode, LOBBY, RoomId};

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    /// Join order; the first member founded the room.
    pub members: Vec<ConnectionId>,
    pub objective: Option<Vec2>,
}

impl Room {
    fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Vec::new(),
            objective: None,
        }
    }

    pub fn founder(&self) -> Option<ConnectionId> {
        self.members.first().copied()
    }

    pub fn player_count(&self) -> u8 {
        self.members.len().min(u8::MAX as usize) as u8
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    fn remove(&mut self, id: ConnectionId) -> bool {
        if let Some(pos) = self.members.iter().position(|&m| m == id) {
            self.members.remove(pos);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} does not exist")]
    NoSuchRoom(RoomId),
    #[error("room {0} is full")]
    RoomFull(RoomId),
    #[error("room limit reached")]
    TooManyRooms,
    #[error("connection is not in the lobby")]
    NotInLobby,
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoSuchRoom(_) => ErrorCode::RoomEmpty,
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::TooManyRooms => ErrorCode::ServerFull,
            Self::NotInLobby => ErrorCode::BadRoomId,
        }
    }
}

/// Result of a connection leaving a numbered room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room: RoomId,
    /// Other members sent back to the lobby because the founder left.
    pub returned: Vec<ConnectionId>,
    pub disbanded: bool,
}

/// Lobby and room membership. Every tracked connection is in exactly one
/// room; room 0 is the lobby and always exists.
#[derive(Debug)]
pub struct RoomManager {
    rooms: BTreeMap<RoomId, Room>,
    membership: HashMap<ConnectionId, RoomId>,
    next_room_id: RoomId,
    max_rooms: usize,
    max_players: usize,
}

impl RoomManager {
    pub fn new(max_rooms: usize, max_players: usize) -> Self {
        let mut rooms = BTreeMap::new();
        rooms.insert(LOBBY, Room::new(LOBBY));

        Self {
            rooms,
            membership: HashMap::new(),
            next_room_id: LOBBY + 1,
            max_rooms,
            max_players: max_players.max(1),
        }
    }

    /// Places a new connection in the lobby. Returns false if it was already
    /// tracked.
    pub fn enter_lobby(&mut self, id: ConnectionId) -> bool {
        if self.membership.contains_key(&id) {
            return false;
        }
        self.membership.insert(id, LOBBY);
        if let Some(lobby) = self.rooms.get_mut(&LOBBY) {
            lobby.members.push(id);
        }
        true
    }

    pub fn create_room(&mut self, id: ConnectionId) -> Result<RoomId, RoomError> {
        if self.room_of(id) != Some(LOBBY) {
            return Err(RoomError::NotInLobby);
        }
        if self.room_count() >= self.max_rooms {
            return Err(RoomError::TooManyRooms);
        }

        let room_id = self.next_room_id;
        self.next_room_id = self.next_room_id.wrapping_add(1).max(LOBBY + 1);

        self.move_member(id, LOBBY, room_id);
        Ok(room_id)
    }

    pub fn join_room(&mut self, id: ConnectionId, target: RoomId) -> Result<(), RoomError> {
        if self.room_of(id) != Some(LOBBY) {
            return Err(RoomError::NotInLobby);
        }
        let room = match self.rooms.get(&target) {
            Some(room) if target != LOBBY => room,
            _ => return Err(RoomError::NoSuchRoom(target)),
        };
        if room.members.len() >= self.max_players {
            return Err(RoomError::RoomFull(target));
        }

        self.move_member(id, LOBBY, target);
        Ok(())
    }

    /// Moves the connection back to the lobby. A departing founder takes the
    /// whole room with it. Returns `None` if it was not in a numbered room.
    pub fn leave_room(&mut self, id: ConnectionId) -> Option<Departure> {
        let room_id = self.room_of(id).filter(|&r| r != LOBBY)?;
        let departure = self.detach(id, room_id);
        self.enter_lobby_unchecked(id);
        for &member in &departure.returned {
            self.enter_lobby_unchecked(member);
        }
        Some(departure)
    }

    /// Forgets the connection entirely. Returns a departure when it was in a
    /// numbered room, or a lobby departure when it was in the lobby.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Departure> {
        let room_id = self.room_of(id)?;
        let departure = self.detach(id, room_id);
        for &member in &departure.returned {
            self.enter_lobby_unchecked(member);
        }
        Some(departure)
    }

    fn detach(&mut self, id: ConnectionId, room_id: RoomId) -> Departure {
        self.membership.remove(&id);

        let mut departure = Departure {
            room: room_id,
            returned: Vec::new(),
            disbanded: false,
        };

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return departure;
        };
        let was_founder = room.founder() == Some(id);
        room.remove(id);

        if room_id != LOBBY && (was_founder || room.members.is_empty()) {
            if let Some(room) = self.rooms.remove(&room_id) {
                for &member in &room.members {
                    self.membership.remove(&member);
                }
                departure.returned = room.members;
            }
            departure.disbanded = true;
        }
        departure
    }

    fn enter_lobby_unchecked(&mut self, id: ConnectionId) {
        self.membership.remove(&id);
        self.enter_lobby(id);
    }

    fn move_member(&mut self, id: ConnectionId, from: RoomId, to: RoomId) {
        if let Some(room) = self.rooms.get_mut(&from) {
            room.remove(id);
        }
        self.rooms
            .entry(to)
            .or_insert_with(|| Room::new(to))
            .members
            .push(id);
        self.membership.insert(id, to);
    }

    pub fn room_of(&self, id: ConnectionId) -> Option<RoomId> {
        self.membership.get(&id).copied()
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn room_mut(&mut self, id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&id)
    }

    pub fn members(&self, id: RoomId) -> &[ConnectionId] {
        self.rooms.get(&id).map_or(&[], |room| room.members.as_slice())
    }

    pub fn lobby_members(&self) -> &[ConnectionId] {
        self.members(LOBBY)
    }

    /// Numbered rooms in creation order.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values().filter(|room| room.id != LOBBY)
    }

    pub fn occupancy(&self) -> Vec<(RoomId, u8)> {
        self.rooms().map(|room| (room.id, room.player_count())).collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len() - 1
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_lobby(ids: &[ConnectionId]) -> RoomManager {
        let mut manager = RoomManager::new(8, 4);
        for &id in ids {
            manager.enter_lobby(id);
        }
        manager
    }

    #[test]
    fn test_room_ids_are_never_reused() {
        let mut manager = manager_with_lobby(&[1, 2]);

        let first = manager.create_room(1).unwrap();
        manager.leave_room(1);
        let second = manager.create_room(2).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert!(manager.room(first).is_none());
    }

    #[test]
    fn test_join_moves_out_of_lobby() {
        let mut manager = manager_with_lobby(&[1, 2, 3]);
        let room = manager.create_room(1).unwrap();

        manager.join_room(2, room).unwrap();
        assert_eq!(manager.members(room), &[1, 2]);
        assert_eq!(manager.lobby_members(), &[3]);
        assert_eq!(manager.occupancy(), vec![(room, 2)]);
    }

    #[test]
    fn test_join_errors() {
        let mut manager = RoomManager::new(1, 2);
        for id in 1..=4 {
            manager.enter_lobby(id);
        }
        let room = manager.create_room(1).unwrap();

        assert_eq!(manager.join_room(2, 99), Err(RoomError::NoSuchRoom(99)));
        assert_eq!(manager.join_room(2, LOBBY), Err(RoomError::NoSuchRoom(LOBBY)));
        manager.join_room(2, room).unwrap();
        assert_eq!(manager.join_room(3, room), Err(RoomError::RoomFull(room)));
        assert_eq!(manager.join_room(2, room), Err(RoomError::NotInLobby));
        assert_eq!(manager.create_room(4), Err(RoomError::TooManyRooms));
        assert_eq!(RoomError::TooManyRooms.code(), ErrorCode::ServerFull);
    }

    #[test]
    fn test_founder_leaving_disbands_room() {
        let mut manager = manager_with_lobby(&[1, 2, 3]);
        let room = manager.create_room(1).unwrap();
        manager.join_room(2, room).unwrap();
        manager.join_room(3, room).unwrap();

        let departure = manager.leave_room(1).unwrap();
        assert!(departure.disbanded);
        assert_eq!(departure.returned, vec![2, 3]);
        assert!(manager.room(room).is_none());
        assert_eq!(manager.room_of(2), Some(LOBBY));
        assert_eq!(manager.room_of(1), Some(LOBBY));
        assert_eq!(manager.room_count(), 0);
    }

    #[test]
    fn test_member_leaving_keeps_room() {
        let mut manager = manager_with_lobby(&[1, 2]);
        let room = manager.create_room(1).unwrap();
        manager.join_room(2, room).unwrap();

        let departure = manager.leave_room(2).unwrap();
        assert!(!departure.disbanded);
        assert!(departure.returned.is_empty());
        assert_eq!(manager.members(room), &[1]);
    }

    #[test]
    fn test_remove_connection_forgets_it() {
        let mut manager = manager_with_lobby(&[1, 2]);
        let room = manager.create_room(1).unwrap();
        manager.join_room(2, room).unwrap();

        let departure = manager.remove_connection(1).unwrap();
        assert_eq!(departure.returned, vec![2]);
        assert_eq!(manager.room_of(1), None);
        assert_eq!(manager.lobby_members(), &[2]);

        let departure = manager.remove_connection(2).unwrap();
        assert_eq!(departure.room, LOBBY);
        assert!(manager.lobby_members().is_empty());
        assert!(manager.remove_connection(2).is_none());
    }

    #[test]
    fn test_leave_from_lobby_is_none() {
        let mut manager = manager_with_lobby(&[1]);
        assert!(manager.leave_room(1).is_none());
    }
}
