use std::net::SocketAddr;

use crate::net::{ConnectionId, PlayerId, RoomId};

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ClientConnected {
        id: ConnectionId,
        addr: SocketAddr,
        player: PlayerId,
    },
    ClientDisconnected {
        id: ConnectionId,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
    RoomCreated {
        room: RoomId,
        founder: ConnectionId,
    },
    RoomJoined {
        room: RoomId,
        id: ConnectionId,
    },
    RoomLeft {
        room: RoomId,
        id: ConnectionId,
    },
    RoomClosed {
        room: RoomId,
    },
    RequestRefused {
        id: ConnectionId,
        reason: String,
    },
    Victory {
        room: RoomId,
        winner: PlayerId,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Timeout,
    Kicked,
    /// The peer started a new session from the same endpoint.
    Restarted,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::Restarted => "restarted its session",
        }
    }
}
