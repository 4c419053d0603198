use std::fmt;

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Largest datagram the transport will read; anything longer than
/// [`WIRE_SIZE`] is still read in full so it can be rejected.
pub const MAX_DATAGRAM_SIZE: usize = 1200;

/// Number of room slots carried by a lobby update.
pub const MAX_LISTED_ROOMS: usize = 8;

pub type RoomId = u32;
pub type PlayerId = u8;

pub const LOBBY: RoomId = 0;
pub const NO_PLAYER: PlayerId = 0;

/// Every packet archives to exactly this many bytes.
pub const WIRE_SIZE: usize = std::mem::size_of::<ArchivedPacket>();

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    Reliable,
    Unreliable,
}

impl Reliability {
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Reliable)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Reliable => 0,
            Self::Unreliable => 1,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketKind {
    None = 0,
    Ack = 1,
    Nack = 2,
    KeepAlive = 3,
    CreateRoom = 4,
    JoinRoom = 5,
    LobbyUpdate = 6,
    GameUpdate = 7,
    GameReset = 8,
    Respawn = 9,
    Hit = 10,
    Fire = 11,
    ReturnToLobby = 12,
}

impl PacketKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        let kind = match tag {
            0 => Self::None,
            1 => Self::Ack,
            2 => Self::Nack,
            3 => Self::KeepAlive,
            4 => Self::CreateRoom,
            5 => Self::JoinRoom,
            6 => Self::LobbyUpdate,
            7 => Self::GameUpdate,
            8 => Self::GameReset,
            9 => Self::Respawn,
            10 => Self::Hit,
            11 => Self::Fire,
            12 => Self::ReturnToLobby,
            _ => return None,
        };
        Some(kind)
    }

    /// Static delivery class of each packet type.
    pub fn reliability(self) -> Reliability {
        match self {
            Self::CreateRoom
            | Self::JoinRoom
            | Self::LobbyUpdate
            | Self::GameReset
            | Self::Respawn
            | Self::Hit
            | Self::Fire
            | Self::ReturnToLobby => Reliability::Reliable,

            Self::None | Self::Ack | Self::Nack | Self::KeepAlive | Self::GameUpdate => {
                Reliability::Unreliable
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Ack => "Ack",
            Self::Nack => "Nack",
            Self::KeepAlive => "KeepAlive",
            Self::CreateRoom => "CreateRoom",
            Self::JoinRoom => "JoinRoom",
            Self::LobbyUpdate => "LobbyUpdate",
            Self::GameUpdate => "GameUpdate",
            Self::GameReset => "GameReset",
            Self::Respawn => "Respawn",
            Self::Hit => "Hit",
            Self::Fire => "Fire",
            Self::ReturnToLobby => "ReturnToLobby",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason carried by a [`PacketPayload::Nack`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None = 0,
    RoomEmpty = 1,
    RoomFull = 2,
    BadRoomId = 3,
    ServerFull = 4,
    Unknown = 255,
}

impl ErrorCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::RoomEmpty,
            2 => Self::RoomFull,
            3 => Self::BadRoomId,
            4 => Self::ServerFull,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RoomEmpty => "room does not exist",
            Self::RoomFull => "room is full",
            Self::BadRoomId => "bad room id",
            Self::ServerFull => "no free room",
            Self::Unknown => "unknown error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct AckInfo {
    pub kind: u8,
    pub sequence: u32,
}

impl AckInfo {
    pub fn new(kind: PacketKind, sequence: u32) -> Self {
        Self {
            kind: kind as u8,
            sequence,
        }
    }

    pub fn acked_kind(&self) -> Option<PacketKind> {
        PacketKind::from_u8(self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct NackInfo {
    pub kind: u8,
    pub sequence: u32,
    pub error: u8,
}

impl NackInfo {
    pub fn new(kind: PacketKind, sequence: u32, error: ErrorCode) -> Self {
        Self {
            kind: kind as u8,
            sequence,
            error: error as u8,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_u8(self.error)
    }
}

/// One entry of the lobby listing. `room == LOBBY` marks an unused slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct RoomSlot {
    pub room: RoomId,
    pub players: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct LobbyUpdate {
    pub rooms: [RoomSlot; MAX_LISTED_ROOMS],
}

impl LobbyUpdate {
    /// Builds a listing from `(room, players)` pairs; entries past
    /// [`MAX_LISTED_ROOMS`] are not listed.
    pub fn from_occupancy<I>(occupancy: I) -> Self
    where
        I: IntoIterator<Item = (RoomId, u8)>,
    {
        let mut update = Self::default();
        for (slot, (room, players)) in update.rooms.iter_mut().zip(occupancy) {
            *slot = RoomSlot { room, players };
        }
        update
    }

    pub fn occupancy(&self) -> impl Iterator<Item = RoomSlot> + '_ {
        self.rooms.iter().copied().filter(|slot| slot.room != LOBBY)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct GameUpdate {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub acceleration: [f32; 2],
    /// 0-359.99, 0 = east, counterclockwise.
    pub orientation_degrees: f32,
    pub health: u8,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct GameReset {
    pub position: [f32; 2],
    pub orientation_degrees: f32,
    pub objective: [f32; 2],
    pub player: PlayerId,
    pub room: RoomId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Respawn {
    pub position: [f32; 2],
    pub orientation_degrees: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Hit {
    pub instigator: PlayerId,
    pub target: PlayerId,
    pub damage: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PacketPayload {
    Ack(AckInfo),
    Nack(NackInfo),
    KeepAlive,
    CreateRoom,
    JoinRoom { room: RoomId },
    LobbyUpdate(LobbyUpdate),
    GameUpdate(GameUpdate),
    GameReset(GameReset),
    Respawn(Respawn),
    Hit(Hit),
    Fire { instigator: PlayerId },
    ReturnToLobby,
}

impl PacketPayload {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Ack(_) => PacketKind::Ack,
            Self::Nack(_) => PacketKind::Nack,
            Self::KeepAlive => PacketKind::KeepAlive,
            Self::CreateRoom => PacketKind::CreateRoom,
            Self::JoinRoom { .. } => PacketKind::JoinRoom,
            Self::LobbyUpdate(_) => PacketKind::LobbyUpdate,
            Self::GameUpdate(_) => PacketKind::GameUpdate,
            Self::GameReset(_) => PacketKind::GameReset,
            Self::Respawn(_) => PacketKind::Respawn,
            Self::Hit(_) => PacketKind::Hit,
            Self::Fire { .. } => PacketKind::Fire,
            Self::ReturnToLobby => PacketKind::ReturnToLobby,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PacketHeader {
    pub kind: u8,
    pub sender: PlayerId,
    pub sequence: u32,
    pub timestamp: f64,
}

/// A wire packet. The header tag is always derived from the payload, so a
/// packet built locally can never disagree with itself.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    header: PacketHeader,
    payload: PacketPayload,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("datagram is {actual} bytes, expected {expected}")]
    WrongSize { expected: usize, actual: usize },
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("header tag {tag} does not match {payload} payload")]
    TagMismatch { tag: u8, payload: PacketKind },
}

impl Packet {
    pub fn new(sender: PlayerId, payload: PacketPayload) -> Self {
        Self {
            header: PacketHeader {
                kind: payload.kind() as u8,
                sender,
                sequence: 0,
                timestamp: 0.0,
            },
            payload,
        }
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn payload(&self) -> &PacketPayload {
        &self.payload
    }

    pub fn kind(&self) -> PacketKind {
        self.payload.kind()
    }

    pub fn sender(&self) -> PlayerId {
        self.header.sender
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn timestamp(&self) -> f64 {
        self.header.timestamp
    }

    pub(crate) fn set_sequence(&mut self, sequence: u32) {
        self.header.sequence = sequence;
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: f64) {
        self.header.timestamp = timestamp;
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != WIRE_SIZE {
            return Err(PacketError::WrongSize {
                expected: WIRE_SIZE,
                actual: data.len(),
            });
        }

        // Socket buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(WIRE_SIZE);
        aligned.extend_from_slice(data);

        let packet = rkyv::from_bytes::<Self, rancor::Error>(&aligned)
            .map_err(PacketError::Deserialize)?;

        let payload = packet.payload.kind();
        if packet.header.kind != payload as u8 {
            return Err(PacketError::TagMismatch {
                tag: packet.header.kind,
                payload,
            });
        }

        Ok(packet)
    }
}
