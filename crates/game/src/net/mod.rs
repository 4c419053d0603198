mod connection;
mod protocol;
mod reliability;
mod stats;
mod transport;

pub use connection::{Connection, ConnectionId, ConnectionRegistry, RegistryError};
pub use protocol::{ArchivedPacket, sequence_greater_than};
pub use protocol::{
    AckInfo, DEFAULT_PORT, DEFAULT_TICK_RATE, ErrorCode, GameReset, GameUpdate, Hit, LOBBY,
    LobbyUpdate, MAX_DATAGRAM_SIZE, MAX_LISTED_ROOMS, NO_PLAYER, NackInfo, Packet, PacketError,
    PacketHeader, PacketKind, PacketPayload, PlayerId, Reliability, Respawn, RoomId, RoomSlot,
    WIRE_SIZE,
};
pub use reliability::{
    Acknowledgement, Inbound, PendingPacket, REORDER_WINDOW, Receipt, ReceiveTracker, Refusal,
    ReliabilityEngine, SendTracker,
};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{NetworkEndpoint, Received};
