pub mod client;
pub mod config;
pub mod lobby;
pub mod net;
pub mod player;
pub mod server;

pub use client::{ClientEvent, ClientSession, ClientState, ClientView, RemotePlayer, RoomRequest};
pub use config::{ClientSettings, ConfigError, ServerSettings, load_toml};
pub use lobby::{Departure, Room, RoomError, RoomManager};
pub use net::{
    ConnectionId, DEFAULT_PORT, DEFAULT_TICK_RATE, ErrorCode, NetworkEndpoint, NetworkStats,
    Packet, PacketError, PacketKind, PacketLossSimulation, PacketPayload, PlayerId, Received,
    ReliabilityEngine, RoomId,
};
pub use player::{KinematicSource, MovementController, PlayerConfig, PlayerState};
pub use server::{ConnectionInfo, DisconnectReason, Outgoing, RoomInfo, ServerEvent, ServerSession};
