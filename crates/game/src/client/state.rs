use crate::net::RoomId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Unconnected,
    InLobby,
    AwaitingReset,
    InGame,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconnected => "connecting",
            Self::InLobby => "lobby",
            Self::AwaitingReset => "joining",
            Self::InGame => "in game",
        }
    }

    /// Next state for an inbound event. Events that do not apply to the
    /// current state leave it unchanged.
    pub fn on_event(self, event: &ClientEvent) -> ClientState {
        use ClientEvent as E;
        use ClientState as S;

        match (self, event) {
            (_, E::ServerLost) => S::Unconnected,

            (S::Unconnected, E::RequestAcked(RoomRequest::Lobby)) => S::InLobby,
            (S::InLobby, E::RequestAcked(RoomRequest::Create | RoomRequest::Join(_))) => {
                S::AwaitingReset
            }
            (S::InGame, E::RequestAcked(RoomRequest::Lobby)) => S::InLobby,

            (S::AwaitingReset, E::RequestRefused) => S::InLobby,
            (S::AwaitingReset | S::InGame, E::ResetReceived) => S::InGame,
            (S::AwaitingReset | S::InGame, E::ReturnToLobby) => S::InLobby,

            (state, _) => state,
        }
    }
}

/// Reliable room requests the client tracks until acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomRequest {
    Lobby,
    Create,
    Join(RoomId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    RequestAcked(RoomRequest),
    RequestRefused,
    ResetReceived,
    ReturnToLobby,
    ServerLost,
}
