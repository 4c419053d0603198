use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::net::MAX_LISTED_ROOMS;
use crate::player::PlayerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Reads a TOML settings file into `T`. Missing keys take their defaults.
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub max_clients: usize,
    pub max_rooms: usize,
    pub max_players_per_room: usize,
    pub inactivity_timeout_secs: f32,
    pub retransmit_interval_secs: f32,
    pub broadcast_interval_secs: f32,
    pub kills_to_win: u8,
    /// Hits are ignored for this long after a player is placed by a reset.
    pub spawn_protection_secs: f32,
    pub arena_width: f32,
    pub arena_height: f32,
    pub max_datagrams_per_tick: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_clients: 32,
            max_rooms: MAX_LISTED_ROOMS,
            max_players_per_room: 4,
            inactivity_timeout_secs: 5.0,
            retransmit_interval_secs: 0.5,
            broadcast_interval_secs: 0.05,
            kills_to_win: 10,
            spawn_protection_secs: 2.0,
            arena_width: 500.0,
            arena_height: 500.0,
            max_datagrams_per_tick: 256,
        }
    }
}

impl ServerSettings {
    pub fn inactivity_timeout(&self) -> Duration {
        secs(self.inactivity_timeout_secs)
    }

    pub fn retransmit_interval(&self) -> Duration {
        secs(self.retransmit_interval_secs)
    }

    pub fn broadcast_interval(&self) -> Duration {
        secs(self.broadcast_interval_secs)
    }

    pub fn spawn_protection(&self) -> Duration {
        secs(self.spawn_protection_secs)
    }

    /// Room count is bounded by what a lobby update can list.
    pub fn room_limit(&self) -> usize {
        self.max_rooms.min(MAX_LISTED_ROOMS)
    }

    pub fn arena(&self) -> glam::Vec2 {
        glam::Vec2::new(self.arena_width, self.arena_height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub join_resend_secs: f32,
    pub keep_alive_secs: f32,
    pub update_interval_secs: f32,
    pub retransmit_interval_secs: f32,
    pub server_timeout_secs: f32,
    /// Remote players without a state update for this long are dropped.
    pub remote_timeout_secs: f32,
    pub max_datagrams_per_tick: usize,
    pub movement: PlayerConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            join_resend_secs: 1.0,
            keep_alive_secs: 1.0,
            update_interval_secs: 0.05,
            retransmit_interval_secs: 0.5,
            server_timeout_secs: 10.0,
            remote_timeout_secs: 1.0,
            max_datagrams_per_tick: 256,
            movement: PlayerConfig::default(),
        }
    }
}

impl ClientSettings {
    pub fn join_resend(&self) -> Duration {
        secs(self.join_resend_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        secs(self.keep_alive_secs)
    }

    pub fn update_interval(&self) -> Duration {
        secs(self.update_interval_secs)
    }

    pub fn retransmit_interval(&self) -> Duration {
        secs(self.retransmit_interval_secs)
    }

    pub fn server_timeout(&self) -> Duration {
        secs(self.server_timeout_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        secs(self.remote_timeout_secs)
    }
}

fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: ServerSettings = toml::from_str("max_rooms = 3\nkills_to_win = 2").unwrap();
        assert_eq!(settings.max_rooms, 3);
        assert_eq!(settings.kills_to_win, 2);
        assert_eq!(settings.inactivity_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_room_limit_is_capped() {
        let settings = ServerSettings {
            max_rooms: 100,
            ..Default::default()
        };
        assert_eq!(settings.room_limit(), MAX_LISTED_ROOMS);
    }

    #[test]
    fn test_nested_movement_table() {
        let settings: ClientSettings =
            toml::from_str("keep_alive_secs = 2.0\n[movement]\nmove_speed = 50.0").unwrap();
        assert_eq!(settings.movement.move_speed, 50.0);
        assert_eq!(settings.movement.arena_width, 500.0);
        assert_eq!(settings.keep_alive(), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_toml::<ServerSettings>("/nonexistent/arena.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_negative_duration_is_zero() {
        assert_eq!(secs(-1.0), Duration::ZERO);
    }
}
