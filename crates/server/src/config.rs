use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use arena::{ConfigError, DEFAULT_PORT, DEFAULT_TICK_RATE, PacketLossSimulation, ServerSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub tick_rate: u32,
    pub packet_loss: PacketLossSimulation,
    pub session: ServerSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            packet_loss: PacketLossSimulation::default(),
            session: ServerSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => arena::load_toml(path),
            None => Ok(Self::default()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_table() {
        let config: ServerConfig = toml::from_str(
            "port = 6000\n[session]\nmax_rooms = 2\n\
             [packet_loss]\nenabled = true\nloss_percent = 0.1",
        )
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.session.max_rooms, 2);
        assert_eq!(config.session.max_players_per_room, 4);
        assert!(config.packet_loss.enabled);
    }

    #[test]
    fn test_zero_tick_rate_is_clamped() {
        let config = ServerConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_secs(1));
    }
}
