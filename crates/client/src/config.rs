use std::path::Path;

use serde::{Deserialize, Serialize};

use arena::{ClientSettings, ConfigError, DEFAULT_PORT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: String,
    pub tick_rate: u32,
    pub session: ClientSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
            tick_rate: 60,
            session: ClientSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => arena::load_toml(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let text = "server = \"10.0.0.2:6000\"\n[session.movement]\nmove_speed = 45.0";
        let config: ClientConfig = toml::from_str(text).unwrap();
        assert_eq!(config.server, "10.0.0.2:6000");
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.session.movement.move_speed, 45.0);
    }
}
