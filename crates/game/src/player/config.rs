use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub move_speed: f32,
    pub accelerate: f32,
    pub decelerate: f32,
    pub arena_width: f32,
    pub arena_height: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            move_speed: 30.0,
            accelerate: 120.0,
            decelerate: 90.0,
            arena_width: 500.0,
            arena_height: 500.0,
        }
    }
}

impl PlayerConfig {
    pub fn arena(&self) -> Vec2 {
        Vec2::new(self.arena_width, self.arena_height)
    }
}
