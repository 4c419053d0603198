use glam::Vec2;

use crate::net::{GameReset, GameUpdate, Respawn};

pub const MAX_HEALTH: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kinematics {
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    /// Degrees, 0 = east, counterclockwise.
    pub orientation_degrees: f32,
}

impl Kinematics {
    pub fn at(position: Vec2, orientation_degrees: f32) -> Self {
        Self {
            position,
            orientation_degrees,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub kinematics: Kinematics,
    pub health: u8,
    pub score: u8,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            kinematics: Kinematics::default(),
            health: MAX_HEALTH,
            score: 0,
        }
    }
}

impl PlayerState {
    /// Fresh match state: full health, no score.
    pub fn spawned(position: Vec2, orientation_degrees: f32) -> Self {
        Self {
            kinematics: Kinematics::at(position, orientation_degrees),
            ..Default::default()
        }
    }

    pub fn from_update(update: &GameUpdate) -> Self {
        Self {
            kinematics: Kinematics {
                position: Vec2::from_array(update.position),
                velocity: Vec2::from_array(update.velocity),
                acceleration: Vec2::from_array(update.acceleration),
                orientation_degrees: update.orientation_degrees,
            },
            health: update.health,
            score: update.score,
        }
    }

    pub fn to_update(&self) -> GameUpdate {
        GameUpdate {
            position: self.kinematics.position.to_array(),
            velocity: self.kinematics.velocity.to_array(),
            acceleration: self.kinematics.acceleration.to_array(),
            orientation_degrees: self.kinematics.orientation_degrees,
            health: self.health,
            score: self.score,
        }
    }

    pub fn apply_reset(&mut self, reset: &GameReset) {
        *self = Self::spawned(Vec2::from_array(reset.position), reset.orientation_degrees);
    }

    /// Moves to the respawn point with full health; score is kept.
    pub fn apply_respawn(&mut self, respawn: &Respawn) {
        self.kinematics = Kinematics::at(
            Vec2::from_array(respawn.position),
            respawn.orientation_degrees,
        );
        self.health = MAX_HEALTH;
    }

    /// Returns true when this hit took the last point of health.
    pub fn take_damage(&mut self, damage: u8) -> bool {
        let was_alive = self.health > 0;
        self.health = self.health.saturating_sub(damage);
        was_alive && self.health == 0
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_conversion_keeps_fields() {
        let state = PlayerState {
            kinematics: Kinematics {
                position: Vec2::new(1.0, 2.0),
                velocity: Vec2::new(-3.0, 0.5),
                acceleration: Vec2::ZERO,
                orientation_degrees: 270.0,
            },
            health: 1,
            score: 7,
        };
        assert_eq!(PlayerState::from_update(&state.to_update()), state);
    }

    #[test]
    fn test_only_the_lethal_hit_counts() {
        let mut state = PlayerState::default();
        assert!(state.take_damage(5));
        assert!(!state.take_damage(1));
        assert_eq!(state.health, 0);
    }

    #[test]
    fn test_respawn_restores_health_and_keeps_score() {
        let mut state = PlayerState {
            health: 0,
            score: 3,
            ..Default::default()
        };
        state.apply_respawn(&Respawn {
            position: [10.0, 20.0],
            orientation_degrees: 90.0,
        });
        assert_eq!(state.health, MAX_HEALTH);
        assert_eq!(state.score, 3);
        assert_eq!(state.kinematics.position, Vec2::new(10.0, 20.0));
    }
}
