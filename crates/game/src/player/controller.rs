use glam::Vec2;

use super::{Kinematics, PlayerConfig};

/// Produces the local player's kinematics from movement input.
pub trait KinematicSource {
    fn advance(&mut self, input: Vec2, dt: f32) -> Kinematics;

    /// Teleports to a server-chosen spawn and clears motion.
    fn place(&mut self, position: Vec2, orientation_degrees: f32);
}

/// Top-down movement with acceleration toward the input direction, clamped
/// to the arena.
#[derive(Debug, Clone)]
pub struct MovementController {
    config: PlayerConfig,
    current: Kinematics,
}

impl Default for MovementController {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

impl MovementController {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            current: Kinematics::default(),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn current(&self) -> &Kinematics {
        &self.current
    }
}

impl KinematicSource for MovementController {
    fn advance(&mut self, input: Vec2, dt: f32) -> Kinematics {
        if dt <= 0.0 {
            return self.current;
        }

        let wish = input.clamp_length_max(1.0) * self.config.move_speed;
        let rate = if wish.length_squared() > 0.0 {
            self.config.accelerate
        } else {
            self.config.decelerate
        };

        let previous = self.current.velocity;
        let delta = wish - previous;
        let velocity = previous + delta.clamp_length_max(rate * dt);

        let target = self.current.position + velocity * dt;
        let position = target.clamp(Vec2::ZERO, self.config.arena());
        // Stop against the walls instead of pushing into them.
        let velocity = Vec2::new(
            if position.x == target.x { velocity.x } else { 0.0 },
            if position.y == target.y { velocity.y } else { 0.0 },
        );

        let orientation_degrees = if input.length_squared() > 0.0 {
            input.y.atan2(input.x).to_degrees().rem_euclid(360.0)
        } else {
            self.current.orientation_degrees
        };

        self.current = Kinematics {
            position,
            velocity,
            acceleration: (velocity - previous) / dt,
            orientation_degrees,
        };
        self.current
    }

    fn place(&mut self, position: Vec2, orientation_degrees: f32) {
        self.current = Kinematics::at(position, orientation_degrees);
    }
}
