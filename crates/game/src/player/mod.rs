mod config;
mod controller;
mod spawn;
mod state;

pub use config::PlayerConfig;
pub use controller::{KinematicSource, MovementController};
pub use spawn::SpawnGenerator;
pub use state::{Kinematics, MAX_HEALTH, PlayerState};
