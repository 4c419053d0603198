mod client;
mod input;

pub use client::NetworkClient;
pub use input::{Direction, InputState, InputTracker};
