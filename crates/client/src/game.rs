use arena::net::PlayerId;
use arena::{PlayerState, RemotePlayer};

pub const FIRE_RANGE: f32 = 150.0;
/// Half-angle of the aim cone.
pub const FIRE_CONE_DEGREES: f32 = 15.0;
pub const SHOT_DAMAGE: u8 = 1;

/// Every living opponent inside the shooter's aim cone, nearest first.
/// Shots pass through players.
pub fn find_targets(shooter: &PlayerState, remotes: &[RemotePlayer]) -> Vec<PlayerId> {
    let origin = shooter.kinematics.position;
    let aim = shooter.kinematics.orientation_degrees;

    let mut targets: Vec<(PlayerId, f32)> = remotes
        .iter()
        .filter(|r| r.state.is_alive())
        .filter_map(|r| {
            let offset = r.state.kinematics.position - origin;
            let distance = offset.length();
            if distance > FIRE_RANGE {
                return None;
            }
            if distance > f32::EPSILON {
                let bearing = offset.y.atan2(offset.x).to_degrees();
                let off_axis = (bearing - aim + 180.0).rem_euclid(360.0) - 180.0;
                if off_axis.abs() > FIRE_CONE_DEGREES {
                    return None;
                }
            }
            Some((r.player, distance))
        })
        .collect();
    targets.sort_by(|a, b| a.1.total_cmp(&b.1));
    targets.into_iter().map(|(player, _)| player).collect()
}
