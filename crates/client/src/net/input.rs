use std::time::{Duration, Instant};

use glam::Vec2;

/// Terminals report key presses and repeats but no releases, so a direction
/// counts as held for this long after its last press.
const HOLD_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    fn index(self) -> usize {
        self as usize
    }

    /// Arena y grows upward.
    fn vector(self) -> Vec2 {
        match self {
            Direction::Up => Vec2::Y,
            Direction::Down => Vec2::NEG_Y,
            Direction::Left => Vec2::NEG_X,
            Direction::Right => Vec2::X,
        }
    }

    fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub move_direction: Vec2,
    pub fire: bool,
}

#[derive(Debug, Default)]
pub struct InputTracker {
    pressed: [Option<Instant>; 4],
    fire: bool,
}

impl InputTracker {
    pub fn press(&mut self, direction: Direction, now: Instant) {
        self.pressed[direction.index()] = Some(now);
        self.pressed[direction.opposite().index()] = None;
    }

    pub fn fire(&mut self) {
        self.fire = true;
    }

    pub fn release_all(&mut self) {
        self.pressed = [None; 4];
        self.fire = false;
    }

    /// Input for this frame. The fire request is consumed.
    pub fn sample(&mut self, now: Instant) -> InputState {
        let move_direction = Direction::ALL
            .iter()
            .filter(|d| {
                self.pressed[d.index()].is_some_and(|at| now.duration_since(at) < HOLD_WINDOW)
            })
            .map(|d| d.vector())
            .sum::<Vec2>()
            .normalize_or_zero();

        InputState {
            move_direction,
            fire: std::mem::take(&mut self.fire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_held_keys_combine() {
        let now = Instant::now();
        let mut tracker = InputTracker::default();
        tracker.press(Direction::Up, now);
        tracker.press(Direction::Right, now);

        let input = tracker.sample(now + Duration::from_millis(10));
        assert!((input.move_direction - Vec2::new(1.0, 1.0).normalize()).length() < 1e-5);
    }

    #[test]
    fn test_keys_expire() {
        let now = Instant::now();
        let mut tracker = InputTracker::default();
        tracker.press(Direction::Left, now);

        assert_eq!(tracker.sample(now + HOLD_WINDOW).move_direction, Vec2::ZERO);
    }

    #[test]
    fn test_opposite_key_cancels() {
        let now = Instant::now();
        let mut tracker = InputTracker::default();
        tracker.press(Direction::Left, now);
        tracker.press(Direction::Right, now);

        assert_eq!(tracker.sample(now).move_direction, Vec2::X);
    }

    #[test]
    fn test_fire_is_consumed() {
        let now = Instant::now();
        let mut tracker = InputTracker::default();
        tracker.fire();

        assert!(tracker.sample(now).fire);
        assert!(!tracker.sample(now).fire);
    }
}
