use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks spawn points and objective positions inside the arena.
#[derive(Debug)]
pub struct SpawnGenerator {
    rng: StdRng,
    arena: Vec2,
}

impl SpawnGenerator {
    pub fn new(arena: Vec2) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            arena,
        }
    }

    pub fn with_seed(arena: Vec2, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            arena,
        }
    }

    pub fn spawn_point(&mut self) -> Vec2 {
        self.point()
    }

    pub fn objective(&mut self) -> Vec2 {
        self.point()
    }

    fn point(&mut self) -> Vec2 {
        Vec2::new(
            self.rng.gen_range(0.0..self.arena.x.max(1.0)),
            self.rng.gen_range(0.0..self.arena.y.max(1.0)),
        )
    }
}
