//! Fruit placement

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::error::GameError;
use super::grid::{Bounds, Coordinate};

/// Random draws before falling back to scanning the free cells
pub const SPAWN_ATTEMPTS: usize = 64;

/// Picks free cells for fruit, reproducibly per seed
#[derive(Debug, Clone)]
pub struct FruitSpawner {
    rng: ChaCha8Rng,
}

impl FruitSpawner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniformly random cell within `bounds` for which `occupied` is false
    pub fn spawn<F>(&mut self, bounds: Bounds, occupied: F) -> Result<Coordinate, GameError>
    where
        F: Fn(Coordinate) -> bool,
    {
        let saturated = GameError::BoardSaturated {
            width: bounds.width,
            height: bounds.height,
        };
        if bounds.cell_count() == 0 {
            return Err(saturated);
        }

        for _ in 0..SPAWN_ATTEMPTS {
            let c = Coordinate::new(
                self.rng.gen_range(0..bounds.width),
                self.rng.gen_range(0..bounds.height),
            );
            if !occupied(c) {
                return Ok(c);
            }
        }

        // Crowded board: pick among what is actually left
        let free: Vec<Coordinate> = bounds.cells().filter(|c| !occupied(*c)).collect();
        if free.is_empty() {
            return Err(saturated);
        }
        Ok(free[self.rng.gen_range(0..free.len())])
    }
}
