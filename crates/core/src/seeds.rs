//! Seed generation for rendered prompts.

use rand::Rng;

/// Smallest seed handed to a worker.
pub const MIN_SEED: i64 = 1;

/// Largest seed handed to a worker (positive 31-bit range).
pub const MAX_SEED: i64 = (1 << 31) - 1;

/// Generate `count` seeds in `MIN_SEED..=MAX_SEED` from the thread RNG.
pub fn generate_seeds(count: usize) -> Vec<i64> {
    generate_seeds_with(&mut rand::rng(), count)
}

/// Generate `count` seeds from the given RNG.
pub fn generate_seeds_with<R: Rng>(rng: &mut R, count: usize) -> Vec<i64> {
    (0..count)
        .map(|_| rng.random_range(MIN_SEED..=MAX_SEED))
        .collect()
}
