//! Random test patterns
//!
//! A test pattern is a random subset of reference note indices scored
//! by the pattern evaluator. Sampling is seeded so every solver
//! attempt is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct TestPatternGenerator {
    rng: StdRng,
}

impl TestPatternGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restart the random sequence
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Fill `buffer` with `min(requested_size, note_count)` distinct indices
    /// from `[0, note_count)`, sorted ascending, and return that length.
    ///
    /// Uses a partial Fisher-Yates shuffle over the reused buffer.
    pub fn find_random_test_pattern(
        &mut self,
        note_count: usize,
        requested_size: usize,
        buffer: &mut Vec<usize>,
    ) -> usize {
        let pattern_length = requested_size.min(note_count);

        buffer.clear();
        buffer.extend(0..note_count);

        if pattern_length < note_count {
            for i in 0..pattern_length {
                let j = self.rng.gen_range(i..note_count);
                buffer.swap(i, j);
            }
            buffer.truncate(pattern_length);
            buffer.sort_unstable();
        }

        pattern_length
    }
}
