// partita-core/src/solver/mod.rs

pub mod buckets;
pub mod comparator;
pub mod full_solver;
pub mod note_mapper;
pub mod pattern_evaluator;
pub mod pattern_generator;
pub mod refiner;

pub use buckets::PitchBuckets;
pub use comparator::Fit;
pub use full_solver::{SolveRequest, Solution, Solver};
pub use pattern_generator::TestPatternGenerator;

/// Similarity of two positions `error` apart: 1 when equal, falling
/// linearly to 0 at `tolerance`
#[inline]
pub fn correlation(error: f64, tolerance: f64) -> f64 {
    (1.0 - error.abs() / tolerance).max(0.0)
}
