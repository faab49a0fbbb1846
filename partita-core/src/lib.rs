//! # Partita Core
//!
//! Deterministic, single-threaded building blocks of the Partita score
//! follower. Provides the note/segment model, the passage library with its
//! transition graph, and every stage of the alignment solver, without any
//! threading or I/O.
//!
//! ## Features
//!
//! - **serde**: Derive `Serialize`/`Deserialize` for the model and config types
//!
//! ## Example
//!
//! ```ignore
//! use partita_core::{Library, MatcherConfig, Segment, Solver, SolveRequest};
//!
//! let mut solver = Solver::new(MatcherConfig::default());
//! let solution = solver.solve(&SolveRequest {
//!     reference: &reference,
//!     segment: &performance,
//!     start_index: 0,
//!     end_index: performance.len() - 1,
//!     seed: 0,
//! });
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod solver;
pub mod types;

// Re-export commonly used types
pub use config::MatcherConfig;
pub use error::{ConfigError, LibraryError};
pub use generator::SegmentGenerator;
pub use solver::{Fit, SolveRequest, Solution, Solver};
pub use types::{Bar, BarId, Library, Note, NoteSequence, Segment, SegmentId, Timestamp, Transform};
