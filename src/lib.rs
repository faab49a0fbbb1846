//! # Partita
//!
//! Partita follows a live performance against a library of reference
//! passages. Performed notes are matched bar by bar with the solver from
//! `partita-core`; matches are merged into a set of decisions and linked
//! into chains that describe which passages were played, in which order
//! and at which tempo.
//!
//! ## Modules
//!
//! - `tree`: The chain builder, its worker pool and piece reconstruction.
//! - `follower`: A background thread that feeds live notes to the chain
//!   builder and publishes the recognized pieces.
//! - `error`: Engine error type.

pub mod error;
pub mod follower;
pub mod tree;

// Re-export commonly used types
pub use crate::error::EngineError;
pub use crate::follower::{LiveFollower, Snapshot};
pub use crate::tree::{
    ChainBuilder, Decision, MatchedBar, MatchedPiece, ProcessSummary, SharedSegment, WorkerState,
};
pub use partita_core;
