// partita-core/src/types/mod.rs

pub mod library;
pub mod note;
pub mod segment;
pub mod transform;

pub use library::{Bar, BarId, Library, SegmentId};
pub use note::{Note, NoteSequence, Timestamp};
pub use segment::Segment;
pub use transform::Transform;
