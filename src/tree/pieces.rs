// src/tree/pieces.rs

use partita_core::{BarId, Segment, Timestamp, Transform};

/// One recognized bar inside a piece
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedBar {
    pub bar: BarId,
    pub transform: Transform,
    /// First and last performed note claimed by the match
    pub start_index: usize,
    pub end_index: usize,
    pub start_timestamp: Timestamp,
    pub end_timestamp: Timestamp,
    pub mapped_notes: usize,
    pub average_error: f64,
}

/// A chain of matched bars, root first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedPiece {
    pub bars: Vec<MatchedBar>,
}

impl MatchedPiece {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_index(&self) -> Option<usize> {
        self.bars.first().map(|bar| bar.start_index)
    }

    /// Performance time covered by the piece
    pub fn time_span(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.bars.first()?;
        let last = self.bars.last()?;
        Some((first.start_timestamp, last.end_timestamp))
    }

    /// Bar sequence of the piece
    pub fn bar_ids(&self) -> Vec<BarId> {
        self.bars.iter().map(|bar| bar.bar).collect()
    }

    /// Tempo of the most recent bar relative to its reference (1.0 = as
    /// written, 2.0 = twice as fast)
    pub fn current_tempo(&self) -> Option<f64> {
        self.bars.last().map(|bar| bar.transform.s)
    }
}

/// Timestamp of a performed note, if the segment still holds it
pub(crate) fn note_time(segment: Option<&Segment>, index: usize) -> Timestamp {
    segment
        .and_then(|segment| segment.notes.get(index))
        .map(|note| note.timestamp)
        .unwrap_or(0)
}
