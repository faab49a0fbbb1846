//! Note sequences with a tempo-normalized time axis
//!
//! A `Segment` is either a reference passage from the library or the live
//! performed stream. `normalize` maps absolute time into pulse space so that
//! segments recorded at different tempos can be compared.

use crate::types::note::{Note, NoteSequence, Timestamp};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub notes: NoteSequence,
    /// Length in timestamp units
    pub length: f64,
    /// Timestamp units per pulse
    pub pulse_unit: f64,
    /// Pulses per pulse unit
    pub pulse_rate: f64,
}

impl Segment {
    /// Create an empty segment with the given pulse definition
    pub fn new(pulse_unit: f64, pulse_rate: f64) -> Self {
        Self {
            notes: NoteSequence::new(),
            length: 0.0,
            pulse_unit,
            pulse_rate,
        }
    }

    /// Build a segment from notes; length runs up to the last onset
    pub fn from_notes(notes: impl IntoIterator<Item = Note>, pulse_unit: f64, pulse_rate: f64) -> Self {
        let notes: NoteSequence = notes.into_iter().collect();
        let length = notes.last().map(|n| n.timestamp as f64).unwrap_or(0.0);
        Self {
            notes,
            length,
            pulse_unit,
            pulse_rate,
        }
    }

    /// Set length
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    /// Map a time (or time difference) into pulse space
    #[inline]
    pub fn normalize(&self, t: Timestamp) -> f64 {
        t as f64 / self.pulse_unit * self.pulse_rate
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Append a note
    pub fn push(&mut self, note: Note) {
        self.notes.push(note);
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::new(1000.0, 1.0)
    }
}
