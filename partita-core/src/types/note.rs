//! Timestamped note events
//!
//! A `Note` is one discrete performed or written note; a `NoteSequence`
//! keeps notes in arrival order and is only appended to during capture.

use std::ops::Index;

/// Time unit of note events (device ticks, usually milliseconds)
pub type Timestamp = i64;

/// A single note event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    /// MIDI key number
    pub pitch: i32,
    /// Onset time
    pub timestamp: Timestamp,
    /// Key velocity (0-127)
    pub velocity: i32,
    /// Held length in timestamp units
    pub duration: Timestamp,
}

impl Note {
    /// Create a note with default velocity and no duration
    pub fn new(pitch: i32, timestamp: Timestamp) -> Self {
        Self {
            pitch,
            timestamp,
            velocity: 100,
            duration: 0,
        }
    }

    /// Set velocity
    pub fn with_velocity(mut self, velocity: i32) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set duration
    pub fn with_duration(mut self, duration: Timestamp) -> Self {
        self.duration = duration;
        self
    }

    /// Pitch as a bucket index, if it falls inside `[0, buckets)`
    pub fn pitch_bucket(&self, buckets: usize) -> Option<usize> {
        usize::try_from(self.pitch).ok().filter(|&p| p < buckets)
    }
}

/// Ordered note container; insertion order is arrival order
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteSequence {
    notes: Vec<Note>,
}

impl NoteSequence {
    pub fn new() -> Self {
        Self { notes: Vec::new() }
    }

    /// Append a note (live capture path)
    pub fn push(&mut self, note: Note) {
        self.notes.push(note);
    }

    /// Insert keeping timestamps non-decreasing; equal timestamps keep
    /// arrival order
    pub fn insert_sorted(&mut self, note: Note) {
        let index = self
            .notes
            .partition_point(|n| n.timestamp <= note.timestamp);
        self.notes.insert(index, note);
    }

    /// Remove the note at `index`
    pub fn remove(&mut self, index: usize) -> Note {
        self.notes.remove(index)
    }

    /// Drop every note at or after `len`
    pub fn truncate(&mut self, len: usize) {
        self.notes.truncate(len);
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    pub fn last(&self) -> Option<&Note> {
        self.notes.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Note> {
        self.notes.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Note> {
        self.notes.iter_mut()
    }

    /// All notes as a slice
    pub fn points(&self) -> &[Note] {
        &self.notes
    }
}

impl Index<usize> for NoteSequence {
    type Output = Note;

    fn index(&self, index: usize) -> &Note {
        &self.notes[index]
    }
}

impl FromIterator<Note> for NoteSequence {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        Self {
            notes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a NoteSequence {
    type Item = &'a Note;
    type IntoIter = std::slice::Iter<'a, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}
