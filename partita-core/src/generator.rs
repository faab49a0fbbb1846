//! Synthetic segments
//!
//! Seeded generation and manipulation of note segments: random passages,
//! timing jitter, wrong and missing notes, tempo scaling and concatenation.
//! Used to build reproducible performances for tests and simulations.

use crate::types::{Note, NoteSequence, Segment, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

pub struct SegmentGenerator {
    rng: StdRng,
}

impl SegmentGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Replace the segment's notes with `note_count` random onsets in
    /// `[0, length)`, sorted by time, pitches drawn from `pitches`
    pub fn create_random_segment(
        &mut self,
        segment: &mut Segment,
        note_count: usize,
        length: Timestamp,
        pitches: Range<i32>,
    ) {
        let mut timestamps: Vec<Timestamp> = (0..note_count)
            .map(|_| self.rng.gen_range(0..length.max(1)))
            .collect();
        timestamps.sort_unstable();

        segment.notes = timestamps
            .into_iter()
            .map(|t| Note::new(self.rng.gen_range(pitches.clone()), t))
            .collect();
        segment.length = length as f64;
    }

    /// Like `create_random_segment`, but onsets sit on distinct grid slots
    /// `unit_length` apart (at most `grid_spaces` notes)
    pub fn create_random_segment_quantized(
        &mut self,
        segment: &mut Segment,
        note_count: usize,
        grid_spaces: usize,
        unit_length: Timestamp,
        pitches: Range<i32>,
    ) {
        let count = note_count.min(grid_spaces);
        let mut slots: Vec<usize> = (0..grid_spaces).collect();
        for i in 0..count {
            let j = self.rng.gen_range(i..grid_spaces);
            slots.swap(i, j);
        }
        slots.truncate(count);
        slots.sort_unstable();

        segment.notes = slots
            .into_iter()
            .map(|slot| {
                Note::new(self.rng.gen_range(pitches.clone()), slot as Timestamp * unit_length)
                    .with_duration(unit_length)
            })
            .collect();
        segment.length = (grid_spaces as Timestamp * unit_length) as f64;
    }

    /// Insert `count` random notes anywhere in the segment
    pub fn add_random_notes(&mut self, segment: &mut Segment, count: usize, pitches: Range<i32>) {
        let end = (segment.length as Timestamp).max(1);
        self.add_random_notes_between(segment, count, pitches, 0, end);
    }

    /// Insert `count` random notes with onsets in `[start, end)`
    pub fn add_random_notes_between(
        &mut self,
        segment: &mut Segment,
        count: usize,
        pitches: Range<i32>,
        start: Timestamp,
        end: Timestamp,
    ) {
        for _ in 0..count {
            let t = self.rng.gen_range(start..end.max(start + 1));
            let pitch = self.rng.gen_range(pitches.clone());
            segment.notes.insert_sorted(Note::new(pitch, t));
        }
    }

    /// Delete up to `count` random notes
    pub fn remove_random_notes(&mut self, segment: &mut Segment, count: usize) {
        for _ in 0..count {
            if segment.notes.is_empty() {
                break;
            }
            let index = self.rng.gen_range(0..segment.notes.len());
            segment.notes.remove(index);
        }
    }

    /// Move each onset by a uniform offset in `[-amplitude, amplitude]`.
    /// Callers keep the amplitude below half the note spacing to preserve
    /// note order.
    pub fn jitter(&mut self, segment: &mut Segment, amplitude: Timestamp) {
        if amplitude <= 0 {
            return;
        }
        for note in segment.notes.iter_mut() {
            note.timestamp += self.rng.gen_range(-amplitude..=amplitude);
        }
    }

    /// Stretch time by `s` (2.0 plays twice as slow)
    pub fn scale(segment: &mut Segment, s: f64) {
        for note in segment.notes.iter_mut() {
            note.timestamp = (note.timestamp as f64 * s).round() as Timestamp;
            note.duration = (note.duration as f64 * s).round() as Timestamp;
        }
        segment.length *= s;
    }

    /// Move every onset by `t`
    pub fn shift(segment: &mut Segment, t: Timestamp) {
        for note in segment.notes.iter_mut() {
            note.timestamp += t;
        }
    }

    pub fn copy(reference: &Segment) -> Segment {
        reference.clone()
    }

    /// Append `segment` after `target`, offset by the target's length
    pub fn append(target: &mut Segment, segment: &Segment) {
        let offset = target.length.round() as Timestamp;
        for note in &segment.notes {
            target.notes.push(Note {
                timestamp: note.timestamp + offset,
                ..*note
            });
        }
        target.length += segment.length;
    }

    /// Concatenate segments into a fresh one using the first's pulse definition
    pub fn concatenate<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> Segment {
        let mut iter = segments.into_iter().peekable();
        let mut target = match iter.peek() {
            Some(first) => Segment::new(first.pulse_unit, first.pulse_rate),
            None => Segment::default(),
        };
        for segment in iter {
            Self::append(&mut target, segment);
        }
        target
    }

    /// Random notes as a bare sequence, spaced `spacing` apart
    pub fn random_melody(&mut self, note_count: usize, spacing: Timestamp, pitches: Range<i32>) -> NoteSequence {
        (0..note_count)
            .map(|i| Note::new(self.rng.gen_range(pitches.clone()), i as Timestamp * spacing))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_segment_is_sorted_and_in_range() {
        let mut generator = SegmentGenerator::new(1);
        let mut segment = Segment::default();
        generator.create_random_segment(&mut segment, 32, 4000, 60..72);

        assert_eq!(segment.len(), 32);
        assert_eq!(segment.length, 4000.0);
        assert!(segment.notes.points().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(segment.notes.iter().all(|n| (60..72).contains(&n.pitch) && n.timestamp < 4000));
    }

    #[test]
    fn test_quantized_segment_uses_distinct_slots() {
        let mut generator = SegmentGenerator::new(2);
        let mut segment = Segment::default();
        generator.create_random_segment_quantized(&mut segment, 6, 8, 250, 40..50);

        assert_eq!(segment.len(), 6);
        assert_eq!(segment.length, 2000.0);
        let stamps: Vec<Timestamp> = segment.notes.iter().map(|n| n.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert!(stamps.iter().all(|t| t % 250 == 0));
    }

    #[test]
    fn test_same_seed_same_segment() {
        let mut a = Segment::default();
        let mut b = Segment::default();
        SegmentGenerator::new(9).create_random_segment(&mut a, 10, 1000, 0..127);
        SegmentGenerator::new(9).create_random_segment(&mut b, 10, 1000, 0..127);
        assert_eq!(a, b);
    }

    #[test]
    fn test_append_offsets_by_length() {
        let first = Segment::from_notes(vec![Note::new(60, 0), Note::new(62, 500)], 1000.0, 1.0)
            .with_length(1000.0);
        let second = Segment::from_notes(vec![Note::new(64, 0)], 1000.0, 1.0).with_length(1000.0);

        let joined = SegmentGenerator::concatenate([&first, &second]);
        let stamps: Vec<Timestamp> = joined.notes.iter().map(|n| n.timestamp).collect();
        assert_eq!(stamps, vec![0, 500, 1000]);
        assert_eq!(joined.length, 2000.0);
    }

    #[test]
    fn test_scale_shift_and_jitter() {
        let mut segment = Segment::from_notes(
            vec![Note::new(60, 0), Note::new(62, 1000)],
            1000.0,
            1.0,
        )
        .with_length(2000.0);

        SegmentGenerator::scale(&mut segment, 1.5);
        SegmentGenerator::shift(&mut segment, 100);
        assert_eq!(segment.notes[0].timestamp, 100);
        assert_eq!(segment.notes[1].timestamp, 1600);
        assert_eq!(segment.length, 3000.0);

        let mut generator = SegmentGenerator::new(5);
        let before = segment.clone();
        generator.jitter(&mut segment, 20);
        for (a, b) in before.notes.iter().zip(segment.notes.iter()) {
            assert!((a.timestamp - b.timestamp).abs() <= 20);
        }
    }

    #[test]
    fn test_add_and_remove_notes() {
        let mut generator = SegmentGenerator::new(4);
        let mut segment = Segment::default();
        generator.create_random_segment_quantized(&mut segment, 8, 8, 100, 60..61);

        generator.add_random_notes(&mut segment, 3, 90..91);
        assert_eq!(segment.len(), 11);
        assert!(segment.notes.points().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        generator.remove_random_notes(&mut segment, 20);
        assert!(segment.is_empty());
    }
}
