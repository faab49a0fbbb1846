//! Performance notes grouped by pitch

use crate::types::Segment;

/// Reusable per-pitch index lists over a window of performed notes
pub struct PitchBuckets {
    buckets: Vec<Vec<usize>>,
}

impl PitchBuckets {
    pub fn new(max_pitches: usize, capacity: usize) -> Self {
        Self {
            buckets: (0..max_pitches).map(|_| Vec::with_capacity(capacity)).collect(),
        }
    }

    /// Refill with the indices of `segment` notes in `[start, end]`, in
    /// index order. Out-of-range pitches are skipped.
    pub fn sort_by_pitch(&mut self, segment: &Segment, start: usize, end: usize) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }

        let points = segment.notes.points();
        if start >= points.len() || start > end {
            return;
        }
        let end = end.min(points.len() - 1);

        for (index, note) in points.iter().enumerate().take(end + 1).skip(start) {
            if let Some(pitch) = note.pitch_bucket(self.buckets.len()) {
                self.buckets[pitch].push(index);
            }
        }
    }

    /// Indices of notes with the given pitch
    pub fn get(&self, pitch: i32) -> &[usize] {
        usize::try_from(pitch)
            .ok()
            .and_then(|p| self.buckets.get(p))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Note;

    #[test]
    fn test_sort_by_pitch_window() {
        let segment = Segment::from_notes(
            vec![
                Note::new(60, 0),
                Note::new(62, 100),
                Note::new(60, 200),
                Note::new(300, 300),
                Note::new(60, 400),
            ],
            1000.0,
            1.0,
        );
        let mut buckets = PitchBuckets::new(128, 4);

        buckets.sort_by_pitch(&segment, 1, 3);
        assert_eq!(buckets.get(60), &[2]);
        assert_eq!(buckets.get(62), &[1]);
        assert!(buckets.get(300).is_empty());
        assert!(buckets.get(-4).is_empty());

        // Refilling clears the previous window
        buckets.sort_by_pitch(&segment, 0, 10);
        assert_eq!(buckets.get(60), &[0, 2, 4]);

        buckets.sort_by_pitch(&segment, 7, 9);
        assert!(buckets.get(60).is_empty());
    }
}
