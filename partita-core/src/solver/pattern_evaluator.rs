//! Coarse alignment of a test pattern inside a performance window
//!
//! Brute force over placements anchored on same-pitch performance notes.
//! Each placement pairs two pattern notes `a`, `b` with two performed notes
//! of the same pitches, which fixes scale and offset. The placement that
//! brings the most pattern notes close to a same-pitch performed note wins.

use crate::solver::buckets::PitchBuckets;
use crate::solver::correlation;
use crate::types::{Segment, Transform};

/// Patterns spanning less than this (reference pulses) use single anchors
const SPAN_EPSILON: f64 = 1e-9;

/// Anchor pairs must cover at least this fraction of the pattern span
const MIN_ANCHOR_SPAN: f64 = 0.5;

pub struct EvaluationRequest<'a> {
    /// Performed notes
    pub segment: &'a Segment,
    /// Reference passage the pattern was drawn from
    pub reference: &'a Segment,
    /// Reference note indices to test with
    pub pattern: &'a [usize],
    /// Performed notes of the window, bucketed by pitch
    pub notes_by_pitch: &'a PitchBuckets,
    pub alignment_tolerance: f64,
    /// Minimum score as a fraction of the pattern length
    pub min_pattern_score: f64,
    pub max_tempo_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseAlignment {
    pub transform: Transform,
    /// Summed per-note correlation, at most the pattern length
    pub score: f64,
}

/// Best placement of the pattern, or `None` when nothing reaches the
/// minimum score
pub fn evaluate(request: &EvaluationRequest<'_>) -> Option<CoarseAlignment> {
    let reference = request.reference;
    let segment = request.segment;
    let pattern = request.pattern;
    if pattern.is_empty() {
        return None;
    }

    let position = |index: usize| reference.normalize(reference.notes[index].timestamp);

    let (min_r, max_r) = pattern
        .iter()
        .map(|&i| position(i))
        .fold((f64::MAX, f64::MIN), |(lo, hi), r| (lo.min(r), hi.max(r)));
    let span = max_r - min_r;

    let mut best: Option<CoarseAlignment> = None;
    let mut consider = |transform: Transform| {
        let score = score_placement(request, &transform);
        if score > best.map_or(0.0, |b| b.score) {
            best = Some(CoarseAlignment { transform, score });
        }
    };

    if span < SPAN_EPSILON {
        // Every pattern note sounds at once: only the offset is observable
        for &a in pattern {
            let ra = position(a);
            for &i in request.notes_by_pitch.get(reference.notes[a].pitch) {
                consider(Transform::new(1.0, ra, segment.notes[i].timestamp));
            }
        }
    } else {
        let min_scale = 1.0 / request.max_tempo_ratio;
        let max_scale = request.max_tempo_ratio;

        for &a in pattern {
            let ra = position(a);
            let candidates_a = request.notes_by_pitch.get(reference.notes[a].pitch);
            if candidates_a.is_empty() {
                continue;
            }

            for &b in pattern {
                let dr = position(b) - ra;
                if dr < MIN_ANCHOR_SPAN * span || dr < SPAN_EPSILON {
                    continue;
                }

                let candidates_b = request.notes_by_pitch.get(reference.notes[b].pitch);
                for &i in candidates_a {
                    let ts_i = segment.notes[i].timestamp;
                    for &j in candidates_b {
                        let ts_j = segment.notes[j].timestamp;
                        if ts_j <= ts_i {
                            continue;
                        }

                        let dp = segment.normalize(ts_j - ts_i);
                        let s = dr / dp;
                        if !(min_scale..=max_scale).contains(&s) {
                            continue;
                        }

                        consider(Transform::new(s, ra, ts_i));
                    }
                }
            }
        }
    }

    let threshold = request.min_pattern_score * pattern.len() as f64;
    best.filter(|b| b.score >= threshold)
}

/// Sum over pattern notes of the best same-pitch correlation
fn score_placement(request: &EvaluationRequest<'_>, transform: &Transform) -> f64 {
    let reference = request.reference;
    let segment = request.segment;

    request
        .pattern
        .iter()
        .map(|&k| {
            let note = &reference.notes[k];
            let r = reference.normalize(note.timestamp);
            request
                .notes_by_pitch
                .get(note.pitch)
                .iter()
                .map(|&j| {
                    let mapped = transform.to_reference(segment, segment.notes[j].timestamp);
                    correlation(mapped - r, request.alignment_tolerance)
                })
                .fold(0.0, f64::max)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Note;

    fn segment(notes: &[(i32, i64)]) -> Segment {
        Segment::from_notes(notes.iter().map(|&(p, t)| Note::new(p, t)), 1000.0, 1.0)
    }

    fn run(reference: &Segment, performance: &Segment, pattern: &[usize]) -> Option<CoarseAlignment> {
        let mut buckets = PitchBuckets::new(128, 16);
        buckets.sort_by_pitch(performance, 0, performance.len() - 1);
        evaluate(&EvaluationRequest {
            segment: performance,
            reference,
            pattern,
            notes_by_pitch: &buckets,
            alignment_tolerance: 0.25,
            min_pattern_score: 0.5,
            max_tempo_ratio: 2.0,
        })
    }

    #[test]
    fn test_finds_shifted_copy() {
        let reference = segment(&[(60, 0), (64, 500), (67, 1000), (72, 1500)]);
        let performance = segment(&[(50, 0), (60, 3000), (64, 3500), (67, 4000), (72, 4500)]);

        let alignment = run(&reference, &performance, &[0, 1, 2, 3]).unwrap();
        assert!((alignment.score - 4.0).abs() < 1e-9);
        assert!((alignment.transform.s - 1.0).abs() < 1e-9);
        assert_eq!(alignment.transform.t_coarse, 3000);
        assert!((alignment.transform.to_reference(&performance, 4500) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_finds_slower_performance() {
        let reference = segment(&[(60, 0), (62, 1000), (64, 2000), (65, 3000)]);
        // Played at half speed
        let performance = segment(&[(60, 0), (62, 2000), (64, 4000), (65, 6000)]);

        let alignment = run(&reference, &performance, &[0, 1, 2, 3]).unwrap();
        assert!((alignment.transform.s - 0.5).abs() < 1e-9);
        assert!((alignment.score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_tempo_outside_ratio() {
        let reference = segment(&[(60, 0), (62, 1000), (64, 2000)]);
        let performance = segment(&[(60, 0), (62, 5000), (64, 10000)]);
        assert!(run(&reference, &performance, &[0, 1, 2]).is_none());
    }

    #[test]
    fn test_rejects_unrelated_pitches() {
        let reference = segment(&[(60, 0), (62, 500), (64, 1000)]);
        let performance = segment(&[(70, 0), (71, 500), (72, 1000)]);
        assert!(run(&reference, &performance, &[0, 1, 2]).is_none());
    }

    #[test]
    fn test_single_chord_uses_offset_only() {
        let reference = segment(&[(60, 0), (64, 0), (67, 0)]);
        let performance = segment(&[(48, 0), (60, 2000), (64, 2000), (67, 2000)]);

        let alignment = run(&reference, &performance, &[0, 1, 2]).unwrap();
        assert_eq!(alignment.transform.t_coarse, 2000);
        assert_eq!(alignment.transform.s, 1.0);
        assert!((alignment.score - 3.0).abs() < 1e-9);
    }
}
