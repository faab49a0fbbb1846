//! Injective note mapping
//!
//! Turns a coarse transform into a one-to-one correspondence between
//! reference notes and performed notes. Candidate pairs share a pitch and
//! exceed the correlation threshold; they are taken greedily from the best
//! correlation down, so no performed note is claimed twice.

use crate::solver::buckets::PitchBuckets;
use crate::solver::correlation;
use crate::types::{Segment, Transform};
use std::cmp::Ordering;

pub struct MappingRequest<'a> {
    pub reference: &'a Segment,
    pub segment: &'a Segment,
    /// First performed note of the window
    pub start: usize,
    /// Last performed note of the window (inclusive)
    pub end: usize,
    pub transform: &'a Transform,
    pub notes_by_pitch: &'a PitchBuckets,
    pub correlation_threshold: f64,
    pub alignment_tolerance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    correlation: f64,
    reference: usize,
    performance: usize,
}

/// Scratch space for building mappings without per-call allocation
pub struct NoteMapper {
    candidates: Vec<Candidate>,
    performance_used: Vec<bool>,
    mapping: Vec<Option<usize>>,
}

impl NoteMapper {
    pub fn new(capacity: usize) -> Self {
        Self {
            candidates: Vec::with_capacity(capacity),
            performance_used: Vec::with_capacity(capacity),
            mapping: Vec::with_capacity(capacity),
        }
    }

    /// Mapping indexed by reference note; `None` marks an unmapped note
    pub fn injective_mapping(&mut self, request: &MappingRequest<'_>) -> &[Option<usize>] {
        let reference = request.reference;
        let segment = request.segment;

        self.mapping.clear();
        self.mapping.resize(reference.len(), None);
        self.candidates.clear();
        self.performance_used.clear();

        if request.end < request.start {
            return &self.mapping;
        }
        self.performance_used.resize(request.end - request.start + 1, false);

        for (i, note) in reference.notes.iter().enumerate() {
            let r = reference.normalize(note.timestamp);
            for &j in request.notes_by_pitch.get(note.pitch) {
                let mapped = request
                    .transform
                    .to_reference(segment, segment.notes[j].timestamp);
                let c = correlation(mapped - r, request.alignment_tolerance);
                if c > request.correlation_threshold {
                    self.candidates.push(Candidate {
                        correlation: c,
                        reference: i,
                        performance: j,
                    });
                }
            }
        }

        self.candidates.sort_by(|a, b| {
            b.correlation
                .partial_cmp(&a.correlation)
                .unwrap_or(Ordering::Equal)
                .then(a.reference.cmp(&b.reference))
                .then(a.performance.cmp(&b.performance))
        });

        for candidate in &self.candidates {
            let slot = candidate.performance - request.start;
            if self.mapping[candidate.reference].is_none() && !self.performance_used[slot] {
                self.mapping[candidate.reference] = Some(candidate.performance);
                self.performance_used[slot] = true;
            }
        }

        &self.mapping
    }
}
