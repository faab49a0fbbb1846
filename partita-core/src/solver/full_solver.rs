//! End-to-end match of one performance window against one reference bar
//!
//! Pipeline: bucket the window by pitch, draw a random test pattern, find
//! the best coarse placement, map notes injectively, refine the transform
//! and score the result. Any stage failing means "no match".

use crate::config::MatcherConfig;
use crate::solver::buckets::PitchBuckets;
use crate::solver::comparator::{self, ComparisonRequest, Fit};
use crate::solver::note_mapper::{MappingRequest, NoteMapper};
use crate::solver::pattern_evaluator::{self, EvaluationRequest};
use crate::solver::pattern_generator::TestPatternGenerator;
use crate::solver::refiner::{self, Problem};
use crate::types::{Segment, Transform};
use std::collections::BTreeSet;
use tracing::trace;

/// Initial capacity of the per-solver scratch buffers
const NOTE_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct SolveRequest<'a> {
    pub reference: &'a Segment,
    pub segment: &'a Segment,
    /// First performed note of the window
    pub start_index: usize,
    /// Last performed note of the window (inclusive, clamped to the segment)
    pub end_index: usize,
    /// Seed for this attempt's test pattern
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub fit: Fit,
    /// Performed notes counted by the fit
    pub notes: BTreeSet<usize>,
    pub transform: Transform,
    pub singular: bool,
}

/// Matching workspace; owns every scratch buffer so repeated solves do not
/// allocate. One per worker, never shared.
pub struct Solver {
    config: MatcherConfig,
    generator: TestPatternGenerator,
    pattern: Vec<usize>,
    notes_by_pitch: PitchBuckets,
    mapper: NoteMapper,
    r: Vec<f64>,
    p: Vec<f64>,
}

impl Solver {
    pub fn new(config: MatcherConfig) -> Self {
        let generator = TestPatternGenerator::new(config.seed);
        let notes_by_pitch = PitchBuckets::new(config.max_pitches, 8);

        Self {
            config,
            generator,
            pattern: Vec::with_capacity(NOTE_BUFFER_SIZE),
            notes_by_pitch,
            mapper: NoteMapper::new(NOTE_BUFFER_SIZE),
            r: Vec::with_capacity(NOTE_BUFFER_SIZE),
            p: Vec::with_capacity(NOTE_BUFFER_SIZE),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn solve(&mut self, request: &SolveRequest<'_>) -> Option<Solution> {
        let reference = request.reference;
        let segment = request.segment;
        let n = reference.len();

        if n == 0 || request.start_index >= segment.len() || request.start_index > request.end_index {
            return None;
        }
        let start = request.start_index;
        let end = request.end_index.min(segment.len() - 1);

        self.notes_by_pitch.sort_by_pitch(segment, start, end);

        self.generator.seed(request.seed);
        let pattern_length =
            self.generator
                .find_random_test_pattern(n, self.config.pattern_length, &mut self.pattern);

        let Some(coarse) = pattern_evaluator::evaluate(&EvaluationRequest {
            segment,
            reference,
            pattern: &self.pattern[..pattern_length],
            notes_by_pitch: &self.notes_by_pitch,
            alignment_tolerance: self.config.alignment_tolerance,
            min_pattern_score: self.config.min_pattern_score,
            max_tempo_ratio: self.config.max_tempo_ratio,
        }) else {
            trace!(start, end, "no coarse alignment");
            return None;
        };

        let mapping = self.mapper.injective_mapping(&MappingRequest {
            reference,
            segment,
            start,
            end,
            transform: &coarse.transform,
            notes_by_pitch: &self.notes_by_pitch,
            correlation_threshold: self.config.correlation_threshold,
            alignment_tolerance: self.config.alignment_tolerance,
        });

        self.r.clear();
        self.p.clear();
        for (i, mapped) in mapping.iter().enumerate() {
            if let Some(j) = *mapped {
                self.r.push(reference.normalize(reference.notes[i].timestamp));
                self.p
                    .push(segment.normalize(coarse.transform.local(segment.notes[j].timestamp)));
            }
        }

        let Some(refined) = refiner::refine(
            &Problem {
                r: &self.r,
                p: &self.p,
                initial_s: coarse.transform.s,
                initial_t: coarse.transform.t,
            },
            self.config.refine_iterations,
        ) else {
            trace!(start, end, pairs = self.r.len(), "refinement not solvable");
            return None;
        };

        let transform = Transform::new(refined.s, refined.t, coarse.transform.t_coarse);
        let mut notes = BTreeSet::new();
        let fit = comparator::calculate_error(
            &ComparisonRequest {
                mapping,
                reference,
                segment,
                transform,
                fit_tolerance: self.config.fit_tolerance,
            },
            &mut notes,
        );

        if !accepts(&fit, n, self.config.missing_note_threshold) {
            trace!(start, end, mapped = fit.mapped_notes, n, "too many missed notes");
            return None;
        }

        Some(Solution {
            fit,
            notes,
            transform,
            singular: refined.singular,
        })
    }
}

/// Acceptance rule on the fraction of reference notes left unmatched.
/// A threshold of exactly 1.0 accepts any non-empty match.
pub fn accepts(fit: &Fit, note_count: usize, missing_note_threshold: f64) -> bool {
    if fit.mapped_notes == 0 || note_count == 0 {
        return false;
    }

    let missed = note_count.saturating_sub(fit.mapped_notes);
    let missed_ratio = missed as f64 / note_count as f64;
    missed_ratio <= missing_note_threshold || missing_note_threshold == 1.0
}
