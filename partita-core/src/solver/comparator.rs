//! Fit scoring
//!
//! Re-checks every mapped pair under the refined transform. Only pairs that
//! land within the fit tolerance count; this count and their mean error are
//! what decisions are ranked by.

use crate::types::{Segment, Transform};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fit {
    pub mapped_notes: usize,
    /// Mean absolute error in reference pulses over the counted notes
    pub average_error: f64,
}

pub struct ComparisonRequest<'a> {
    /// Reference note index to performed note index
    pub mapping: &'a [Option<usize>],
    pub reference: &'a Segment,
    pub segment: &'a Segment,
    pub transform: Transform,
    pub fit_tolerance: f64,
}

/// Score the mapping; indices of the counted performed notes go to `target`
pub fn calculate_error(request: &ComparisonRequest<'_>, target: &mut BTreeSet<usize>) -> Fit {
    let reference = request.reference;
    let segment = request.segment;

    let mut mapped_notes = 0;
    let mut total_error = 0.0;

    for (i, mapped) in request.mapping.iter().enumerate() {
        let Some(j) = *mapped else { continue };

        let r = reference.normalize(reference.notes[i].timestamp);
        let error = (request
            .transform
            .to_reference(segment, segment.notes[j].timestamp)
            - r)
            .abs();

        if error <= request.fit_tolerance {
            mapped_notes += 1;
            total_error += error;
            target.insert(j);
        }
    }

    Fit {
        mapped_notes,
        average_error: if mapped_notes > 0 {
            total_error / mapped_notes as f64
        } else {
            0.0
        },
    }
}
