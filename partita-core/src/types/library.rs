//! Reference passage library
//!
//! The library owns every reference segment and every bar. Bars are linked
//! by directed `next`/`prev` edges describing which passage may follow
//! which; the chain builder only threads matches along these edges.
//! Ids are arena indices and stay valid for the lifetime of the library.

use crate::error::LibraryError;
use crate::types::segment::Segment;
use std::collections::VecDeque;
use std::fmt;

/// Index of a bar in its library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarId(pub usize);

/// Index of a reference segment in its library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentId(pub usize);

impl fmt::Display for BarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bar#{}", self.0)
    }
}

/// One reference passage and its legal transitions
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bar {
    id: BarId,
    segment: SegmentId,
    label: Option<String>,
    next: Vec<BarId>,
    prev: Vec<BarId>,
}

impl Bar {
    pub fn id(&self) -> BarId {
        self.id
    }

    pub fn segment_id(&self) -> SegmentId {
        self.segment
    }

    /// Piece name, if the importer provided one
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn next(&self) -> &[BarId] {
        &self.next
    }

    pub fn prev(&self) -> &[BarId] {
        &self.prev
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Library {
    segments: Vec<Segment>,
    bars: Vec<Bar>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a reference segment
    pub fn add_segment(&mut self, segment: Segment) -> SegmentId {
        self.segments.push(segment);
        SegmentId(self.segments.len() - 1)
    }

    /// Create a bar over an existing segment
    pub fn add_bar(&mut self, segment: SegmentId) -> Result<BarId, LibraryError> {
        self.add_labeled_bar(segment, None)
    }

    /// Create a bar carrying a piece name
    pub fn add_labeled_bar(
        &mut self,
        segment: SegmentId,
        label: Option<String>,
    ) -> Result<BarId, LibraryError> {
        if segment.0 >= self.segments.len() {
            return Err(LibraryError::UnknownSegment(segment.0));
        }

        let id = BarId(self.bars.len());
        self.bars.push(Bar {
            id,
            segment,
            label,
            next: Vec::new(),
            prev: Vec::new(),
        });
        Ok(id)
    }

    /// Add a segment and a bar over it in one step
    pub fn add_passage(&mut self, segment: Segment, label: Option<String>) -> BarId {
        let segment = self.add_segment(segment);
        let id = BarId(self.bars.len());
        self.bars.push(Bar {
            id,
            segment,
            label,
            next: Vec::new(),
            prev: Vec::new(),
        });
        id
    }

    /// Record that `to` may follow `from`
    pub fn add_edge(&mut self, from: BarId, to: BarId) -> Result<(), LibraryError> {
        self.check(from)?;
        self.check(to)?;

        if !self.bars[from.0].next.contains(&to) {
            self.bars[from.0].next.push(to);
            self.bars[to.0].prev.push(from);
        }
        Ok(())
    }

    /// Link bars in order, each to the one after it
    pub fn link_sequence(&mut self, bars: &[BarId]) -> Result<(), LibraryError> {
        for pair in bars.windows(2) {
            self.add_edge(pair[0], pair[1])?;
        }
        Ok(())
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn bar(&self, id: BarId) -> Option<&Bar> {
        self.bars.get(id.0)
    }

    pub fn bars(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id.0)
    }

    /// Reference segment of a bar
    pub fn bar_segment(&self, id: BarId) -> Option<&Segment> {
        self.bar(id).and_then(|bar| self.segment(bar.segment))
    }

    /// Whether `to` is reachable from `from` in at most `max_hops` forward edges
    pub fn find_next(&self, from: BarId, to: BarId, max_hops: usize) -> bool {
        if max_hops == 0 || self.bar(from).is_none() {
            return false;
        }

        let mut visited = vec![false; self.bars.len()];
        let mut queue = VecDeque::new();
        queue.push_back((from, 0usize));

        while let Some((current, hops)) = queue.pop_front() {
            if hops == max_hops {
                continue;
            }
            for &next in &self.bars[current.0].next {
                if next == to {
                    return true;
                }
                if !visited[next.0] {
                    visited[next.0] = true;
                    queue.push_back((next, hops + 1));
                }
            }
        }

        false
    }

    /// Direct transition in either direction
    pub fn adjacent(&self, a: BarId, b: BarId) -> bool {
        self.find_next(a, b, 1) || self.find_next(b, a, 1)
    }

    /// Longest reference note count over all bars
    pub fn max_bar_notes(&self) -> usize {
        self.bars
            .iter()
            .filter_map(|bar| self.segment(bar.segment))
            .map(Segment::len)
            .max()
            .unwrap_or(0)
    }

    /// Shortest reference note count over all bars
    pub fn min_bar_notes(&self) -> usize {
        self.bars
            .iter()
            .filter_map(|bar| self.segment(bar.segment))
            .map(Segment::len)
            .min()
            .unwrap_or(0)
    }

    fn check(&self, id: BarId) -> Result<(), LibraryError> {
        if id.0 < self.bars.len() {
            Ok(())
        } else {
            Err(LibraryError::UnknownBar(id.0))
        }
    }
}
