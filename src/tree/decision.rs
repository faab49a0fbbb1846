//! Candidate matches
//!
//! A `Decision` claims that a set of performed notes plays one bar. The
//! chain builder keeps decisions in an arena; parent links are arena
//! indices, memoized together with the chain depth.

use partita_core::{BarId, Solution, Transform};
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct Decision {
    pub bar: BarId,
    /// Performed note indices matched to the bar (never empty)
    pub notes: BTreeSet<usize>,
    pub mapped_notes: usize,
    pub average_error: f64,
    pub transform: Transform,
    /// The refined transform came from an ill-conditioned system
    pub singular: bool,

    parent: Cell<Option<usize>>,
    depth: Cell<usize>,
    cached: Cell<bool>,
}

impl Decision {
    pub fn new(bar: BarId, solution: Solution) -> Self {
        Self {
            bar,
            notes: solution.notes,
            mapped_notes: solution.fit.mapped_notes,
            average_error: solution.fit.average_error,
            transform: solution.transform,
            singular: solution.singular,
            parent: Cell::new(None),
            depth: Cell::new(1),
            cached: Cell::new(false),
        }
    }

    /// Build a decision directly from its matched notes
    pub fn from_notes(
        bar: BarId,
        notes: impl IntoIterator<Item = usize>,
        average_error: f64,
        transform: Transform,
    ) -> Self {
        let notes: BTreeSet<usize> = notes.into_iter().collect();
        Self {
            bar,
            mapped_notes: notes.len(),
            notes,
            average_error,
            transform,
            singular: false,
            parent: Cell::new(None),
            depth: Cell::new(1),
            cached: Cell::new(false),
        }
    }

    /// First matched performed note
    pub fn start(&self) -> usize {
        self.notes.first().copied().unwrap_or(0)
    }

    /// Last matched performed note
    pub fn end(&self) -> usize {
        self.notes.last().copied().unwrap_or(0)
    }

    pub fn footprint(&self) -> usize {
        self.end() - self.start() + 1
    }

    /// Number of performed notes both decisions claim
    pub fn shared_notes(&self, other: &Decision) -> usize {
        self.notes.intersection(&other.notes).count()
    }

    /// Two decisions compete when they share at least half of the smaller
    /// note set (rounded up)
    pub fn overlaps(&self, other: &Decision) -> bool {
        let smaller = self.mapped_notes.min(other.mapped_notes);
        smaller > 0 && self.shared_notes(other) >= smaller.div_ceil(2)
    }

    /// More mapped notes, then smaller footprint, then lower error
    pub fn is_better_fit_than(&self, other: &Decision) -> bool {
        match self.mapped_notes.cmp(&other.mapped_notes) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match self.footprint().cmp(&other.footprint()) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => self.average_error < other.average_error,
            },
        }
    }

    /// Take over the match of `other`, keeping this decision's arena slot
    pub(crate) fn overwrite_with(&mut self, other: Decision) {
        self.bar = other.bar;
        self.notes = other.notes;
        self.mapped_notes = other.mapped_notes;
        self.average_error = other.average_error;
        self.transform = other.transform;
        self.singular = other.singular;
        self.invalidate();
    }

    pub(crate) fn parent(&self) -> Option<usize> {
        self.parent.get()
    }

    pub(crate) fn cached_depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn is_marked_valid(&self) -> bool {
        self.cached.get()
    }

    pub(crate) fn link(&self, parent: Option<usize>, depth: usize) {
        self.parent.set(parent);
        self.depth.set(depth);
        self.cached.set(true);
    }

    pub(crate) fn invalidate(&self) {
        self.cached.set(false);
    }

    /// Rewrite the parent index after the arena was compacted
    pub(crate) fn remap_parent(&self, remap: impl Fn(usize) -> Option<usize>) {
        if let Some(parent) = self.parent.get() {
            let mapped = remap(parent);
            if mapped.is_none() {
                self.cached.set(false);
            }
            self.parent.set(mapped);
        }
    }
}
