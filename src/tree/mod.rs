//! Chain builder
//!
//! Runs the solver for every library bar against the performed stream,
//! merges accepted matches into a live set of decisions and threads them
//! into chains of adjacent bars. Workers only produce decisions; the set
//! itself is touched on the calling thread alone, after every worker of a
//! `process()` call has reported.

pub mod decision;
pub mod pieces;
pub mod worker;

pub use decision::Decision;
pub use pieces::{MatchedBar, MatchedPiece};
pub use worker::{SharedSegment, WorkerState};

use crate::error::EngineError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use partita_core::{Library, MatcherConfig, Solver};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use worker::{Job, WorkerContext, WorkerReport};

/// How often a waiting `process()` checks that dispatched threads are alive
const LIVENESS_POLL: Duration = Duration::from_millis(100);

/// Counts from one `process()` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Decisions the workers produced
    pub produced: usize,
    /// Produced decisions that overlapped an existing one
    pub merged: usize,
    /// Produced decisions added to the set
    pub added: usize,
}

pub struct ChainBuilder {
    library: Arc<Library>,
    config: MatcherConfig,
    segment: Option<SharedSegment>,
    decisions: Vec<Decision>,
    workers: Vec<WorkerContext>,
    reports: Option<Receiver<WorkerReport>>,
    /// Sequence number of the latest `process()` call
    calls: u64,
}

impl ChainBuilder {
    pub fn new(library: Arc<Library>, config: MatcherConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            library,
            config,
            segment: None,
            decisions: Vec::new(),
            workers: Vec::new(),
            reports: None,
            calls: 0,
        })
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Set the performed stream that `process()` reads
    pub fn set_input_segment(&mut self, segment: SharedSegment) {
        self.segment = Some(segment);
    }

    pub fn input_segment(&self) -> Option<&SharedSegment> {
        self.segment.as_ref()
    }

    /// Allocate one solver workspace per worker
    pub fn initialize(&mut self, worker_count: usize) -> Result<(), EngineError> {
        if worker_count == 0 {
            return Err(EngineError::InvalidWorkerCount);
        }
        if !self.workers.is_empty() {
            return Err(EngineError::AlreadyInitialized(self.workers.len()));
        }

        self.workers = (0..worker_count)
            .map(|id| WorkerContext::new(id, Solver::new(self.config.clone())))
            .collect();
        Ok(())
    }

    /// Start worker threads. A single worker stays on the calling thread.
    pub fn spawn_threads(&mut self) -> Result<(), EngineError> {
        if self.workers.is_empty() {
            return Err(EngineError::NotInitialized);
        }
        if self.workers.len() == 1 || self.threads_running() {
            return Ok(());
        }

        let (report_tx, report_rx) = crossbeam_channel::unbounded();
        for context in &mut self.workers {
            context.spawn(report_tx.clone())?;
        }
        self.reports = Some(report_rx);

        info!(workers = self.workers.len(), "spawned worker threads");
        Ok(())
    }

    /// Signal every worker thread and join it
    pub fn kill_threads(&mut self) {
        if !self.threads_running() {
            return;
        }

        for context in &mut self.workers {
            context.kill(&self.config);
        }
        self.reports = None;

        info!(workers = self.workers.len(), "worker threads joined");
    }

    /// Release the worker workspaces
    ///
    /// # Panics
    ///
    /// Panics if worker threads are still running; call `kill_threads()`
    /// first.
    pub fn destroy(&mut self) {
        assert!(
            !self.threads_running(),
            "destroy() called while worker threads are alive"
        );
        self.workers.clear();
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn threads_running(&self) -> bool {
        self.workers.iter().any(WorkerContext::has_thread)
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(WorkerContext::state).collect()
    }

    /// Attempt every bar against the window starting at `start_index`, then
    /// merge the results into the decision set
    pub fn process(&mut self, start_index: usize) -> Result<ProcessSummary, EngineError> {
        if self.workers.is_empty() {
            return Err(EngineError::NotInitialized);
        }
        let segment = self.segment.clone().ok_or(EngineError::NoInputSegment)?;
        self.calls += 1;
        let call = self.calls;

        let bar_count = self.library.bar_count();
        let worker_count = self.workers.len();
        let mut reports = Vec::with_capacity(worker_count);
        let mut pending = Vec::new();

        for (i, context) in self.workers.iter_mut().enumerate() {
            let job = Job {
                call,
                start_index,
                bars: worker::shard(bar_count, worker_count, i),
                library: self.library.clone(),
                segment: segment.clone(),
            };

            if context.has_thread() {
                if !context.dispatch(job) {
                    return Err(EngineError::WorkerDisconnected(context.id()));
                }
                pending.push(context.id());
            } else if let Some(report) = context.run_inline(&job) {
                reports.push(report);
            }
        }

        if !pending.is_empty() {
            self.collect_reports(call, &mut pending, &mut reports)?;
        }

        reports.sort_by_key(|report| report.worker_id);

        let mut summary = ProcessSummary::default();
        for report in reports {
            for decision in report.decisions {
                summary.produced += 1;
                if self.integrate_decision(decision) {
                    summary.added += 1;
                } else {
                    summary.merged += 1;
                }
            }
        }

        debug!(
            start_index,
            produced = summary.produced,
            merged = summary.merged,
            added = summary.added,
            decisions = self.decisions.len(),
            "processed window"
        );
        Ok(summary)
    }

    /// Block until every dispatched worker has reported for `call`. Reports
    /// left over from an earlier call that failed are discarded.
    fn collect_reports(
        &self,
        call: u64,
        pending: &mut Vec<usize>,
        reports: &mut Vec<WorkerReport>,
    ) -> Result<(), EngineError> {
        let receiver = self
            .reports
            .as_ref()
            .ok_or_else(|| EngineError::WorkerDisconnected(pending[0]))?;

        while !pending.is_empty() {
            match receiver.recv_timeout(LIVENESS_POLL) {
                Ok(report) if report.call != call => {
                    debug!(
                        worker = report.worker_id,
                        call = report.call,
                        "discarded stale report"
                    );
                }
                Ok(report) => {
                    pending.retain(|&id| id != report.worker_id);
                    reports.push(report);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(dead) = pending
                        .iter()
                        .copied()
                        .find(|&id| self.workers[id].thread_died())
                    {
                        warn!(worker = dead, "worker thread exited mid-call");
                        return Err(EngineError::WorkerDisconnected(dead));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::WorkerDisconnected(pending[0]));
                }
            }
        }
        Ok(())
    }

    /// Merge one decision into the set. Returns `true` if it was added,
    /// `false` if it overlapped an existing decision (the better of the two
    /// then occupies the existing slot).
    pub fn integrate_decision(&mut self, decision: Decision) -> bool {
        let overlapping = self
            .decisions
            .iter()
            .position(|existing| existing.overlaps(&decision));

        match overlapping {
            Some(index) => {
                if decision.is_better_fit_than(&self.decisions[index]) {
                    let changed_from = self.decisions[index].end().min(decision.end());
                    self.decisions[index].overwrite_with(decision);
                    self.invalidate_from(changed_from);
                }
                false
            }
            None => {
                let changed_from = decision.end();
                self.decisions.push(decision);
                self.invalidate_from(changed_from);
                true
            }
        }
    }

    /// Every decision ending at or after `end` may pick a different parent
    fn invalidate_from(&self, end: usize) {
        for decision in &self.decisions {
            if decision.end() >= end {
                decision.invalidate();
            }
        }
    }

    /// Drop every decision that uses a performed note at or after
    /// `changed_index`
    pub fn on_note_change(&mut self, changed_index: usize) {
        let before = self.decisions.len();
        let mut remap = vec![None; before];
        let mut kept = 0;
        for (i, decision) in self.decisions.iter().enumerate() {
            if decision.end() < changed_index {
                remap[i] = Some(kept);
                kept += 1;
            }
        }

        self.decisions.retain(|decision| decision.end() < changed_index);
        for decision in &self.decisions {
            decision.remap_parent(|parent| remap.get(parent).copied().flatten());
        }

        if kept != before {
            debug!(changed_index, removed = before - kept, "pruned decisions");
        }
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    pub fn decision(&self, index: usize) -> Option<&Decision> {
        self.decisions.get(index)
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Chain depth of a decision (1 for a chain root)
    pub fn depth(&self, index: usize) -> usize {
        if index >= self.decisions.len() {
            return 0;
        }
        if !self.chain_valid(index) {
            self.refresh();
        }
        self.decisions[index].cached_depth()
    }

    /// Best parent of a decision
    pub fn parent(&self, index: usize) -> Option<usize> {
        if index >= self.decisions.len() {
            return None;
        }
        if !self.chain_valid(index) {
            self.refresh();
        }
        self.decisions[index].parent()
    }

    /// Longest chain over all decisions
    pub fn max_depth(&self) -> usize {
        self.refresh();
        self.decisions
            .iter()
            .map(Decision::cached_depth)
            .max()
            .unwrap_or(0)
    }

    /// Cached values hold only if the whole ancestor chain is valid
    fn chain_valid(&self, index: usize) -> bool {
        let mut current = index;
        loop {
            let decision = &self.decisions[current];
            if !decision.is_marked_valid() {
                return false;
            }
            match decision.parent() {
                Some(parent) => current = parent,
                None => return true,
            }
        }
    }

    /// Recompute parent and depth of every stale decision. Parents always
    /// end strictly earlier, so visiting by end index sees each parent
    /// before its children.
    fn refresh(&self) {
        let mut stale: Vec<usize> = (0..self.decisions.len())
            .filter(|&i| !self.chain_valid(i))
            .collect();
        if stale.is_empty() {
            return;
        }
        stale.sort_by_key(|&i| self.decisions[i].end());

        for i in stale {
            let decision = &self.decisions[i];
            let mut best: Option<(usize, usize)> = None;

            for (j, candidate) in self.decisions.iter().enumerate() {
                if candidate.end() >= decision.end()
                    || !self.library.adjacent(candidate.bar, decision.bar)
                {
                    continue;
                }
                let depth = candidate.cached_depth();
                if best.map_or(true, |(_, best_depth)| depth > best_depth) {
                    best = Some((j, depth));
                }
            }

            let depth = 1 + best.map_or(0, |(_, depth)| depth);
            decision.link(best.map(|(j, _)| j), depth);
        }
    }

    /// Shortest and longest window over the library. A start index has a
    /// complete window for every bar once `longest` notes follow it.
    pub fn window_bounds(&self) -> (usize, usize) {
        let shortest = self.config.window_length(self.library.min_bar_notes()).max(1);
        let longest = self.config.window_length(self.library.max_bar_notes()).max(1);
        (shortest, longest)
    }

    /// Reconstruct every chain, one per terminal decision, in order of
    /// first performed note
    pub fn pieces(&self) -> Vec<MatchedPiece> {
        self.refresh();

        let mut is_parent = vec![false; self.decisions.len()];
        for decision in &self.decisions {
            if let Some(parent) = decision.parent() {
                is_parent[parent] = true;
            }
        }

        let guard = self
            .segment
            .as_ref()
            .map(|segment| segment.read().unwrap_or_else(PoisonError::into_inner));
        let segment = guard.as_deref();

        let mut pieces: Vec<MatchedPiece> = (0..self.decisions.len())
            .filter(|&i| !is_parent[i])
            .map(|leaf| {
                let mut bars = Vec::new();
                let mut current = Some(leaf);
                while let Some(i) = current {
                    let decision = &self.decisions[i];
                    bars.push(MatchedBar {
                        bar: decision.bar,
                        transform: decision.transform,
                        start_index: decision.start(),
                        end_index: decision.end(),
                        start_timestamp: pieces::note_time(segment, decision.start()),
                        end_timestamp: pieces::note_time(segment, decision.end()),
                        mapped_notes: decision.mapped_notes,
                        average_error: decision.average_error,
                    });
                    current = decision.parent();
                }
                bars.reverse();
                MatchedPiece { bars }
            })
            .collect();

        pieces.sort_by_key(|piece| piece.first_index());
        pieces
    }
}

impl Drop for ChainBuilder {
    fn drop(&mut self) {
        self.kill_threads();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partita_core::{BarId, Note, Segment, Transform};
    use std::sync::RwLock;

    fn chained_library(bars: usize) -> Library {
        let mut library = Library::new();
        let ids: Vec<BarId> = (0..bars)
            .map(|_| library.add_passage(Segment::default(), None))
            .collect();
        library.link_sequence(&ids).unwrap();
        library
    }

    fn builder(bars: usize) -> ChainBuilder {
        ChainBuilder::new(Arc::new(chained_library(bars)), MatcherConfig::default()).unwrap()
    }

    fn decision(bar: usize, notes: std::ops::Range<usize>) -> Decision {
        Decision::from_notes(BarId(bar), notes, 0.0, Transform::identity(0))
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut builder = builder(1);
        assert!(matches!(builder.process(0), Err(EngineError::NotInitialized)));
        assert!(matches!(builder.initialize(0), Err(EngineError::InvalidWorkerCount)));

        builder.initialize(2).unwrap();
        assert!(matches!(
            builder.initialize(2),
            Err(EngineError::AlreadyInitialized(2))
        ));
        assert!(matches!(builder.process(0), Err(EngineError::NoInputSegment)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MatcherConfig::default().with_margin(-1.0);
        assert!(matches!(
            ChainBuilder::new(Arc::new(Library::new()), config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_single_worker_never_spawns() {
        let mut builder = builder(1);
        builder.initialize(1).unwrap();
        builder.spawn_threads().unwrap();
        assert!(!builder.threads_running());
        builder.destroy();
        assert_eq!(builder.worker_count(), 0);
    }

    #[test]
    fn test_threads_spawn_and_join() {
        let mut builder = builder(3);
        builder.set_input_segment(Arc::new(RwLock::new(Segment::default())));
        builder.initialize(3).unwrap();
        builder.spawn_threads().unwrap();
        assert!(builder.threads_running());

        builder.process(0).unwrap();
        assert!(builder
            .worker_states()
            .iter()
            .all(|state| *state == WorkerState::Idle));

        builder.kill_threads();
        assert!(!builder.threads_running());
        builder.destroy();
    }

    #[test]
    #[should_panic(expected = "worker threads are alive")]
    fn test_destroy_requires_joined_threads() {
        let mut builder = builder(2);
        builder.initialize(2).unwrap();
        builder.spawn_threads().unwrap();
        builder.destroy();
    }

    #[test]
    fn test_stale_reports_are_discarded() {
        let notes: Vec<Note> = (0..6).map(|i| Note::new(60 + i, i as i64 * 500)).collect();
        let mut library = Library::new();
        library.add_passage(Segment::from_notes(notes.clone(), 1000.0, 1.0), None);
        library.add_passage(Segment::from_notes(notes.clone(), 1000.0, 1.0), None);

        let segment = Arc::new(RwLock::new(Segment::from_notes(notes, 1000.0, 1.0)));
        let mut builder = ChainBuilder::new(Arc::new(library), MatcherConfig::default()).unwrap();
        builder.set_input_segment(segment.clone());
        builder.initialize(2).unwrap();
        builder.spawn_threads().unwrap();

        // A report still queued from an earlier call that bailed out
        assert!(builder.workers[0].dispatch(Job {
            call: 0,
            start_index: 0,
            bars: 0..1,
            library: builder.library.clone(),
            segment,
        }));

        // Nothing can match past the end of the stream
        let summary = builder.process(6).unwrap();
        assert_eq!(summary, ProcessSummary::default());
        assert_eq!(builder.decision_count(), 0);

        let summary = builder.process(0).unwrap();
        assert_eq!(summary.produced, 2);
        assert_eq!(builder.decision_count(), 1);

        builder.kill_threads();
        builder.destroy();
    }

    #[test]
    fn test_window_bounds_span_bar_lengths() {
        let note = |i: i64| Note::new(60, i * 500);
        let mut library = Library::new();
        library.add_passage(Segment::from_notes((0..4).map(note), 1000.0, 1.0), None);
        library.add_passage(Segment::from_notes((0..16).map(note), 1000.0, 1.0), None);

        let builder = ChainBuilder::new(Arc::new(library), MatcherConfig::default()).unwrap();
        assert_eq!(builder.window_bounds(), (5, 20));
    }

    #[test]
    fn test_chain_depth_and_parents() {
        let mut builder = builder(3);
        assert!(builder.integrate_decision(decision(0, 0..4)));
        assert!(builder.integrate_decision(decision(1, 4..8)));
        assert!(builder.integrate_decision(decision(2, 8..12)));

        assert_eq!(builder.max_depth(), 3);
        assert_eq!(builder.depth(2), 3);
        assert_eq!(builder.parent(2), Some(1));
        assert_eq!(builder.parent(0), None);
    }

    #[test]
    fn test_non_adjacent_bars_do_not_chain() {
        let mut builder = builder(3);
        builder.integrate_decision(decision(0, 0..4));
        builder.integrate_decision(decision(2, 4..8));
        assert_eq!(builder.max_depth(), 1);
        assert_eq!(builder.pieces().len(), 2);
    }

    #[test]
    fn test_late_parent_invalidates_cache() {
        let mut builder = builder(3);
        builder.integrate_decision(decision(2, 8..12));
        builder.integrate_decision(decision(1, 4..8));
        assert_eq!(builder.max_depth(), 2);

        // Root arrives after its descendants were linked
        builder.integrate_decision(decision(0, 0..4));
        assert_eq!(builder.max_depth(), 3);
        assert_eq!(builder.depth(0), 3);
    }

    #[test]
    fn test_pieces_root_first() {
        let mut builder = builder(3);
        builder.integrate_decision(decision(1, 4..8));
        builder.integrate_decision(decision(0, 0..4));
        builder.integrate_decision(decision(2, 8..12));

        let pieces = builder.pieces();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].bar_ids(), vec![BarId(0), BarId(1), BarId(2)]);
        assert_eq!(pieces[0].bars[2].end_index, 11);
    }

    #[test]
    fn test_note_change_keeps_parent_links() {
        let mut builder = builder(3);
        builder.integrate_decision(decision(2, 8..12));
        builder.integrate_decision(decision(0, 0..4));
        builder.integrate_decision(decision(1, 4..8));
        assert_eq!(builder.max_depth(), 3);

        builder.on_note_change(8);
        assert_eq!(builder.decision_count(), 2);
        assert_eq!(builder.max_depth(), 2);
        assert!(builder.decisions().iter().all(|d| d.end() < 8));
        assert_eq!(builder.parent(1), Some(0));
    }
}
