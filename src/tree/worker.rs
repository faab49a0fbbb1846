//! Worker pool of the chain builder
//!
//! Each worker owns one `Solver` and a shard of the library. A worker with
//! a thread receives jobs over a channel and sends its decisions back; a
//! worker without one runs its shard on the caller's thread.

use crate::tree::decision::Decision;
use crossbeam_channel::{Receiver, Sender};
use partita_core::{BarId, Library, MatcherConfig, Segment, SolveRequest, Solver};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// The performed stream, shared between the feeder and the workers
pub type SharedSegment = Arc<RwLock<Segment>>;

/// Worker lifecycle: `Idle → Triggered → Running → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Triggered = 1,
    Running = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Triggered,
            2 => WorkerState::Running,
            _ => WorkerState::Idle,
        }
    }
}

/// One shard of one `process()` call
#[derive(Clone)]
pub(crate) struct Job {
    /// Sequence number of the `process()` call that issued the job
    pub call: u64,
    pub start_index: usize,
    pub bars: Range<usize>,
    pub library: Arc<Library>,
    pub segment: SharedSegment,
}

#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub call: u64,
    pub worker_id: usize,
    pub decisions: Vec<Decision>,
}

enum WorkerCommand {
    Run(Job),
    Kill,
}

/// Per-worker context; the solver lives here while no thread is running
pub(crate) struct WorkerContext {
    id: usize,
    state: Arc<AtomicU8>,
    killed: Arc<AtomicBool>,
    solver: Option<Solver>,
    command_tx: Option<Sender<WorkerCommand>>,
    thread: Option<JoinHandle<Solver>>,
}

impl WorkerContext {
    pub fn new(id: usize, solver: Solver) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(WorkerState::Idle as u8)),
            killed: Arc::new(AtomicBool::new(false)),
            solver: Some(solver),
            command_tx: None,
            thread: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn has_thread(&self) -> bool {
        self.thread.is_some()
    }

    /// The thread exited without being killed
    pub fn thread_died(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| thread.is_finished())
            .unwrap_or(false)
    }

    /// Move the solver onto a dedicated thread
    pub fn spawn(&mut self, report_tx: Sender<WorkerReport>) -> std::io::Result<()> {
        let Some(solver) = self.solver.take() else {
            return Ok(());
        };

        let (command_tx, command_rx) = crossbeam_channel::bounded(1);
        self.killed.store(false, Ordering::Release);

        let worker = WorkerThread {
            id: self.id,
            state: self.state.clone(),
            killed: self.killed.clone(),
            solver,
            command_rx,
            report_tx,
        };

        let thread = thread::Builder::new()
            .name(format!("partita-worker-{}", self.id))
            .spawn(move || worker.run())?;

        self.command_tx = Some(command_tx);
        self.thread = Some(thread);
        Ok(())
    }

    /// Hand a job to the thread; `false` if the thread is gone
    pub fn dispatch(&self, job: Job) -> bool {
        let Some(command_tx) = &self.command_tx else {
            return false;
        };
        self.state
            .store(WorkerState::Triggered as u8, Ordering::Release);
        command_tx.send(WorkerCommand::Run(job)).is_ok()
    }

    /// Run a job on the calling thread
    pub fn run_inline(&mut self, job: &Job) -> Option<WorkerReport> {
        let solver = self.solver.as_mut()?;
        self.state.store(WorkerState::Running as u8, Ordering::Release);
        let decisions = run_shard(solver, job);
        self.state.store(WorkerState::Idle as u8, Ordering::Release);
        Some(WorkerReport {
            call: job.call,
            worker_id: self.id,
            decisions,
        })
    }

    /// Signal the thread, join it and take the solver back. A workspace lost
    /// to a panicked thread is rebuilt from `config`.
    pub fn kill(&mut self, config: &MatcherConfig) {
        self.killed.store(true, Ordering::Release);
        if let Some(command_tx) = self.command_tx.take() {
            let _ = command_tx.send(WorkerCommand::Kill);
        }

        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(solver) => self.solver = Some(solver),
                Err(_) => {
                    warn!(worker = self.id, "worker thread panicked; rebuilding workspace");
                    self.solver = Some(Solver::new(config.clone()));
                }
            }
        }
        self.state.store(WorkerState::Idle as u8, Ordering::Release);
    }
}

struct WorkerThread {
    id: usize,
    state: Arc<AtomicU8>,
    killed: Arc<AtomicBool>,
    solver: Solver,
    command_rx: Receiver<WorkerCommand>,
    report_tx: Sender<WorkerReport>,
}

impl WorkerThread {
    fn run(mut self) -> Solver {
        debug!(worker = self.id, "worker started");

        while let Ok(command) = self.command_rx.recv() {
            if self.killed.load(Ordering::Acquire) {
                break;
            }

            match command {
                WorkerCommand::Kill => break,
                WorkerCommand::Run(job) => {
                    self.state
                        .store(WorkerState::Running as u8, Ordering::Release);
                    let decisions = run_shard(&mut self.solver, &job);
                    self.state.store(WorkerState::Idle as u8, Ordering::Release);

                    let report = WorkerReport {
                        call: job.call,
                        worker_id: self.id,
                        decisions,
                    };
                    if self.report_tx.send(report).is_err() {
                        break;
                    }
                }
            }
        }

        debug!(worker = self.id, "worker stopped");
        self.solver
    }
}

/// Attempt every bar of the shard against the window starting at
/// `job.start_index`
pub(crate) fn run_shard(solver: &mut Solver, job: &Job) -> Vec<Decision> {
    let guard = job.segment.read().unwrap_or_else(PoisonError::into_inner);
    let segment: &Segment = &guard;
    let mut decisions = Vec::new();
    if job.start_index >= segment.len() {
        return decisions;
    }
    let last = segment.len() - 1;

    for index in job.bars.clone() {
        let bar = BarId(index);
        let Some(reference) = job.library.bar_segment(bar) else {
            continue;
        };

        let window = solver.config().window_length(reference.len());
        let end_index = (job.start_index + window).saturating_sub(1).min(last);
        let seed = attempt_seed(solver.config().seed, index, job.start_index);

        let request = SolveRequest {
            reference,
            segment,
            start_index: job.start_index,
            end_index,
            seed,
        };
        if let Some(solution) = solver.solve(&request) {
            decisions.push(Decision::new(bar, solution));
        }
    }

    decisions
}

/// Seed of one solver attempt; depends only on the inputs, never on which
/// worker runs the attempt (splitmix64 finalizer)
pub(crate) fn attempt_seed(seed: u64, bar: usize, start_index: usize) -> u64 {
    let mut z = seed
        ^ (bar as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (start_index as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Contiguous shard of `bar_count` bars for worker `worker` of
/// `worker_count`; trailing shards may be short or empty
pub(crate) fn shard(bar_count: usize, worker_count: usize, worker: usize) -> Range<usize> {
    let size = bar_count.div_ceil(worker_count.max(1));
    let start = (worker * size).min(bar_count);
    let end = ((worker + 1) * size).min(bar_count);
    start..end
}
