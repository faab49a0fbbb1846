//! Live score following
//!
//! `LiveFollower` owns a chain builder on a background thread. Notes are
//! sent to it as they are played. A start index is attempted once its
//! shortest bar window is complete and again once its longest one is, so
//! libraries with bars of different lengths are followed note by note. A
//! flush attempts every start index still waiting on notes. Pieces are
//! published for readers on other threads.

use crate::tree::{ChainBuilder, MatchedPiece, SharedSegment};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use partita_core::{Library, MatcherConfig, Note, Segment};
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Follower state published after every batch of notes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub pieces: Vec<MatchedPiece>,
    pub max_depth: usize,
    pub note_count: usize,
    pub decision_count: usize,
}

impl Snapshot {
    /// The piece containing the most recent match
    pub fn current_piece(&self) -> Option<&MatchedPiece> {
        self.pieces
            .iter()
            .max_by_key(|piece| piece.bars.last().map(|bar| bar.end_index))
    }
}

#[derive(Debug)]
enum FollowerCommand {
    AddNote(Note),
    /// Performed notes from this index on were retracted
    WithdrawFrom(usize),
    Flush(Sender<()>),
    Shutdown,
}

pub struct LiveFollower {
    command_tx: Sender<FollowerCommand>,
    snapshot: Arc<Mutex<Snapshot>>,
    thread: Option<JoinHandle<()>>,
}

impl LiveFollower {
    /// Start following with `worker_count` solver workers. Performed time is
    /// normalized with `pulse_unit`/`pulse_rate`.
    pub fn start(
        library: Arc<Library>,
        config: MatcherConfig,
        worker_count: usize,
        pulse_unit: f64,
        pulse_rate: f64,
    ) -> Result<Self> {
        let segment: SharedSegment = Arc::new(RwLock::new(Segment::new(pulse_unit, pulse_rate)));

        let mut builder = ChainBuilder::new(library, config)?;
        builder.set_input_segment(segment.clone());
        builder
            .initialize(worker_count)
            .context("failed to initialize chain builder")?;
        builder
            .spawn_threads()
            .context("failed to spawn solver workers")?;

        let snapshot = Arc::new(Mutex::new(Snapshot::default()));
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        let follower = FollowerThread {
            builder,
            segment,
            snapshot: snapshot.clone(),
            command_rx,
        };
        let thread = thread::Builder::new()
            .name("partita-follower".to_string())
            .spawn(move || follower.run())
            .context("failed to spawn follower thread")?;

        info!(workers = worker_count, "live follower started");

        Ok(LiveFollower {
            command_tx,
            snapshot,
            thread: Some(thread),
        })
    }

    /// Queue a newly performed note
    pub fn add_note(&self, note: Note) -> Result<()> {
        self.send(FollowerCommand::AddNote(note))
    }

    /// Retract every performed note from `index` on
    pub fn withdraw_from(&self, index: usize) -> Result<()> {
        self.send(FollowerCommand::WithdrawFrom(index))
    }

    /// Block until every queued command has been handled
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.send(FollowerCommand::Flush(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| anyhow!("follower thread stopped before flushing"))
    }

    /// Latest published state
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pieces(&self) -> Vec<MatchedPiece> {
        self.snapshot().pieces
    }

    /// Stop the follower and its workers
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let _ = self.command_tx.send(FollowerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| anyhow!("follower thread panicked"))?;
        }
        Ok(())
    }

    fn send(&self, command: FollowerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| anyhow!("follower thread is not running"))
    }
}

impl Drop for LiveFollower {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Start indices due for an attempt as the stream grows
#[derive(Debug, Clone, PartialEq, Eq)]
struct StartCursor {
    shortest: usize,
    longest: usize,
    /// First start index whose shortest window is not yet complete
    short_next: usize,
    /// First start index whose longest window is not yet complete
    long_next: usize,
}

impl StartCursor {
    fn new((shortest, longest): (usize, usize)) -> Self {
        Self {
            shortest,
            longest,
            short_next: 0,
            long_next: 0,
        }
    }

    /// Start indices whose windows were completed by the stream reaching
    /// `len` notes, in ascending order
    fn advance(&mut self, len: usize) -> Vec<usize> {
        let mut due = Vec::new();
        while self.short_next + self.shortest <= len {
            due.push(self.short_next);
            self.short_next += 1;
        }
        if self.longest > self.shortest {
            while self.long_next + self.longest <= len {
                due.push(self.long_next);
                self.long_next += 1;
            }
        } else {
            self.long_next = self.short_next;
        }
        due.sort_unstable();
        due.dedup();
        due
    }

    /// Start indices still short of a complete window for some bar
    fn pending(&self, len: usize) -> Range<usize> {
        self.long_next.min(len)..len
    }

    /// Rewind past every window that reached a withdrawn note
    fn withdraw(&mut self, index: usize) {
        self.short_next = self.short_next.min((index + 1).saturating_sub(self.shortest));
        self.long_next = self.long_next.min((index + 1).saturating_sub(self.longest));
    }
}

struct FollowerThread {
    builder: ChainBuilder,
    segment: SharedSegment,
    snapshot: Arc<Mutex<Snapshot>>,
    command_rx: Receiver<FollowerCommand>,
}

impl FollowerThread {
    fn run(mut self) {
        let mut cursor = StartCursor::new(self.builder.window_bounds());

        while let Ok(command) = self.command_rx.recv() {
            match command {
                FollowerCommand::AddNote(note) => {
                    let len = {
                        let mut segment = self.segment.write().unwrap_or_else(PoisonError::into_inner);
                        segment.push(note);
                        segment.length = segment.length.max(note.timestamp as f64);
                        segment.len()
                    };

                    if let Err(e) = self.process_all(cursor.advance(len)) {
                        error!("matching failed at note {}: {}", len - 1, e);
                        break;
                    }
                }
                FollowerCommand::WithdrawFrom(index) => {
                    self.segment
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .notes
                        .truncate(index);
                    self.builder.on_note_change(index);
                    cursor.withdraw(index);
                    debug!(index, "withdrew performed notes");
                }
                FollowerCommand::Flush(ack) => {
                    let len = self.note_count();
                    if let Err(e) = self.process_all(cursor.pending(len)) {
                        error!("matching failed while flushing: {}", e);
                        break;
                    }
                    self.publish();
                    let _ = ack.send(());
                    continue;
                }
                FollowerCommand::Shutdown => break,
            }

            if self.command_rx.is_empty() {
                self.publish();
            }
        }

        self.builder.kill_threads();
        self.builder.destroy();
        info!("live follower stopped");
    }

    fn process_all(&mut self, starts: impl IntoIterator<Item = usize>) -> Result<()> {
        for start in starts {
            self.builder.process(start)?;
        }
        Ok(())
    }

    fn note_count(&self) -> usize {
        self.segment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn publish(&self) {
        let snapshot = Snapshot {
            pieces: self.builder.pieces(),
            max_depth: self.builder.max_depth(),
            note_count: self.note_count(),
            decision_count: self.builder.decision_count(),
        };
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
