//! Score following simulator
//!
//! Builds a random library of linked bars, plays one chain of them through
//! the live follower (optionally with tempo change, timing jitter and wrong
//! notes) and prints the pieces that were recognized.
//!
//! **Usage:**
//! ```bash
//! partita [--bars 8] [--distractors 16] [--workers 4] [--jitter 20] [--wrong-notes 1]
//! ```

use anyhow::{ensure, Result};
use clap::Parser;
use colored::*;
use partita::{LiveFollower, MatchedPiece};
use partita_core::{BarId, Library, MatcherConfig, Segment, SegmentGenerator};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Notes of one generated bar fall on this many grid slots
const GRID_SPACES: usize = 16;

/// Generated pitch range
const PITCH_LOW: i32 = 36;
const PITCH_HIGH: i32 = 96;

/// Score following simulator
#[derive(Parser, Debug)]
#[command(name = "partita")]
#[command(about = "Simulate a performance and follow it against a random passage library")]
struct Args {
    /// Bars in the performed piece
    #[arg(long, default_value = "8")]
    bars: usize,

    /// Extra library bars that are never played
    #[arg(long, default_value = "16")]
    distractors: usize,

    /// Notes per bar
    #[arg(long, default_value = "8")]
    notes: usize,

    /// Length of one grid slot (ms)
    #[arg(long, default_value = "250")]
    unit: i64,

    /// Solver worker count
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Tempo factor of the performance (2.0 plays twice as slow)
    #[arg(long, default_value = "1.0")]
    stretch: f64,

    /// Maximum timing error per note (ms)
    #[arg(long, default_value = "0")]
    jitter: i64,

    /// Wrong notes per bar
    #[arg(long, default_value = "0")]
    wrong_notes: usize,

    /// Seed of the generated library and performance
    #[arg(long, default_value = "1")]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("partita=info")),
        )
        .init();

    let args = Args::parse();
    ensure!(args.bars > 0, "--bars must be at least 1");
    ensure!(args.notes > 0 && args.notes <= GRID_SPACES, "--notes must be in 1..={}", GRID_SPACES);
    ensure!(args.unit > 0, "--unit must be positive");
    ensure!(args.stretch > 0.0, "--stretch must be positive");

    let mut generator = SegmentGenerator::new(args.seed);
    let (library, played) = build_library(&mut generator, &args)?;
    let performance = build_performance(&mut generator, &library, &played, &args);

    println!(
        "{} {} bars in library, {} played, {} performed notes",
        "▶".green(),
        library.bar_count(),
        played.len(),
        performance.len()
    );

    let library = Arc::new(library);
    let config = MatcherConfig::default().with_seed(args.seed);
    let follower = LiveFollower::start(
        library.clone(),
        config,
        args.workers,
        performance.pulse_unit,
        performance.pulse_rate,
    )?;

    let started = Instant::now();
    for note in &performance.notes {
        follower.add_note(*note)?;
    }
    follower.flush()?;
    let elapsed = started.elapsed();

    let snapshot = follower.snapshot();
    follower.shutdown()?;

    info!(
        decisions = snapshot.decision_count,
        elapsed_ms = elapsed.as_millis() as u64,
        "performance consumed"
    );

    println!();
    for (i, piece) in snapshot.pieces.iter().enumerate() {
        print_piece(i, piece, &library);
    }
    println!();

    let verdict = format!("longest chain: {} of {} bars", snapshot.max_depth, played.len());
    if snapshot.max_depth == played.len() {
        println!("{} {}", "✓".green(), verdict.green().bold());
    } else {
        println!("{} {}", "✗".yellow(), verdict.yellow().bold());
    }
    println!(
        "  {} notes in {:.1} ms ({:.2} ms/note)",
        snapshot.note_count,
        elapsed.as_secs_f64() * 1000.0,
        elapsed.as_secs_f64() * 1000.0 / snapshot.note_count.max(1) as f64
    );

    Ok(())
}

/// A library with the played piece linked in order and distractors linked
/// among themselves
fn build_library(generator: &mut SegmentGenerator, args: &Args) -> Result<(Library, Vec<BarId>)> {
    let mut library = Library::new();
    let mut bar = |library: &mut Library, label: String| {
        let mut segment = Segment::default();
        generator.create_random_segment_quantized(
            &mut segment,
            args.notes,
            GRID_SPACES,
            args.unit,
            PITCH_LOW..PITCH_HIGH,
        );
        library.add_passage(segment, Some(label))
    };

    let played: Vec<BarId> = (0..args.bars)
        .map(|i| bar(&mut library, format!("Prelude m.{}", i + 1)))
        .collect();
    let distractors: Vec<BarId> = (0..args.distractors)
        .map(|i| bar(&mut library, format!("Fugue m.{}", i + 1)))
        .collect();

    library.link_sequence(&played)?;
    library.link_sequence(&distractors)?;
    Ok((library, played))
}

fn build_performance(
    generator: &mut SegmentGenerator,
    library: &Library,
    played: &[BarId],
    args: &Args,
) -> Segment {
    let mut performance = Segment::default();
    for &id in played {
        let Some(reference) = library.bar_segment(id) else {
            continue;
        };
        let mut bar = SegmentGenerator::copy(reference);
        if args.wrong_notes > 0 {
            generator.remove_random_notes(&mut bar, args.wrong_notes);
            generator.add_random_notes(&mut bar, args.wrong_notes, PITCH_LOW..PITCH_HIGH);
        }
        SegmentGenerator::append(&mut performance, &bar);
    }

    SegmentGenerator::scale(&mut performance, args.stretch);
    generator.jitter(&mut performance, args.jitter);
    performance
}

fn print_piece(index: usize, piece: &MatchedPiece, library: &Library) {
    let (start, end) = piece.time_span().unwrap_or((0, 0));
    println!(
        "{} {} bars, {:.2}s to {:.2}s",
        format!("Piece {}:", index + 1).cyan().bold(),
        piece.len(),
        start as f64 / 1000.0,
        end as f64 / 1000.0
    );

    for bar in &piece.bars {
        let label = library
            .bar(bar.bar)
            .and_then(|b| b.label())
            .map(str::to_string)
            .unwrap_or_else(|| bar.bar.to_string());
        println!(
            "    {:<14} notes {:>4}..{:<4} mapped {:>2}  tempo ×{:.2}  error {:.3}",
            label.white(),
            bar.start_index,
            bar.end_index,
            bar.mapped_notes,
            bar.transform.s,
            bar.average_error
        );
    }
}
