use partita::LiveFollower;
use partita_core::{BarId, Library, MatcherConfig, Note, Segment, SegmentGenerator, Timestamp};
use std::sync::Arc;

const NOTES_PER_BAR: usize = 8;

/// Random quantized bars; bar `b` draws from its own octave-wide pitch band
fn library(generator: &mut SegmentGenerator, bars: usize) -> (Library, Vec<BarId>) {
    let mut library = Library::new();
    let ids: Vec<BarId> = (0..bars)
        .map(|b| {
            let low = 30 + 12 * b as i32;
            let mut segment = Segment::new(1000.0, 1.0);
            generator.create_random_segment_quantized(
                &mut segment,
                NOTES_PER_BAR,
                NOTES_PER_BAR,
                500,
                low..low + 12,
            );
            library.add_passage(segment, Some(format!("bar {}", b + 1)))
        })
        .collect();
    library.link_sequence(&ids).unwrap();
    (library, ids)
}

fn performance(library: &Library, ids: &[BarId]) -> Segment {
    SegmentGenerator::concatenate(ids.iter().filter_map(|&id| library.bar_segment(id)))
}

fn start(library: Library, workers: usize) -> LiveFollower {
    LiveFollower::start(Arc::new(library), MatcherConfig::default(), workers, 1000.0, 1.0).unwrap()
}

#[test]
fn test_follows_played_bars() {
    let mut generator = SegmentGenerator::new(21);
    let (library, ids) = library(&mut generator, 5);
    let performance = performance(&library, &ids);

    let follower = start(library, 2);
    for note in &performance.notes {
        follower.add_note(*note).unwrap();
    }
    follower.flush().unwrap();

    let snapshot = follower.snapshot();
    assert_eq!(snapshot.note_count, performance.len());
    assert_eq!(snapshot.max_depth, ids.len());

    let piece = snapshot.current_piece().unwrap();
    assert_eq!(piece.bar_ids(), ids);
    assert_eq!(piece.bars[0].start_index, 0);

    follower.shutdown().unwrap();
}

#[test]
fn test_follows_slower_performance() {
    let mut generator = SegmentGenerator::new(5);
    let (library, ids) = library(&mut generator, 4);
    let mut performance = performance(&library, &ids);
    SegmentGenerator::scale(&mut performance, 1.25);
    SegmentGenerator::shift(&mut performance, 10_000);

    let follower = start(library, 1);
    for note in &performance.notes {
        follower.add_note(*note).unwrap();
    }
    follower.flush().unwrap();

    let snapshot = follower.snapshot();
    assert_eq!(snapshot.max_depth, ids.len());
    let tempo = snapshot.current_piece().and_then(|p| p.current_tempo()).unwrap();
    assert!((tempo - 0.8).abs() < 1e-3, "tempo {}", tempo);

    follower.shutdown().unwrap();
}

#[test]
fn test_follows_short_bars_beside_a_long_one() {
    let mut generator = SegmentGenerator::new(13);
    let mut library = Library::new();
    let mut bar = |library: &mut Library, notes: usize, low: i32| {
        let mut segment = Segment::new(1000.0, 1.0);
        generator.create_random_segment_quantized(&mut segment, notes, notes, 500, low..low + 12);
        library.add_passage(segment, None)
    };

    let short: Vec<BarId> = (0..3).map(|b| bar(&mut library, 4, 30 + 12 * b)).collect();
    bar(&mut library, 16, 90);
    library.link_sequence(&short).unwrap();
    let performance = performance(&library, &short);

    let follower = start(library, 1);
    for note in &performance.notes {
        follower.add_note(*note).unwrap();
    }
    follower.flush().unwrap();

    let snapshot = follower.snapshot();
    assert_eq!(snapshot.max_depth, 3);
    let piece = snapshot.current_piece().unwrap();
    assert_eq!(piece.bar_ids(), short);
    assert_eq!(piece.bars[2].end_index, 11);

    follower.shutdown().unwrap();
}

#[test]
fn test_withdraw_prunes_published_pieces() {
    let mut generator = SegmentGenerator::new(8);
    let (library, ids) = library(&mut generator, 4);
    let performance = performance(&library, &ids);

    let follower = start(library, 3);
    for note in &performance.notes {
        follower.add_note(*note).unwrap();
    }
    follower.withdraw_from(2 * NOTES_PER_BAR).unwrap();
    follower.flush().unwrap();

    let snapshot = follower.snapshot();
    assert_eq!(snapshot.note_count, 2 * NOTES_PER_BAR);
    assert_eq!(snapshot.max_depth, 2);
    assert!(snapshot
        .pieces
        .iter()
        .flat_map(|piece| &piece.bars)
        .all(|bar| bar.end_index < 2 * NOTES_PER_BAR));

    follower.shutdown().unwrap();
}

#[test]
fn test_unknown_notes_produce_no_pieces() {
    let mut generator = SegmentGenerator::new(2);
    let (library, _) = library(&mut generator, 3);

    let follower = start(library, 2);
    for i in 0..20 {
        follower.add_note(Note::new(127, i as Timestamp * 300)).unwrap();
    }
    follower.flush().unwrap();

    let snapshot = follower.snapshot();
    assert_eq!(snapshot.note_count, 20);
    assert!(snapshot.pieces.is_empty());
    assert_eq!(snapshot.max_depth, 0);
}

#[test]
fn test_invalid_worker_count_fails_to_start() {
    let result = LiveFollower::start(
        Arc::new(Library::new()),
        MatcherConfig::default(),
        0,
        1000.0,
        1.0,
    );
    assert!(result.is_err());
}
