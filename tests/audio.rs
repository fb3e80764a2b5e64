//! Playback queue discipline tests
//!
//! The queue carries the ordering and flush-barrier guarantees; these tests
//! stand in for the device consumer by popping directly.

use std::time::Duration;

use parley::audio::{AudioFrame, PlaybackQueue};

fn frame(seq: u64) -> AudioFrame {
    AudioFrame::new(seq, vec![seq as i16; 160])
}

#[test]
fn test_frames_play_in_enqueue_order_exactly_once() {
    let queue = PlaybackQueue::with_capacity(16);
    let generation = queue.generation();

    for seq in 0..10 {
        assert!(queue.enqueue(frame(seq), generation));
    }

    let mut played = Vec::new();
    while let Some(f) = queue.try_pop() {
        played.push(f.seq);
    }
    assert_eq!(played, (0..10).collect::<Vec<_>>());

    // Nothing plays twice
    assert!(queue.try_pop().is_none());
}

#[test]
fn test_flush_discards_queued_frames() {
    let queue = PlaybackQueue::with_capacity(16);
    let generation = queue.generation();

    for seq in 0..5 {
        queue.enqueue(frame(seq), generation);
    }

    let drained = queue.flush();
    assert_eq!(drained, 5);
    assert!(queue.is_empty());
    assert!(queue.try_pop().is_none());
}

#[test]
fn test_stale_generation_rejected_after_flush() {
    let queue = PlaybackQueue::with_capacity(16);
    let old_generation = queue.generation();

    queue.enqueue(frame(0), old_generation);
    queue.flush();

    // A producer still holding the pre-flush generation must not land
    // audio behind the barrier
    assert!(!queue.enqueue(frame(1), old_generation));
    assert!(queue.is_empty());

    // A producer that re-reads the generation proceeds normally
    let new_generation = queue.generation();
    assert!(queue.enqueue(frame(2), new_generation));
    assert_eq!(queue.try_pop().unwrap().seq, 2);
}

#[test]
fn test_flush_establishes_barrier_between_turns() {
    let queue = PlaybackQueue::with_capacity(16);

    // Old turn enqueues some frames, two get "played"
    let old_generation = queue.generation();
    for seq in 0..4 {
        queue.enqueue(frame(seq), old_generation);
    }
    assert_eq!(queue.try_pop().unwrap().seq, 0);
    assert_eq!(queue.try_pop().unwrap().seq, 1);

    // Barge-in: flush, then a new turn enqueues
    queue.flush();
    let new_generation = queue.generation();
    for seq in 100..103 {
        queue.enqueue(frame(seq), new_generation);
    }

    // Straggler from the cancelled turn arrives late
    assert!(!queue.enqueue(frame(4), old_generation));

    // Only the new turn's frames play, in order
    let mut played = Vec::new();
    while let Some(f) = queue.try_pop() {
        played.push(f.seq);
    }
    assert_eq!(played, vec![100, 101, 102]);
}

#[test]
fn test_pop_timeout_bounded_wait() {
    let queue = PlaybackQueue::with_capacity(4);

    let start = std::time::Instant::now();
    assert!(queue.pop_timeout(Duration::from_millis(50)).is_none());
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_pop_timeout_wakes_on_enqueue() {
    let queue = PlaybackQueue::with_capacity(4);
    let producer = std::sync::Arc::clone(&queue);

    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        let generation = producer.generation();
        producer.enqueue(frame(7), generation);
    });

    let popped = queue.pop_timeout(Duration::from_secs(2));
    assert_eq!(popped.unwrap().seq, 7);
    handle.join().unwrap();
}

#[test]
fn test_closed_queue_rejects_enqueue() {
    let queue = PlaybackQueue::with_capacity(4);
    let generation = queue.generation();

    queue.enqueue(frame(0), generation);
    queue.close();

    assert!(!queue.enqueue(frame(1), generation));
    // Whatever was queued before close still drains
    assert_eq!(queue.try_pop().unwrap().seq, 0);
    assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
}

#[test]
fn test_concurrent_producer_consumer_preserves_order() {
    let queue = PlaybackQueue::with_capacity(8);
    let producer = std::sync::Arc::clone(&queue);

    let handle = std::thread::spawn(move || {
        let generation = producer.generation();
        for seq in 0..50 {
            // Bounded queue: enqueue blocks until the consumer catches up
            assert!(producer.enqueue(frame(seq), generation));
        }
    });

    let mut played = Vec::new();
    while played.len() < 50 {
        if let Some(f) = queue.pop_timeout(Duration::from_secs(2)) {
            played.push(f.seq);
        } else {
            break;
        }
    }
    handle.join().unwrap();

    assert_eq!(played, (0..50).collect::<Vec<_>>());
}
