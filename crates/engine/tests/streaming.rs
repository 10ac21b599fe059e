// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! End-to-end frame flow through managed pipelines.

use castkit_core::filter::DEFAULT_ID;
use castkit_core::path::Path;
use castkit_core::queue::{ForcePolicy, FrameQueue};
use castkit_core::{shared, Reader, Writer};
use castkit_engine::pipeline::PipelineManager;
use castkit_filters::test_utils::{
    byte_format, feed_filter, pull_bytes, push_bytes, tap_filter, Identity, SelectFirst,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn pull_with_timeout(reader: &Reader, timeout: Duration) -> Option<(Vec<u8>, u64)> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(out) = pull_bytes(reader) {
            return Some(out);
        }
        if Instant::now() > deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Two identity filters in a row, driven by their workers: payloads and
/// timestamps come out unchanged and in order.
#[test]
fn pass_through_chain_preserves_frames() {
    let mut manager = PipelineManager::new();
    manager.add_filter(10, shared(Identity::new())).expect("add A");
    manager.add_filter(11, shared(Identity::new())).expect("add B");

    let (input, output) = {
        let a = manager.get_filter(10).expect("A");
        let b = manager.get_filter(11).expect("B");
        let Ok(mut a) = a.lock() else { panic!("A lock") };
        let Ok(mut b) = b.lock() else { panic!("B lock") };
        (feed_filter(&mut *a, DEFAULT_ID, byte_format()), tap_filter(&mut *b, DEFAULT_ID))
    };

    manager.add_path(1, Path::new(vec![10, 11])).expect("path");
    manager.add_workers_to_path(1).expect("workers");
    manager.connect_path(1).expect("connect");

    for (byte, pts) in [(0x01u8, 1000u64), (0x02, 2000), (0x03, 3000)] {
        push_bytes(&input, &[byte], pts);
        std::thread::sleep(Duration::from_millis(1));
    }

    for (byte, pts) in [(0x01u8, 1000u64), (0x02, 2000), (0x03, 3000)] {
        let (payload, got_pts) =
            pull_with_timeout(&output, Duration::from_secs(2)).expect("frame delivered");
        assert_eq!(payload, vec![byte]);
        assert_eq!(got_pts, pts);
    }

    manager.shutdown();
}

/// Fan-in with one silent input: the live input's throughput is unaffected,
/// and removing the silent reader does not perturb it.
#[test]
fn fan_in_ignores_silent_input() {
    let mut select = SelectFirst::new(2);
    let live = feed_filter(&mut select, 1, byte_format());
    let silent = feed_filter(&mut select, 2, byte_format());
    let output = tap_filter(&mut select, DEFAULT_ID);

    use castkit_core::filter::Filter;
    for b in 0..4u8 {
        push_bytes(&live, &[b], u64::from(b));
        select.process();
    }
    for b in 0..4u8 {
        assert_eq!(pull_bytes(&output), Some((vec![b], u64::from(b))));
    }

    // Drop the silent input entirely.
    let removed = select.core_mut().remove_reader(2).expect("reader 2 registered");
    removed.disconnect();
    drop(silent);

    for b in 4..8u8 {
        push_bytes(&live, &[b], u64::from(b));
        select.process();
    }
    for b in 4..8u8 {
        assert_eq!(pull_bytes(&output), Some((vec![b], u64::from(b))));
    }
}

/// Producer overruns a 2-slot queue while the consumer keeps half the pace:
/// the tail is dropped, nothing blocks, and every frame is accounted for.
#[test]
fn overload_drops_tail_without_blocking() {
    let queue = Arc::new(FrameQueue::new(2, byte_format(), ForcePolicy::Duplicate));
    let mut writer = Writer::new();
    writer.set_queue(queue.clone());
    let reader = Reader::new();
    assert!(writer.connect(&reader));

    let mut delivered = 0u64;
    let mut last_seen = -1i64;
    for i in 0..200u64 {
        push_bytes(&writer, &[(i % 251) as u8], i);

        // Consumer runs at half the producer's rate.
        if i % 2 == 1 {
            if let Some((_, pts)) = pull_bytes(&reader) {
                // FIFO: timestamps only move forward, even across drops.
                assert!((pts as i64) > last_seen, "pts {pts} after {last_seen}");
                last_seen = pts as i64;
                delivered += 1;
            }
        }
    }

    assert_eq!(delivered, 100);
    assert_eq!(queue.overwrite_count(), 99);
    assert_eq!(queue.pending_frames(), 1);
}

/// A sink that must keep playing out duplicates the last frame on underrun.
#[test]
fn sink_underrun_repeats_last_frame() {
    let mut filter = Identity::new();
    let input = feed_filter(&mut filter, DEFAULT_ID, byte_format());
    let output = tap_filter(&mut filter, DEFAULT_ID);
    use castkit_core::filter::Filter;

    push_bytes(&input, &[0x55], 9);
    filter.process();
    assert_eq!(pull_bytes(&output), Some((vec![0x55], 9)));

    // Underrun: the playout side forces and gets the retired frame again.
    let repeated = output.get_frame(true).expect("duplicate frame");
    assert_eq!(repeated.lock().payload(), &[0x55]);
}
