// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Small filters and harness helpers shared by unit and integration tests.
//!
//! These are real filters - an identity pass-through, a first-input selector,
//! a fan-out duplicator and a partition-summing master/slave family - kept
//! public so the engine's integration tests and demo wiring can reuse them.

use castkit_core::filter::{Filter, FilterCore, FilterKind, ProcessOutcome, StepVerdict};
use castkit_core::frame::{AudioFormat, Frame, FrameFormat, SampleFormat};
use castkit_core::io::{Reader, Writer};
use castkit_core::queue::{ForcePolicy, FrameQueue};
use castkit_core::{ReaderId, WriterId};
use std::sync::{Arc, Mutex};

/// A compact S16 mono format for byte-oriented tests.
#[must_use]
pub fn byte_format() -> FrameFormat {
    FrameFormat::Audio(AudioFormat {
        sample_format: SampleFormat::S16,
        channels: 1,
        sample_rate: 8000,
        samples_per_frame: 256,
    })
}

/// Connects a bare test writer to `filter`'s reader `reader_id`.
///
/// The returned writer feeds the filter the way a source adapter would.
pub fn feed_filter(filter: &mut dyn Filter, reader_id: ReaderId, format: FrameFormat) -> Writer {
    feed_filter_with_slots(filter, reader_id, format, 4)
}

/// As [`feed_filter`], with an explicit queue capacity.
pub fn feed_filter_with_slots(
    filter: &mut dyn Filter,
    reader_id: ReaderId,
    format: FrameFormat,
    slots: usize,
) -> Writer {
    let queue = Arc::new(FrameQueue::new(slots, format, ForcePolicy::Duplicate));
    let reader = filter.set_reader(reader_id, &queue).expect("reader slot available");
    let mut writer = Writer::new();
    writer.set_queue(queue);
    assert!(writer.connect(&reader));
    writer
}

/// Attaches a bare test reader to `filter`'s writer `writer_id`.
///
/// The returned reader drains the filter the way a sink adapter would.
pub fn tap_filter(filter: &mut dyn Filter, writer_id: WriterId) -> Arc<Reader> {
    let queue = filter.alloc_queue(writer_id);
    let reader = Arc::new(Reader::new());
    let mut writer = Writer::new();
    writer.set_queue(queue);
    assert!(writer.connect(&reader));
    filter.core_mut().insert_writer(writer_id, writer).expect("writer slot available");
    reader
}

/// Pushes one payload through a test writer, forcing on overload.
pub fn push_bytes(writer: &Writer, bytes: &[u8], presentation_us: u64) {
    let rear = writer.get_frame(true).expect("rear slot");
    rear.lock().fill_from(bytes, presentation_us);
    writer.add_frame();
}

/// Pops one payload from a test reader, if any.
#[must_use]
pub fn pull_bytes(reader: &Reader) -> Option<(Vec<u8>, u64)> {
    let front = reader.get_frame(false)?;
    let out = {
        let frame = front.lock();
        (frame.payload().to_vec(), frame.presentation_us())
    };
    drop(front);
    reader.remove_frame();
    Some(out)
}

/// One-to-one identity: copies payload and timestamp through unchanged.
pub struct Identity {
    core: FilterCore,
    format: FrameFormat,
    slots: usize,
}

impl Identity {
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue(byte_format(), 4)
    }

    #[must_use]
    pub fn with_queue(format: FrameFormat, slots: usize) -> Self {
        Self { core: FilterCore::one_to_one(), format, slots }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Identity {
    fn kind(&self) -> FilterKind {
        FilterKind::Custom
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn alloc_queue(&self, _writer_id: WriterId) -> Arc<FrameQueue> {
        Arc::new(FrameQueue::new(self.slots, self.format, ForcePolicy::Duplicate))
    }

    fn process(&mut self) -> ProcessOutcome {
        self.core.step_one_to_one(|src, dst| {
            if dst.copy_payload_from(src) {
                StepVerdict::Emit
            } else {
                StepVerdict::Discard
            }
        })
    }
}

/// Many-to-one selector: emits the lowest-id live input, ignores the rest.
pub struct SelectFirst {
    core: FilterCore,
    format: FrameFormat,
}

impl SelectFirst {
    #[must_use]
    pub fn new(inputs: usize) -> Self {
        Self { core: FilterCore::many_to_one(inputs), format: byte_format() }
    }
}

impl Filter for SelectFirst {
    fn kind(&self) -> FilterKind {
        FilterKind::Custom
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn alloc_queue(&self, _writer_id: WriterId) -> Arc<FrameQueue> {
        Arc::new(FrameQueue::new(4, self.format, ForcePolicy::Duplicate))
    }

    fn process(&mut self) -> ProcessOutcome {
        self.core.step_many_to_one(|inputs, dst| {
            for (_, frame) in inputs {
                if let Some(frame) = frame {
                    if dst.copy_payload_from(frame) {
                        return StepVerdict::Emit;
                    }
                }
            }
            StepVerdict::Hold
        })
    }
}

/// One-to-many duplicator: every output gets a copy of the input frame.
pub struct Duplicator {
    core: FilterCore,
    format: FrameFormat,
}

impl Duplicator {
    #[must_use]
    pub fn new(outputs: usize) -> Self {
        Self { core: FilterCore::one_to_many(outputs), format: byte_format() }
    }
}

impl Filter for Duplicator {
    fn kind(&self) -> FilterKind {
        FilterKind::VideoSplitter
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn alloc_queue(&self, _writer_id: WriterId) -> Arc<FrameQueue> {
        Arc::new(FrameQueue::new(4, self.format, ForcePolicy::Duplicate))
    }

    fn process(&mut self) -> ProcessOutcome {
        self.core.step_one_to_many(|src, slots| {
            for slot in slots.iter_mut() {
                if slot.frame.copy_payload_from(src) {
                    slot.produced = true;
                }
            }
            StepVerdict::Emit
        })
    }
}

/// Shared partial results for the partition-sum family.
pub type Partials = Arc<Mutex<Vec<f32>>>;

/// Allocates zeroed partials for `slaves` slaves.
#[must_use]
pub fn new_partials(slaves: usize) -> Partials {
    Arc::new(Mutex::new(vec![0.0; slaves]))
}

/// Master side of a parallel sum: shares the input frame, then merges the
/// slaves' partials into a single f32 scalar output.
pub struct PartitionSumMaster {
    core: FilterCore,
    partials: Partials,
}

impl PartitionSumMaster {
    #[must_use]
    pub fn new(partials: Partials) -> Self {
        Self { core: FilterCore::one_to_one(), partials }
    }
}

impl Filter for PartitionSumMaster {
    fn kind(&self) -> FilterKind {
        FilterKind::Custom
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn alloc_queue(&self, _writer_id: WriterId) -> Arc<FrameQueue> {
        Arc::new(FrameQueue::new(4, byte_format(), ForcePolicy::Duplicate))
    }

    fn process(&mut self) -> ProcessOutcome {
        // Driven by a Master worker; the simple step never runs.
        ProcessOutcome::Idle
    }

    fn share_frame(&mut self) -> Option<Arc<Frame>> {
        let reader = self.core.reader(castkit_core::DEFAULT_ID)?.clone();
        let writer_ready =
            self.core.writer(castkit_core::DEFAULT_ID).is_some_and(|w| w.get_frame(false).is_some());
        if !writer_ready {
            return None;
        }
        let front = reader.get_frame(false)?;
        let frame = front.lock().clone();
        Some(Arc::new(frame))
    }

    fn finish_cycle(&mut self) -> ProcessOutcome {
        let total: f32 = match self.partials.lock() {
            Ok(mut partials) => {
                let total = partials.iter().sum();
                partials.fill(0.0);
                total
            },
            Err(_) => return ProcessOutcome::Idle,
        };
        self.core.step_one_to_one(|src, dst| {
            dst.buffer_mut()[..4].copy_from_slice(&total.to_le_bytes());
            dst.set_len(4);
            dst.set_presentation_us(src.presentation_us());
            StepVerdict::Emit
        })
    }
}

/// Slave side of a parallel sum: adds up its share of the S16 samples.
pub struct PartitionSlave {
    core: FilterCore,
    index: usize,
    total: usize,
    partials: Partials,
}

impl PartitionSlave {
    #[must_use]
    pub fn new(index: usize, total: usize, partials: Partials) -> Self {
        Self { core: FilterCore::one_to_one(), index, total, partials }
    }
}

impl Filter for PartitionSlave {
    fn kind(&self) -> FilterKind {
        FilterKind::Custom
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn alloc_queue(&self, _writer_id: WriterId) -> Arc<FrameQueue> {
        Arc::new(FrameQueue::new(4, byte_format(), ForcePolicy::Duplicate))
    }

    fn process(&mut self) -> ProcessOutcome {
        ProcessOutcome::Idle
    }

    fn process_partition(&mut self, origin: &Frame) -> bool {
        let payload = origin.payload();
        let samples = payload.len() / 2;
        let begin = self.index * samples / self.total;
        let end = (self.index + 1) * samples / self.total;

        let mut sum = 0.0f32;
        for i in begin..end {
            let raw = i16::from_le_bytes([payload[2 * i], payload[2 * i + 1]]);
            sum += f32::from(raw);
        }
        if let Ok(mut partials) = self.partials.lock() {
            if let Some(slot) = partials.get_mut(self.index) {
                *slot = sum;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castkit_core::worker::{Master, Slave, Worker};
    use castkit_core::{shared, DEFAULT_ID};
    use std::time::{Duration, Instant};

    #[test]
    fn identity_round_trips_payloads() {
        let mut filter = Identity::new();
        let input = feed_filter(&mut filter, DEFAULT_ID, byte_format());
        let output = tap_filter(&mut filter, DEFAULT_ID);

        push_bytes(&input, &[1, 2, 3], 5);
        filter.process();
        assert_eq!(pull_bytes(&output), Some((vec![1, 2, 3], 5)));
    }

    #[test]
    fn partition_sum_across_four_slaves() {
        let partials = new_partials(4);
        let master_filter = shared(PartitionSumMaster::new(partials.clone()));

        let (input, output) = {
            let Ok(mut locked) = master_filter.lock() else { unreachable!() };
            let format = FrameFormat::Audio(AudioFormat {
                sample_format: SampleFormat::S16,
                channels: 1,
                sample_rate: 8000,
                samples_per_frame: 400,
            });
            (feed_filter(&mut *locked, DEFAULT_ID, format), tap_filter(&mut *locked, DEFAULT_ID))
        };

        let mut master = Master::new(master_filter);
        for i in 0..4 {
            let slave_filter = shared(PartitionSlave::new(i, 4, partials.clone()));
            assert!(master.add_slave(Slave::new(i, slave_filter)));
        }

        // 400 samples of value 1.
        let mut bytes = Vec::new();
        for _ in 0..400 {
            bytes.extend_from_slice(&1i16.to_le_bytes());
        }
        push_bytes(&input, &bytes, 99);

        assert!(master.start());
        let deadline = Instant::now() + Duration::from_secs(2);
        let result = loop {
            if let Some((payload, pts)) = pull_bytes(&output) {
                break Some((payload, pts));
            }
            if Instant::now() > deadline {
                break None;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        master.stop();

        let (payload, pts) = result.expect("master produced the merged frame");
        assert_eq!(pts, 99);
        let total = f32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        assert!((total - 400.0).abs() < f32::EPSILON, "got {total}");
    }
}
