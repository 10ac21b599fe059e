// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The filter model: graph nodes with a fixed arity.
//!
//! Every filter owns a bounded map of [`Reader`]s and a bounded map of
//! [`Writer`]s and exposes one `process()` scheduling step. The per-arity step
//! contracts live here as drivers on [`FilterCore`]; concrete filters call the
//! driver matching their arity and provide the frame-transforming closure.
//!
//! Graph mutations (connect/disconnect) follow one protocol regardless of
//! arity: the origin allocates the queue, the destination registers a reader
//! for it, and the new writer hands the queue across. See [`connect_filters`].

use crate::error::{CastError, Result};
use crate::events::EventResponse;
use crate::frame::Frame;
use crate::io::{FrameRef, Reader, Writer};
use crate::queue::FrameQueue;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type FilterId = u32;
pub type ReaderId = u32;
pub type WriterId = u32;

/// Reader/writer id used when a path does not pick one explicitly.
pub const DEFAULT_ID: u32 = 1;

/// What a filter's step did, as seen by the driving worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A frame was examined; pace by the filter's frame time.
    Worked,
    /// An endpoint was unavailable; take the short idle sleep.
    Idle,
}

/// Per-step decision returned by a filter's frame closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    /// Commit produced rears, then retire the consumed fronts.
    Emit,
    /// Retire the consumed fronts without producing (poisoned input).
    Discard,
    /// Commit nothing; the same input is offered again next step.
    Hold,
}

/// Filter type tags, used for registry lookups and state reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Receiver,
    Transmitter,
    AudioMixer,
    AudioEncoder,
    VideoSplitter,
    Custom,
}

/// One output slot offered to a one-to-many or many-to-many closure.
///
/// The closure sets `produced` on every slot it filled; only those rears are
/// committed on [`StepVerdict::Emit`].
pub struct WriterSlot<'a> {
    pub id: WriterId,
    pub frame: &'a mut Frame,
    pub produced: bool,
}

/// Shared state of every filter: bounded endpoint maps and pacing budget.
pub struct FilterCore {
    max_readers: usize,
    max_writers: usize,
    readers: BTreeMap<ReaderId, Arc<Reader>>,
    writers: BTreeMap<WriterId, Writer>,
    frame_time: Duration,
}

impl FilterCore {
    /// One-to-one arity.
    #[must_use]
    pub fn one_to_one() -> Self {
        Self::with_arity(1, 1)
    }

    /// Many-to-one arity with `inputs` reader slots.
    #[must_use]
    pub fn many_to_one(inputs: usize) -> Self {
        Self::with_arity(inputs, 1)
    }

    /// One-to-many arity with `outputs` writer slots.
    #[must_use]
    pub fn one_to_many(outputs: usize) -> Self {
        Self::with_arity(1, outputs)
    }

    /// Many-to-many arity.
    #[must_use]
    pub fn many_to_many(inputs: usize, outputs: usize) -> Self {
        Self::with_arity(inputs, outputs)
    }

    fn with_arity(max_readers: usize, max_writers: usize) -> Self {
        Self {
            max_readers: max_readers.max(1),
            max_writers: max_writers.max(1),
            readers: BTreeMap::new(),
            writers: BTreeMap::new(),
            frame_time: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn max_readers(&self) -> usize {
        self.max_readers
    }

    #[must_use]
    pub fn max_writers(&self) -> usize {
        self.max_writers
    }

    /// Pacing budget for the driving worker; zero disables pacing.
    #[must_use]
    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    /// Derives the pacing budget from a frame-rate cap; `0` disables pacing.
    pub fn set_max_fps(&mut self, max_fps: u32) {
        self.frame_time = if max_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(1_000_000 / u64::from(max_fps))
        };
    }

    /// Registers a new reader slot, refusing duplicates and arity overflow.
    pub fn insert_reader(&mut self, id: ReaderId) -> Option<Arc<Reader>> {
        if self.readers.contains_key(&id) || self.readers.len() >= self.max_readers {
            return None;
        }
        let reader = Arc::new(Reader::new());
        self.readers.insert(id, reader.clone());
        Some(reader)
    }

    /// Registers a connected writer, refusing duplicates and arity overflow.
    pub fn insert_writer(&mut self, id: WriterId, writer: Writer) -> Result<()> {
        if self.writers.contains_key(&id) {
            return Err(CastError::Configuration(format!("duplicate writer id {id}")));
        }
        if self.writers.len() >= self.max_writers {
            return Err(CastError::Configuration(format!(
                "writer capacity {} exceeded",
                self.max_writers
            )));
        }
        self.writers.insert(id, writer);
        Ok(())
    }

    #[must_use]
    pub fn reader(&self, id: ReaderId) -> Option<&Arc<Reader>> {
        self.readers.get(&id)
    }

    #[must_use]
    pub fn writer(&self, id: WriterId) -> Option<&Writer> {
        self.writers.get(&id)
    }

    pub fn remove_reader(&mut self, id: ReaderId) -> Option<Arc<Reader>> {
        self.readers.remove(&id)
    }

    pub fn remove_writer(&mut self, id: WriterId) -> Option<Writer> {
        self.writers.remove(&id)
    }

    pub fn reader_ids(&self) -> impl Iterator<Item = ReaderId> + '_ {
        self.readers.keys().copied()
    }

    pub fn writer_ids(&self) -> impl Iterator<Item = WriterId> + '_ {
        self.writers.keys().copied()
    }

    /// Disconnects every endpoint. Used on teardown.
    pub fn disconnect_all(&mut self) {
        for writer in self.writers.values_mut() {
            writer.disconnect();
        }
        for reader in self.readers.values() {
            reader.disconnect();
        }
        self.writers.clear();
        self.readers.clear();
    }

    /// One-to-one step: single front, single rear, one transform.
    ///
    /// On [`StepVerdict::Emit`] the rear is committed before the front is
    /// retired, so a consumer never observes a gap.
    pub fn step_one_to_one(
        &mut self,
        f: impl FnOnce(&Frame, &mut Frame) -> StepVerdict,
    ) -> ProcessOutcome {
        let Some(reader) = self.readers.values().next() else { return ProcessOutcome::Idle };
        let Some(writer) = self.writers.values().next() else { return ProcessOutcome::Idle };
        let Some(src) = reader.get_frame(false) else { return ProcessOutcome::Idle };
        let Some(dst) = writer.get_frame(false) else { return ProcessOutcome::Idle };

        let verdict = {
            let src_frame = src.lock();
            let mut dst_frame = dst.lock();
            f(&src_frame, &mut dst_frame)
        };
        match verdict {
            StepVerdict::Emit => {
                writer.add_frame();
                reader.remove_frame();
            },
            StepVerdict::Discard => {
                reader.remove_frame();
            },
            StepVerdict::Hold => {},
        }
        ProcessOutcome::Worked
    }

    /// Many-to-one step: the closure sees `(reader id, Option<frame>)` for
    /// every registered input, absent inputs as `None`, and decides whether
    /// it has enough to emit. Only non-nil fronts are retired.
    pub fn step_many_to_one(
        &mut self,
        f: impl FnOnce(&[(ReaderId, Option<&Frame>)], &mut Frame) -> StepVerdict,
    ) -> ProcessOutcome {
        let Some(writer) = self.writers.values().next() else { return ProcessOutcome::Idle };
        let Some(dst) = writer.get_frame(false) else { return ProcessOutcome::Idle };

        let refs: Vec<(ReaderId, Option<FrameRef>)> =
            self.readers.iter().map(|(id, r)| (*id, r.get_frame(false))).collect();
        if refs.iter().all(|(_, r)| r.is_none()) {
            return ProcessOutcome::Idle;
        }

        let verdict = {
            let guards: Vec<(ReaderId, Option<std::sync::MutexGuard<'_, Frame>>)> =
                refs.iter().map(|(id, r)| (*id, r.as_ref().map(FrameRef::lock))).collect();
            let frames: Vec<(ReaderId, Option<&Frame>)> =
                guards.iter().map(|(id, g)| (*id, g.as_deref())).collect();
            let mut dst_frame = dst.lock();
            f(&frames, &mut dst_frame)
        };
        match verdict {
            StepVerdict::Emit => {
                writer.add_frame();
                self.retire_fronts(&refs);
            },
            StepVerdict::Discard => self.retire_fronts(&refs),
            StepVerdict::Hold => {},
        }
        ProcessOutcome::Worked
    }

    /// One-to-many step: one front fanned into every available rear. The
    /// closure marks the slots it produced; those rears are committed, then
    /// the single front is retired.
    pub fn step_one_to_many(
        &mut self,
        f: impl FnOnce(&Frame, &mut [WriterSlot<'_>]) -> StepVerdict,
    ) -> ProcessOutcome {
        let Some(reader) = self.readers.values().next() else { return ProcessOutcome::Idle };
        let Some(src) = reader.get_frame(false) else { return ProcessOutcome::Idle };

        let rears: Vec<(WriterId, FrameRef)> = self
            .writers
            .iter()
            .filter_map(|(id, w)| w.get_frame(false).map(|r| (*id, r)))
            .collect();
        if rears.is_empty() {
            return ProcessOutcome::Idle;
        }

        let (verdict, produced) = {
            let mut guards: Vec<(WriterId, std::sync::MutexGuard<'_, Frame>)> =
                rears.iter().map(|(id, r)| (*id, r.lock())).collect();
            let mut slots: Vec<WriterSlot<'_>> = guards
                .iter_mut()
                .map(|(id, g)| WriterSlot { id: *id, frame: &mut **g, produced: false })
                .collect();
            let src_frame = src.lock();
            let verdict = f(&src_frame, &mut slots);
            let produced: Vec<WriterId> =
                slots.iter().filter(|s| s.produced).map(|s| s.id).collect();
            (verdict, produced)
        };
        match verdict {
            StepVerdict::Emit => {
                for id in &produced {
                    if let Some(writer) = self.writers.get(id) {
                        writer.add_frame();
                    }
                }
                reader.remove_frame();
            },
            StepVerdict::Discard => {
                reader.remove_frame();
            },
            StepVerdict::Hold => {},
        }
        ProcessOutcome::Worked
    }

    /// Many-to-many step: the union of the two above.
    pub fn step_many_to_many(
        &mut self,
        f: impl FnOnce(&[(ReaderId, Option<&Frame>)], &mut [WriterSlot<'_>]) -> StepVerdict,
    ) -> ProcessOutcome {
        let refs: Vec<(ReaderId, Option<FrameRef>)> =
            self.readers.iter().map(|(id, r)| (*id, r.get_frame(false))).collect();
        if refs.iter().all(|(_, r)| r.is_none()) {
            return ProcessOutcome::Idle;
        }

        let rears: Vec<(WriterId, FrameRef)> = self
            .writers
            .iter()
            .filter_map(|(id, w)| w.get_frame(false).map(|r| (*id, r)))
            .collect();
        if rears.is_empty() {
            return ProcessOutcome::Idle;
        }

        let (verdict, produced) = {
            let guards: Vec<(ReaderId, Option<std::sync::MutexGuard<'_, Frame>>)> =
                refs.iter().map(|(id, r)| (*id, r.as_ref().map(FrameRef::lock))).collect();
            let frames: Vec<(ReaderId, Option<&Frame>)> =
                guards.iter().map(|(id, g)| (*id, g.as_deref())).collect();
            let mut rear_guards: Vec<(WriterId, std::sync::MutexGuard<'_, Frame>)> =
                rears.iter().map(|(id, r)| (*id, r.lock())).collect();
            let mut slots: Vec<WriterSlot<'_>> = rear_guards
                .iter_mut()
                .map(|(id, g)| WriterSlot { id: *id, frame: &mut **g, produced: false })
                .collect();
            let verdict = f(&frames, &mut slots);
            let produced: Vec<WriterId> =
                slots.iter().filter(|s| s.produced).map(|s| s.id).collect();
            (verdict, produced)
        };
        match verdict {
            StepVerdict::Emit => {
                for id in &produced {
                    if let Some(writer) = self.writers.get(id) {
                        writer.add_frame();
                    }
                }
                self.retire_fronts(&refs);
            },
            StepVerdict::Discard => self.retire_fronts(&refs),
            StepVerdict::Hold => {},
        }
        ProcessOutcome::Worked
    }

    fn retire_fronts(&self, refs: &[(ReaderId, Option<FrameRef>)]) {
        for (id, frame) in refs {
            if frame.is_some() {
                if let Some(reader) = self.readers.get(id) {
                    reader.remove_frame();
                }
            }
        }
    }
}

/// A graph node with a fixed arity that transforms input frames into output
/// frames. Driven by a [`crate::worker::Worker`] and reconfigured through its
/// event map.
pub trait Filter: Send {
    fn kind(&self) -> FilterKind;

    fn core(&self) -> &FilterCore;

    fn core_mut(&mut self) -> &mut FilterCore;

    /// Allocates the queue a downstream connection will read from. The filter
    /// picks slot count, frame format and force policy.
    fn alloc_queue(&self, writer_id: WriterId) -> Arc<FrameQueue>;

    /// Registers a reader for `queue`. `None` when the id exists already or
    /// the arity is saturated. The queue itself is attached by the connecting
    /// writer.
    fn set_reader(&mut self, id: ReaderId, queue: &Arc<FrameQueue>) -> Option<Arc<Reader>> {
        let _ = queue;
        self.core_mut().insert_reader(id)
    }

    /// One scheduling step; see the per-arity drivers on [`FilterCore`].
    fn process(&mut self) -> ProcessOutcome;

    /// Dispatches a control event against this filter's event map.
    fn process_event(&mut self, action: &str, params: &serde_json::Value) -> EventResponse {
        let _ = params;
        tracing::warn!(action, "unknown filter event");
        EventResponse::unknown_action()
    }

    /// Pacing budget for the driving worker.
    fn frame_time(&self) -> Duration {
        self.core().frame_time()
    }

    /// Cooperative teardown hook for filters owning external resources.
    fn stop(&mut self) {}

    /// Master/slave hook: grab the cycle's input frame if a step is possible.
    ///
    /// The default (`None`) marks the filter as not parallelizable.
    fn share_frame(&mut self) -> Option<Arc<Frame>> {
        None
    }

    /// Master/slave hook: one slave's share of work on the cycle's frame.
    fn process_partition(&mut self, origin: &Frame) -> bool {
        let _ = origin;
        false
    }

    /// Master/slave hook: merge the slaves' partial results and commit.
    fn finish_cycle(&mut self) -> ProcessOutcome {
        ProcessOutcome::Idle
    }
}

impl std::fmt::Debug for dyn Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dyn Filter({:?})", self.kind())
    }
}

/// A filter shared between its worker and the control plane.
pub type SharedFilter = Arc<Mutex<dyn Filter>>;

/// Wraps a filter for sharing.
pub fn shared<F: Filter + 'static>(filter: F) -> SharedFilter {
    Arc::new(Mutex::new(filter))
}

/// Connects `origin`'s writer `writer_id` to `dest`'s reader `reader_id`.
///
/// Protocol: origin allocates the queue, dest registers a reader, the writer
/// hands the queue across and flips it live. Any failure leaves both filters
/// untouched.
pub fn connect_filters(
    origin: &mut dyn Filter,
    dest: &mut dyn Filter,
    writer_id: WriterId,
    reader_id: ReaderId,
) -> Result<()> {
    let core = origin.core();
    if core.writer(writer_id).is_some() {
        return Err(CastError::Configuration(format!("duplicate writer id {writer_id}")));
    }
    if core.writers.len() >= core.max_writers {
        return Err(CastError::Configuration(format!(
            "writer capacity {} exceeded",
            core.max_writers
        )));
    }

    let queue = origin.alloc_queue(writer_id);
    let Some(reader) = dest.set_reader(reader_id, &queue) else {
        return Err(CastError::Configuration(format!(
            "destination refused reader id {reader_id}"
        )));
    };

    let mut writer = Writer::new();
    writer.set_queue(queue);
    if !writer.connect(&reader) {
        dest.core_mut().remove_reader(reader_id);
        return Err(CastError::Runtime("writer connect failed".to_string()));
    }
    origin.core_mut().insert_writer(writer_id, writer)
}

/// Reverses [`connect_filters`]: detaches both endpoints and lets the queue
/// drop with the last handle.
pub fn disconnect_filters(
    origin: &mut dyn Filter,
    dest: &mut dyn Filter,
    writer_id: WriterId,
    reader_id: ReaderId,
) -> Result<()> {
    if let Some(reader) = dest.core_mut().remove_reader(reader_id) {
        reader.disconnect();
    }
    if let Some(mut writer) = origin.core_mut().remove_writer(writer_id) {
        writer.disconnect();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioFormat, FrameFormat, SampleFormat};
    use crate::queue::ForcePolicy;

    fn byte_format() -> FrameFormat {
        FrameFormat::Audio(AudioFormat {
            sample_format: SampleFormat::S16,
            channels: 1,
            sample_rate: 8000,
            samples_per_frame: 8,
        })
    }

    struct Passthrough {
        core: FilterCore,
    }

    impl Passthrough {
        fn new() -> Self {
            Self { core: FilterCore::one_to_one() }
        }
    }

    impl Filter for Passthrough {
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
            self.core.step_one_to_one(|src, dst| {
                if dst.copy_payload_from(src) {
                    StepVerdict::Emit
                } else {
                    StepVerdict::Discard
                }
            })
        }
    }

    /// Feeds a filter's reader from a bare test writer.
    fn feed(filter: &mut dyn Filter, reader_id: ReaderId) -> Writer {
        let queue = Arc::new(FrameQueue::new(4, byte_format(), ForcePolicy::Duplicate));
        let reader = filter.set_reader(reader_id, &queue).expect("reader slot");
        let mut writer = Writer::new();
        writer.set_queue(queue);
        assert!(writer.connect(&reader));
        writer
    }

    /// Taps a filter's writer with a bare test reader.
    fn tap(filter: &mut dyn Filter, writer_id: WriterId) -> Arc<Reader> {
        let queue = filter.alloc_queue(writer_id);
        let reader = Arc::new(Reader::new());
        let mut writer = Writer::new();
        writer.set_queue(queue);
        assert!(writer.connect(&reader));
        filter.core_mut().insert_writer(writer_id, writer).expect("writer slot");
        reader
    }

    fn push(writer: &Writer, byte: u8, pts: u64) {
        let rear = writer.get_frame(true).expect("rear slot");
        rear.lock().fill_from(&[byte], pts);
        writer.add_frame();
    }

    fn pull(reader: &Reader) -> Option<(u8, u64)> {
        let front = reader.get_frame(false)?;
        let out = {
            let frame = front.lock();
            (frame.payload()[0], frame.presentation_us())
        };
        reader.remove_frame();
        Some(out)
    }

    #[test]
    fn one_to_one_passes_frames_through() {
        let mut filter = Passthrough::new();
        let input = feed(&mut filter, DEFAULT_ID);
        let output = tap(&mut filter, DEFAULT_ID);

        for (b, pts) in [(0x01, 10), (0x02, 20), (0x03, 30)] {
            push(&input, b, pts);
        }
        for _ in 0..3 {
            assert_eq!(filter.process(), ProcessOutcome::Worked);
        }

        assert_eq!(pull(&output), Some((0x01, 10)));
        assert_eq!(pull(&output), Some((0x02, 20)));
        assert_eq!(pull(&output), Some((0x03, 30)));
        assert_eq!(pull(&output), None);

        // Nothing left to read: the step reports idle.
        assert_eq!(filter.process(), ProcessOutcome::Idle);
    }

    #[test]
    fn one_to_one_hold_commits_nothing() {
        struct Holder {
            core: FilterCore,
        }
        impl Filter for Holder {
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
                self.core.step_one_to_one(|_, _| StepVerdict::Hold)
            }
        }

        let mut filter = Holder { core: FilterCore::one_to_one() };
        let input = feed(&mut filter, DEFAULT_ID);
        let output = tap(&mut filter, DEFAULT_ID);

        push(&input, 5, 50);
        assert_eq!(filter.process(), ProcessOutcome::Worked);
        assert_eq!(filter.process(), ProcessOutcome::Worked);

        // Input still queued, output still empty.
        assert!(output.get_frame(false).is_none());
        assert_eq!(input.queue().unwrap().pending_frames(), 1);
    }

    struct SelectFirst {
        core: FilterCore,
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
            Arc::new(FrameQueue::new(4, byte_format(), ForcePolicy::Duplicate))
        }
        fn process(&mut self) -> ProcessOutcome {
            self.core.step_many_to_one(|frames, dst| {
                for (_, frame) in frames {
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

    #[test]
    fn many_to_one_tolerates_silent_inputs() {
        let mut filter = SelectFirst { core: FilterCore::many_to_one(2) };
        let loud = feed(&mut filter, 1);
        let _silent = feed(&mut filter, 2);
        let output = tap(&mut filter, DEFAULT_ID);

        for b in 1..=4u8 {
            push(&loud, b, u64::from(b));
            assert_eq!(filter.process(), ProcessOutcome::Worked);
        }
        for b in 1..=4u8 {
            assert_eq!(pull(&output), Some((b, u64::from(b))));
        }
    }

    #[test]
    fn reader_arity_is_bounded() {
        let mut filter = SelectFirst { core: FilterCore::many_to_one(2) };
        let queue = Arc::new(FrameQueue::new(4, byte_format(), ForcePolicy::Duplicate));
        assert!(filter.set_reader(1, &queue).is_some());
        // Duplicate id refused.
        assert!(filter.set_reader(1, &queue).is_none());
        assert!(filter.set_reader(2, &queue).is_some());
        // Capacity refused.
        assert!(filter.set_reader(3, &queue).is_none());
    }

    struct Duplicator {
        core: FilterCore,
    }

    impl Filter for Duplicator {
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

    #[test]
    fn one_to_many_fans_out() {
        let mut filter = Duplicator { core: FilterCore::one_to_many(2) };
        let input = feed(&mut filter, DEFAULT_ID);
        let out_a = tap(&mut filter, 1);
        let out_b = tap(&mut filter, 2);

        push(&input, 0x2a, 7);
        assert_eq!(filter.process(), ProcessOutcome::Worked);

        assert_eq!(pull(&out_a), Some((0x2a, 7)));
        assert_eq!(pull(&out_b), Some((0x2a, 7)));
        // One input frame produced exactly one output frame per branch.
        assert_eq!(pull(&out_a), None);
        assert_eq!(pull(&out_b), None);
    }

    #[test]
    fn connect_protocol_rolls_back_on_refusal() {
        let mut origin = Passthrough::new();
        let mut dest = Passthrough::new();

        // First link succeeds.
        connect_filters(&mut origin, &mut dest, DEFAULT_ID, DEFAULT_ID).expect("first link");
        assert!(origin.core().writer(DEFAULT_ID).is_some());
        assert!(dest.core().reader(DEFAULT_ID).is_some());

        // Second link hits both arity bounds; origin must stay untouched.
        let mut other = Passthrough::new();
        let err = connect_filters(&mut origin, &mut other, DEFAULT_ID, DEFAULT_ID).unwrap_err();
        assert!(err.to_string().contains("duplicate writer id"));
        assert!(other.core().reader(DEFAULT_ID).is_none());
    }

    #[test]
    fn disconnect_breaks_the_link() {
        let mut origin = Passthrough::new();
        let mut dest = Passthrough::new();
        connect_filters(&mut origin, &mut dest, DEFAULT_ID, DEFAULT_ID).expect("link");

        let reader = dest.core().reader(DEFAULT_ID).unwrap().clone();
        assert!(reader.is_connected());

        disconnect_filters(&mut origin, &mut dest, DEFAULT_ID, DEFAULT_ID).expect("unlink");
        assert!(!reader.is_connected());
        assert!(reader.get_frame(false).is_none());
        assert!(origin.core().writer(DEFAULT_ID).is_none());
    }
}
