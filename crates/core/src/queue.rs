// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Bounded single-producer frame rings.
//!
//! A [`FrameQueue`] hands frames from one filter to the next without copying:
//! the producing side borrows the rear slot, the consuming side borrows the
//! front slot, and commits only move cursors. All cursor operations are
//! non-blocking; overload is handled by the `force_*` variants, never by
//! blocking the producer.
//!
//! Slots are addressed by index into a fixed arena. A slot's `Mutex<Frame>`
//! serializes payload access between the two endpoints of the hand-off; the
//! cursor state lives under its own mutex.

use crate::frame::{Frame, FrameFormat};
use std::sync::{Mutex, MutexGuard};

/// Default number of slots for queues whose creator does not care.
pub const DEFAULT_QUEUE_SLOTS: usize = 8;

/// What `force_front` means for a queue that has nothing to deliver.
///
/// The two flavors mirror the needs of real-time sinks: audio playout wants to
/// repeat the last sample block, video playout prefers to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcePolicy {
    /// Return the most recently retired frame again, without moving cursors.
    Duplicate,
    /// Return nothing; the caller schedules a short retry.
    Drop,
}

#[derive(Debug)]
struct Cursors {
    /// Next slot to write.
    rear: usize,
    /// Next slot to read.
    front: usize,
    /// Committed frames between front and rear.
    len: usize,
    connected: bool,
    /// Slot of the last frame retired through `commit_front`.
    retired: Option<usize>,
    /// Frames recycled unconsumed by `force_rear`.
    overwrites: u64,
}

/// A fixed ring of preallocated [`Frame`]s.
pub struct FrameQueue {
    slots: Box<[Mutex<Frame>]>,
    cursors: Mutex<Cursors>,
    policy: ForcePolicy,
}

impl FrameQueue {
    /// Creates a queue of `slots` frames, each sized for `format`.
    pub fn new(slots: usize, format: FrameFormat, policy: ForcePolicy) -> Self {
        let slots = slots.max(1);
        let frames = (0..slots).map(|_| Mutex::new(Frame::for_format(format))).collect();
        Self {
            slots: frames,
            cursors: Mutex::new(Cursors {
                rear: 0,
                front: 0,
                len: 0,
                connected: false,
                retired: None,
                overwrites: 0,
            }),
            policy,
        }
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn force_policy(&self) -> ForcePolicy {
        self.policy
    }

    /// Committed frames waiting to be consumed.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.lock_cursors().len
    }

    /// Frames recycled unconsumed under producer overload.
    #[must_use]
    pub fn overwrite_count(&self) -> u64 {
        self.lock_cursors().overwrites
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock_cursors().connected
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock_cursors().connected = connected;
    }

    /// Locks a slot's frame for reading or writing.
    ///
    /// Slot indices come from the cursor operations below; holding the guard
    /// across a commit is fine, holding two guards of the *same* queue is not.
    pub fn frame(&self, slot: usize) -> MutexGuard<'_, Frame> {
        match self.slots[slot].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Next writable slot, or `None` when the ring is full.
    #[must_use]
    pub fn rear(&self) -> Option<usize> {
        let cursors = self.lock_cursors();
        if cursors.len == self.slots.len() {
            None
        } else {
            Some(cursors.rear)
        }
    }

    /// Next writable slot, recycling the oldest unconsumed frame when full.
    #[must_use]
    pub fn force_rear(&self) -> usize {
        let mut cursors = self.lock_cursors();
        if cursors.len == self.slots.len() {
            // Overload: drop the tail so the producer keeps moving.
            cursors.front = (cursors.front + 1) % self.slots.len();
            cursors.len -= 1;
            cursors.overwrites += 1;
        }
        cursors.rear
    }

    /// Next readable slot, or `None` when the ring is empty.
    #[must_use]
    pub fn front(&self) -> Option<usize> {
        let cursors = self.lock_cursors();
        if cursors.len == 0 {
            None
        } else {
            Some(cursors.front)
        }
    }

    /// Next readable slot even when empty, per the queue's [`ForcePolicy`].
    ///
    /// Never advances the front cursor past the rear.
    #[must_use]
    pub fn force_front(&self) -> Option<usize> {
        let cursors = self.lock_cursors();
        if cursors.len > 0 {
            return Some(cursors.front);
        }
        match self.policy {
            ForcePolicy::Duplicate => cursors.retired,
            ForcePolicy::Drop => None,
        }
    }

    /// Commits the rear slot written through [`FrameQueue::rear`] or
    /// [`FrameQueue::force_rear`].
    pub fn commit_rear(&self) {
        let mut cursors = self.lock_cursors();
        debug_assert!(cursors.len < self.slots.len());
        cursors.rear = (cursors.rear + 1) % self.slots.len();
        cursors.len += 1;
    }

    /// Retires the front slot. No-op on an empty ring.
    pub fn commit_front(&self) {
        let mut cursors = self.lock_cursors();
        if cursors.len == 0 {
            return;
        }
        cursors.retired = Some(cursors.front);
        cursors.front = (cursors.front + 1) % self.slots.len();
        cursors.len -= 1;
    }

    fn lock_cursors(&self) -> MutexGuard<'_, Cursors> {
        match self.cursors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cursors = self.lock_cursors();
        f.debug_struct("FrameQueue")
            .field("slots", &self.slots.len())
            .field("len", &cursors.len)
            .field("connected", &cursors.connected)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioFormat, SampleFormat};

    fn test_queue(slots: usize, policy: ForcePolicy) -> FrameQueue {
        let format = FrameFormat::Audio(AudioFormat {
            sample_format: SampleFormat::S16,
            channels: 1,
            sample_rate: 8000,
            samples_per_frame: 8,
        });
        FrameQueue::new(slots, format, policy)
    }

    fn push(queue: &FrameQueue, byte: u8, pts: u64) {
        let slot = queue.rear().expect("ring full");
        queue.frame(slot).fill_from(&[byte], pts);
        queue.commit_rear();
    }

    fn pop(queue: &FrameQueue) -> Option<u8> {
        let slot = queue.front()?;
        let byte = queue.frame(slot).payload()[0];
        queue.commit_front();
        Some(byte)
    }

    #[test]
    fn fifo_order() {
        let queue = test_queue(4, ForcePolicy::Duplicate);
        for b in 1..=3u8 {
            push(&queue, b, u64::from(b));
        }
        assert_eq!(queue.pending_frames(), 3);
        assert_eq!(pop(&queue), Some(1));
        assert_eq!(pop(&queue), Some(2));
        assert_eq!(pop(&queue), Some(3));
        assert_eq!(pop(&queue), None);
    }

    #[test]
    fn rear_refuses_when_full() {
        let queue = test_queue(2, ForcePolicy::Duplicate);
        push(&queue, 1, 1);
        push(&queue, 2, 2);
        assert!(queue.rear().is_none());
    }

    #[test]
    fn force_rear_recycles_oldest() {
        let queue = test_queue(2, ForcePolicy::Duplicate);
        push(&queue, 1, 1);
        push(&queue, 2, 2);

        let slot = queue.force_rear();
        queue.frame(slot).fill_from(&[3], 3);
        queue.commit_rear();

        assert_eq!(queue.overwrite_count(), 1);
        // Oldest frame was dropped; the rest arrive in order.
        assert_eq!(pop(&queue), Some(2));
        assert_eq!(pop(&queue), Some(3));
        assert_eq!(pop(&queue), None);
    }

    #[test]
    fn force_front_duplicates_last_retired() {
        let queue = test_queue(4, ForcePolicy::Duplicate);
        // Nothing ever retired: nothing to duplicate.
        assert!(queue.force_front().is_none());

        push(&queue, 7, 70);
        let retired_slot = queue.front().unwrap();
        queue.commit_front();

        let slot = queue.force_front().expect("retired frame available");
        assert_eq!(slot, retired_slot);
        assert_eq!(queue.frame(slot).payload()[0], 7);
        // Repeating must not consume anything.
        assert_eq!(queue.pending_frames(), 0);
    }

    #[test]
    fn force_front_drop_policy_returns_none() {
        let queue = test_queue(4, ForcePolicy::Drop);
        push(&queue, 1, 1);
        queue.commit_front();
        assert!(queue.force_front().is_none());
    }

    #[test]
    fn force_front_prefers_live_frames() {
        let queue = test_queue(4, ForcePolicy::Duplicate);
        push(&queue, 1, 1);
        assert_eq!(queue.force_front(), queue.front());
    }

    #[test]
    fn connected_lifecycle() {
        let queue = test_queue(2, ForcePolicy::Duplicate);
        assert!(!queue.is_connected());
        queue.set_connected(true);
        assert!(queue.is_connected());
        queue.set_connected(false);
        assert!(!queue.is_connected());
    }
}
