// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Reader and Writer endpoints over a [`FrameQueue`].
//!
//! A Writer is the single producing endpoint of a queue and is only ever
//! touched by its owning filter's worker, so it carries no lock. A Reader may
//! be shared by several logical consumers (fan-out over one physical queue);
//! its `readers`/`pending` bookkeeping makes the shared front advance only
//! after every consumer acknowledged the frame, which is what keeps fan-out
//! lockstep without copying payloads.

use crate::frame::Frame;
use crate::queue::FrameQueue;
use std::sync::{Arc, Mutex, MutexGuard};

/// Non-owning handle to one queue slot.
///
/// Valid while the queue is alive; the slot lock serializes payload access
/// between the two endpoints.
pub struct FrameRef {
    queue: Arc<FrameQueue>,
    slot: usize,
}

impl FrameRef {
    #[must_use]
    pub fn lock(&self) -> MutexGuard<'_, Frame> {
        self.queue.frame(self.slot)
    }

    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

#[derive(Default)]
struct ReaderState {
    queue: Option<Arc<FrameQueue>>,
    /// Logical consumers sharing this endpoint.
    readers: u32,
    /// Consumers that still have to acknowledge the current cycle's frame.
    pending: u32,
}

/// Consuming endpoint of a frame queue.
pub struct Reader {
    state: Mutex<ReaderState>,
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}

impl Reader {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(ReaderState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Attaches the queue handed over by a Writer on connect.
    pub(crate) fn attach(&self, queue: Arc<FrameQueue>) {
        let mut state = self.lock();
        state.queue = Some(queue);
        state.readers = state.readers.max(1);
        state.pending = 0;
    }

    /// Registers one more logical consumer sharing this endpoint.
    pub fn add_reader(&self) {
        let mut state = self.lock();
        let connected = state.queue.as_ref().is_some_and(|q| q.is_connected());
        if state.readers >= 1 && connected {
            state.readers += 1;
        }
    }

    /// Drops one logical consumer; the last one out disconnects.
    pub fn remove_reader(&self) {
        let should_disconnect = {
            let mut state = self.lock();
            if state.readers == 0 {
                return;
            }
            state.readers -= 1;
            state.readers == 0
        };
        if should_disconnect {
            self.disconnect();
        }
    }

    #[must_use]
    pub fn readers(&self) -> u32 {
        self.lock().readers
    }

    /// The current front frame, shared across all logical consumers of the
    /// cycle. With `force`, falls back to the queue's force policy when empty.
    ///
    /// Returns `None` on an unconnected queue (non-fatal; logged at debug).
    #[must_use]
    pub fn get_frame(&self, force: bool) -> Option<FrameRef> {
        let mut state = self.lock();
        let queue = state.queue.clone()?;
        if !queue.is_connected() {
            tracing::debug!("reader queue is not connected");
            return None;
        }
        if state.pending == 0 {
            state.pending = state.readers;
        }
        let slot = queue.front().or_else(|| if force { queue.force_front() } else { None })?;
        Some(FrameRef { queue, slot })
    }

    /// Acknowledges the cycle's frame for one logical consumer.
    ///
    /// Returns `true` when this acknowledgement retired the physical front.
    pub fn remove_frame(&self) -> bool {
        let mut state = self.lock();
        let Some(queue) = state.queue.clone() else { return false };
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            queue.commit_front();
            true
        } else {
            false
        }
    }

    /// Detaches from the queue. Shared readers peel off one consumer at a
    /// time; the last consumer flips the queue to disconnected.
    pub fn disconnect(&self) -> bool {
        let mut state = self.lock();
        if state.readers > 1 {
            state.readers -= 1;
            return true;
        }
        let Some(queue) = state.queue.take() else { return false };
        queue.set_connected(false);
        state.readers = 0;
        state.pending = 0;
        true
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().queue.as_ref().is_some_and(|q| q.is_connected())
    }
}

/// Producing endpoint of a frame queue.
///
/// Owned by the producing filter and driven from exactly one worker thread.
#[derive(Default)]
pub struct Writer {
    queue: Option<Arc<FrameQueue>>,
}

impl Writer {
    #[must_use]
    pub fn new() -> Self {
        Self { queue: None }
    }

    pub fn set_queue(&mut self, queue: Arc<FrameQueue>) {
        self.queue = Some(queue);
    }

    /// Hands the queue to `reader` and marks the connection live.
    pub fn connect(&self, reader: &Reader) -> bool {
        let Some(queue) = &self.queue else {
            tracing::error!("writer has no queue to connect");
            return false;
        };
        reader.attach(queue.clone());
        queue.set_connected(true);
        true
    }

    /// Flips the queue to disconnected and releases the handle.
    pub fn disconnect(&mut self) -> bool {
        let Some(queue) = self.queue.take() else { return false };
        queue.set_connected(false);
        true
    }

    /// The next writable slot. With `force`, recycles the oldest unconsumed
    /// frame when the ring is full.
    #[must_use]
    pub fn get_frame(&self, force: bool) -> Option<FrameRef> {
        let queue = self.queue.clone()?;
        if !queue.is_connected() {
            tracing::debug!("writer queue is not connected");
            return None;
        }
        let slot = queue.rear().or_else(|| force.then(|| queue.force_rear()))?;
        Some(FrameRef { queue, slot })
    }

    /// Commits the slot written through [`Writer::get_frame`].
    pub fn add_frame(&self) {
        if let Some(queue) = &self.queue {
            queue.commit_rear();
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.queue.as_ref().is_some_and(|q| q.is_connected())
    }

    #[must_use]
    pub fn queue(&self) -> Option<&Arc<FrameQueue>> {
        self.queue.as_ref()
    }
}
