// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Workers: the threads that drive filters.
//!
//! Three variants share one control surface ([`Worker`]):
//!
//! - [`SimpleWorker`]: one thread, one filter, paced by the filter's frame
//!   time.
//! - [`Master`] with up to [`MAX_SLAVES`] [`Slave`]s: fans one frame out to
//!   parallel sub-filters each cycle, spin-waiting (with yields) for the
//!   slaves so no heap traffic happens per parallel task beyond the one
//!   shared clone of the cycle's frame.
//! - [`ExternalWorker`]: bridges enable/disable/stop to a filter whose
//!   processing thread is owned by an external library.
//!
//! Cancellation is cooperative everywhere: `stop()` clears the running flag
//! and joins, bounded by one step plus one idle sleep.

use crate::filter::{ProcessOutcome, SharedFilter};
use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Upper bound on slaves per master.
pub const MAX_SLAVES: usize = 16;

/// Sleep taken when a filter reports an unavailable endpoint, and between
/// enablement checks of a disabled worker.
pub const IDLE_WAIT: Duration = Duration::from_micros(500);

/// Control surface shared by every worker variant.
pub trait Worker: Send {
    /// Spawns the worker's thread. Returns `false` when already running.
    fn start(&mut self) -> bool;

    /// Cooperative shutdown: clears the running flag and joins.
    fn stop(&mut self);

    /// Resumes stepping without touching the thread.
    fn enable(&self);

    /// Pauses stepping; the thread and the filter's endpoints stay intact.
    fn disable(&self);

    fn is_running(&self) -> bool;

    fn is_enabled(&self) -> bool;

    /// Updates the pacing budget; `0` disables pacing.
    fn set_fps(&self, max_fps: u32);
}

/// Flags shared between a worker handle and its thread.
struct Flags {
    running: AtomicBool,
    enabled: AtomicBool,
    /// Frame-time override in microseconds; `u64::MAX` defers to the filter.
    frame_time_us: AtomicU64,
}

impl Flags {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            frame_time_us: AtomicU64::new(u64::MAX),
        })
    }

    fn frame_time(&self, filter_default: Duration) -> Duration {
        match self.frame_time_us.load(Ordering::Relaxed) {
            u64::MAX => filter_default,
            us => Duration::from_micros(us),
        }
    }
}

fn pace(started: Instant, frame_time: Duration) {
    let elapsed = started.elapsed();
    if frame_time > elapsed {
        std::thread::sleep(frame_time - elapsed);
    }
}

/// Drives one filter in a loop at a bounded rate.
pub struct SimpleWorker {
    flags: Arc<Flags>,
    runnable: SharedFilter,
    handle: Option<JoinHandle<()>>,
}

impl SimpleWorker {
    #[must_use]
    pub fn new(runnable: SharedFilter) -> Self {
        Self { flags: Flags::new(), runnable, handle: None }
    }

    /// As [`SimpleWorker::new`], with an explicit frame-rate cap.
    #[must_use]
    pub fn with_fps(runnable: SharedFilter, max_fps: u32) -> Self {
        let worker = Self::new(runnable);
        worker.set_fps(max_fps);
        worker
    }
}

impl Worker for SimpleWorker {
    fn start(&mut self) -> bool {
        if self.flags.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let flags = self.flags.clone();
        let runnable = self.runnable.clone();
        let handle = std::thread::Builder::new()
            .name("castkit-worker".to_string())
            .spawn(move || run_loop(&flags, &runnable))
            .ok();
        if handle.is_none() {
            self.flags.running.store(false, Ordering::SeqCst);
            return false;
        }
        self.handle = handle;
        true
    }

    fn stop(&mut self) {
        self.flags.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn enable(&self) {
        self.flags.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.flags.enabled.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.flags.enabled.load(Ordering::SeqCst)
    }

    fn set_fps(&self, max_fps: u32) {
        let us = if max_fps == 0 { 0 } else { 1_000_000 / u64::from(max_fps) };
        self.flags.frame_time_us.store(us, Ordering::Relaxed);
    }
}

impl Drop for SimpleWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(flags: &Flags, runnable: &SharedFilter) {
    while flags.running.load(Ordering::SeqCst) {
        if !flags.enabled.load(Ordering::SeqCst) {
            std::thread::sleep(IDLE_WAIT);
            continue;
        }
        let started = Instant::now();
        let Ok(mut filter) = runnable.lock() else {
            // The filter panicked under another thread; this worker is done.
            tracing::error!("filter mutex poisoned, stopping worker");
            flags.running.store(false, Ordering::SeqCst);
            return;
        };
        let outcome = filter.process();
        let frame_time = flags.frame_time(filter.frame_time());
        drop(filter);
        match outcome {
            ProcessOutcome::Worked => pace(started, frame_time),
            ProcessOutcome::Idle => std::thread::sleep(IDLE_WAIT),
        }
    }
}

/// Mailbox through which a master hands the cycle's frame to one slave.
struct SlaveCell {
    origin: Mutex<Option<Arc<Frame>>>,
    finished: AtomicBool,
}

/// A parallel sub-worker owned by a [`Master`].
///
/// Runs its filter's partition of the master's current frame exactly once per
/// cycle, then reports back through its `finished` flag.
pub struct Slave {
    id: usize,
    flags: Arc<Flags>,
    runnable: SharedFilter,
    cell: Arc<SlaveCell>,
    handle: Option<JoinHandle<()>>,
}

impl Slave {
    #[must_use]
    pub fn new(id: usize, runnable: SharedFilter) -> Self {
        Self {
            id,
            flags: Flags::new(),
            runnable,
            cell: Arc::new(SlaveCell {
                origin: Mutex::new(None),
                finished: AtomicBool::new(true),
            }),
            handle: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    fn dispatch(&self, frame: Arc<Frame>) {
        if let Ok(mut origin) = self.cell.origin.lock() {
            *origin = Some(frame);
        }
        self.cell.finished.store(false, Ordering::Release);
    }

    fn finished(&self) -> bool {
        self.cell.finished.load(Ordering::Acquire)
    }

    fn start(&mut self) -> bool {
        if self.flags.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let flags = self.flags.clone();
        let runnable = self.runnable.clone();
        let cell = self.cell.clone();
        let handle = std::thread::Builder::new()
            .name(format!("castkit-slave-{}", self.id))
            .spawn(move || slave_loop(&flags, &runnable, &cell))
            .ok();
        if handle.is_none() {
            self.flags.running.store(false, Ordering::SeqCst);
            return false;
        }
        self.handle = handle;
        true
    }

    fn stop(&mut self) {
        self.flags.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn slave_loop(flags: &Flags, runnable: &SharedFilter, cell: &SlaveCell) {
    while flags.running.load(Ordering::SeqCst) {
        if cell.finished.load(Ordering::Acquire) {
            std::thread::yield_now();
            continue;
        }
        let frame = cell.origin.lock().ok().and_then(|guard| guard.clone());
        if let Some(frame) = frame {
            if let Ok(mut filter) = runnable.lock() {
                filter.process_partition(&frame);
            }
        }
        cell.finished.store(true, Ordering::Release);
    }
}

/// Drives a filter that partitions each frame across parallel slaves.
///
/// Per cycle: grab the input frame, publish it to every slave, spin (with
/// yields) until all slaves report finished, then let the filter merge and
/// commit through `finish_cycle()`.
pub struct Master {
    flags: Arc<Flags>,
    runnable: SharedFilter,
    slaves: Arc<Mutex<Vec<Slave>>>,
    handle: Option<JoinHandle<()>>,
}

impl Master {
    #[must_use]
    pub fn new(runnable: SharedFilter) -> Self {
        Self { flags: Flags::new(), runnable, slaves: Arc::new(Mutex::new(Vec::new())), handle: None }
    }

    /// Adds a slave, refusing beyond [`MAX_SLAVES`]. Must happen before
    /// `start()`.
    pub fn add_slave(&mut self, slave: Slave) -> bool {
        let Ok(mut slaves) = self.slaves.lock() else { return false };
        if slaves.len() >= MAX_SLAVES || slaves.iter().any(|s| s.id == slave.id) {
            return false;
        }
        slaves.push(slave);
        true
    }

    /// Removes a slave by id, joining its thread.
    pub fn remove_slave(&mut self, id: usize) -> bool {
        let Ok(mut slaves) = self.slaves.lock() else { return false };
        let Some(idx) = slaves.iter().position(|s| s.id == id) else { return false };
        let mut slave = slaves.remove(idx);
        slave.stop();
        true
    }
}

impl Worker for Master {
    fn start(&mut self) -> bool {
        if self.flags.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Ok(mut slaves) = self.slaves.lock() {
            for slave in slaves.iter_mut() {
                slave.start();
            }
        }
        let flags = self.flags.clone();
        let runnable = self.runnable.clone();
        let slaves = self.slaves.clone();
        let handle = std::thread::Builder::new()
            .name("castkit-master".to_string())
            .spawn(move || master_loop(&flags, &runnable, &slaves))
            .ok();
        if handle.is_none() {
            self.flags.running.store(false, Ordering::SeqCst);
            return false;
        }
        self.handle = handle;
        true
    }

    fn stop(&mut self) {
        self.flags.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Ok(mut slaves) = self.slaves.lock() {
            for slave in slaves.iter_mut() {
                slave.stop();
            }
        }
    }

    fn enable(&self) {
        self.flags.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.flags.enabled.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.flags.enabled.load(Ordering::SeqCst)
    }

    fn set_fps(&self, max_fps: u32) {
        let us = if max_fps == 0 { 0 } else { 1_000_000 / u64::from(max_fps) };
        self.flags.frame_time_us.store(us, Ordering::Relaxed);
    }
}

impl Drop for Master {
    fn drop(&mut self) {
        self.stop();
    }
}

fn master_loop(flags: &Flags, runnable: &SharedFilter, slaves: &Mutex<Vec<Slave>>) {
    while flags.running.load(Ordering::SeqCst) {
        if !flags.enabled.load(Ordering::SeqCst) {
            std::thread::sleep(IDLE_WAIT);
            continue;
        }
        let started = Instant::now();

        let shared = match runnable.lock() {
            Ok(mut filter) => filter.share_frame(),
            Err(_) => {
                tracing::error!("filter mutex poisoned, stopping master");
                flags.running.store(false, Ordering::SeqCst);
                return;
            },
        };
        let Some(frame) = shared else {
            std::thread::sleep(IDLE_WAIT);
            continue;
        };

        {
            let Ok(slaves) = slaves.lock() else { break };
            for slave in slaves.iter() {
                slave.dispatch(frame.clone());
            }
            // Bounded spin: slaves flip their flags within one partition's work.
            while !slaves.iter().all(Slave::finished) {
                if !flags.running.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::yield_now();
            }
        }

        let (outcome, frame_time) = match runnable.lock() {
            Ok(mut filter) => (filter.finish_cycle(), flags.frame_time(filter.frame_time())),
            Err(_) => {
                flags.running.store(false, Ordering::SeqCst);
                return;
            },
        };
        match outcome {
            ProcessOutcome::Worked => pace(started, frame_time),
            ProcessOutcome::Idle => std::thread::sleep(IDLE_WAIT),
        }
    }
}

/// Bridges worker control to a filter whose thread is owned by an external
/// library (protocol stacks with their own event loop). Never steps the
/// filter itself.
pub struct ExternalWorker {
    flags: Arc<Flags>,
    runnable: SharedFilter,
}

impl ExternalWorker {
    #[must_use]
    pub fn new(runnable: SharedFilter) -> Self {
        Self { flags: Flags::new(), runnable }
    }
}

impl Worker for ExternalWorker {
    fn start(&mut self) -> bool {
        !self.flags.running.swap(true, Ordering::SeqCst)
    }

    fn stop(&mut self) {
        if self.flags.running.swap(false, Ordering::SeqCst) {
            if let Ok(mut filter) = self.runnable.lock() {
                filter.stop();
            }
        }
    }

    // The external library owns scheduling; enable/disable are deliberate
    // no-ops, matching the contract of externally-driven processors.
    fn enable(&self) {}

    fn disable(&self) {}

    fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.is_running()
    }

    fn set_fps(&self, _max_fps: u32) {}
}
