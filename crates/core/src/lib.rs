// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! CastKit Core - the execution substrate of a live media streaming engine.
//!
//! A pipeline is a directed graph of media filters connected by bounded
//! frame rings and driven by per-filter worker threads. This crate provides
//! the pieces the graph is built from:
//!
//! ## Core Modules
//!
//! - [`frame`]: media frames and their format descriptors
//! - [`queue`]: bounded single-producer frame rings with overload recycling
//! - [`io`]: Reader/Writer endpoints, including shared lockstep readers
//! - [`filter`]: the filter trait, arity step drivers and the connect protocol
//! - [`worker`]: simple, master/slave and externally-driven schedulers
//! - [`path`]: ordered filter chains from an origin output to a destination
//!   input
//! - [`events`]: control-event responses and parameter parsing
//! - [`error`]: error types and handling
//!
//! ## Quick Start
//!
//! ```ignore
//! use castkit_core::filter::{Filter, FilterCore, StepVerdict};
//!
//! struct Gain { core: FilterCore, gain: f32 }
//!
//! impl Filter for Gain {
//!     // one-to-one: read the front, write the rear, commit both
//!     fn process(&mut self) -> ProcessOutcome {
//!         self.core.step_one_to_one(|src, dst| {
//!             /* transform src into dst */
//!             StepVerdict::Emit
//!         })
//!     }
//!     /* ... */
//! }
//! ```

pub mod error;
pub mod events;
pub mod filter;
pub mod frame;
pub mod io;
pub mod path;
pub mod queue;
pub mod worker;

// Convenience re-exports for the types every filter implementation touches.

pub use error::{CastError, Result};
pub use events::EventResponse;
pub use filter::{
    connect_filters, disconnect_filters, shared, Filter, FilterCore, FilterId, FilterKind,
    ProcessOutcome, ReaderId, SharedFilter, StepVerdict, WriterId, WriterSlot, DEFAULT_ID,
};
pub use frame::{AudioFormat, Frame, FrameFormat, PixelFormat, SampleFormat, VideoFormat};
pub use io::{FrameRef, Reader, Writer};
pub use path::{Path, PathId, PathLink, WorkerId};
pub use queue::{ForcePolicy, FrameQueue, DEFAULT_QUEUE_SLOTS};
pub use worker::{ExternalWorker, Master, SimpleWorker, Slave, Worker, IDLE_WAIT, MAX_SLAVES};
