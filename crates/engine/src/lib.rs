// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! CastKit Engine - owns the filter graph and the control channel.
//!
//! - [`pipeline`]: the [`pipeline::PipelineManager`], registry and mutator
//!   for filters, workers and paths
//! - [`controller`]: the TCP/JSON control channel bridging external events
//!   to the manager and the filters' event maps
//! - [`registry`]: filter factories keyed by kind name, backing the
//!   `addFilter` control event

pub mod controller;
pub mod pipeline;
pub mod registry;

pub use controller::Controller;
pub use pipeline::{PipelineManager, SharedManager};
pub use registry::{FilterFactory, FilterRegistry};
