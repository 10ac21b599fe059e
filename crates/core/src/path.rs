// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Data-flow routes through the pipeline.
//!
//! A [`Path`] is an ordered chain of filter ids from one origin output to one
//! destination input, together with the workers that have to be running for
//! frames to move along it. Paths are definitions; wiring them up is the
//! pipeline manager's job.

use crate::filter::{FilterId, ReaderId, WriterId, DEFAULT_ID};
use serde::{Deserialize, Serialize};

pub type PathId = u32;
pub type WorkerId = u32;

/// An ordered chain of filters: origin, intermediates, destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    filters: Vec<FilterId>,
    #[serde(default = "default_endpoint_id")]
    origin_writer: WriterId,
    #[serde(default = "default_endpoint_id")]
    destination_reader: ReaderId,
    #[serde(default)]
    workers: Vec<WorkerId>,
}

const fn default_endpoint_id() -> u32 {
    DEFAULT_ID
}

impl Path {
    /// A path using the default writer/reader ids at both ends.
    #[must_use]
    pub fn new(filters: Vec<FilterId>) -> Self {
        Self::with_endpoints(filters, DEFAULT_ID, DEFAULT_ID)
    }

    /// A path with explicit endpoint ids, for origins with several outputs or
    /// destinations with several inputs (mixer channels, splitter branches).
    #[must_use]
    pub fn with_endpoints(
        filters: Vec<FilterId>,
        origin_writer: WriterId,
        destination_reader: ReaderId,
    ) -> Self {
        Self { filters, origin_writer, destination_reader, workers: Vec::new() }
    }

    #[must_use]
    pub fn filters(&self) -> &[FilterId] {
        &self.filters
    }

    #[must_use]
    pub fn origin(&self) -> Option<FilterId> {
        self.filters.first().copied()
    }

    #[must_use]
    pub fn destination(&self) -> Option<FilterId> {
        self.filters.last().copied()
    }

    #[must_use]
    pub fn origin_writer(&self) -> WriterId {
        self.origin_writer
    }

    #[must_use]
    pub fn destination_reader(&self) -> ReaderId {
        self.destination_reader
    }

    /// Workers that must be (re)started when this path is connected.
    #[must_use]
    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }

    pub fn add_worker(&mut self, worker: WorkerId) {
        if !self.workers.contains(&worker) {
            self.workers.push(worker);
        }
    }

    /// Whether the chain references `filter`.
    #[must_use]
    pub fn contains(&self, filter: FilterId) -> bool {
        self.filters.contains(&filter)
    }

    /// Consecutive (origin, destination) pairs along the chain, with the
    /// writer/reader ids each link uses.
    pub fn links(&self) -> impl Iterator<Item = PathLink> + '_ {
        let last = self.filters.len().saturating_sub(1);
        self.filters.windows(2).enumerate().map(move |(i, pair)| PathLink {
            from: pair[0],
            to: pair[1],
            writer_id: if i == 0 { self.origin_writer } else { DEFAULT_ID },
            reader_id: if i + 1 == last { self.destination_reader } else { DEFAULT_ID },
        })
    }
}

/// One link of a path: `from`'s writer feeding `to`'s reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLink {
    pub from: FilterId,
    pub to: FilterId,
    pub writer_id: WriterId,
    pub reader_id: ReaderId,
}
