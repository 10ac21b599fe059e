// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The pipeline manager: registry and mutator for the filter graph.
//!
//! One manager owns every filter, worker and path of the process. Graph
//! edits go through it and serialize against the workers' `process()` calls
//! by taking the filter mutexes involved, so a link is never rewired under a
//! running step. `connect_path` is atomic: either every link of the path
//! comes up and its workers run, or everything created by the call is rolled
//! back.

use crate::registry::FilterRegistry;
use castkit_core::error::{CastError, Result};
use castkit_core::events::{parse_params, EventResponse};
use castkit_core::filter::{
    connect_filters, disconnect_filters, Filter, FilterId, FilterKind, SharedFilter,
};
use castkit_core::path::{Path, PathId, PathLink, WorkerId};
use castkit_core::worker::{SimpleWorker, Worker};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Default id under which the source adapter registers.
pub const RECEIVER_ID: FilterId = 1;
/// Default id under which the sink adapter registers.
pub const TRANSMITTER_ID: FilterId = 2;

struct FilterEntry {
    filter: SharedFilter,
    worker: Option<WorkerId>,
}

/// Registry and mutator for filters, workers and paths.
///
/// Exactly one instance exists per process; it is created in `main` and
/// handed to the controller and the adapters rather than reached through a
/// global.
pub struct PipelineManager {
    filters: BTreeMap<FilterId, FilterEntry>,
    workers: BTreeMap<WorkerId, Box<dyn Worker>>,
    paths: BTreeMap<PathId, Path>,
    registry: FilterRegistry,
    receiver_id: FilterId,
    transmitter_id: FilterId,
    shutdown: bool,
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_adapter_ids(RECEIVER_ID, TRANSMITTER_ID)
    }

    #[must_use]
    pub fn with_adapter_ids(receiver_id: FilterId, transmitter_id: FilterId) -> Self {
        Self {
            filters: BTreeMap::new(),
            workers: BTreeMap::new(),
            paths: BTreeMap::new(),
            registry: FilterRegistry::new(),
            receiver_id,
            transmitter_id,
            shutdown: false,
        }
    }

    /// Installs the factory registry backing the `addFilter` event.
    pub fn set_registry(&mut self, registry: FilterRegistry) {
        self.registry = registry;
    }

    #[must_use]
    pub fn receiver_id(&self) -> FilterId {
        self.receiver_id
    }

    #[must_use]
    pub fn transmitter_id(&self) -> FilterId {
        self.transmitter_id
    }

    /// Whether a `stop` event asked the process to wind down.
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    pub fn add_filter(&mut self, id: FilterId, filter: SharedFilter) -> Result<()> {
        if self.filters.contains_key(&id) {
            return Err(CastError::Configuration(format!("duplicate filter id {id}")));
        }
        self.filters.insert(id, FilterEntry { filter, worker: None });
        Ok(())
    }

    #[must_use]
    pub fn get_filter(&self, id: FilterId) -> Option<SharedFilter> {
        self.filters.get(&id).map(|entry| entry.filter.clone())
    }

    /// First registered filter of the given kind.
    #[must_use]
    pub fn search_filter_by_kind(&self, kind: FilterKind) -> Option<FilterId> {
        self.filters.iter().find_map(|(id, entry)| {
            let matches = entry.filter.lock().is_ok_and(|f| f.kind() == kind);
            matches.then_some(*id)
        })
    }

    pub fn add_worker(&mut self, id: WorkerId, worker: Box<dyn Worker>) -> Result<()> {
        if self.workers.contains_key(&id) {
            return Err(CastError::Configuration(format!("duplicate worker id {id}")));
        }
        self.workers.insert(id, worker);
        Ok(())
    }

    /// Binds a registered worker to a registered filter.
    ///
    /// A filter is driven by at most one worker; rebinding is refused.
    pub fn assign_worker(&mut self, filter_id: FilterId, worker_id: WorkerId) -> Result<()> {
        if !self.workers.contains_key(&worker_id) {
            return Err(CastError::Configuration(format!("unknown worker id {worker_id}")));
        }
        let Some(entry) = self.filters.get_mut(&filter_id) else {
            return Err(CastError::Configuration(format!("unknown filter id {filter_id}")));
        };
        if entry.worker.is_some() {
            return Err(CastError::ResourceExhausted(format!(
                "filter {filter_id} already has a worker"
            )));
        }
        entry.worker = Some(worker_id);
        Ok(())
    }

    pub fn add_path(&mut self, id: PathId, path: Path) -> Result<()> {
        if self.paths.contains_key(&id) {
            return Err(CastError::Configuration(format!("duplicate path id {id}")));
        }
        for filter_id in path.filters() {
            if !self.filters.contains_key(filter_id) {
                return Err(CastError::Configuration(format!("unknown filter id {filter_id}")));
            }
        }
        self.paths.insert(id, path);
        Ok(())
    }

    #[must_use]
    pub fn get_path(&self, id: PathId) -> Option<&Path> {
        self.paths.get(&id)
    }

    /// Creates simple workers for every filter of `path` that has none yet
    /// and records them in the path's worker list.
    pub fn add_workers_to_path(&mut self, path_id: PathId) -> Result<()> {
        let Some(path) = self.paths.get(&path_id) else {
            return Err(CastError::Configuration(format!("unknown path id {path_id}")));
        };
        let filter_ids: Vec<FilterId> = path.filters().to_vec();

        let mut created: Vec<(FilterId, WorkerId)> = Vec::new();
        let mut next_worker_id =
            self.workers.keys().max().copied().map_or(1, |max| max + 1);
        let mut existing: Vec<WorkerId> = Vec::new();

        for filter_id in filter_ids {
            let Some(entry) = self.filters.get(&filter_id) else {
                return Err(CastError::Configuration(format!("unknown filter id {filter_id}")));
            };
            if let Some(worker_id) = entry.worker {
                existing.push(worker_id);
                continue;
            }
            let worker = SimpleWorker::new(entry.filter.clone());
            self.workers.insert(next_worker_id, Box::new(worker));
            created.push((filter_id, next_worker_id));
            next_worker_id += 1;
        }

        for (filter_id, worker_id) in &created {
            if let Some(entry) = self.filters.get_mut(filter_id) {
                entry.worker = Some(*worker_id);
            }
        }

        let Some(path) = self.paths.get_mut(&path_id) else {
            return Err(CastError::Configuration(format!("unknown path id {path_id}")));
        };
        for worker_id in existing.into_iter().chain(created.into_iter().map(|(_, w)| w)) {
            path.add_worker(worker_id);
        }
        Ok(())
    }

    /// Wires every link of the path and (re)starts its workers.
    ///
    /// Atomic: if any link fails, every link created by this call is
    /// disconnected before the error is returned, and no worker is touched.
    pub fn connect_path(&mut self, path_id: PathId) -> Result<()> {
        let Some(path) = self.paths.get(&path_id) else {
            return Err(CastError::Configuration(format!("unknown path id {path_id}")));
        };
        let links: Vec<PathLink> = path.links().collect();
        let workers: Vec<WorkerId> = path.workers().to_vec();

        let mut connected: Vec<PathLink> = Vec::new();
        for link in &links {
            match self.connect_link(link) {
                Ok(()) => connected.push(*link),
                Err(err) => {
                    tracing::warn!(
                        from = link.from,
                        to = link.to,
                        %err,
                        "path link failed, rolling back"
                    );
                    for done in connected.iter().rev() {
                        let _ = self.disconnect_link(done);
                    }
                    return Err(err);
                },
            }
        }

        for worker_id in workers {
            if let Some(worker) = self.workers.get_mut(&worker_id) {
                worker.start();
                worker.enable();
            }
        }
        tracing::info!(path_id, links = links.len(), "path connected");
        Ok(())
    }

    fn connect_link(&self, link: &PathLink) -> Result<()> {
        let origin = self
            .get_filter(link.from)
            .ok_or_else(|| CastError::Configuration(format!("unknown filter id {}", link.from)))?;
        let dest = self
            .get_filter(link.to)
            .ok_or_else(|| CastError::Configuration(format!("unknown filter id {}", link.to)))?;
        if Arc::ptr_eq(&origin, &dest) {
            return Err(CastError::Configuration(format!(
                "filter {} cannot feed itself",
                link.from
            )));
        }

        let (Ok(mut origin), Ok(mut dest)) = (origin.lock(), dest.lock()) else {
            return Err(CastError::Runtime("filter mutex poisoned".to_string()));
        };
        connect_filters(&mut *origin, &mut *dest, link.writer_id, link.reader_id)
    }

    fn disconnect_link(&self, link: &PathLink) -> Result<()> {
        let origin = self
            .get_filter(link.from)
            .ok_or_else(|| CastError::Configuration(format!("unknown filter id {}", link.from)))?;
        let dest = self
            .get_filter(link.to)
            .ok_or_else(|| CastError::Configuration(format!("unknown filter id {}", link.to)))?;
        let (Ok(mut origin), Ok(mut dest)) = (origin.lock(), dest.lock()) else {
            return Err(CastError::Runtime("filter mutex poisoned".to_string()));
        };
        disconnect_filters(&mut *origin, &mut *dest, link.writer_id, link.reader_id)
    }

    /// Tears a path down: stops workers no other path references, breaks
    /// every link, then unregisters the path. Filters stay registered.
    pub fn remove_path(&mut self, path_id: PathId) -> Result<()> {
        let Some(path) = self.paths.remove(&path_id) else {
            return Err(CastError::Configuration(format!("unknown path id {path_id}")));
        };

        for worker_id in path.workers() {
            let shared = self
                .paths
                .values()
                .any(|other| other.workers().contains(worker_id));
            if shared {
                continue;
            }
            if let Some(worker) = self.workers.get_mut(worker_id) {
                worker.stop();
            }
        }

        for link in path.links() {
            if let Err(err) = self.disconnect_link(&link) {
                tracing::warn!(from = link.from, to = link.to, %err, "link teardown failed");
            }
        }
        tracing::info!(path_id, "path removed");
        Ok(())
    }

    /// Starts and enables every registered worker.
    pub fn start_workers(&mut self) {
        for (id, worker) in &mut self.workers {
            if worker.start() {
                tracing::debug!(worker_id = id, "worker started");
            }
            worker.enable();
        }
    }

    /// Stops every registered worker, joining their threads.
    pub fn stop_workers(&mut self) {
        for (id, worker) in &mut self.workers {
            worker.stop();
            tracing::debug!(worker_id = id, "worker stopped");
        }
    }

    #[must_use]
    pub fn worker(&self, id: WorkerId) -> Option<&dyn Worker> {
        self.workers.get(&id).map(|worker| worker.as_ref())
    }

    /// Full teardown: all workers stopped, all links broken.
    pub fn shutdown(&mut self) {
        self.stop_workers();
        let path_ids: Vec<PathId> = self.paths.keys().copied().collect();
        for id in path_ids {
            let _ = self.remove_path(id);
        }
        for entry in self.filters.values() {
            if let Ok(mut filter) = entry.filter.lock() {
                filter.core_mut().disconnect_all();
                filter.stop();
            }
        }
        self.shutdown = true;
    }

    /// Dispatches a control event against the manager's event map.
    pub fn handle_event(&mut self, action: &str, params: &Value) -> EventResponse {
        match action {
            "getState" => self.get_state_event(),
            "reconfigAudioEncoder" => self.reconfig_audio_encoder_event(params),
            "addFilter" => self.add_filter_event(params),
            "addWorker" => self.add_worker_event(params),
            "addPath" => self.add_path_event(params),
            "removePath" => self.remove_path_event(params),
            "stop" => {
                self.stop_workers();
                self.shutdown = true;
                EventResponse::ok()
            },
            _ => {
                tracing::warn!(action, "unknown manager event");
                EventResponse::unknown_action()
            },
        }
    }

    fn get_state_event(&self) -> EventResponse {
        let filters: Vec<Value> = self
            .filters
            .iter()
            .map(|(id, entry)| {
                let kind = entry
                    .filter
                    .lock()
                    .map_or(Value::Null, |f| json!(f.kind()));
                json!({ "id": id, "kind": kind, "workerId": entry.worker })
            })
            .collect();
        let paths: Vec<Value> = self
            .paths
            .iter()
            .map(|(id, path)| {
                json!({
                    "id": id,
                    "filters": path.filters(),
                    "originWriter": path.origin_writer(),
                    "destinationReader": path.destination_reader(),
                    "workers": path.workers(),
                })
            })
            .collect();
        let workers: Vec<Value> = self
            .workers
            .iter()
            .map(|(id, worker)| {
                json!({
                    "id": id,
                    "running": worker.is_running(),
                    "enabled": worker.is_enabled(),
                })
            })
            .collect();
        EventResponse::ok_with(json!({
            "filters": filters,
            "paths": paths,
            "workers": workers,
        }))
    }

    fn reconfig_audio_encoder_event(&mut self, params: &Value) -> EventResponse {
        let Some(encoder_id) = self.search_filter_by_kind(FilterKind::AudioEncoder) else {
            return EventResponse::err("no audio encoder in the pipeline");
        };
        let Some(filter) = self.get_filter(encoder_id) else {
            return EventResponse::err("no audio encoder in the pipeline");
        };
        let response = match filter.lock() {
            Ok(mut filter) => filter.process_event("configure", params),
            Err(_) => EventResponse::err("encoder unavailable"),
        };
        response
    }

    fn add_filter_event(&mut self, params: &Value) -> EventResponse {
        #[derive(Deserialize)]
        struct AddFilterParams {
            id: FilterId,
            kind: String,
            #[serde(default)]
            params: Value,
        }
        let parsed: AddFilterParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return EventResponse::err(e.to_string()),
        };
        let filter = match self.registry.create(&parsed.kind, &parsed.params) {
            Ok(filter) => filter,
            Err(e) => return EventResponse::err(e.to_string()),
        };
        match self.add_filter(parsed.id, filter) {
            Ok(()) => EventResponse::ok(),
            Err(e) => EventResponse::err(e.to_string()),
        }
    }

    fn add_worker_event(&mut self, params: &Value) -> EventResponse {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct AddWorkerParams {
            id: WorkerId,
            filter_id: FilterId,
            #[serde(default)]
            max_fps: u32,
        }
        let parsed: AddWorkerParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return EventResponse::err(e.to_string()),
        };
        let Some(filter) = self.get_filter(parsed.filter_id) else {
            return EventResponse::err(format!("unknown filter id {}", parsed.filter_id));
        };
        let worker = SimpleWorker::with_fps(filter, parsed.max_fps);
        if let Err(e) = self.add_worker(parsed.id, Box::new(worker)) {
            return EventResponse::err(e.to_string());
        }
        match self.assign_worker(parsed.filter_id, parsed.id) {
            Ok(()) => EventResponse::ok(),
            Err(e) => {
                self.workers.remove(&parsed.id);
                EventResponse::err(e.to_string())
            },
        }
    }

    fn add_path_event(&mut self, params: &Value) -> EventResponse {
        #[derive(Deserialize)]
        struct AddPathParams {
            id: PathId,
            #[serde(flatten)]
            path: Path,
        }
        let parsed: AddPathParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return EventResponse::err(e.to_string()),
        };
        if parsed.path.filters().len() < 2 {
            return EventResponse::err("a path needs at least two filters");
        }
        if let Err(e) = self.add_path(parsed.id, parsed.path) {
            return EventResponse::err(e.to_string());
        }
        if let Err(e) = self.add_workers_to_path(parsed.id) {
            self.paths.remove(&parsed.id);
            return EventResponse::err(e.to_string());
        }
        if let Err(e) = self.connect_path(parsed.id) {
            self.paths.remove(&parsed.id);
            return EventResponse::err(e.to_string());
        }
        EventResponse::ok()
    }

    fn remove_path_event(&mut self, params: &Value) -> EventResponse {
        #[derive(Deserialize)]
        struct RemovePathParams {
            id: PathId,
        }
        let parsed: RemovePathParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return EventResponse::err(e.to_string()),
        };
        match self.remove_path(parsed.id) {
            Ok(()) => EventResponse::ok(),
            Err(e) => EventResponse::err(e.to_string()),
        }
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        if !self.shutdown {
            self.shutdown();
        }
    }
}

/// The manager as shared between the control thread and the setup code.
pub type SharedManager = Arc<Mutex<PipelineManager>>;

/// Wraps a manager for sharing with the controller.
#[must_use]
pub fn shared_manager(manager: PipelineManager) -> SharedManager {
    Arc::new(Mutex::new(manager))
}
