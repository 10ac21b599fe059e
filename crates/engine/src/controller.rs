// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The control channel: newline-delimited JSON over TCP.
//!
//! One control connection is served at a time. Each message is a JSON object
//! `{"action": "...", "filterId"?: n, "params"?: {...}}`, at most
//! [`MSG_BUFFER_MAX_LENGTH`] bytes. A recognized `filterId` routes the action
//! to that filter's event map; everything else goes to the manager's map.
//! Every reply carries at least `{"error": null | "<message>"}`. Malformed
//! JSON closes the connection; the listener keeps accepting.

use crate::pipeline::SharedManager;
use castkit_core::error::{CastError, Result};
use castkit_core::events::EventResponse;
use castkit_core::filter::{Filter, FilterId};
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};

/// Upper bound on one control message, terminator included.
pub const MSG_BUFFER_MAX_LENGTH: usize = 4096;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlRequest {
    action: String,
    filter_id: Option<FilterId>,
    #[serde(default)]
    params: Value,
}

/// Event dispatcher bridging the control socket to the pipeline.
pub struct Controller {
    manager: SharedManager,
    listener: TcpListener,
}

impl Controller {
    /// Binds the control socket. A failure here is fatal to the process
    /// (exit code 1 by convention).
    pub fn bind(manager: SharedManager, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|e| CastError::Network(format!("control socket on port {port}: {e}")))?;
        tracing::info!(port, "control channel listening");
        Ok(Self { manager, listener })
    }

    /// Port the listener actually bound (useful with port 0).
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept loop: serves one connection at a time until a `stop` event
    /// requests shutdown. Per-connection I/O failures only close that
    /// connection.
    pub fn run(&self) -> Result<()> {
        loop {
            if self.shutdown_requested() {
                return Ok(());
            }
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "control accept failed");
                    continue;
                },
            };
            tracing::info!(%peer, "control connection accepted");
            if let Err(e) = self.serve_connection(stream) {
                tracing::warn!(error = %e, "control connection closed");
            }
            if self.shutdown_requested() {
                return Ok(());
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.manager.lock().map(|m| m.shutdown_requested()).unwrap_or(true)
    }

    fn serve_connection(&self, stream: TcpStream) -> Result<()> {
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                tracing::debug!("control peer hung up");
                return Ok(());
            }
            if read > MSG_BUFFER_MAX_LENGTH {
                return Err(CastError::Network(format!(
                    "control message exceeds {MSG_BUFFER_MAX_LENGTH} bytes"
                )));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: ControlRequest = match serde_json::from_str(trimmed) {
                Ok(request) => request,
                Err(e) => {
                    // Malformed JSON tears the connection down.
                    return Err(CastError::Network(format!("malformed control message: {e}")));
                },
            };

            let response = self.dispatch(&request);
            let mut payload = response.into_json().to_string();
            payload.push('\n');
            writer.write_all(payload.as_bytes())?;
            writer.flush()?;

            if self.shutdown_requested() {
                return Ok(());
            }
        }
    }

    /// Routes one request: a known `filterId` goes to that filter's event
    /// map, everything else to the manager's internal map.
    fn dispatch(&self, request: &ControlRequest) -> EventResponse {
        tracing::debug!(action = %request.action, filter_id = ?request.filter_id, "control event");

        if let Some(filter_id) = request.filter_id {
            let filter = match self.manager.lock() {
                Ok(manager) => manager.get_filter(filter_id),
                Err(_) => return EventResponse::err("pipeline manager unavailable"),
            };
            if let Some(filter) = filter {
                return match filter.lock() {
                    Ok(mut filter) => filter.process_event(&request.action, &request.params),
                    Err(_) => EventResponse::err("filter unavailable"),
                };
            }
            // Unrecognized filter ids fall through to the manager's map.
        }

        match self.manager.lock() {
            Ok(mut manager) => manager.handle_event(&request.action, &request.params),
            Err(_) => EventResponse::err("pipeline manager unavailable"),
        }
    }
}
