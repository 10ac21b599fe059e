// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Event plumbing between the control plane and filters.
//!
//! The wire keeps string-keyed actions and free-form JSON params; inside the
//! crates each component deserializes its params into a tagged struct and
//! answers with an [`EventResponse`]. Every response carries at least
//! `{"error": null | "<message>"}`.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::{CastError, Result};

/// Outcome of one event dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventResponse {
    error: Option<String>,
    fields: Map<String, Value>,
}

impl EventResponse {
    /// Success with no extra fields.
    #[must_use]
    pub fn ok() -> Self {
        Self { error: None, fields: Map::new() }
    }

    /// Success carrying handler-supplied fields.
    ///
    /// Non-object `fields` values are wrapped under a `"result"` key.
    #[must_use]
    pub fn ok_with(fields: Value) -> Self {
        match fields {
            Value::Object(map) => Self { error: None, fields: map },
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                Self { error: None, fields: map }
            },
        }
    }

    /// Failure with an explanatory message.
    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), fields: Map::new() }
    }

    /// The canonical answer for actions nobody recognizes.
    #[must_use]
    pub fn unknown_action() -> Self {
        Self::err("unknown action")
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serializes into the wire shape: handler fields plus the `error` key.
    #[must_use]
    pub fn into_json(self) -> Value {
        let mut map = self.fields;
        map.insert("error".to_string(), self.error.map_or(Value::Null, Value::String));
        Value::Object(map)
    }
}

impl From<Result<Value>> for EventResponse {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(fields) => Self::ok_with(fields),
            Err(err) => Self::err(err.to_string()),
        }
    }
}

/// Deserializes event params into a handler's tagged struct.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| CastError::Configuration(format!("invalid params: {e}")))
}

/// Convenience for handlers answering a plain key/value pair.
#[must_use]
pub fn field(key: &str, value: Value) -> Value {
    json!({ key: value })
}
