// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Filter factory registry.
//!
//! The control surface creates filters by kind name (`"audioMixer"`,
//! `"audioEncoder"`, ...). The engine does not know the concrete filter
//! types; the application registers a factory per kind at startup and the
//! manager's `addFilter` event looks them up here.

use castkit_core::error::{CastError, Result};
use castkit_core::filter::SharedFilter;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds one filter instance from its event params.
pub type FilterFactory = Arc<dyn Fn(&Value) -> Result<SharedFilter> + Send + Sync>;

/// Central registry of all filter kinds the engine can construct.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    factories: BTreeMap<String, FilterFactory>,
}

impl FilterRegistry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a kind name, replacing any previous one.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&Value) -> Result<SharedFilter> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    /// Instantiates a filter of the given kind.
    pub fn create(&self, kind: &str, params: &Value) -> Result<SharedFilter> {
        let Some(factory) = self.factories.get(kind) else {
            return Err(CastError::Configuration(format!("unknown filter kind '{kind}'")));
        };
        factory(params)
    }

    /// Registered kind names, for state reports.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castkit_core::filter::{
        Filter, FilterCore, FilterKind, ProcessOutcome, WriterId,
    };
    use castkit_core::frame::{AudioFormat, FrameFormat, SampleFormat};
    use castkit_core::queue::{ForcePolicy, FrameQueue};
    use castkit_core::shared;

    struct Null {
        core: FilterCore,
    }

    impl Filter for Null {
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
            let format = FrameFormat::Audio(AudioFormat {
                sample_format: SampleFormat::S16,
                channels: 1,
                sample_rate: 8000,
                samples_per_frame: 8,
            });
            Arc::new(FrameQueue::new(2, format, ForcePolicy::Duplicate))
        }
        fn process(&mut self) -> ProcessOutcome {
            ProcessOutcome::Idle
        }
    }

    #[test]
    fn creates_registered_kinds_and_rejects_others() {
        let mut registry = FilterRegistry::new();
        registry.register("null", |_params| Ok(shared(Null { core: FilterCore::one_to_one() })));

        assert!(registry.create("null", &Value::Null).is_ok());
        let err = registry.create("mystery", &Value::Null).unwrap_err();
        assert!(err.to_string().contains("unknown filter kind 'mystery'"));
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["null"]);
    }
}
