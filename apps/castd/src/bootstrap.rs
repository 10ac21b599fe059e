// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Builds the pipeline described in the configuration.

use crate::config::{FilterDef, FilterKindDef, PipelineConfig};
use castkit_core::error::Result;
use castkit_core::filter::{Filter, SharedFilter};
use castkit_core::path::Path;
use castkit_core::shared;
use castkit_engine::pipeline::PipelineManager;
use castkit_engine::registry::FilterRegistry;
use castkit_filters::{AudioEncoder, AudioMixer};
use serde::Deserialize;

fn build_filter(def: &FilterDef) -> SharedFilter {
    match def.kind {
        FilterKindDef::AudioMixer => {
            shared(AudioMixer::with_format(def.inputs, def.channels, def.sample_rate))
        },
        FilterKindDef::AudioEncoder => shared(AudioEncoder::new()),
    }
}

/// Factories behind the control channel's `addFilter` event.
#[must_use]
pub fn filter_registry() -> FilterRegistry {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct MixerParams {
        inputs: usize,
        channels: u16,
        sample_rate: u32,
    }

    impl Default for MixerParams {
        fn default() -> Self {
            Self { inputs: 2, channels: 2, sample_rate: 48_000 }
        }
    }

    let mut registry = FilterRegistry::new();
    registry.register("audioMixer", |params| {
        let parsed = if params.is_null() {
            MixerParams::default()
        } else {
            castkit_core::events::parse_params(params)?
        };
        Ok(shared(AudioMixer::with_format(parsed.inputs, parsed.channels, parsed.sample_rate)))
    });
    registry.register("audioEncoder", |_params| Ok(shared(AudioEncoder::new())));
    registry
}

/// Registers every configured filter and path and connects the paths.
///
/// Workers are created per path and started by `connect_path`; filters with a
/// `max_fps` cap get it applied to their pacing budget.
pub fn build_pipeline(config: &PipelineConfig) -> Result<PipelineManager> {
    let mut manager = PipelineManager::new();
    manager.set_registry(filter_registry());

    for def in &config.filters {
        let filter = build_filter(def);
        if def.max_fps > 0 {
            if let Ok(mut locked) = filter.lock() {
                locked.core_mut().set_max_fps(def.max_fps);
            }
        }
        manager.add_filter(def.id, filter)?;
        tracing::info!(id = def.id, kind = ?def.kind, "filter registered");
    }

    for def in &config.paths {
        let path = Path::with_endpoints(
            def.filters.clone(),
            def.origin_writer,
            def.destination_reader,
        );
        manager.add_path(def.id, path)?;
        manager.add_workers_to_path(def.id)?;
        manager.connect_path(def.id)?;
        tracing::info!(id = def.id, filters = ?def.filters, "path connected");
    }

    Ok(manager)
}
