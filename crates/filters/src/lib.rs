// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! CastKit Filters - concrete media filters for CastKit pipelines.
//!
//! - [`audio::AudioMixer`]: many-to-one mixer with per-channel gains
//! - [`audio::AudioEncoder`]: one-to-one PCM encoder (G.711 µ-law built in)
//! - [`test_utils`]: identity/fan-out/partition filters for tests and demos

pub mod audio;
pub mod test_utils;

pub use audio::{AudioEncoder, AudioMixer, MixAlgorithm};
