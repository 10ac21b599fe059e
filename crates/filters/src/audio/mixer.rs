// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Many-to-one audio mixer.
//!
//! Mixes every connected input into one S16 output stream: per-input gain,
//! master gain, and a selectable mix algorithm applied per channel. Inputs
//! that have no frame this cycle simply contribute nothing; the mixer emits
//! whenever at least one input is live, so a silent channel never stalls the
//! others.
//!
//! Runtime control happens through the event map: `changeChannelVolume`,
//! `muteChannel`, `soloChannel`, `changeMasterVolume`, `muteMaster`.

use castkit_core::events::{parse_params, EventResponse};
use castkit_core::filter::{Filter, FilterCore, FilterKind, ProcessOutcome, StepVerdict};
use castkit_core::frame::{AudioFormat, Frame, FrameFormat, SampleFormat};
use castkit_core::io::Reader;
use castkit_core::queue::{ForcePolicy, FrameQueue, DEFAULT_QUEUE_SLOTS};
use castkit_core::{ReaderId, WriterId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_CHANNEL_GAIN: f32 = 1.0;
const DEFAULT_MASTER_GAIN: f32 = 1.0;
const COMPRESSION_THRESHOLD: f32 = 0.6;

/// How summed channels are folded back into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MixAlgorithm {
    /// Scale every sample by `1 / input_count`.
    LevelAverage,
    /// Soft-knee compression above a fixed threshold.
    DynamicCompress,
}

#[derive(Deserialize)]
struct ChannelVolumeParams {
    id: ReaderId,
    volume: f32,
}

#[derive(Deserialize)]
struct ChannelParams {
    id: ReaderId,
}

#[derive(Deserialize)]
struct MasterVolumeParams {
    volume: f32,
}

struct MixerState {
    format: AudioFormat,
    gains: BTreeMap<ReaderId, f32>,
    master_gain: f32,
    threshold: f32,
    algorithm: MixAlgorithm,
    /// Per-channel scratch for one input's samples.
    samples: Vec<f32>,
    /// Per-channel accumulator.
    mixed: Vec<f32>,
}

/// Many-to-one audio mixer filter.
pub struct AudioMixer {
    core: FilterCore,
    state: MixerState,
}

impl AudioMixer {
    /// A mixer for `inputs` channels with the default output format.
    #[must_use]
    pub fn new(inputs: usize) -> Self {
        Self::with_format(inputs, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE)
    }

    /// A mixer with an explicit output channel count and sample rate.
    #[must_use]
    pub fn with_format(inputs: usize, channels: u16, sample_rate: u32) -> Self {
        let format = AudioFormat {
            sample_format: SampleFormat::S16,
            channels,
            sample_rate,
            // 20ms worth of samples per frame.
            samples_per_frame: (sample_rate / 50) as usize,
        };
        Self {
            core: FilterCore::many_to_one(inputs),
            state: MixerState {
                format,
                gains: BTreeMap::new(),
                master_gain: DEFAULT_MASTER_GAIN,
                threshold: COMPRESSION_THRESHOLD,
                algorithm: MixAlgorithm::DynamicCompress,
                samples: Vec::new(),
                mixed: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn gain(&self, id: ReaderId) -> Option<f32> {
        self.state.gains.get(&id).copied()
    }

    #[must_use]
    pub fn master_gain(&self) -> f32 {
        self.state.master_gain
    }
}

impl MixerState {
    fn mix(&mut self, inputs: &[(ReaderId, Option<&Frame>)], dst: &mut Frame) -> StepVerdict {
        let live: Vec<(ReaderId, &Frame)> =
            inputs.iter().filter_map(|(id, f)| f.map(|f| (*id, f))).collect();
        if live.is_empty() {
            return StepVerdict::Hold;
        }

        let total_inputs = inputs.len();
        let mut out_samples = 0;
        for ch in 0..self.format.channels {
            self.mixed.clear();
            for (id, frame) in &live {
                let n = frame.channel_to_f32(ch, &mut self.samples);
                if n == 0 {
                    continue;
                }
                if self.mixed.len() < n {
                    self.mixed.resize(n, 0.0);
                }
                let gain = self.gains.get(id).copied().unwrap_or(DEFAULT_CHANNEL_GAIN);
                apply_gain(&mut self.samples, gain);
                for (acc, sample) in self.mixed.iter_mut().zip(&self.samples) {
                    *acc += sample;
                }
            }
            self.apply_algorithm(total_inputs);
            apply_gain(&mut self.mixed, self.master_gain);
            out_samples = out_samples.max(self.mixed.len());
            dst.fill_channel_from_f32(ch, &self.mixed);
        }

        let bytes = out_samples
            * self.format.channels as usize
            * self.format.sample_format.bytes_per_sample();
        dst.set_len(bytes);
        dst.set_format(FrameFormat::Audio(self.format));
        dst.set_presentation_us(live.iter().map(|(_, f)| f.presentation_us()).max().unwrap_or(0));
        StepVerdict::Emit
    }

    fn apply_algorithm(&mut self, input_count: usize) {
        match self.algorithm {
            MixAlgorithm::LevelAverage => level_average(&mut self.mixed, input_count),
            MixAlgorithm::DynamicCompress => {
                dynamic_compress(&mut self.mixed, input_count, self.threshold);
            },
        }
    }
}

fn apply_gain(samples: &mut [f32], gain: f32) {
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

fn level_average(samples: &mut [f32], input_count: usize) {
    // TODO: store the averaged value back into the buffer.
    let scale = 1.0 / input_count as f32;
    for sample in samples.iter().copied() {
        let _ = sample * scale;
    }
}

fn dynamic_compress(samples: &mut [f32], input_count: usize, threshold: f32) {
    // TODO: store the compressed value back into the buffer.
    for sample in samples.iter().copied() {
        if sample.abs() > threshold {
            let knee = threshold
                + ((1.0 - threshold) / (input_count as f32 - threshold)) * (sample.abs() - threshold);
            let _ = sample.signum() * knee;
        }
    }
}

impl Filter for AudioMixer {
    fn kind(&self) -> FilterKind {
        FilterKind::AudioMixer
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn alloc_queue(&self, _writer_id: WriterId) -> Arc<FrameQueue> {
        Arc::new(FrameQueue::new(
            DEFAULT_QUEUE_SLOTS,
            FrameFormat::Audio(self.state.format),
            ForcePolicy::Duplicate,
        ))
    }

    fn set_reader(&mut self, id: ReaderId, _queue: &Arc<FrameQueue>) -> Option<Arc<Reader>> {
        let reader = self.core.insert_reader(id)?;
        self.state.gains.insert(id, DEFAULT_CHANNEL_GAIN);
        Some(reader)
    }

    fn process(&mut self) -> ProcessOutcome {
        let state = &mut self.state;
        self.core.step_many_to_one(|inputs, dst| state.mix(inputs, dst))
    }

    fn process_event(&mut self, action: &str, params: &serde_json::Value) -> EventResponse {
        match action {
            "changeChannelVolume" => {
                let parsed: ChannelVolumeParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return EventResponse::err(e.to_string()),
                };
                if parsed.volume < 0.0 {
                    return EventResponse::err("volume must be non-negative");
                }
                match self.state.gains.get_mut(&parsed.id) {
                    Some(gain) => {
                        *gain = parsed.volume;
                        EventResponse::ok()
                    },
                    None => EventResponse::err(format!("unknown channel id {}", parsed.id)),
                }
            },
            "muteChannel" => {
                let parsed: ChannelParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return EventResponse::err(e.to_string()),
                };
                match self.state.gains.get_mut(&parsed.id) {
                    Some(gain) => {
                        *gain = 0.0;
                        EventResponse::ok()
                    },
                    None => EventResponse::err(format!("unknown channel id {}", parsed.id)),
                }
            },
            "soloChannel" => {
                let parsed: ChannelParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return EventResponse::err(e.to_string()),
                };
                if !self.state.gains.contains_key(&parsed.id) {
                    return EventResponse::err(format!("unknown channel id {}", parsed.id));
                }
                for (id, gain) in &mut self.state.gains {
                    *gain = if *id == parsed.id { DEFAULT_CHANNEL_GAIN } else { 0.0 };
                }
                EventResponse::ok()
            },
            "changeMasterVolume" => {
                let parsed: MasterVolumeParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return EventResponse::err(e.to_string()),
                };
                self.state.master_gain = parsed.volume;
                EventResponse::ok()
            },
            "muteMaster" => {
                self.state.master_gain = 0.0;
                EventResponse::ok()
            },
            _ => {
                tracing::warn!(action, "unknown mixer event");
                EventResponse::unknown_action()
            },
        }
    }
}
