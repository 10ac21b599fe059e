// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! One-to-one audio encoder.
//!
//! Consumes S16 interleaved PCM and produces companded payloads. G.711 µ-law
//! (`pcmu`) is encoded natively; the other codecs named on the control
//! surface (`opus`, `aac`, `mp3`) have no backend in this build, so a
//! `configure` naming them fails and the filter keeps its previous
//! configuration. A frame the encoder cannot handle is logged and retired;
//! the pipeline keeps going.

use castkit_core::events::{parse_params, EventResponse};
use castkit_core::filter::{Filter, FilterCore, FilterKind, ProcessOutcome, StepVerdict};
use castkit_core::frame::{AudioFormat, Frame, FrameFormat, SampleFormat};
use castkit_core::queue::{ForcePolicy, FrameQueue, DEFAULT_QUEUE_SLOTS};
use castkit_core::WriterId;
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_SAMPLE_RATE: u32 = 8000;
const DEFAULT_CHANNELS: u16 = 1;

/// Codecs the control surface may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Pcmu,
    Opus,
    Aac,
    Mp3,
}

impl AudioCodec {
    const fn name(self) -> &'static str {
        match self {
            Self::Pcmu => "pcmu",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureParams {
    codec: AudioCodec,
    sample_rate: u32,
    channels: u16,
}

#[derive(Debug, Clone, Copy)]
struct EncoderConfig {
    codec: AudioCodec,
    sample_rate: u32,
    channels: u16,
}

impl EncoderConfig {
    fn output_format(&self) -> AudioFormat {
        AudioFormat {
            sample_format: SampleFormat::U8,
            channels: self.channels,
            sample_rate: self.sample_rate,
            samples_per_frame: (self.sample_rate / 50) as usize,
        }
    }
}

/// One-to-one audio encoder filter.
pub struct AudioEncoder {
    core: FilterCore,
    config: EncoderConfig,
}

impl Default for AudioEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: FilterCore::one_to_one(),
            config: EncoderConfig {
                codec: AudioCodec::Pcmu,
                sample_rate: DEFAULT_SAMPLE_RATE,
                channels: DEFAULT_CHANNELS,
            },
        }
    }

    #[must_use]
    pub fn codec(&self) -> AudioCodec {
        self.config.codec
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    #[must_use]
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    fn encode(src: &Frame, dst: &mut Frame) -> StepVerdict {
        let Some(src_format) = src.audio_format().copied() else {
            tracing::warn!("encoder fed a non-audio frame, retiring it");
            return StepVerdict::Discard;
        };
        if src_format.sample_format != SampleFormat::S16 {
            tracing::warn!(?src_format, "encoder expects S16 input, retiring frame");
            return StepVerdict::Discard;
        }

        let payload = src.payload();
        let samples = payload.len() / 2;
        if dst.capacity() < samples {
            tracing::warn!(samples, "encoded frame exceeds output capacity, retiring it");
            return StepVerdict::Discard;
        }

        {
            let out = dst.buffer_mut();
            for i in 0..samples {
                let pcm = i16::from_le_bytes([payload[2 * i], payload[2 * i + 1]]);
                out[i] = linear_to_ulaw(pcm);
            }
        }
        dst.set_len(samples);
        dst.set_presentation_us(src.presentation_us());
        StepVerdict::Emit
    }
}

/// G.711 µ-law compression of one 16-bit sample.
fn linear_to_ulaw(pcm: i16) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32_635;

    let sign: u8 = if pcm < 0 { 0x80 } else { 0 };
    let mut magnitude = i32::from(pcm).abs().min(CLIP) + BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    magnitude >>= exponent + 3;
    let mantissa = (magnitude & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

impl Filter for AudioEncoder {
    fn kind(&self) -> FilterKind {
        FilterKind::AudioEncoder
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
            FrameFormat::Audio(self.config.output_format()),
            ForcePolicy::Duplicate,
        ))
    }

    fn process(&mut self) -> ProcessOutcome {
        self.core.step_one_to_one(Self::encode)
    }

    fn process_event(&mut self, action: &str, params: &serde_json::Value) -> EventResponse {
        match action {
            "configure" => {
                let parsed: ConfigureParams = match parse_params(params) {
                    Ok(p) => p,
                    Err(e) => return EventResponse::err(e.to_string()),
                };
                if parsed.codec != AudioCodec::Pcmu {
                    return EventResponse::err(format!(
                        "unsupported codec: {}",
                        parsed.codec.name()
                    ));
                }
                if parsed.channels == 0 || parsed.sample_rate == 0 {
                    return EventResponse::err("sampleRate and channels must be positive");
                }
                self.config = EncoderConfig {
                    codec: parsed.codec,
                    sample_rate: parsed.sample_rate,
                    channels: parsed.channels,
                };
                tracing::info!(
                    codec = parsed.codec.name(),
                    sample_rate = parsed.sample_rate,
                    channels = parsed.channels,
                    "audio encoder reconfigured"
                );
                EventResponse::ok()
            },
            _ => {
                tracing::warn!(action, "unknown encoder event");
                EventResponse::unknown_action()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{feed_filter, tap_filter};
    use castkit_core::DEFAULT_ID;
    use serde_json::json;

    #[test]
    fn ulaw_reference_values() {
        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_ulaw(-1), 0x7F);
        assert_eq!(linear_to_ulaw(i16::MAX), 0x80);
        assert_eq!(linear_to_ulaw(i16::MIN), 0x00);
    }

    #[test]
    fn ulaw_is_monotonic_on_magnitude() {
        // Encoded positive magnitudes decrease as PCM magnitude grows.
        let mut last = linear_to_ulaw(0);
        for pcm in [16, 128, 1024, 8192, 32000] {
            let code = linear_to_ulaw(pcm);
            assert!(code < last, "pcm {pcm} code {code:#x} >= {last:#x}");
            last = code;
        }
    }

    #[test]
    fn encodes_frames_end_to_end() {
        let mut encoder = AudioEncoder::new();
        let input_format = AudioFormat {
            sample_format: SampleFormat::S16,
            channels: 1,
            sample_rate: 8000,
            samples_per_frame: 160,
        };
        let input = feed_filter(&mut encoder, DEFAULT_ID, FrameFormat::Audio(input_format));
        let output = tap_filter(&mut encoder, DEFAULT_ID);

        let rear = input.get_frame(false).expect("rear slot");
        {
            let mut frame = rear.lock();
            let mut bytes = Vec::new();
            for _ in 0..160 {
                bytes.extend_from_slice(&0i16.to_le_bytes());
            }
            frame.fill_from(&bytes, 123);
            frame.set_format(FrameFormat::Audio(input_format));
        }
        input.add_frame();

        assert_eq!(encoder.process(), ProcessOutcome::Worked);

        let front = output.get_frame(false).expect("encoded frame");
        {
            let frame = front.lock();
            assert_eq!(frame.len(), 160);
            assert!(frame.payload().iter().all(|&b| b == 0xFF));
            assert_eq!(frame.presentation_us(), 123);
        }
        drop(front);
        output.remove_frame();
    }

    #[test]
    fn configure_accepts_pcmu() {
        let mut encoder = AudioEncoder::new();
        let resp = encoder.process_event(
            "configure",
            &json!({"codec": "pcmu", "sampleRate": 16_000, "channels": 2}),
        );
        assert!(resp.is_ok(), "{:?}", resp.error());
        assert_eq!(encoder.sample_rate(), 16_000);
        assert_eq!(encoder.channels(), 2);
    }

    #[test]
    fn configure_failure_keeps_previous_config() {
        let mut encoder = AudioEncoder::new();

        let resp = encoder.process_event(
            "configure",
            &json!({"codec": "opus", "sampleRate": 48_000, "channels": 2}),
        );
        assert_eq!(resp.error(), Some("unsupported codec: opus"));
        // Previous configuration survives the failed reconfig.
        assert_eq!(encoder.codec(), AudioCodec::Pcmu);
        assert_eq!(encoder.sample_rate(), DEFAULT_SAMPLE_RATE);
        assert_eq!(encoder.channels(), DEFAULT_CHANNELS);

        let resp = encoder.process_event("configure", &json!({"codec": "wav"}));
        assert!(!resp.is_ok(), "unknown codec names must fail to parse");
    }
}
