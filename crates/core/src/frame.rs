// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media frames and their format descriptors.
//!
//! A [`Frame`] is a fixed-capacity payload buffer plus a presentation timestamp
//! and a [`FrameFormat`] descriptor. Frames are preallocated inside a
//! [`crate::queue::FrameQueue`] and recycled for the lifetime of the queue;
//! nothing in the hot path allocates.

use serde::{Deserialize, Serialize};

/// Sample encoding of raw audio payloads.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 8-bit companded (G.711-style payloads).
    U8,
    /// 16-bit signed integer, interleaved.
    S16,
    /// 32-bit floating point, interleaved.
    F32,
}

impl SampleFormat {
    /// Bytes per single sample.
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::F32 => 4,
        }
    }
}

/// Format metadata for an audio stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    /// Samples per channel carried by one full frame.
    pub samples_per_frame: usize,
}

impl AudioFormat {
    /// Payload bytes needed for one full frame in this format.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.samples_per_frame * self.channels as usize * self.sample_format.bytes_per_sample()
    }
}

/// Pixel layout of raw video payloads.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Yuv420p,
    Rgb24,
}

/// Format metadata for a video stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct VideoFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl VideoFormat {
    /// Payload bytes needed for one full frame in this format.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        let pixels = (self.width * self.height) as usize;
        match self.pixel_format {
            PixelFormat::Yuv420p => pixels * 3 / 2,
            PixelFormat::Rgb24 => pixels * 3,
        }
    }
}

/// Media type descriptor carried by every frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum FrameFormat {
    Audio(AudioFormat),
    Video(VideoFormat),
}

impl FrameFormat {
    /// Payload capacity a queue slot must provide for this format.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        match self {
            Self::Audio(a) => a.frame_bytes(),
            Self::Video(v) => v.frame_bytes(),
        }
    }
}

/// One media sample: payload bytes, presentation time and format.
///
/// `length` is set by the producing side and read by the consuming side when
/// the frame crosses from the queue rear to the queue front. The backing
/// buffer never grows after construction.
#[derive(Debug, Clone)]
pub struct Frame {
    payload: Box<[u8]>,
    length: usize,
    presentation_us: u64,
    format: FrameFormat,
}

impl Frame {
    /// Creates an empty frame with `capacity` payload bytes.
    pub fn new(capacity: usize, format: FrameFormat) -> Self {
        Self { payload: vec![0; capacity].into_boxed_slice(), length: 0, presentation_us: 0, format }
    }

    /// Creates an empty frame sized for one full frame of `format`.
    pub fn for_format(format: FrameFormat) -> Self {
        Self::new(format.frame_bytes(), format)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Sets the valid payload length, clamped to capacity.
    pub fn set_len(&mut self, length: usize) {
        self.length = length.min(self.payload.len());
    }

    #[must_use]
    pub const fn presentation_us(&self) -> u64 {
        self.presentation_us
    }

    pub fn set_presentation_us(&mut self, us: u64) {
        self.presentation_us = us;
    }

    #[must_use]
    pub const fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn set_format(&mut self, format: FrameFormat) {
        self.format = format;
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.length]
    }

    /// The whole backing buffer; pair with [`Frame::set_len`].
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Copies `bytes` into the frame and stamps the presentation time.
    ///
    /// Returns `false` without touching the frame if `bytes` exceeds capacity.
    pub fn fill_from(&mut self, bytes: &[u8], presentation_us: u64) -> bool {
        if bytes.len() > self.payload.len() {
            return false;
        }
        self.payload[..bytes.len()].copy_from_slice(bytes);
        self.length = bytes.len();
        self.presentation_us = presentation_us;
        true
    }

    /// Copies payload, length, timestamp and format from `other`.
    ///
    /// Returns `false` without touching the frame if `other` does not fit.
    pub fn copy_payload_from(&mut self, other: &Self) -> bool {
        if other.length > self.payload.len() {
            return false;
        }
        self.payload[..other.length].copy_from_slice(other.payload());
        self.length = other.length;
        self.presentation_us = other.presentation_us;
        self.format = other.format;
        true
    }

    #[must_use]
    pub const fn audio_format(&self) -> Option<&AudioFormat> {
        match &self.format {
            FrameFormat::Audio(a) => Some(a),
            FrameFormat::Video(_) => None,
        }
    }

    /// Samples per channel currently held, for S16 interleaved audio frames.
    #[must_use]
    pub fn audio_samples(&self) -> usize {
        match self.audio_format() {
            Some(fmt) if fmt.channels > 0 => {
                self.length / (fmt.channels as usize * fmt.sample_format.bytes_per_sample())
            },
            _ => 0,
        }
    }

    /// Extracts one channel of an S16 interleaved payload into `out` as f32 in
    /// [-1.0, 1.0]. Returns the number of samples written.
    pub fn channel_to_f32(&self, channel: u16, out: &mut Vec<f32>) -> usize {
        let Some(fmt) = self.audio_format() else { return 0 };
        if fmt.sample_format != SampleFormat::S16 || channel >= fmt.channels {
            return 0;
        }
        let channels = fmt.channels as usize;
        let samples = self.audio_samples();
        out.clear();
        out.reserve(samples);
        for i in 0..samples {
            let off = (i * channels + channel as usize) * 2;
            let raw = i16::from_le_bytes([self.payload[off], self.payload[off + 1]]);
            out.push(f32::from(raw) / 32768.0);
        }
        samples
    }

    /// Writes `samples` into one channel of an S16 interleaved payload,
    /// clamping to [-1.0, 1.0]. The caller is responsible for `set_len`.
    pub fn fill_channel_from_f32(&mut self, channel: u16, samples: &[f32]) {
        let Some(fmt) = self.audio_format().copied() else { return };
        if fmt.sample_format != SampleFormat::S16 || channel >= fmt.channels {
            return;
        }
        let channels = fmt.channels as usize;
        for (i, sample) in samples.iter().enumerate() {
            let off = (i * channels + channel as usize) * 2;
            if off + 1 >= self.payload.len() {
                break;
            }
            let clamped = sample.clamp(-1.0, 1.0);
            let raw = (clamped * 32767.0) as i16;
            self.payload[off..off + 2].copy_from_slice(&raw.to_le_bytes());
        }
    }
}
