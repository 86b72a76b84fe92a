// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Media-format descriptors that flow between ports.
//!
//! A [`MediaFormat`] is an immutable value. Ports never own one directly;
//! they hold a [`crate::format_registry::FormatHandle`] so that many ports can
//! share a single interned descriptor.
//!
//! All byte counts in this crate are expressed *per buffer*: for interleaved
//! data a buffer holds every channel, for deinterleaved data each channel has
//! its own buffer and byte counts refer to one of them.

use serde::{Deserialize, Serialize};

/// Sample layout of PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interleaving {
    #[default]
    Interleaved,
    Deinterleaved,
}

/// Byte order of multi-byte PCM samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Detailed description of a linear PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    #[serde(default)]
    pub interleaving: Interleaving,
    #[serde(default)]
    pub endianness: Endianness,
}

impl PcmFormat {
    /// Interleaved little-endian PCM, the common case.
    pub const fn interleaved(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            interleaving: Interleaving::Interleaved,
            endianness: Endianness::Little,
        }
    }

    /// Deinterleaved little-endian PCM (one buffer per channel).
    pub const fn deinterleaved(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            interleaving: Interleaving::Deinterleaved,
            endianness: Endianness::Little,
        }
    }

    pub const fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes occupied by one sample instant inside a single buffer.
    pub const fn frame_bytes_per_buf(&self) -> usize {
        match self.interleaving {
            Interleaving::Interleaved => self.bytes_per_sample() * self.channels as usize,
            Interleaving::Deinterleaved => self.bytes_per_sample(),
        }
    }
}

/// Describes the format of data on a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaFormat {
    /// Linear PCM.
    Pcm(PcmFormat),
    /// Framed compressed data whose frames carry a known sample rate (e.g. after a packetizer).
    Packetized { format_id: u32, sample_rate: u32, channels: u16 },
    /// Raw compressed bitstream.
    Raw { format_id: u32 },
}

impl MediaFormat {
    pub const fn pcm(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self::Pcm(PcmFormat::interleaved(sample_rate, channels, bits_per_sample))
    }

    pub const fn is_pcm(&self) -> bool {
        matches!(self, Self::Pcm(_))
    }

    pub const fn as_pcm(&self) -> Option<&PcmFormat> {
        match self {
            Self::Pcm(pcm) => Some(pcm),
            _ => None,
        }
    }

    /// Number of buffers a stream of this format is spread over.
    pub fn num_bufs(&self) -> usize {
        match self {
            Self::Pcm(pcm) if pcm.interleaving == Interleaving::Deinterleaved => {
                usize::from(pcm.channels.max(1))
            },
            _ => 1,
        }
    }

    /// Duration in microseconds of `bytes` (per buffer). `None` for non-PCM data.
    pub fn bytes_to_us(&self, bytes: usize) -> Option<u64> {
        let pcm = self.as_pcm()?;
        let frame = pcm.frame_bytes_per_buf();
        if frame == 0 || pcm.sample_rate == 0 {
            return None;
        }
        let samples = (bytes / frame) as u64;
        Some(samples * 1_000_000 / u64::from(pcm.sample_rate))
    }

    /// Bytes (per buffer) needed to hold `us` microseconds, rounded down to a whole sample.
    /// Non-PCM formats have no time base and return zero.
    pub fn us_to_bytes(&self, us: u64) -> usize {
        let Some(pcm) = self.as_pcm() else {
            return 0;
        };
        let samples = us * u64::from(pcm.sample_rate) / 1_000_000;
        usize::try_from(samples).unwrap_or(usize::MAX).saturating_mul(pcm.frame_bytes_per_buf())
    }

    /// Translates a byte count from this format's domain into `to`'s domain.
    ///
    /// Only PCM on both sides is rescaled (sample rate and frame size); anything
    /// else is carried through unchanged.
    pub fn convert_bytes_to(&self, to: &Self, bytes: usize) -> usize {
        let (Some(from_pcm), Some(to_pcm)) = (self.as_pcm(), to.as_pcm()) else {
            return bytes;
        };
        let from_frame = from_pcm.frame_bytes_per_buf();
        if from_frame == 0 || from_pcm.sample_rate == 0 {
            return bytes;
        }
        let samples = (bytes / from_frame) as u64;
        let scaled = samples * u64::from(to_pcm.sample_rate) / u64::from(from_pcm.sample_rate);
        usize::try_from(scaled).unwrap_or(usize::MAX).saturating_mul(to_pcm.frame_bytes_per_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_frame_sizes() {
        let stereo16 = PcmFormat::interleaved(48_000, 2, 16);
        assert_eq!(stereo16.frame_bytes_per_buf(), 4);

        let stereo16_di = PcmFormat::deinterleaved(48_000, 2, 16);
        assert_eq!(stereo16_di.frame_bytes_per_buf(), 2);
        assert_eq!(MediaFormat::Pcm(stereo16_di).num_bufs(), 2);
        assert_eq!(MediaFormat::Pcm(stereo16).num_bufs(), 1);

        let odd = PcmFormat::interleaved(8_000, 1, 24);
        assert_eq!(odd.bytes_per_sample(), 3);
    }

    #[test]
    fn duration_conversions() {
        let fmt = MediaFormat::pcm(48_000, 2, 16);
        // 1 ms at 48 kHz stereo 16-bit = 48 samples * 4 bytes
        assert_eq!(fmt.us_to_bytes(1_000), 192);
        assert_eq!(fmt.bytes_to_us(192), Some(1_000));

        let raw = MediaFormat::Raw { format_id: 7 };
        assert_eq!(raw.us_to_bytes(1_000), 0);
        assert_eq!(raw.bytes_to_us(100), None);
    }

    #[test]
    fn convert_between_rates() {
        let hi = MediaFormat::pcm(48_000, 1, 16);
        let lo = MediaFormat::pcm(16_000, 1, 16);
        assert_eq!(hi.convert_bytes_to(&lo, 96), 32);
        assert_eq!(lo.convert_bytes_to(&hi, 32), 96);

        // Non-PCM passes through untouched.
        let raw = MediaFormat::Raw { format_id: 1 };
        assert_eq!(raw.convert_bytes_to(&hi, 50), 50);
        assert_eq!(hi.convert_bytes_to(&raw, 50), 50);
    }

    #[test]
    fn deserializes_from_yaml() {
        let fmt: MediaFormat = serde_saphyr::from_str(
            "kind: pcm\nsample_rate: 16000\nchannels: 1\nbits_per_sample: 16\n",
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(fmt, MediaFormat::pcm(16_000, 1, 16));
    }
}
