// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sample-rate converter built on rubato's `FastFixedIn`.
//!
//! Input is gathered into fixed chunks of `chunk_frames` frames before each
//! resampler run, so the module buffers data and reports the chunk plus the
//! resampler's own latency as algorithmic delay. After a flushing
//! end-of-stream the engine pads the input with that many zeros, which
//! pushes the last partial chunk through. Markers crossing the module are
//! rescaled by the engine from the input to the output format.

use crate::audio::require_pcm16;
use cyclekit_core::buffer::Buffer;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::{Interleaving, MediaFormat, PcmFormat};
use cyclekit_core::module::{
    EventSink, Module, ModuleCaps, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext,
};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use serde::Deserialize;
use std::collections::VecDeque;

const MAX_RATE: u32 = 384_000;

const fn default_chunk_frames() -> usize {
    960 // 20ms at 48kHz
}

/// Configuration for the RateConverterModule
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateConverterConfig {
    /// Target output sample rate in Hz (e.g., 48000, 24000, 16000)
    pub output_rate: u32,
    /// Input frames per resampler run. Larger values cost more latency.
    pub chunk_frames: usize,
}

impl Default for RateConverterConfig {
    fn default() -> Self {
        Self { output_rate: 48_000, chunk_frames: default_chunk_frames() }
    }
}

impl RateConverterConfig {
    /// # Errors
    ///
    /// Returns an error if the rate is zero or unreasonably high, or the
    /// chunk is empty.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.output_rate == 0 || self.output_rate > MAX_RATE {
            return Err(format!(
                "output_rate must be between 1 and {MAX_RATE}, got: {}",
                self.output_rate
            ));
        }
        if self.chunk_frames == 0 {
            return Err("chunk_frames must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Stream layout and the resampler built for it.
struct Stream {
    pcm: PcmFormat,
    resampler: FastFixedIn<f32>,
    /// Planar input samples waiting for a full chunk.
    pending_in: Vec<Vec<f32>>,
    /// Converted bytes per output buffer, not yet written.
    pending_out: Vec<VecDeque<u8>>,
}

impl Stream {
    fn channels(&self) -> usize {
        usize::from(self.pcm.channels)
    }

    fn num_bufs(&self) -> usize {
        match self.pcm.interleaving {
            Interleaving::Interleaved => 1,
            Interleaving::Deinterleaved => self.channels(),
        }
    }

    /// Appends `frames` input frames starting at byte `skip` to the planar queue.
    fn gather(&mut self, src: &Buffer, skip: usize, frames: usize) {
        let frame = self.pcm.frame_bytes_per_buf();
        let interleaved = self.pcm.interleaving == Interleaving::Interleaved;
        for (ch, planar) in self.pending_in.iter_mut().enumerate() {
            let (buf, lane) = if interleaved { (0, ch) } else { (ch, 0) };
            let data = src.channel(buf);
            planar.extend((0..frames).map(|f| {
                let at = skip + f * frame + lane * 2;
                i16_to_f32([data[at], data[at + 1]])
            }));
        }
    }

    /// Runs the resampler over every complete chunk.
    fn convert(&mut self, chunk: usize) -> Result<()> {
        while self.pending_in.first().is_some_and(|p| p.len() >= chunk) {
            let block: Vec<Vec<f32>> =
                self.pending_in.iter_mut().map(|p| p.drain(..chunk).collect()).collect();
            let planar = self
                .resampler
                .process(&block, None)
                .map_err(|e| CycleKitError::Failed(format!("resampling failed: {e}")))?;
            self.queue_output(&planar);
        }
        Ok(())
    }

    fn queue_output(&mut self, planar: &[Vec<f32>]) {
        let frames = planar.first().map_or(0, Vec::len);
        match self.pcm.interleaving {
            Interleaving::Interleaved => {
                if let Some(out) = self.pending_out.first_mut() {
                    for f in 0..frames {
                        for lane in planar {
                            out.extend(f32_to_i16(lane[f]));
                        }
                    }
                }
            },
            Interleaving::Deinterleaved => {
                for (out, lane) in self.pending_out.iter_mut().zip(planar) {
                    for sample in lane {
                        out.extend(f32_to_i16(*sample));
                    }
                }
            },
        }
    }

    /// Writes as many whole queued frames as fit. Returns the bytes written per buffer.
    fn drain_into(&mut self, dst: &mut Buffer) -> usize {
        let frame = self.pcm.frame_bytes_per_buf();
        let queued = self.pending_out.first().map_or(0, VecDeque::len);
        let len = queued.min(dst.free_space()) / frame * frame;
        if len == 0 {
            return 0;
        }
        let chunks: Vec<Vec<u8>> =
            self.pending_out.iter_mut().map(|q| q.drain(..len).collect()).collect();
        let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
        dst.push_channels(&refs)
    }

    fn has_output(&self) -> bool {
        self.pending_out.first().is_some_and(|q| !q.is_empty())
    }
}

fn i16_to_f32(bytes: [u8; 2]) -> f32 {
    f32::from(i16::from_le_bytes(bytes)) / 32_768.0
}

#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> [u8; 2] {
    let scaled = (sample * 32_768.0).round().clamp(-32_768.0, 32_767.0);
    (scaled as i16).to_le_bytes()
}

pub struct RateConverterModule {
    output_rate: u32,
    chunk_frames: usize,
    stream: Option<Stream>,
}

impl RateConverterModule {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RateConverterConfig) -> std::result::Result<Self, String> {
        config.validate()?;
        Ok(Self { output_rate: config.output_rate, chunk_frames: config.chunk_frames, stream: None })
    }

    fn build(&self, pcm: PcmFormat) -> Result<Stream> {
        let channels = usize::from(pcm.channels);
        let resampler = FastFixedIn::<f32>::new(
            f64::from(self.output_rate) / f64::from(pcm.sample_rate),
            1.0,
            PolynomialDegree::Linear,
            self.chunk_frames,
            channels,
        )
        .map_err(|e| CycleKitError::Configuration(format!("Failed to create resampler: {e}")))?;
        let num_bufs = match pcm.interleaving {
            Interleaving::Interleaved => 1,
            Interleaving::Deinterleaved => channels,
        };
        Ok(Stream {
            pcm,
            resampler,
            pending_in: vec![Vec::with_capacity(self.chunk_frames); channels],
            pending_out: vec![VecDeque::new(); num_bufs],
        })
    }

    /// Chunk latency at the input rate plus the resampler's output delay.
    fn delay_us(&self, stream: &Stream) -> u64 {
        let frames_us = |frames: usize, rate: u32| {
            u64::try_from(frames).unwrap_or(u64::MAX).saturating_mul(1_000_000) / u64::from(rate)
        };
        frames_us(self.chunk_frames, stream.pcm.sample_rate)
            + frames_us(stream.resampler.output_delay(), self.output_rate)
    }
}

impl Module for RateConverterModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Converter, 1, 1)
            .with_caps(ModuleCaps { requires_data_buffering: true, ..ModuleCaps::default() })
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let chunk = self.chunk_frames;
        let Some(stream) = self.stream.as_mut() else {
            return Err(CycleKitError::Failed("input media format not set".into()));
        };
        let (Some(input), Some(output)) = (ctx.inputs.first_mut(), ctx.outputs.first_mut()) else {
            return Ok(());
        };
        let Some(dst) = output.data.buf.as_mut() else {
            return Ok(());
        };
        stream.drain_into(dst);
        if stream.has_output() {
            // Output is full; leave the input for a later call.
            return Ok(());
        }

        if let Some(src) = input.data.buf.as_ref() {
            if src.num_bufs() != stream.num_bufs() {
                return Err(CycleKitError::Failed(format!(
                    "expected {} input buffers, got {}",
                    stream.num_bufs(),
                    src.num_bufs()
                )));
            }
            let frame = stream.pcm.frame_bytes_per_buf();
            let frames = src.actual_len().saturating_sub(input.consumed) / frame;
            stream.gather(src, input.consumed, frames);
            input.consumed += frames * frame;
        }
        stream.convert(chunk)?;
        stream.drain_into(dst);
        Ok(())
    }

    fn on_input_media_format(
        &mut self,
        _port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        let pcm = require_pcm16(format, "audio::rate_converter")?;
        if pcm.sample_rate == 0 || pcm.channels == 0 {
            return Err(CycleKitError::BadParam(format!("unusable input format {pcm:?}")));
        }
        let stream = self.build(pcm)?;
        let delay_us = self.delay_us(&stream);
        tracing::debug!(
            from = pcm.sample_rate,
            to = self.output_rate,
            chunk_frames = self.chunk_frames,
            delay_us,
            "Rate converter configured"
        );
        self.stream = Some(stream);
        let out = MediaFormat::Pcm(PcmFormat { sample_rate: self.output_rate, ..pcm });
        events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: out });
        events.raise(ModuleEvent::AlgorithmicDelay(delay_us));
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.resampler.reset();
            stream.pending_in.iter_mut().for_each(Vec::clear);
            stream.pending_out.iter_mut().for_each(VecDeque::clear);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{input_with, output_bytes, output_with, run_once, samples};
    use cyclekit_core::pcm_helpers::sample_i16;

    fn converter(from: u32, to: u32, chunk_frames: usize) -> RateConverterModule {
        let mut module = RateConverterModule::new(RateConverterConfig { output_rate: to, chunk_frames })
            .unwrap_or_else(|e| panic!("{e}"));
        let mut events = EventSink::new();
        module
            .on_input_media_format(0, &MediaFormat::pcm(from, 1, 16), &mut events)
            .unwrap_or_else(|e| panic!("{e}"));
        module
    }

    /// Feeds `input` once and collects output by draining with `capacity`
    /// byte buffers until the module has nothing left.
    fn run_collect(module: &mut RateConverterModule, input: &[u8], capacity: usize) -> Vec<u8> {
        let mut collected = Vec::new();
        let mut inputs = [input_with(input, 1, None)];
        loop {
            let mut outputs = [output_with(capacity, 1, None)];
            run_once(module, &mut inputs, &mut outputs).unwrap_or_else(|e| panic!("{e}"));
            let produced = output_bytes(&outputs, 0);
            if produced.is_empty() {
                return collected;
            }
            collected.extend(produced);
        }
    }

    #[test]
    fn partial_chunk_is_held() {
        let mut module = converter(8_000, 16_000, 16);
        let mut inputs = [input_with(&samples(&[1, 2, 3]), 1, None)];
        let mut outputs = [output_with(64, 1, None)];
        run_once(&mut module, &mut inputs, &mut outputs).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(inputs[0].consumed, 6);
        assert_eq!(outputs[0].data.actual_len(), 0);
    }

    #[test]
    fn upsampling_settles_on_a_constant_input() {
        let mut module = converter(8_000, 16_000, 32);
        let input = samples(&[1000; 256]);
        let out = run_collect(&mut module, &input, 4096);

        let frames = out.len() / 2;
        assert_eq!(out.len() % 2, 0);
        assert!(frames > 256, "expected roughly twice the input, got {frames} frames");
        let last = sample_i16(&out, frames - 1).unwrap_or_else(|| panic!("no sample"));
        assert!((i32::from(last) - 1000).abs() <= 1, "last sample {last}");
    }

    #[test]
    fn downsampling_shrinks_the_stream() {
        let mut module = converter(16_000, 8_000, 32);
        let out = run_collect(&mut module, &samples(&[500; 256]), 4096);
        let frames = out.len() / 2;
        assert!(frames > 100 && frames <= 130, "got {frames} frames");
    }

    #[test]
    fn small_output_buffers_see_the_same_stream() {
        let input = samples(&(0..200).map(|v| v * 10).collect::<Vec<i16>>());
        let mut wide = converter(8_000, 11_025, 16);
        let mut narrow = converter(8_000, 11_025, 16);
        let expected = run_collect(&mut wide, &input, 8192);
        assert!(!expected.is_empty());
        assert_eq!(run_collect(&mut narrow, &input, 6), expected);
    }

    #[test]
    fn reset_drops_buffered_audio() {
        let mut module = converter(8_000, 16_000, 16);
        let mut inputs = [input_with(&samples(&[7; 8]), 1, None)];
        let mut outputs = [output_with(64, 1, None)];
        run_once(&mut module, &mut inputs, &mut outputs).unwrap_or_else(|e| panic!("{e}"));
        module.reset();
        let pending = module.stream.as_ref().map(|s| s.pending_in[0].len());
        assert_eq!(pending, Some(0));
    }

    #[test]
    fn announces_converted_format_and_delay() {
        let mut module =
            RateConverterModule::new(RateConverterConfig { output_rate: 16_000, chunk_frames: 480 })
                .unwrap_or_else(|e| panic!("{e}"));
        let mut events = EventSink::new();
        module
            .on_input_media_format(0, &MediaFormat::pcm(48_000, 2, 16), &mut events)
            .unwrap_or_else(|e| panic!("{e}"));
        let raised: Vec<_> = events.drain().collect();
        assert_eq!(
            raised[0],
            ModuleEvent::OutputMediaFormat { port: 0, format: MediaFormat::pcm(16_000, 2, 16) }
        );
        // 480 frames at 48 kHz is 10 ms before the resampler's own latency.
        assert!(matches!(raised[1], ModuleEvent::AlgorithmicDelay(us) if us >= 10_000));
    }

    #[test]
    fn zero_chunk_is_rejected() {
        let config = RateConverterConfig { output_rate: 16_000, chunk_frames: 0 };
        assert!(RateConverterModule::new(config).is_err());
    }

    #[test]
    fn processing_without_format_fails() {
        let mut module = RateConverterModule::new(RateConverterConfig::default())
            .unwrap_or_else(|e| panic!("{e}"));
        let mut inputs = [input_with(&samples(&[1]), 1, None)];
        let mut outputs = [output_with(4, 1, None)];
        assert!(run_once(&mut module, &mut inputs, &mut outputs).is_err());
    }
}
