// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::params::{decode_u32, PARAM_BYTES_PER_CALL, PARAM_BYTE_COUNT};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::metadata::{MetadataFlags, MetadataId, MetadataSpec};
use cyclekit_core::module::{
    EventSink, Module, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext,
};
use serde::Deserialize;

/// The configuration struct for the SourceModule.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SourceConfig {
    /// Sample rate announced on the output.
    pub sample_rate: u32,
    /// Bytes written per call. Zero fills whatever space the output has.
    pub bytes_per_call: usize,
    /// Sample value repeated as 16-bit little-endian PCM.
    pub level: i16,
    /// Stop producing after this many bytes.
    pub total_bytes: Option<usize>,
    /// Attach a flushing end-of-stream after the last byte of `total_bytes`.
    pub eos_at_end: bool,
    /// Attach a custom marker with this id at the start of every chunk.
    pub marker_id: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bytes_per_call: 0,
            level: 0,
            total_bytes: None,
            eos_at_end: false,
            marker_id: None,
        }
    }
}

/// A module with no inputs producing a constant pattern.
pub struct SourceModule {
    config: SourceConfig,
    produced: usize,
    eos_sent: bool,
}

impl SourceModule {
    pub const fn new(config: SourceConfig) -> Self {
        Self { config, produced: 0, eos_sent: false }
    }

    fn remaining(&self) -> usize {
        self.config.total_bytes.map_or(usize::MAX, |total| total.saturating_sub(self.produced))
    }

    fn pattern(&self, len: usize) -> Vec<u8> {
        let sample = self.config.level.to_le_bytes();
        // Keep the pattern aligned to what was produced so far.
        (self.produced..self.produced + len).map(|i| sample[i % 2]).collect()
    }
}

impl Module for SourceModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 0, 1)
    }

    fn init(&mut self, events: &mut EventSink) -> Result<()> {
        events.raise(ModuleEvent::OutputMediaFormat {
            port: 0,
            format: MediaFormat::pcm(self.config.sample_rate, 1, 16),
        });
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let Some(output) = ctx.outputs.first_mut() else {
            return Ok(());
        };
        if !output.available {
            return Ok(());
        }
        let Some(buf) = output.data.buf.as_mut() else {
            return Ok(());
        };

        let wanted = match self.config.bytes_per_call {
            0 => buf.free_space(),
            n => n,
        };
        let len = wanted.min(self.remaining()).min(buf.free_space());
        let start = buf.actual_len();
        let written = buf.push_bytes(&self.pattern(len));
        let end = buf.actual_len();
        self.produced += written;

        if written > 0 {
            if let Some(id) = self.config.marker_id {
                let spec = MetadataSpec::new(MetadataId::Custom(id), start, MetadataFlags::sample());
                ctx.metadata.create(&mut output.data.metadata, spec, end)?;
            }
        }
        if self.config.eos_at_end && !self.eos_sent && self.remaining() == 0 {
            let spec =
                MetadataSpec::new(MetadataId::Eos, end, MetadataFlags::sample().flushing(true));
            ctx.metadata.create(&mut output.data.metadata, spec, end)?;
            output.data.flags.end_of_frame = true;
            self.eos_sent = true;
            tracing::debug!(produced = self.produced, "Source reached its end");
        }
        Ok(())
    }

    fn set_param(&mut self, param_id: u32, payload: &[u8], _events: &mut EventSink) -> Result<()> {
        match param_id {
            PARAM_BYTES_PER_CALL => {
                self.config.bytes_per_call = decode_u32(payload, param_id)? as usize;
                Ok(())
            },
            _ => Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
    }

    fn get_param(&self, param_id: u32) -> Result<Vec<u8>> {
        match param_id {
            PARAM_BYTE_COUNT => Ok((self.produced as u64).to_le_bytes().to_vec()),
            _ => Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
    }

    fn reset(&mut self) {
        self.produced = 0;
        self.eos_sent = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{output_bytes, output_with, run_with, RecordingHandler};

    #[test]
    fn produces_in_fixed_steps() {
        let mut source = SourceModule::new(SourceConfig {
            bytes_per_call: 4,
            level: 0x0102,
            ..SourceConfig::default()
        });
        let mut outputs = [output_with(6, 1, None)];
        let mut handler = RecordingHandler::default();
        run_with(&mut source, &mut [], &mut outputs, &mut handler)
            .unwrap_or_else(|e| panic!("{e}"));
        run_with(&mut source, &mut [], &mut outputs, &mut handler)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output_bytes(&outputs, 0), vec![2, 1, 2, 1, 2, 1]);
    }

    #[test]
    fn ends_with_flushing_eos() {
        let mut source = SourceModule::new(SourceConfig {
            total_bytes: Some(6),
            eos_at_end: true,
            marker_id: Some(7),
            ..SourceConfig::default()
        });
        let mut outputs = [output_with(4, 1, None)];
        let mut handler = RecordingHandler::default();
        run_with(&mut source, &mut [], &mut outputs, &mut handler)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(outputs[0].data.metadata.len(), 1);

        if let Some(buf) = outputs[0].data.buf.as_mut() {
            buf.clear();
        }
        outputs[0].data.metadata.clear();
        run_with(&mut source, &mut [], &mut outputs, &mut handler)
            .unwrap_or_else(|e| panic!("{e}"));
        let md = &outputs[0].data.metadata;
        assert_eq!(md.len(), 2);
        assert_eq!(md[0].id, MetadataId::Custom(7));
        assert!(md[1].is_flushing_eos());
        assert_eq!(md[1].offset, 2);
        assert!(outputs[0].data.flags.end_of_frame);
    }

    #[test]
    fn announces_mono_pcm() {
        let mut source =
            SourceModule::new(SourceConfig { sample_rate: 8_000, ..SourceConfig::default() });
        let mut events = EventSink::new();
        source.init(&mut events).unwrap_or_else(|e| panic!("{e}"));
        let raised: Vec<_> = events.drain().collect();
        assert_eq!(
            raised,
            vec![ModuleEvent::OutputMediaFormat { port: 0, format: MediaFormat::pcm(8_000, 1, 16) }]
        );
    }

    #[test]
    fn bytes_per_call_is_tunable() {
        let mut source = SourceModule::new(SourceConfig::default());
        let mut events = EventSink::new();
        source
            .set_param(PARAM_BYTES_PER_CALL, &3u32.to_le_bytes(), &mut events)
            .unwrap_or_else(|e| panic!("{e}"));
        let mut outputs = [output_with(8, 1, None)];
        let mut handler = RecordingHandler::default();
        run_with(&mut source, &mut [], &mut outputs, &mut handler)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(outputs[0].data.actual_len(), 3);
        let count = source.get_param(PARAM_BYTE_COUNT).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(count, 3u64.to_le_bytes().to_vec());
    }
}
