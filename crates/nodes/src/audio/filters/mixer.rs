// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::audio::require_pcm16;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::module::{EventSink, Module, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext};
use cyclekit_core::pcm_helpers::mix_i16;
use serde::Deserialize;

const MAX_INPUTS: usize = 16;

/// The configuration struct for the MixerModule.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MixerConfig {
    /// Number of input ports.
    pub inputs: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self { inputs: 2 }
    }
}

impl MixerConfig {
    /// # Errors
    ///
    /// Returns an error if the input count is below two or above the supported maximum.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.inputs < 2 || self.inputs > MAX_INPUTS {
            return Err(format!("inputs must be between 2 and {MAX_INPUTS}, got: {}", self.inputs));
        }
        Ok(())
    }
}

/// Sums 16-bit PCM streams.
///
/// Each call mixes as many bytes as every input holding data can supply.
/// Inputs without data don't hold the others back; they contribute silence.
pub struct MixerModule {
    inputs: usize,
    format: Option<MediaFormat>,
}

impl MixerModule {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: MixerConfig) -> std::result::Result<Self, String> {
        config.validate()?;
        Ok(Self { inputs: config.inputs, format: None })
    }
}

impl Module for MixerModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, self.inputs, 1)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let Some(output) = ctx.outputs.first_mut() else {
            return Ok(());
        };
        let Some(dst) = output.data.buf.as_mut().filter(|_| output.available) else {
            return Ok(());
        };
        let len = ctx
            .inputs
            .iter()
            .filter(|i| i.available && i.remaining() > 0)
            .map(cyclekit_core::InputStream::remaining)
            .min()
            .unwrap_or(0)
            .min(dst.free_space());
        if len == 0 {
            return Ok(());
        }

        let start = dst.actual_len();
        dst.push_zeros(len);
        for input in ctx.inputs.iter_mut().filter(|i| i.available && i.remaining() > 0) {
            let Some(src) = input.data.buf.as_ref() else {
                continue;
            };
            for ch in 0..dst.num_bufs().min(src.num_bufs()) {
                let from = &src.channel(ch)[input.consumed..input.consumed + len];
                mix_i16(&mut dst.channel_mut(ch)[start..start + len], from);
            }
            input.consumed += len;
        }
        Ok(())
    }

    fn on_input_media_format(
        &mut self,
        port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        require_pcm16(format, "audio::mixer")?;
        match &self.format {
            Some(current) if current != format => Err(CycleKitError::Unsupported(format!(
                "input {port} format {format:?} differs from the mix format {current:?}"
            ))),
            Some(_) => Ok(()),
            None => {
                self.format = Some(format.clone());
                events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: format.clone() });
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{input_with, output_with, run_once, samples};
    use cyclekit_core::pcm_helpers::sample_i16;

    #[test]
    fn needs_at_least_two_inputs() {
        assert!(MixerModule::new(MixerConfig { inputs: 1 }).is_err());
    }

    #[test]
    fn sums_inputs_with_data() {
        let mut mixer = MixerModule::new(MixerConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        let mut inputs = [
            input_with(&samples(&[100, 200, 300]), 1, None),
            input_with(&samples(&[1, 2]), 1, None),
        ];
        let mut outputs = [output_with(8, 1, None)];
        run_once(&mut mixer, &mut inputs, &mut outputs).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(inputs[0].consumed, 4);
        assert_eq!(inputs[1].consumed, 4);
        let buf = outputs[0].data.buf.as_ref().unwrap_or_else(|| panic!("no output"));
        assert_eq!(buf.actual_len(), 4);
        assert_eq!(sample_i16(buf.channel(0), 0), Some(101));
        assert_eq!(sample_i16(buf.channel(0), 1), Some(202));
    }

    #[test]
    fn idle_input_does_not_block() {
        let mut mixer = MixerModule::new(MixerConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        let mut inputs = [input_with(&samples(&[7, 7]), 1, None), input_with(&[], 1, None)];
        let mut outputs = [output_with(8, 1, None)];
        run_once(&mut mixer, &mut inputs, &mut outputs).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(inputs[0].consumed, 4);
        assert_eq!(inputs[1].consumed, 0);
    }

    #[test]
    fn mismatched_formats_are_rejected() {
        let mut mixer = MixerModule::new(MixerConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        let mut events = EventSink::new();
        mixer
            .on_input_media_format(0, &MediaFormat::pcm(48_000, 1, 16), &mut events)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(mixer
            .on_input_media_format(1, &MediaFormat::pcm(16_000, 1, 16), &mut events)
            .is_err());
        assert_eq!(events.drain().count(), 1);
    }
}
