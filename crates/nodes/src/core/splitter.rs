// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use cyclekit_core::buffer::Buffer;
use cyclekit_core::error::Result;
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::module::{EventSink, Module, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext};
use serde::Deserialize;

const MAX_OUTPUTS: usize = 16;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SplitterConfig {
    pub outputs: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self { outputs: 2 }
    }
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns an error if the output count is zero or above the supported maximum.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.outputs == 0 || self.outputs > MAX_OUTPUTS {
            return Err(format!(
                "outputs must be between 1 and {MAX_OUTPUTS}, got: {}",
                self.outputs
            ));
        }
        Ok(())
    }
}

/// Copies one input to every started output. Data moves at the pace of the
/// fullest output so that all of them see the same bytes.
pub struct SplitterModule {
    outputs: usize,
}

impl SplitterModule {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SplitterConfig) -> std::result::Result<Self, String> {
        config.validate()?;
        Ok(Self { outputs: config.outputs })
    }
}

impl Module for SplitterModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 1, self.outputs)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let Some(input) = ctx.inputs.first_mut() else {
            return Ok(());
        };
        let Some(src) = input.data.buf.as_ref().filter(|_| input.available) else {
            return Ok(());
        };
        let len = ctx
            .outputs
            .iter()
            .filter(|o| o.available)
            .map(|o| o.data.buf.as_ref().map_or(0, Buffer::free_space))
            .min()
            .unwrap_or(0)
            .min(src.actual_len().saturating_sub(input.consumed));

        for output in ctx.outputs.iter_mut().filter(|o| o.available) {
            if let Some(dst) = output.data.buf.as_mut() {
                dst.append_range(src, input.consumed, len);
            }
            output.data.flags.erasure |= input.data.flags.erasure;
        }
        input.consumed += len;
        Ok(())
    }

    fn on_input_media_format(
        &mut self,
        _port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        for port in 0..self.outputs {
            events.raise(ModuleEvent::OutputMediaFormat { port, format: format.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{input_with, output_bytes, output_with, run_once};

    #[test]
    fn rejects_zero_outputs() {
        assert!(SplitterModule::new(SplitterConfig { outputs: 0 }).is_err());
    }

    #[test]
    fn moves_at_the_pace_of_the_fullest_output() {
        let mut splitter =
            SplitterModule::new(SplitterConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        let mut inputs = [input_with(&[1, 2, 3, 4], 1, None)];
        let mut outputs = [output_with(4, 1, None), output_with(2, 1, None)];
        run_once(&mut splitter, &mut inputs, &mut outputs).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(inputs[0].consumed, 2);
        assert_eq!(output_bytes(&outputs, 0), vec![1, 2]);
        assert_eq!(output_bytes(&outputs, 1), vec![1, 2]);
    }

    #[test]
    fn stopped_output_is_skipped() {
        let mut splitter =
            SplitterModule::new(SplitterConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        let mut inputs = [input_with(&[5; 3], 1, None)];
        let mut outputs = [output_with(4, 1, None), output_with(1, 1, None)];
        outputs[1].available = false;
        run_once(&mut splitter, &mut inputs, &mut outputs).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(inputs[0].consumed, 3);
        assert!(output_bytes(&outputs, 1).is_empty());
    }
}
