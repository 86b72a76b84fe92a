// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::audio::require_pcm16;
use crate::params::{decode_f32, PARAM_GAIN};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::module::{
    EventSink, Module, ModuleCaps, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext,
};
use cyclekit_core::pcm_helpers::apply_gain_i16;
use serde::Deserialize;

/// The configuration struct for the GainModule.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GainConfig {
    /// A linear multiplier for the amplitude (e.g., 0.5 is -6dB).
    /// Valid range: 0.0 to 4.0
    pub gain: f32,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self { gain: 1.0 } // Default to no volume change
    }
}

impl GainConfig {
    /// Validate the gain parameter is within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the gain is outside the range [0.0, 4.0] or is NaN/infinite.
    pub fn validate(&self) -> std::result::Result<(), String> {
        const MIN_GAIN: f32 = 0.0;
        const MAX_GAIN: f32 = 4.0;

        if !self.gain.is_finite() {
            return Err(format!("Gain must be a finite number, got: {}", self.gain));
        }

        if self.gain < MIN_GAIN || self.gain > MAX_GAIN {
            return Err(format!(
                "Gain must be between {MIN_GAIN} and {MAX_GAIN}, got: {}",
                self.gain
            ));
        }

        Ok(())
    }
}

/// A module that adjusts the volume of 16-bit PCM.
///
/// Declares in-place support: when the engine hands it an output without a
/// buffer it scales the input where it is and the buffer moves on as output.
pub struct GainModule {
    config: GainConfig,
}

impl GainModule {
    /// Create a new gain module with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the gain configuration is invalid (e.g., out of range or non-finite).
    pub fn new(config: GainConfig) -> std::result::Result<Self, String> {
        config.validate()?;
        Ok(Self { config })
    }

    pub const fn gain(&self) -> f32 {
        self.config.gain
    }
}

impl Module for GainModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 1, 1)
            .with_caps(ModuleCaps { inplace: true, ..ModuleCaps::default() })
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let (Some(input), Some(output)) = (ctx.inputs.first_mut(), ctx.outputs.first_mut()) else {
            return Ok(());
        };
        if !input.available || !output.available {
            return Ok(());
        }
        let gain = self.config.gain;
        let skip = input.consumed;

        match (input.data.buf.as_mut(), output.data.buf.as_mut()) {
            (Some(src), None) => {
                for ch in 0..src.num_bufs() {
                    apply_gain_i16(&mut src.channel_mut(ch)[skip..], gain);
                }
                input.consumed = src.actual_len();
            },
            (Some(src), Some(dst)) => {
                let start = dst.actual_len();
                let n = dst.append_range(src, skip, usize::MAX);
                for ch in 0..dst.num_bufs() {
                    apply_gain_i16(&mut dst.channel_mut(ch)[start..], gain);
                }
                input.consumed += n;
            },
            _ => {},
        }
        Ok(())
    }

    fn set_param(&mut self, param_id: u32, payload: &[u8], _events: &mut EventSink) -> Result<()> {
        match param_id {
            PARAM_GAIN => {
                let config = GainConfig { gain: decode_f32(payload, param_id)? };
                config.validate().map_err(CycleKitError::BadParam)?;
                tracing::debug!(gain = config.gain, "Gain updated");
                self.config = config;
                Ok(())
            },
            _ => Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
    }

    fn get_param(&self, param_id: u32) -> Result<Vec<u8>> {
        match param_id {
            PARAM_GAIN => Ok(self.config.gain.to_le_bytes().to_vec()),
            _ => Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
    }

    fn on_input_media_format(
        &mut self,
        _port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        require_pcm16(format, "audio::gain")?;
        events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: format.clone() });
        Ok(())
    }
}
