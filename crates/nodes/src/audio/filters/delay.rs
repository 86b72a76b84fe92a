// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::params::{decode_u64, PARAM_DELAY_US};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::module::{
    EventSink, Module, ModuleCaps, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext,
};
use serde::Deserialize;
use std::collections::VecDeque;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DelayConfig {
    pub delay_us: u64,
}

/// Delays PCM by a fixed duration.
///
/// The delay line starts out full of silence, so the first output bytes are
/// zeros. The engine pads the input with zeros after a flushing end-of-stream
/// to push the last real samples out.
pub struct DelayModule {
    delay_us: u64,
    format: Option<MediaFormat>,
    lines: Vec<VecDeque<u8>>,
}

impl DelayModule {
    pub const fn new(config: DelayConfig) -> Self {
        Self { delay_us: config.delay_us, format: None, lines: Vec::new() }
    }

    fn delay_bytes(&self) -> usize {
        self.format.as_ref().map_or(0, |f| f.us_to_bytes(self.delay_us))
    }

    fn refill(&mut self, num_bufs: usize) {
        let silence = self.delay_bytes();
        self.lines = (0..num_bufs).map(|_| VecDeque::from(vec![0; silence])).collect();
    }
}

impl Module for DelayModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 1, 1)
            .with_caps(ModuleCaps { requires_data_buffering: true, ..ModuleCaps::default() })
    }

    fn init(&mut self, events: &mut EventSink) -> Result<()> {
        events.raise(ModuleEvent::AlgorithmicDelay(self.delay_us));
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let (Some(input), Some(output)) = (ctx.inputs.first_mut(), ctx.outputs.first_mut()) else {
            return Ok(());
        };
        let (Some(src), Some(dst)) = (input.data.buf.as_ref(), output.data.buf.as_mut()) else {
            return Ok(());
        };
        if self.lines.len() != src.num_bufs() {
            self.refill(src.num_bufs());
        }
        let skip = input.consumed;
        let len = src.actual_len().saturating_sub(skip).min(dst.free_space());
        if len == 0 {
            return Ok(());
        }

        let delayed: Vec<Vec<u8>> = self
            .lines
            .iter_mut()
            .enumerate()
            .map(|(ch, line)| {
                line.extend(&src.channel(ch)[skip..skip + len]);
                line.drain(..len).collect()
            })
            .collect();
        let refs: Vec<&[u8]> = delayed.iter().map(Vec::as_slice).collect();
        dst.push_channels(&refs);
        input.consumed += len;
        Ok(())
    }

    fn set_param(&mut self, param_id: u32, payload: &[u8], events: &mut EventSink) -> Result<()> {
        match param_id {
            PARAM_DELAY_US => {
                self.delay_us = decode_u64(payload, param_id)?;
                let num_bufs = self.lines.len();
                self.refill(num_bufs);
                events.raise(ModuleEvent::AlgorithmicDelay(self.delay_us));
                Ok(())
            },
            _ => Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
    }

    fn get_param(&self, param_id: u32) -> Result<Vec<u8>> {
        match param_id {
            PARAM_DELAY_US => Ok(self.delay_us.to_le_bytes().to_vec()),
            _ => Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
    }

    fn on_input_media_format(
        &mut self,
        _port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        if !format.is_pcm() {
            return Err(CycleKitError::Unsupported(format!("audio::delay needs PCM, got {format:?}")));
        }
        self.format = Some(format.clone());
        self.refill(format.num_bufs());
        events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: format.clone() });
        Ok(())
    }

    fn reset(&mut self) {
        let num_bufs = self.lines.len();
        self.refill(num_bufs);
    }
}
