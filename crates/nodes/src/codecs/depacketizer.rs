// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Depacketizer for length-prefixed PCM packets.
//!
//! Each packet is a little-endian `u16` payload length followed by the
//! payload. Only whole packets are consumed; payload bytes that don't fit the
//! output wait inside the module for later calls.

use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::module::{
    EventSink, Module, ModuleCaps, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext,
};
use serde::Deserialize;

const HEADER_LEN: usize = 2;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DepacketizerConfig {
    /// Largest payload accepted. Bigger packets fail the call.
    pub max_payload: usize,
}

impl Default for DepacketizerConfig {
    fn default() -> Self {
        Self { max_payload: 4096 }
    }
}

pub struct DepacketizerModule {
    max_payload: usize,
    pending: Vec<u8>,
}

impl DepacketizerModule {
    pub const fn new(config: DepacketizerConfig) -> Self {
        Self { max_payload: config.max_payload, pending: Vec::new() }
    }

    /// Payload bytes waiting for output space.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Splits whole packets off `data`. Returns the bytes consumed.
    fn unpack(&mut self, data: &[u8]) -> Result<usize> {
        let mut pos = 0;
        while self.pending.len() < self.max_payload {
            let Some(header) = data.get(pos..pos + HEADER_LEN) else {
                break;
            };
            let len = usize::from(u16::from_le_bytes([header[0], header[1]]));
            if len > self.max_payload {
                return Err(CycleKitError::BadParam(format!(
                    "packet of {len} bytes exceeds the {} byte limit",
                    self.max_payload
                )));
            }
            let Some(payload) = data.get(pos + HEADER_LEN..pos + HEADER_LEN + len) else {
                break;
            };
            self.pending.extend_from_slice(payload);
            pos += HEADER_LEN + len;
        }
        Ok(pos)
    }
}

impl Module for DepacketizerModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Depacketizer, 1, 1)
            .with_caps(ModuleCaps { requires_data_buffering: true, ..ModuleCaps::default() })
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let (Some(input), Some(output)) = (ctx.inputs.first_mut(), ctx.outputs.first_mut()) else {
            return Ok(());
        };
        if input.available {
            if let Some(src) = input.data.buf.as_ref() {
                let skip = input.consumed;
                input.consumed += self.unpack(&src.channel(0)[skip..])?;
            }
        }
        if let Some(dst) = output.data.buf.as_mut().filter(|_| output.available) {
            let written = dst.push_bytes(&self.pending);
            self.pending.drain(..written);
        }
        Ok(())
    }

    fn on_input_media_format(
        &mut self,
        _port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        let MediaFormat::Packetized { sample_rate, channels, .. } = format else {
            return Err(CycleKitError::Unsupported(format!(
                "codecs::depacketizer needs packetized input, got {format:?}"
            )));
        };
        let out = MediaFormat::pcm(*sample_rate, *channels, 16);
        events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: out });
        Ok(())
    }

    fn reset(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(bytes = self.pending.len(), "Depacketizer discarding leftover payload");
        }
        self.pending.clear();
    }
}

/// Builds one packet, as a packetizer upstream would.
pub fn packet(payload: &[u8]) -> Vec<u8> {
    let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
    let mut out = len.to_le_bytes().to_vec();
    out.extend_from_slice(&payload[..usize::from(len)]);
    out
}
