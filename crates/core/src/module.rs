// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core module abstractions and the [`Module`] trait.
//!
//! This module defines the contract between the engine and plug-in modules:
//! - [`Module`]: the trait every processing module implements
//! - [`ProcessContext`]: what a module sees during one invocation
//! - [`EventSink`]: how a module notifies the engine of changes
//! - [`ModuleInfo`]: static description (kind, capabilities, port counts)

use crate::error::{CycleKitError, Result};
use crate::media_format::MediaFormat;
use crate::metadata::MetadataHandler;
use crate::state::ProcessState;
use crate::stream::StreamData;
use crate::trigger_policy::{TriggerPolicyRequest, TriggerType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Broad category of a module. Codec-like kinds get end-of-stream squeeze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    #[default]
    Generic,
    Decoder,
    Encoder,
    Packetizer,
    Depacketizer,
    Converter,
    /// Hardware endpoint; may run with no started ports at all.
    HwEndpoint,
}

impl ModuleKind {
    /// Kinds that may keep producing output after their input ended.
    pub const fn is_codec_like(self) -> bool {
        matches!(
            self,
            Self::Decoder | Self::Encoder | Self::Packetizer | Self::Depacketizer | Self::Converter
        )
    }
}

/// Static capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleCaps {
    /// The module moves markers itself through the metadata handler.
    pub supports_metadata: bool,
    /// The module only accepts whole input frames.
    pub requires_fixed_frame: bool,
    /// Input and output may share one buffer.
    pub inplace: bool,
    /// The module keeps data across calls, breaking non-buffering chains.
    pub requires_data_buffering: bool,
}

/// Cached performance figures, updated through events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerfFigures {
    /// Thousands of packets per second.
    pub kpps: u32,
    /// Bytes per second.
    pub bandwidth: u32,
    pub algo_delay_us: u64,
}

/// Static description of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub kind: ModuleKind,
    pub caps: ModuleCaps,
    pub max_inputs: usize,
    pub max_outputs: usize,
}

impl ModuleInfo {
    pub const fn new(kind: ModuleKind, max_inputs: usize, max_outputs: usize) -> Self {
        Self { kind, caps: caps_none(), max_inputs, max_outputs }
    }

    #[must_use]
    pub const fn with_caps(mut self, caps: ModuleCaps) -> Self {
        self.caps = caps;
        self
    }

    pub const fn is_source(&self) -> bool {
        self.max_inputs == 0
    }

    pub const fn is_sink(&self) -> bool {
        self.max_outputs == 0
    }

    pub const fn is_siso(&self) -> bool {
        self.max_inputs == 1 && self.max_outputs == 1
    }
}

const fn caps_none() -> ModuleCaps {
    ModuleCaps {
        supports_metadata: false,
        requires_fixed_frame: false,
        inplace: false,
        requires_data_buffering: false,
    }
}

/// Identifies one port of the module raising an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRef {
    Input(usize),
    Output(usize),
}

/// Who provides output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferAccessMode {
    /// The engine assigns pool buffers.
    #[default]
    Engine,
    /// The module attaches its own buffers.
    Module,
}

/// Notifications a module raises towards the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEvent {
    Kpps(u32),
    Bandwidth(u32),
    PortThreshold { port: PortRef, bytes: usize },
    OutputMediaFormat { port: usize, format: MediaFormat },
    AlgorithmicDelay(u64),
    DataTriggerPolicy(TriggerPolicyRequest),
    SignalTriggerPolicy(TriggerPolicyRequest),
    ProcessState(ProcessState),
    DynamicInplace(bool),
    BufferAccessMode(BufferAccessMode),
    /// Opt in to running on data triggers inside a signal-triggered container.
    AllowDataTriggerInSignalTriggered { needs_input: bool, needs_output: bool },
}

/// Collects events raised by a module until the engine handles them.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<ModuleEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, event: ModuleEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, ModuleEvent> {
        self.events.drain(..)
    }
}

/// One input port as seen by a module.
#[derive(Debug, Default)]
pub struct InputStream {
    pub data: StreamData,
    pub format: Option<Arc<MediaFormat>>,
    /// Bytes per channel buffer the module consumed from the front.
    pub consumed: usize,
    /// False for ports that are not started or are blocked by the trigger policy.
    pub available: bool,
}

impl InputStream {
    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.actual_len().saturating_sub(self.consumed)
    }
}

/// One output port as seen by a module. Modules append to the buffer.
#[derive(Debug, Default)]
pub struct OutputStream {
    pub data: StreamData,
    pub format: Option<Arc<MediaFormat>>,
    pub available: bool,
}

/// Everything a module gets for one invocation.
pub struct ProcessContext<'a> {
    pub trigger: TriggerType,
    pub inputs: &'a mut [InputStream],
    pub outputs: &'a mut [OutputStream],
    pub metadata: &'a mut dyn MetadataHandler,
    pub events: &'a mut EventSink,
}

/// A processing module.
///
/// The engine calls [`Module::process`] whenever the module is admitted by its
/// trigger policy. Modules report consumed bytes through
/// [`InputStream::consumed`] and produce by appending to output buffers.
/// Returning an error drops this call's input; its markers go through the
/// tracking path as dropped.
pub trait Module: Send {
    fn info(&self) -> ModuleInfo;

    /// Called once after the module is added to a topology.
    ///
    /// # Errors
    ///
    /// Returning an error aborts `add_module`.
    fn init(&mut self, _events: &mut EventSink) -> Result<()> {
        Ok(())
    }

    /// Processes one cycle's worth of data.
    ///
    /// # Errors
    ///
    /// Any error is counted and logged; the cycle continues with the next module.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()>;

    /// # Errors
    ///
    /// `Unsupported` unless the module knows `param_id`.
    fn set_param(&mut self, param_id: u32, _payload: &[u8], _events: &mut EventSink) -> Result<()> {
        Err(CycleKitError::Unsupported(format!("param {param_id:#x}")))
    }

    /// # Errors
    ///
    /// `Unsupported` unless the module knows `param_id`.
    fn get_param(&self, param_id: u32) -> Result<Vec<u8>> {
        Err(CycleKitError::Unsupported(format!("param {param_id:#x}")))
    }

    /// An input port received a new media format.
    ///
    /// # Errors
    ///
    /// `Unsupported` when the module can't handle the format.
    fn on_input_media_format(
        &mut self,
        _port: usize,
        _format: &MediaFormat,
        _events: &mut EventSink,
    ) -> Result<()> {
        Ok(())
    }

    /// Clears algorithmic state, e.g. after a flushing end-of-stream left the module.
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_predicates() {
        let src = ModuleInfo::new(ModuleKind::Generic, 0, 1);
        assert!(src.is_source());
        assert!(!src.is_sink());
        let siso = ModuleInfo::new(ModuleKind::Decoder, 1, 1);
        assert!(siso.is_siso());
        assert!(siso.kind.is_codec_like());
        assert!(!ModuleKind::HwEndpoint.is_codec_like());
    }

    #[test]
    fn event_sink_drains_in_order() {
        let mut sink = EventSink::new();
        sink.raise(ModuleEvent::Kpps(5));
        sink.raise(ModuleEvent::AlgorithmicDelay(1000));
        let drained: Vec<_> = sink.drain().collect();
        assert_eq!(drained, vec![ModuleEvent::Kpps(5), ModuleEvent::AlgorithmicDelay(1000)]);
        assert!(sink.is_empty());
    }
}
