// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Unit tests for the engine crate, driving small hand-written modules
//! through a topology.


use crate::container::RegistryContainer;
use crate::ids::{ModuleId, PortId, SubgraphId};
use crate::topology::Topology;
use crate::Engine;
use cyclekit_core::config::EngineConfig;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::module::{
    EventSink, Module, ModuleCaps, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext,
};
use cyclekit_core::state::ProcessState;

pub(super) const PARAM_DISABLE: u32 = 1;
pub(super) const PARAM_INPLACE: u32 = 2;

fn mono() -> MediaFormat {
    MediaFormat::pcm(8_000, 1, 16)
}

/// Source writing `chunk` bytes of ones per call.
pub(super) struct Feed {
    pub chunk: usize,
}

impl Module for Feed {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 0, 1)
    }

    fn init(&mut self, events: &mut EventSink) -> Result<()> {
        events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: mono() });
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        if let Some(buf) = ctx.outputs.first_mut().and_then(|o| o.data.buf.as_mut()) {
            buf.push_bytes(&vec![1; self.chunk]);
        }
        Ok(())
    }
}

/// Single-input single-output copier.
pub(super) struct Relay {
    pub caps: ModuleCaps,
    pub delay_us: u64,
}

impl Relay {
    pub fn plain() -> Self {
        Self { caps: ModuleCaps::default(), delay_us: 0 }
    }

    pub fn in_place() -> Self {
        Self { caps: ModuleCaps { inplace: true, ..ModuleCaps::default() }, delay_us: 0 }
    }
}

impl Module for Relay {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 1, 1).with_caps(self.caps)
    }

    fn init(&mut self, events: &mut EventSink) -> Result<()> {
        if self.delay_us > 0 {
            events.raise(ModuleEvent::AlgorithmicDelay(self.delay_us));
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let (Some(input), Some(output)) = (ctx.inputs.first_mut(), ctx.outputs.first_mut()) else {
            return Ok(());
        };
        match (input.data.buf.as_ref(), output.data.buf.as_mut()) {
            (Some(src), None) => input.consumed = src.actual_len(),
            (Some(src), Some(dst)) => {
                input.consumed += dst.append_range(src, input.consumed, usize::MAX);
            },
            _ => {},
        }
        Ok(())
    }

    fn set_param(&mut self, param_id: u32, payload: &[u8], events: &mut EventSink) -> Result<()> {
        let on = payload.first().is_some_and(|b| *b != 0);
        match param_id {
            PARAM_DISABLE => {
                let state = if on { ProcessState::Disabled } else { ProcessState::Enabled };
                events.raise(ModuleEvent::ProcessState(state));
            },
            PARAM_INPLACE => events.raise(ModuleEvent::DynamicInplace(on)),
            _ => return Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
        Ok(())
    }

    fn on_input_media_format(
        &mut self,
        _port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: format.clone() });
        Ok(())
    }
}

/// In-place capable copier that also holds input back, forwarding at most
/// `step` bytes per call.
pub(super) struct Chunked {
    pub step: usize,
}

impl Module for Chunked {
    fn info(&self) -> ModuleInfo {
        let caps = ModuleCaps { inplace: true, requires_data_buffering: true, ..ModuleCaps::default() };
        ModuleInfo::new(ModuleKind::Generic, 1, 1).with_caps(caps)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let (Some(input), Some(output)) = (ctx.inputs.first_mut(), ctx.outputs.first_mut()) else {
            return Ok(());
        };
        match (input.data.buf.as_ref(), output.data.buf.as_mut()) {
            (Some(src), None) => input.consumed = src.actual_len().min(self.step),
            (Some(src), Some(dst)) => {
                input.consumed += dst.append_range(src, input.consumed, self.step);
            },
            _ => {},
        }
        Ok(())
    }

    fn on_input_media_format(
        &mut self,
        _port: usize,
        format: &MediaFormat,
        events: &mut EventSink,
    ) -> Result<()> {
        events.raise(ModuleEvent::OutputMediaFormat { port: 0, format: format.clone() });
        Ok(())
    }
}

/// Sink consuming everything.
pub(super) struct Drain;

impl Module for Drain {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 1, 0)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        for input in ctx.inputs.iter_mut() {
            input.consumed = input.data.actual_len();
        }
        Ok(())
    }
}

/// Announces a format on an output it doesn't have.
pub(super) struct BrokenInit;

impl Module for BrokenInit {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 1, 1)
    }

    fn init(&mut self, events: &mut EventSink) -> Result<()> {
        events.raise(ModuleEvent::OutputMediaFormat { port: 3, format: mono() });
        Ok(())
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
        Ok(())
    }
}

pub(super) fn topology(config: EngineConfig) -> Topology<RegistryContainer> {
    Engine::new().create_topology(config).unwrap_or_else(|e| panic!("{e}"))
}

pub(super) fn add(
    topo: &mut Topology<RegistryContainer>,
    sg: SubgraphId,
    name: &str,
    module: impl Module + 'static,
) -> ModuleId {
    topo.add_module(sg, name, Box::new(module)).unwrap_or_else(|e| panic!("{e}"))
}

pub(super) fn link(topo: &mut Topology<RegistryContainer>, from: ModuleId, to: ModuleId) {
    topo.connect(PortId::output(from, 0), PortId::input(to, 0))
        .unwrap_or_else(|e| panic!("{e}"));
}
