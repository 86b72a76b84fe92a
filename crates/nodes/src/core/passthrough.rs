// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use cyclekit_core::error::Result;
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::module::{
    EventSink, Module, ModuleCaps, ModuleEvent, ModuleInfo, ModuleKind, ProcessContext,
};

/// A module that forwards its input untouched.
pub struct PassthroughModule;

impl Module for PassthroughModule {
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
        match (input.data.buf.as_ref(), output.data.buf.as_mut()) {
            // In place: the input buffer becomes the output as is.
            (Some(_), None) => input.consumed = input.data.actual_len(),
            (Some(src), Some(dst)) => {
                input.consumed += dst.append_range(src, input.consumed, usize::MAX);
            },
            _ => {},
        }
        output.data.flags.erasure |= input.data.flags.erasure;
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
