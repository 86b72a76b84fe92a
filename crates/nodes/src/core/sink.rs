// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use crate::params::PARAM_BYTE_COUNT;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::module::{Module, ModuleInfo, ModuleKind, ProcessContext};

/// Terminal module that swallows everything.
///
/// Markers reaching it leave the graph as rendered, which is handled by the
/// engine once the bytes in front of them are consumed.
#[derive(Debug, Default)]
pub struct NullSinkModule {
    received: u64,
    calls: u64,
}

impl NullSinkModule {
    pub const fn received(&self) -> u64 {
        self.received
    }
}

impl Module for NullSinkModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(ModuleKind::Generic, 1, 0)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        self.calls += 1;
        for input in ctx.inputs.iter_mut().filter(|i| i.available) {
            let n = input.remaining();
            input.consumed += n;
            self.received += n as u64;
        }
        tracing::trace!(calls = self.calls, received = self.received, "Sink drained input");
        Ok(())
    }

    fn get_param(&self, param_id: u32) -> Result<Vec<u8>> {
        match param_id {
            PARAM_BYTE_COUNT => Ok(self.received.to_le_bytes().to_vec()),
            _ => Err(CycleKitError::Unsupported(format!("param {param_id:#x}"))),
        }
    }
}
