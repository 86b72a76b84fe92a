// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-module runtime statistics.
//!
//! The process loop updates these counters on every invocation; hosts read
//! them through the topology to spot starving or failing modules.

use serde::{Deserialize, Serialize};

/// Runtime statistics for a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStats {
    /// Times the module's `process` was called
    pub invocations: u64,
    /// Times admission was checked and refused
    pub not_admitted: u64,
    /// Process calls that returned an error
    pub errored: u64,
    /// Bytes consumed across all inputs (per channel buffer)
    pub bytes_consumed: u64,
    /// Bytes produced across all outputs (per channel buffer)
    pub bytes_produced: u64,
    /// Markers moved to outputs
    pub markers_propagated: u64,
    /// Markers dropped on this module's ports
    pub markers_dropped: u64,
}

impl ModuleStats {
    #[inline]
    pub const fn invoked(&mut self) {
        self.invocations += 1;
    }

    #[inline]
    pub const fn refused(&mut self) {
        self.not_admitted += 1;
    }

    #[inline]
    pub const fn errored(&mut self) {
        self.errored += 1;
    }

    #[inline]
    pub const fn moved(&mut self, consumed: usize, produced: usize) {
        self.bytes_consumed += consumed as u64;
        self.bytes_produced += produced as u64;
    }

    #[inline]
    pub const fn propagated(&mut self, count: usize) {
        self.markers_propagated += count as u64;
    }

    #[inline]
    pub const fn dropped(&mut self, count: usize) {
        self.markers_dropped += count as u64;
    }
}
