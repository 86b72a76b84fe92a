// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-module record kept by the topology.

use super::port::{InputPort, OutputPort};
use crate::ids::{ModuleId, SubgraphId};
use crate::trigger::{StOptIn, TriggerPolicy};
use cyclekit_core::metadata::{has_flushing_eos, MetadataList};
use cyclekit_core::module::{BufferAccessMode, Module, ModuleInfo, PerfFigures};
use cyclekit_core::state::ProcessState;
use cyclekit_core::stats::ModuleStats;

/// Zero-padding progress after a flushing end-of-stream reached the module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZeroPad {
    /// Zero bytes per channel buffer still to feed.
    pub pending: usize,
    /// Padding was started for the end-of-stream currently on the input.
    pub armed: bool,
}

/// A module instance with its ports and scheduling state.
pub struct ModuleEntry {
    pub id: ModuleId,
    /// Registry name or caller-chosen label, used in logs.
    pub name: String,
    pub subgraph: SubgraphId,
    pub instance: Box<dyn Module>,
    pub info: ModuleInfo,
    pub perf: PerfFigures,
    pub inputs: Vec<InputPort>,
    pub outputs: Vec<OutputPort>,
    pub data_policy: Option<TriggerPolicy>,
    pub signal_policy: Option<TriggerPolicy>,
    pub st_opt_in: Option<StOptIn>,
    /// Holding list per input for markers waiting on output.
    pub held: Vec<MetadataList>,
    pub zero_pad: ZeroPad,
    pub process_state: ProcessState,
    pub inplace_active: bool,
    pub access_mode: BufferAccessMode,
    pub stats: ModuleStats,
    /// Set when `process` failed during the current cycle.
    pub failed_this_cycle: bool,
    pub ran_this_cycle: bool,
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("subgraph", &self.subgraph)
            .field("info", &self.info)
            .field("process_state", &self.process_state)
            .finish_non_exhaustive()
    }
}

impl ModuleEntry {
    pub fn new(
        id: ModuleId,
        name: String,
        subgraph: SubgraphId,
        instance: Box<dyn Module>,
        threshold: usize,
    ) -> Self {
        let info = instance.info();
        Self {
            id,
            name,
            subgraph,
            instance,
            info,
            perf: PerfFigures::default(),
            inputs: (0..info.max_inputs).map(|_| InputPort::new(threshold)).collect(),
            outputs: (0..info.max_outputs).map(|_| OutputPort::new(threshold)).collect(),
            data_policy: None,
            signal_policy: None,
            st_opt_in: None,
            held: vec![MetadataList::new(); info.max_inputs],
            zero_pad: ZeroPad::default(),
            process_state: ProcessState::Enabled,
            inplace_active: info.caps.inplace,
            access_mode: BufferAccessMode::Engine,
            stats: ModuleStats::default(),
            failed_this_cycle: false,
            ran_this_cycle: false,
        }
    }

    /// Disabled single-input single-output modules are bypassed: the engine
    /// copies input to output without calling the module.
    pub const fn is_bypassed(&self) -> bool {
        matches!(self.process_state, ProcessState::Disabled) && self.info.is_siso()
    }

    pub const fn is_enabled(&self) -> bool {
        matches!(self.process_state, ProcessState::Enabled)
    }

    pub fn has_started_port(&self) -> bool {
        self.inputs.iter().any(|p| p.common.is_started())
            || self.outputs.iter().any(|p| p.common.is_started())
    }

    /// Something internal still needs a call: a held flushing end-of-stream
    /// or zero padding in progress.
    pub fn has_internal_work(&self) -> bool {
        self.zero_pad.pending > 0 || self.held.iter().any(|h| has_flushing_eos(h))
    }

    pub const fn has_trigger_policy(&self) -> bool {
        self.data_policy.is_some() || self.signal_policy.is_some()
    }
}
