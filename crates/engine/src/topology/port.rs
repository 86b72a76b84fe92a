// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Port records.
//!
//! A connected output/input pair shares one [`StreamData`], held by the
//! output. Unconnected ports are external: an external input holds whatever
//! the host wrote into it, an external output is drained by the host.

use crate::ids::PortId;
use cyclekit_core::format_registry::FormatHandle;
use cyclekit_core::state::{DataFlowState, PortState};
use cyclekit_core::stream::StreamData;

/// State shared by inputs and outputs.
#[derive(Debug)]
pub struct CommonPort {
    /// State requested for this port.
    pub own_state: PortState,
    /// `own_state` downgraded by the sub-graph and the connected peer.
    pub effective: PortState,
    pub flow: DataFlowState,
    pub format: Option<FormatHandle>,
    /// Maximum bytes per channel buffer.
    pub threshold: usize,
    /// First and last port of the non-buffering linear chain this port is in.
    pub nblc_start: Option<PortId>,
    pub nblc_end: Option<PortId>,
    /// Result of the last admission check for this port.
    pub satisfied: bool,
    /// The trigger policy withholds this port from the module.
    pub blocked: bool,
}

impl CommonPort {
    pub const fn new(threshold: usize) -> Self {
        Self {
            own_state: PortState::Stopped,
            effective: PortState::Stopped,
            flow: DataFlowState::AtGap,
            format: None,
            threshold,
            nblc_start: None,
            nblc_end: None,
            satisfied: false,
            blocked: false,
        }
    }

    pub const fn is_started(&self) -> bool {
        self.effective.is_started()
    }
}

#[derive(Debug)]
pub struct InputPort {
    pub common: CommonPort,
    /// Upstream output feeding this port.
    pub conn: Option<PortId>,
    /// Host-written data; only used while unconnected.
    pub data: StreamData,
    /// Sequence numbers of flushing end-of-stream markers that entered here
    /// and still have copies alive in the graph.
    pub pending_eos: Vec<u32>,
}

impl InputPort {
    pub fn new(threshold: usize) -> Self {
        Self {
            common: CommonPort::new(threshold),
            conn: None,
            data: StreamData::default(),
            pending_eos: Vec::new(),
        }
    }

    pub const fn is_external(&self) -> bool {
        self.conn.is_none()
    }
}

#[derive(Debug)]
pub struct OutputPort {
    pub common: CommonPort,
    /// Downstream input reading this port.
    pub conn: Option<PortId>,
    /// Data produced by the module, shared with the downstream input.
    pub data: StreamData,
}

impl OutputPort {
    pub fn new(threshold: usize) -> Self {
        Self { common: CommonPort::new(threshold), conn: None, data: StreamData::default() }
    }

    pub const fn is_external(&self) -> bool {
        self.conn.is_none()
    }

    /// Whether the module may append to this port now.
    pub fn has_space(&self) -> bool {
        self.data.buf.as_ref().is_none_or(|b| !b.is_full())
    }
}
