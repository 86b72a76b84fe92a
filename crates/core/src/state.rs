// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Port and sub-graph lifecycle states.
//!
//! ## State Machine
//!
//! Ports and sub-graphs share one lifecycle:
//!
//! ```text
//!     Stopped ──→ Prepared ──→ Started
//!        ↑                      │  ↑
//!        │                      ↓  │
//!        └──────────────── Suspended
//! ```
//!
//! A port's *effective* state is its own state downgraded by its sub-graph's
//! state and by the state of the port it is connected to. Downgrading takes
//! the lower of the two ranks, so a started port inside a suspended sub-graph
//! behaves as suspended.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a port or sub-graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    #[default]
    Stopped,
    Prepared,
    Suspended,
    Started,
}

impl PortState {
    const fn rank(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Prepared => 1,
            Self::Suspended => 2,
            Self::Started => 3,
        }
    }

    /// Combines two states, keeping the more restrictive one.
    #[must_use]
    pub const fn downgrade(self, other: Self) -> Self {
        if other.rank() < self.rank() {
            other
        } else {
            self
        }
    }

    pub const fn is_started(self) -> bool {
        matches!(self, Self::Started)
    }

    /// Stopped and prepared ports hold no data; anything attached must be dropped.
    pub const fn drops_data(self) -> bool {
        matches!(self, Self::Stopped | Self::Prepared)
    }
}

/// Sub-graphs follow the same lifecycle as ports.
pub type SubgraphState = PortState;

/// Whether data is currently flowing through a port.
///
/// Changes only when a buffer arrives (`AtGap` → `Flowing`) or when the flow
/// is explicitly reset by an end-of-stream, a data-flow gap or a port stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFlowState {
    #[default]
    AtGap,
    Flowing,
}

impl DataFlowState {
    pub const fn is_flowing(self) -> bool {
        matches!(self, Self::Flowing)
    }
}

/// Enable/disable state a module reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    #[default]
    Enabled,
    Disabled,
}
