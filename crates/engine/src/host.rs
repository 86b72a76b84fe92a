// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Contract between a topology and the container hosting it.
//!
//! The container owns threads, queues and the allocator; the topology only
//! reaches out through [`ContainerCallbacks`].

use crate::ids::{ModuleId, PortId};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::metadata::{Metadata, TrackingStatus};
use cyclekit_core::module::{BufferAccessMode, Module};

/// Notifications the topology raises towards its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// An external output port's media format changed.
    OutputMediaFormat { port: PortId, format: MediaFormat },
    /// Total algorithmic delay of the graph changed.
    PathDelay { delay_us: u64 },
    /// Aggregate processing cost changed.
    Performance { kpps: u32, bandwidth: u32 },
    BufferAccessMode { module: ModuleId, mode: BufferAccessMode },
    /// A tracked marker completed.
    MetadataTracking { token: u64, status: TrackingStatus },
}

/// Callbacks the topology consumes from its container.
pub trait ContainerCallbacks: Send {
    /// The last copy of a flushing end-of-stream that entered through `origin`
    /// was destroyed inside the graph.
    fn clear_eos(&mut self, origin: PortId, origin_id: u32, marker: &Metadata);

    fn raise_event_to_host(&mut self, event: HostEvent);

    /// # Errors
    ///
    /// Whatever the container's factory returns.
    fn create_module(
        &mut self,
        kind: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Box<dyn Module>>;

    fn destroy_module(&mut self, module: ModuleId, instance: Box<dyn Module>);

    /// Delay in microseconds the container adds outside the graph at an external port.
    fn aggregate_external_port_delay(&self, _port: PortId) -> u64 {
        0
    }

    /// Whether the container has a buffer ready to receive what an external
    /// output produces. A module writing to an external output is held back
    /// while this is false.
    fn ext_port_has_buffer(&self, _port: PortId) -> bool {
        true
    }

    /// Whether the container has more data pending for an external input.
    fn ext_port_has_data(&self, _port: PortId) -> bool {
        false
    }

    /// Rate-limit gate for error logs. Returning false suppresses the log.
    fn check_for_error_print(&mut self) -> bool {
        true
    }

    /// Leaves low-power mode for the duration of the current operation.
    ///
    /// # Errors
    ///
    /// When the container can't leave low-power mode right now.
    fn vote_against_low_power(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Container used when the host doesn't need callbacks, e.g. in unit tests.
#[derive(Debug, Default)]
pub struct NullHost;

impl ContainerCallbacks for NullHost {
    fn clear_eos(&mut self, _origin: PortId, _origin_id: u32, _marker: &Metadata) {}

    fn raise_event_to_host(&mut self, _event: HostEvent) {}

    fn create_module(
        &mut self,
        kind: &str,
        _params: Option<&serde_json::Value>,
    ) -> Result<Box<dyn Module>> {
        Err(CycleKitError::NotFound(format!("no module factory for '{kind}'")))
    }

    fn destroy_module(&mut self, _module: ModuleId, _instance: Box<dyn Module>) {}
}

/// Gate for operations that need regular (non-low-power) resources.
#[derive(Debug, Default)]
pub struct LowPowerGate {
    active: bool,
    exits: u64,
}

impl LowPowerGate {
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub const fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// How many times the gate had to ask the container to leave low-power mode.
    pub const fn exits(&self) -> u64 {
        self.exits
    }

    /// Blocks until regular resources may be used.
    ///
    /// # Errors
    ///
    /// `NoMemory` if the container refuses to leave low-power mode.
    pub fn ensure_non_low_power(&mut self, host: &mut dyn ContainerCallbacks) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        host.vote_against_low_power().map_err(|e| {
            CycleKitError::NoMemory(format!("cannot leave low-power mode: {e}"))
        })?;
        self.exits += 1;
        Ok(())
    }
}
