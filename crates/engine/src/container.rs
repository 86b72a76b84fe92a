// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A container backed by a [`ModuleRegistry`].
//!
//! It creates modules by registered name and records everything the topology
//! tells it, which makes it the container of choice for embedding hosts that
//! don't need their own callback plumbing, and for tests.

use crate::host::{ContainerCallbacks, HostEvent};
use crate::ids::{ModuleId, PortId};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::metadata::Metadata;
use cyclekit_core::module::Module;
use cyclekit_core::registry::ModuleRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct RegistryContainer {
    registry: Arc<RwLock<ModuleRegistry>>,
    events: Vec<HostEvent>,
    cleared: Vec<(PortId, u32)>,
    destroyed: Vec<ModuleId>,
    external_delays: HashMap<PortId, u64>,
    ports_with_data: HashSet<PortId>,
    stalled_outputs: HashSet<PortId>,
    refuse_low_power_exit: bool,
    low_power_votes: u64,
}

impl RegistryContainer {
    pub fn new(registry: Arc<RwLock<ModuleRegistry>>) -> Self {
        Self {
            registry,
            events: Vec::new(),
            cleared: Vec::new(),
            destroyed: Vec::new(),
            external_delays: HashMap::new(),
            ports_with_data: HashSet::new(),
            stalled_outputs: HashSet::new(),
            refuse_low_power_exit: false,
            low_power_votes: 0,
        }
    }

    /// Events raised since the last call.
    pub fn take_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    /// `(origin, origin_id)` of every end-of-stream cleared through `clear_eos`.
    pub fn cleared_eos(&self) -> &[(PortId, u32)] {
        &self.cleared
    }

    pub fn destroyed_modules(&self) -> &[ModuleId] {
        &self.destroyed
    }

    pub fn set_external_port_delay(&mut self, port: PortId, delay_us: u64) {
        self.external_delays.insert(port, delay_us);
    }

    /// Declares whether more host data is queued for an external input.
    pub fn set_ext_port_has_data(&mut self, port: PortId, has_data: bool) {
        if has_data {
            self.ports_with_data.insert(port);
        } else {
            self.ports_with_data.remove(&port);
        }
    }

    /// Declares whether the host can take output from an external output
    /// right now.
    pub fn set_ext_port_has_buffer(&mut self, port: PortId, has_buffer: bool) {
        if has_buffer {
            self.stalled_outputs.remove(&port);
        } else {
            self.stalled_outputs.insert(port);
        }
    }

    /// Makes `vote_against_low_power` fail, as a container stuck in
    /// low-power mode would.
    pub const fn set_refuse_low_power_exit(&mut self, refuse: bool) {
        self.refuse_low_power_exit = refuse;
    }

    pub const fn low_power_votes(&self) -> u64 {
        self.low_power_votes
    }
}

impl ContainerCallbacks for RegistryContainer {
    fn clear_eos(&mut self, origin: PortId, origin_id: u32, _marker: &Metadata) {
        tracing::debug!(%origin, origin_id, "End-of-stream cleared");
        self.cleared.push((origin, origin_id));
    }

    fn raise_event_to_host(&mut self, event: HostEvent) {
        self.events.push(event);
    }

    fn create_module(
        &mut self,
        kind: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Box<dyn Module>> {
        let registry = self
            .registry
            .read()
            .map_err(|e| CycleKitError::Failed(format!("module registry lock poisoned: {e}")))?;
        registry.create_module(kind, params)
    }

    fn destroy_module(&mut self, module: ModuleId, instance: Box<dyn Module>) {
        self.destroyed.push(module);
        drop(instance);
    }

    fn aggregate_external_port_delay(&self, port: PortId) -> u64 {
        self.external_delays.get(&port).copied().unwrap_or(0)
    }

    fn ext_port_has_buffer(&self, port: PortId) -> bool {
        !self.stalled_outputs.contains(&port)
    }

    fn ext_port_has_data(&self, port: PortId) -> bool {
        self.ports_with_data.contains(&port)
    }

    fn vote_against_low_power(&mut self) -> Result<()> {
        self.low_power_votes += 1;
        if self.refuse_low_power_exit {
            return Err(CycleKitError::Failed("container is pinned to low-power mode".into()));
        }
        Ok(())
    }
}
