// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The topology instance: graph model, graph operations and event handling.
//!
//! A [`Topology`] owns everything a container needs to run one graph: the
//! modules and their ports, the media-format registry, the buffer pool, the
//! metadata engine and the event accumulators. The container drives it by
//! calling [`Topology::process`] once per trigger and mutates it between
//! cycles through the graph operations below.

mod external;
mod graph;
mod module;
mod port;
mod sort;

pub use external::ExternalOutput;
pub use graph::{Graph, Subgraph};
pub use module::{ModuleEntry, ZeroPad};
pub use port::{CommonPort, InputPort, OutputPort};

use crate::constants::MAX_PORTS_PER_SIDE;
use crate::diagnostics::{DiagnosticCounts, Diagnostics};
use crate::events::{AsyncEventSender, EventAccumulator};
use crate::host::{ContainerCallbacks, HostEvent, LowPowerGate};
use crate::ids::{ModuleId, PortId, SubgraphId};
use crate::metadata::{MdCtx, MetadataEngine};
use crate::trigger::{self, AdmissionEnv, PolicyChange};
use crate::variant::{self, TopologyVariant};
use cyclekit_core::buffer_pool::{BufferPool, PoolStats};
use cyclekit_core::config::{EngineConfig, VariantKind};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::format_registry::MediaFormatRegistry;
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::metadata::{Metadata, MetadataList};
use cyclekit_core::module::{EventSink, Module, ModuleEvent, PortRef};
use cyclekit_core::state::{DataFlowState, PortState, SubgraphState};
use cyclekit_core::stats::ModuleStats;
use cyclekit_core::stream::StreamData;
use cyclekit_core::trigger_policy::{PortsPolicy, TriggerPolicyRequest, TriggerType};
use std::collections::VecDeque;
use std::time::Duration;

/// Shared per-topology services, kept apart from the graph so both can be
/// borrowed at the same time.
pub(crate) struct Services<H> {
    pub(crate) host: H,
    pub(crate) md: MetadataEngine,
    pub(crate) gate: LowPowerGate,
    pub(crate) diag: Diagnostics,
    pub(crate) pool: BufferPool,
    pub(crate) formats: MediaFormatRegistry,
}

impl<H: ContainerCallbacks> Services<H> {
    pub(crate) fn md(&mut self) -> MdCtx<'_> {
        MdCtx::new(&mut self.md, &mut self.host, &mut self.gate, &mut self.diag)
    }

    /// Drops everything attached to `data`: markers go through the tracking
    /// path as dropped, the buffer goes back to the pool.
    pub(crate) fn drop_stream(&mut self, data: &mut StreamData, reason: &'static str) -> usize {
        let mut list = std::mem::take(&mut data.metadata);
        let dropped = self.md().drop_list(&mut list, reason);
        if let Some(buf) = data.buf.take() {
            self.pool.release(buf);
        }
        data.flags = cyclekit_core::stream::StreamFlags::default();
        dropped
    }
}

/// What `teardown` found still alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub leaked_buffers: usize,
    pub live_cargo: usize,
    pub live_tracking: usize,
    pub formats_left: usize,
}

/// One graph instance driven by a container.
pub struct Topology<H: ContainerCallbacks> {
    pub(crate) config: EngineConfig,
    pub(crate) variant: Box<dyn TopologyVariant>,
    pub(crate) graph: Graph,
    pub(crate) svc: Services<H>,
    pub(crate) events: EventAccumulator,
    /// Trigger of the cycle in progress; `Invalid` between cycles.
    pub(crate) trigger: TriggerType,
    pub(crate) path_delay_us: u64,
    next_module: u32,
    next_subgraph: u32,
}

impl<H: ContainerCallbacks> std::fmt::Debug for Topology<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("variant", &self.variant.kind())
            .field("modules", &self.graph.modules.len())
            .field("subgraphs", &self.graph.subgraphs.len())
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl<H: ContainerCallbacks> Topology<H> {
    /// # Errors
    ///
    /// `Configuration` when `config` fails validation.
    pub fn new(config: EngineConfig, host: H) -> Result<Self> {
        config.validate()?;
        let svc = Services {
            host,
            md: MetadataEngine::new(),
            gate: LowPowerGate::default(),
            diag: Diagnostics::new(Duration::from_millis(config.error_print_interval_ms)),
            pool: BufferPool::new(&config.pool),
            formats: MediaFormatRegistry::new(),
        };
        tracing::info!(
            variant = ?config.variant,
            signal_triggered = config.signal_triggered,
            "Created topology"
        );
        Ok(Self {
            variant: variant::for_kind(config.variant),
            config,
            graph: Graph::default(),
            svc,
            events: EventAccumulator::new(),
            trigger: TriggerType::Invalid,
            path_delay_us: 0,
            next_module: 0,
            next_subgraph: 0,
        })
    }

    // --- Accessors ---

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn variant_kind(&self) -> VariantKind {
        self.variant.kind()
    }

    pub const fn host(&self) -> &H {
        &self.svc.host
    }

    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.svc.host
    }

    pub const fn diagnostics(&self) -> DiagnosticCounts {
        self.svc.diag.counts()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.svc.pool.stats()
    }

    pub const fn formats(&self) -> &MediaFormatRegistry {
        &self.svc.formats
    }

    pub const fn metadata_engine(&self) -> &MetadataEngine {
        &self.svc.md
    }

    pub const fn low_power_exits(&self) -> u64 {
        self.svc.gate.exits()
    }

    /// Modules in run order.
    pub fn sorted_modules(&self) -> &[ModuleId] {
        &self.graph.sorted
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown module.
    pub fn module_stats(&self, id: ModuleId) -> Result<ModuleStats> {
        Ok(self.graph.module(id)?.stats)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown module.
    pub fn module_entry(&self, id: ModuleId) -> Result<&ModuleEntry> {
        self.graph.module(id)
    }

    /// Data currently visible at an input port.
    pub fn input_stream(&self, port: PortId) -> Option<&StreamData> {
        self.graph.input_data(port)
    }

    pub fn output_stream(&self, port: PortId) -> Option<&StreamData> {
        self.graph.output(port).ok().map(|o| &o.data)
    }

    /// Markers a module holds for input `index`, waiting for output.
    pub fn held_markers(&self, id: ModuleId, index: usize) -> &[Metadata] {
        self.graph
            .module(id)
            .ok()
            .and_then(|m| m.held.get(index))
            .map_or(&[], Vec::as_slice)
    }

    /// # Errors
    ///
    /// `NotFound` or `BadParam` for an unknown port.
    pub fn port_state(&self, port: PortId) -> Result<PortState> {
        Ok(self.common(port)?.effective)
    }

    /// # Errors
    ///
    /// `NotFound` or `BadParam` for an unknown port.
    pub fn port_flow(&self, port: PortId) -> Result<DataFlowState> {
        Ok(self.common(port)?.flow)
    }

    /// # Errors
    ///
    /// `NotFound` or `BadParam` for an unknown port.
    pub fn port_format(&self, port: PortId) -> Result<Option<&MediaFormat>> {
        Ok(self.common(port)?.format.as_ref().and_then(|h| self.svc.formats.get(h)))
    }

    /// # Errors
    ///
    /// `NotFound` or `BadParam` for an unknown port.
    pub fn port_threshold(&self, port: PortId) -> Result<usize> {
        Ok(self.common(port)?.threshold)
    }

    fn common(&self, port: PortId) -> Result<&CommonPort> {
        if port.is_input() {
            Ok(&self.graph.input(port)?.common)
        } else {
            Ok(&self.graph.output(port)?.common)
        }
    }

    fn common_mut(&mut self, port: PortId) -> Result<&mut CommonPort> {
        if port.is_input() {
            Ok(&mut self.graph.input_mut(port)?.common)
        } else {
            Ok(&mut self.graph.output_mut(port)?.common)
        }
    }

    pub const fn path_delay_us(&self) -> u64 {
        self.path_delay_us
    }

    // --- Sub-graphs and modules ---

    pub fn add_subgraph(&mut self) -> SubgraphId {
        let id = SubgraphId(self.next_subgraph);
        self.next_subgraph += 1;
        self.graph.subgraphs.insert(id, Subgraph::default());
        tracing::debug!(subgraph = %id, "Added sub-graph");
        id
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown sub-graph.
    pub fn set_subgraph_state(&mut self, id: SubgraphId, state: SubgraphState) -> Result<()> {
        let sg = self
            .graph
            .subgraphs
            .get_mut(&id)
            .ok_or_else(|| CycleKitError::NotFound(format!("sub-graph {id}")))?;
        sg.state = state;
        tracing::debug!(subgraph = %id, ?state, "Sub-graph state changed");
        self.apply_port_states();
        Ok(())
    }

    /// Adds a module instance to a sub-graph and runs its `init`.
    ///
    /// Events raised during `init` are handled before this returns; if one
    /// of them is rejected the module is removed again.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown sub-graph, `BadParam` for too many ports,
    /// or whatever `init` or its events return.
    pub fn add_module(
        &mut self,
        subgraph: SubgraphId,
        name: &str,
        instance: Box<dyn Module>,
    ) -> Result<ModuleId> {
        if !self.graph.subgraphs.contains_key(&subgraph) {
            return Err(CycleKitError::NotFound(format!("sub-graph {subgraph}")));
        }
        let info = instance.info();
        if info.max_inputs > MAX_PORTS_PER_SIDE || info.max_outputs > MAX_PORTS_PER_SIDE {
            return Err(CycleKitError::BadParam(format!(
                "module '{name}' declares {}/{} ports, limit is {MAX_PORTS_PER_SIDE}",
                info.max_inputs, info.max_outputs
            )));
        }

        let id = ModuleId(self.next_module);
        let mut entry = ModuleEntry::new(
            id,
            name.to_string(),
            subgraph,
            instance,
            self.config.default_port_threshold,
        );
        let mut events = EventSink::new();
        if let Err(e) = entry.instance.init(&mut events) {
            tracing::warn!(module = name, error = %e, "Module init failed");
            self.svc.host.destroy_module(id, entry.instance);
            return Err(e);
        }
        self.next_module += 1;
        self.graph.modules.insert(id, entry);
        if let Some(sg) = self.graph.subgraphs.get_mut(&subgraph) {
            sg.modules.push(id);
        }

        let flags = self.events.flags_mut();
        flags.sort_dirty = true;
        flags.perf_changed = true;

        let raised: Vec<ModuleEvent> = events.drain().collect();
        if let Err(e) = self.handle_module_events(id, raised) {
            tracing::warn!(module = %id, error = %e, "Rolling back module after rejected init event");
            self.remove_module(id);
            return Err(e);
        }
        self.apply_port_states();
        tracing::debug!(module = %id, name, subgraph = %subgraph, ?info, "Added module");
        Ok(id)
    }

    /// Creates a module through the container's factory and adds it.
    ///
    /// # Errors
    ///
    /// Whatever the factory or [`Topology::add_module`] return.
    pub fn add_module_instance(
        &mut self,
        subgraph: SubgraphId,
        kind: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<ModuleId> {
        let instance = self.svc.host.create_module(kind, params)?;
        self.add_module(subgraph, kind, instance)
    }

    /// Connects an output to an input. The input takes a shared reference to
    /// the output's media format, if it has one.
    ///
    /// # Errors
    ///
    /// `BadParam` when either port is already connected, when the ports are
    /// on the same module, or when the directions are wrong.
    pub fn connect(&mut self, from: PortId, to: PortId) -> Result<()> {
        if from.module == to.module {
            return Err(CycleKitError::BadParam(format!("{from} -> {to} loops on one module")));
        }
        if self.graph.output(from)?.conn.is_some() {
            return Err(CycleKitError::BadParam(format!("{from} is already connected")));
        }
        if self.graph.input(to)?.conn.is_some() {
            return Err(CycleKitError::BadParam(format!("{to} is already connected")));
        }

        // Whatever the host left on the input is stale now.
        let input = self.graph.input_mut(to)?;
        let mut stale = std::mem::take(&mut input.data);
        input.pending_eos.clear();
        input.conn = Some(from);
        self.svc.drop_stream(&mut stale, "reconnected");
        self.graph.output_mut(from)?.conn = Some(to);

        let format = self.graph.output(from)?.common.format.as_ref().and_then(|h| {
            let shared = self.svc.formats.share(h)?;
            let value = self.svc.formats.get(h).cloned()?;
            Some((shared, value))
        });
        if let Some((handle, value)) = format {
            self.assign_input_format(to, handle, &value)?;
        }

        self.events.flags_mut().sort_dirty = true;
        self.apply_port_states();
        tracing::debug!(%from, %to, "Connected ports");
        Ok(())
    }

    /// Disconnects an output from its input. Data in flight is dropped.
    ///
    /// # Errors
    ///
    /// `BadParam` when the output is not connected.
    pub fn disconnect(&mut self, from: PortId) -> Result<()> {
        let output = self.graph.output_mut(from)?;
        let Some(to) = output.conn.take() else {
            return Err(CycleKitError::BadParam(format!("{from} is not connected")));
        };
        let mut data = std::mem::take(&mut output.data);
        if let Ok(input) = self.graph.input_mut(to) {
            input.conn = None;
            input.common.flow = DataFlowState::AtGap;
        }
        self.svc.drop_stream(&mut data, "disconnected");
        self.events.flags_mut().sort_dirty = true;
        self.apply_port_states();
        tracing::debug!(%from, %to, "Disconnected ports");
        Ok(())
    }

    /// Removes a sub-graph and destroys its modules. Connections to modules
    /// in other sub-graphs are cut and their in-flight data dropped.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown sub-graph.
    pub fn remove_subgraph(&mut self, id: SubgraphId) -> Result<()> {
        let sg = self
            .graph
            .subgraphs
            .shift_remove(&id)
            .ok_or_else(|| CycleKitError::NotFound(format!("sub-graph {id}")))?;
        for module in &sg.modules {
            self.remove_module(*module);
        }
        self.events.flags_mut().sort_dirty = true;
        self.apply_port_states();
        self.apply_cleared_origins();
        tracing::info!(subgraph = %id, modules = sg.modules.len(), "Removed sub-graph");
        Ok(())
    }

    fn remove_module(&mut self, id: ModuleId) {
        let Some(entry) = self.graph.modules.shift_remove(&id) else {
            return;
        };
        self.graph.sorted.retain(|m| *m != id);
        for sg in self.graph.subgraphs.values_mut() {
            sg.modules.retain(|m| *m != id);
        }

        let ModuleEntry { instance, inputs, outputs, held, .. } = entry;
        for mut input in inputs {
            if let Some(up) = input.conn {
                if let Ok(output) = self.graph.output_mut(up) {
                    output.conn = None;
                    let mut data = std::mem::take(&mut output.data);
                    self.svc.drop_stream(&mut data, "peer_removed");
                }
            }
            self.svc.drop_stream(&mut input.data, "module_removed");
            if let Some(handle) = input.common.format.take() {
                self.svc.formats.release(handle);
            }
        }
        for mut output in outputs {
            if let Some(down) = output.conn {
                if let Ok(input) = self.graph.input_mut(down) {
                    input.conn = None;
                    input.common.flow = DataFlowState::AtGap;
                }
            }
            self.svc.drop_stream(&mut output.data, "module_removed");
            if let Some(handle) = output.common.format.take() {
                self.svc.formats.release(handle);
            }
        }
        for mut list in held {
            self.svc.md().drop_list(&mut list, "module_removed");
        }
        self.svc.host.destroy_module(id, instance);
        tracing::debug!(module = %id, "Destroyed module");
    }

    // --- Port state ---

    /// # Errors
    ///
    /// `NotFound` or `BadParam` for an unknown port.
    pub fn set_input_port_state(&mut self, port: PortId, state: PortState) -> Result<()> {
        self.graph.input_mut(port)?.common.own_state = state;
        self.apply_port_states();
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` or `BadParam` for an unknown port.
    pub fn set_output_port_state(&mut self, port: PortId, state: PortState) -> Result<()> {
        self.graph.output_mut(port)?.common.own_state = state;
        self.apply_port_states();
        Ok(())
    }

    /// Starts every port of every module in a sub-graph, and the sub-graph itself.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown sub-graph.
    pub fn start_subgraph(&mut self, id: SubgraphId) -> Result<()> {
        let modules = self
            .graph
            .subgraphs
            .get(&id)
            .map(|sg| sg.modules.clone())
            .ok_or_else(|| CycleKitError::NotFound(format!("sub-graph {id}")))?;
        for module in modules {
            let entry = self.graph.module_mut(module)?;
            for port in &mut entry.inputs {
                port.common.own_state = PortState::Started;
            }
            for port in &mut entry.outputs {
                port.common.own_state = PortState::Started;
            }
        }
        self.set_subgraph_state(id, PortState::Started)
    }

    /// Recomputes every port's effective state and drops data on ports that
    /// moved to a state which can't hold any.
    pub(crate) fn apply_port_states(&mut self) {
        let mut changed = 0usize;
        for port in self.graph.all_ports() {
            let base = self.graph.base_state(port);
            let peer = if port.is_input() {
                self.graph.input(port).ok().and_then(|p| p.conn)
            } else {
                self.graph.output(port).ok().and_then(|p| p.conn)
            };
            let effective = peer.map_or(base, |q| base.downgrade(self.graph.base_state(q)));
            let Ok(common) = self.common_mut(port) else {
                continue;
            };
            if common.effective == effective {
                continue;
            }
            common.effective = effective;
            changed += 1;
            if effective.drops_data() {
                common.flow = DataFlowState::AtGap;
                self.drop_port_data(port);
            }
        }
        if changed > 0 {
            let flags = self.events.flags_mut();
            flags.port_state_changed = true;
            flags.perf_changed = true;
            tracing::debug!(changed, "Port states recomputed");
        }
    }

    fn drop_port_data(&mut self, port: PortId) {
        let (mut data, held) = if port.is_input() {
            let Ok(module) = self.graph.module_mut(port.module) else {
                return;
            };
            if port.index == 0 {
                module.zero_pad = ZeroPad::default();
            }
            let held = module.held.get_mut(port.index).map(std::mem::take).unwrap_or_default();
            let Ok(input) = self.graph.input_mut(port) else {
                return;
            };
            input.pending_eos.clear();
            (
                if input.is_external() { std::mem::take(&mut input.data) } else { StreamData::default() },
                held,
            )
        } else {
            let Ok(output) = self.graph.output_mut(port) else {
                return;
            };
            (std::mem::take(&mut output.data), MetadataList::new())
        };
        let mut held = held;
        let mut dropped = self.svc.drop_stream(&mut data, "port_stopped");
        dropped += self.svc.md().drop_list(&mut held, "port_stopped");
        if dropped > 0 {
            if let Ok(module) = self.graph.module_mut(port.module) {
                module.stats.dropped(dropped);
            }
        }
    }

    // --- Formats and thresholds ---

    /// Sets the media format of an unconnected input, as announced by the host.
    ///
    /// # Errors
    ///
    /// `BadParam` for a connected input, or whatever the module returns from
    /// `on_input_media_format`.
    pub fn set_external_input_media_format(
        &mut self,
        port: PortId,
        format: &MediaFormat,
    ) -> Result<()> {
        if !self.graph.input(port)?.is_external() {
            return Err(CycleKitError::BadParam(format!(
                "{port} is connected; its format comes from upstream"
            )));
        }
        let handle = self.svc.formats.intern(format);
        self.assign_input_format(port, handle, format)
    }

    fn assign_input_format(
        &mut self,
        port: PortId,
        handle: cyclekit_core::format_registry::FormatHandle,
        format: &MediaFormat,
    ) -> Result<()> {
        let mut queue = VecDeque::new();
        self.install_input_format(port, handle, format, &mut queue)?;
        self.drain_events(queue)
    }

    fn install_input_format(
        &mut self,
        port: PortId,
        handle: cyclekit_core::format_registry::FormatHandle,
        format: &MediaFormat,
        queue: &mut VecDeque<(ModuleId, ModuleEvent)>,
    ) -> Result<()> {
        let input = match self.graph.input_mut(port) {
            Ok(input) => input,
            Err(e) => {
                self.svc.formats.release(handle);
                return Err(e);
            },
        };
        if let Some(old) = input.common.format.replace(handle) {
            self.svc.formats.release(old);
        }
        self.events.flags_mut().media_format_changed = true;

        let module = self.graph.module_mut(port.module)?;
        let mut sink = EventSink::new();
        module.instance.on_input_media_format(port.index, format, &mut sink)?;
        queue.extend(sink.drain().map(|e| (port.module, e)));
        tracing::debug!(%port, ?format, "Input media format set");
        Ok(())
    }

    fn set_output_media_format(
        &mut self,
        module: ModuleId,
        index: usize,
        format: &MediaFormat,
        queue: &mut VecDeque<(ModuleId, ModuleEvent)>,
    ) -> Result<()> {
        let port = PortId::output(module, index);
        self.graph.output(port)?;
        let handle = self.svc.formats.intern(format);
        let output = self.graph.output_mut(port)?;
        if let Some(old) = output.common.format.replace(handle) {
            self.svc.formats.release(old);
        }
        self.events.flags_mut().media_format_changed = true;

        match self.graph.output(port)?.conn {
            Some(down) => {
                let shared = self
                    .graph
                    .output(port)?
                    .common
                    .format
                    .as_ref()
                    .and_then(|h| self.svc.formats.share(h))
                    .ok_or_else(|| CycleKitError::Failed(format!("format of {port} vanished")))?;
                self.install_input_format(down, shared, format, queue)
            },
            None => {
                self.svc
                    .host
                    .raise_event_to_host(HostEvent::OutputMediaFormat { port, format: format.clone() });
                Ok(())
            },
        }
    }

    /// Sets the threshold (bytes per channel buffer) of a port, its connected
    /// peer and every port of its non-buffering linear chain.
    ///
    /// # Errors
    ///
    /// `BadParam` for a zero threshold or an unknown port.
    pub fn set_port_threshold(&mut self, port: PortId, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Err(CycleKitError::BadParam(format!("zero threshold for {port}")));
        }
        self.common(port)?;
        let scope = self.threshold_scope(port);
        for p in &scope {
            if let Ok(common) = self.common_mut(*p) {
                common.threshold = bytes;
            }
        }
        self.events.flags_mut().threshold_changed = true;
        tracing::debug!(%port, bytes, ports = scope.len(), "Port threshold set");
        Ok(())
    }

    // --- Parameters ---

    /// # Errors
    ///
    /// `NotFound` for an unknown module, or whatever the module or the
    /// handling of its events return.
    pub fn set_param(&mut self, id: ModuleId, param_id: u32, payload: &[u8]) -> Result<()> {
        let module = self.graph.module_mut(id)?;
        let mut sink = EventSink::new();
        module.instance.set_param(param_id, payload, &mut sink)?;
        let raised: Vec<ModuleEvent> = sink.drain().collect();
        self.handle_module_events(id, raised)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown module, or whatever the module returns.
    pub fn get_param(&self, id: ModuleId, param_id: u32) -> Result<Vec<u8>> {
        self.graph.module(id)?.instance.get_param(param_id)
    }

    // --- Trigger policy ---

    /// # Errors
    ///
    /// See [`trigger::register_trigger_policy`].
    pub fn register_trigger_policy(
        &mut self,
        id: ModuleId,
        trigger: TriggerType,
        request: &TriggerPolicyRequest,
    ) -> Result<PolicyChange> {
        let change =
            trigger::register_trigger_policy(&mut self.graph, self.variant.as_ref(), id, trigger, request)?;
        let flags = self.events.flags_mut();
        flags.trigger_policy_changed = true;
        flags.perf_changed = true;
        Ok(change)
    }

    /// # Errors
    ///
    /// As [`Topology::register_trigger_policy`].
    pub fn remove_trigger_policy(&mut self, id: ModuleId, trigger: TriggerType) -> Result<PolicyChange> {
        let removal = TriggerPolicyRequest::new(PortsPolicy::Mandatory);
        self.register_trigger_policy(id, trigger, &removal)
    }

    /// # Errors
    ///
    /// See [`trigger::set_allow_data_trigger_in_st`].
    pub fn set_allow_data_trigger_in_st(
        &mut self,
        id: ModuleId,
        needs_input: bool,
        needs_output: bool,
    ) -> Result<Vec<ModuleId>> {
        let opted = trigger::set_allow_data_trigger_in_st(&mut self.graph, id, needs_input, needs_output)?;
        self.events.flags_mut().trigger_policy_changed = true;
        Ok(opted)
    }

    /// Admission check for one module, recording per-port results.
    pub fn check_module_admission(&mut self, id: ModuleId, trigger: TriggerType) -> bool {
        let env = AdmissionEnv {
            host: &self.svc.host,
            variant: self.variant.as_ref(),
            signal_triggered: self.config.signal_triggered,
        };
        trigger::check_module_admission(&mut self.graph, env, id, trigger)
    }

    pub fn is_module_active(&self, id: ModuleId, ignore_trigger_policy: bool) -> bool {
        trigger::is_module_active(&self.graph, id, ignore_trigger_policy)
    }

    // --- Events ---

    /// Handle for command code running concurrently with processing.
    pub fn async_sender(&self) -> AsyncEventSender {
        self.events.async_sender()
    }

    /// Folds asynchronous event patches into the synchronous flags.
    pub fn reconcile_events(&mut self) -> usize {
        self.events.reconcile()
    }

    /// Enters or leaves low-power mode.
    pub fn set_low_power(&mut self, active: bool) {
        self.svc.gate.set_active(active);
        tracing::debug!(active, "Low-power mode changed");
    }

    /// Acts on every pending event flag: sorts, recomputes port states, path
    /// delay and performance figures.
    ///
    /// # Errors
    ///
    /// `Failed` when the graph has a cycle.
    pub fn handle_pending_events(&mut self) -> Result<()> {
        self.events.reconcile();
        let flags = self.events.take();
        if flags.is_empty() {
            return Ok(());
        }
        if flags.port_state_changed {
            self.apply_port_states();
        }
        if flags.sort_dirty {
            self.sort_modules()?;
        } else if flags.inplace_changed {
            self.compute_nblc();
        }
        if flags.media_format_changed || flags.threshold_changed {
            self.release_stale_buffers();
        }
        if flags.trigger_policy_changed {
            self.clear_port_verdicts();
        }
        if flags.algo_delay_changed || flags.sort_dirty || flags.port_state_changed {
            self.update_path_delay();
        }
        if flags.perf_changed || flags.process_state_changed || flags.port_state_changed {
            self.raise_performance();
        }
        // Follow-up flags raised while handling are already acted upon.
        let pending = self.events.flags_mut();
        pending.port_state_changed = false;
        pending.perf_changed = false;
        Ok(())
    }

    /// Returns idle output buffers whose size or layout no longer matches
    /// their port to the pool.
    fn release_stale_buffers(&mut self) -> usize {
        let formats = &self.svc.formats;
        let mut stale = Vec::new();
        for entry in self.graph.modules.values_mut() {
            for port in &mut entry.outputs {
                let num_bufs = port
                    .common
                    .format
                    .as_ref()
                    .and_then(|h| formats.get(h))
                    .map_or(1, MediaFormat::num_bufs);
                let threshold = port.common.threshold;
                let mismatched = port.data.buf.as_ref().is_some_and(|b| {
                    b.is_empty() && (b.max_len() != threshold || b.num_bufs() != num_bufs)
                });
                if mismatched {
                    stale.extend(port.data.buf.take());
                }
            }
        }
        let released = stale.len();
        for buf in stale {
            self.svc.pool.release(buf);
        }
        if released > 0 {
            tracing::debug!(released, "Released buffers that no longer fit their port");
        }
        released
    }

    /// Drops admission results left over from the previous trigger policy.
    fn clear_port_verdicts(&mut self) {
        for entry in self.graph.modules.values_mut() {
            let inputs = entry.inputs.iter_mut().map(|p| &mut p.common);
            let outputs = entry.outputs.iter_mut().map(|p| &mut p.common);
            for common in inputs.chain(outputs) {
                common.satisfied = false;
                common.blocked = false;
            }
        }
    }

    fn raise_performance(&mut self) {
        let (mut kpps, mut bandwidth) = (0u32, 0u32);
        for id in self.graph.modules.keys() {
            if !trigger::is_module_active(&self.graph, *id, false) {
                continue;
            }
            if let Ok(entry) = self.graph.module(*id) {
                kpps = kpps.saturating_add(entry.perf.kpps);
                bandwidth = bandwidth.saturating_add(entry.perf.bandwidth);
            }
        }
        self.svc.host.raise_event_to_host(HostEvent::Performance { kpps, bandwidth });
    }

    fn update_path_delay(&mut self) {
        let delay = self.compute_path_delay();
        if delay != self.path_delay_us {
            self.path_delay_us = delay;
            self.svc.host.raise_event_to_host(HostEvent::PathDelay { delay_us: delay });
            tracing::debug!(delay_us = delay, "Path delay changed");
        }
    }

    /// Applies events a module raised.
    pub(crate) fn handle_module_events(
        &mut self,
        id: ModuleId,
        events: Vec<ModuleEvent>,
    ) -> Result<()> {
        self.drain_events(events.into_iter().map(|e| (id, e)).collect())
    }

    fn drain_events(&mut self, mut queue: VecDeque<(ModuleId, ModuleEvent)>) -> Result<()> {
        let mut first_error = None;
        while let Some((source, event)) = queue.pop_front() {
            if let Err(e) = self.apply_module_event(source, event, &mut queue) {
                tracing::warn!(module = %source, error = %e, "Module event rejected");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn apply_module_event(
        &mut self,
        source: ModuleId,
        event: ModuleEvent,
        queue: &mut VecDeque<(ModuleId, ModuleEvent)>,
    ) -> Result<()> {
        match event {
            ModuleEvent::Kpps(kpps) => {
                self.graph.module_mut(source)?.perf.kpps = kpps;
                self.events.flags_mut().perf_changed = true;
            },
            ModuleEvent::Bandwidth(bandwidth) => {
                self.graph.module_mut(source)?.perf.bandwidth = bandwidth;
                self.events.flags_mut().perf_changed = true;
            },
            ModuleEvent::PortThreshold { port, bytes } => {
                let port = match port {
                    PortRef::Input(i) => PortId::input(source, i),
                    PortRef::Output(o) => PortId::output(source, o),
                };
                self.set_port_threshold(port, bytes)?;
            },
            ModuleEvent::OutputMediaFormat { port, format } => {
                self.set_output_media_format(source, port, &format, queue)?;
            },
            ModuleEvent::AlgorithmicDelay(delay_us) => {
                let module = self.graph.module_mut(source)?;
                if module.perf.algo_delay_us != delay_us {
                    module.perf.algo_delay_us = delay_us;
                    self.events.flags_mut().algo_delay_changed = true;
                }
            },
            ModuleEvent::DataTriggerPolicy(request) => {
                self.register_trigger_policy(source, TriggerType::Data, &request)?;
            },
            ModuleEvent::SignalTriggerPolicy(request) => {
                self.register_trigger_policy(source, TriggerType::Signal, &request)?;
            },
            ModuleEvent::ProcessState(state) => {
                let module = self.graph.module_mut(source)?;
                if module.process_state != state {
                    module.process_state = state;
                    let flags = self.events.flags_mut();
                    flags.process_state_changed = true;
                    flags.perf_changed = true;
                    tracing::debug!(module = %source, ?state, "Process state changed");
                }
            },
            ModuleEvent::DynamicInplace(enabled) => {
                let module = self.graph.module_mut(source)?;
                if enabled && !module.info.caps.inplace {
                    return Err(CycleKitError::Unsupported(format!(
                        "{source} can't process in place"
                    )));
                }
                module.inplace_active = enabled;
                self.events.flags_mut().inplace_changed = true;
            },
            ModuleEvent::BufferAccessMode(mode) => {
                self.graph.module_mut(source)?.access_mode = mode;
                self.svc
                    .host
                    .raise_event_to_host(HostEvent::BufferAccessMode { module: source, mode });
            },
            ModuleEvent::AllowDataTriggerInSignalTriggered { needs_input, needs_output } => {
                self.set_allow_data_trigger_in_st(source, needs_input, needs_output)?;
            },
        }
        Ok(())
    }

    /// Forwards end-of-stream clearances to the ingress ports' bookkeeping.
    pub(crate) fn apply_cleared_origins(&mut self) {
        for (port, origin_id) in self.svc.md.take_cleared_origins() {
            if let Ok(input) = self.graph.input_mut(port) {
                input.pending_eos.retain(|id| *id != origin_id);
            }
        }
    }

    // --- Teardown ---

    /// Removes every sub-graph and frees the pool and metadata arenas.
    pub fn teardown(&mut self) -> TeardownReport {
        let subgraphs: Vec<SubgraphId> = self.graph.subgraphs.keys().copied().collect();
        for id in subgraphs {
            if let Err(e) = self.remove_subgraph(id) {
                tracing::warn!(subgraph = %id, error = %e, "Sub-graph removal failed during teardown");
            }
        }
        let leaked_buffers = self.svc.pool.teardown();
        let (live_cargo, live_tracking) = self.svc.md.teardown();
        let report = TeardownReport {
            leaked_buffers,
            live_cargo,
            live_tracking,
            formats_left: self.svc.formats.len(),
        };
        tracing::info!(?report, "Topology torn down");
        report
    }
}
