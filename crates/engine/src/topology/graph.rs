// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structural storage: sub-graphs, modules and the shared-buffer lookups.

use super::module::ModuleEntry;
use super::port::{InputPort, OutputPort};
use crate::ids::{ModuleId, PortId, SubgraphId};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::state::{PortState, SubgraphState};
use cyclekit_core::stream::StreamData;
use indexmap::IndexMap;

#[derive(Debug, Default)]
pub struct Subgraph {
    pub state: SubgraphState,
    pub modules: Vec<ModuleId>,
}

/// Modules and sub-graphs in insertion order, plus the sorted run order.
#[derive(Debug, Default)]
pub struct Graph {
    pub subgraphs: IndexMap<SubgraphId, Subgraph>,
    pub modules: IndexMap<ModuleId, ModuleEntry>,
    /// Topological run order; recomputed when the structure changes.
    pub sorted: Vec<ModuleId>,
}

impl Graph {
    pub fn module(&self, id: ModuleId) -> Result<&ModuleEntry> {
        self.modules.get(&id).ok_or_else(|| CycleKitError::NotFound(format!("module {id}")))
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Result<&mut ModuleEntry> {
        self.modules.get_mut(&id).ok_or_else(|| CycleKitError::NotFound(format!("module {id}")))
    }

    pub fn subgraph_state(&self, id: SubgraphId) -> SubgraphState {
        self.subgraphs.get(&id).map_or(PortState::Stopped, |sg| sg.state)
    }

    pub fn subgraph_started(&self, module: &ModuleEntry) -> bool {
        self.subgraph_state(module.subgraph).is_started()
    }

    pub fn input(&self, port: PortId) -> Result<&InputPort> {
        if !port.is_input() {
            return Err(CycleKitError::BadParam(format!("{port} is not an input")));
        }
        self.module(port.module)?
            .inputs
            .get(port.index)
            .ok_or_else(|| CycleKitError::NotFound(format!("port {port}")))
    }

    pub fn input_mut(&mut self, port: PortId) -> Result<&mut InputPort> {
        if !port.is_input() {
            return Err(CycleKitError::BadParam(format!("{port} is not an input")));
        }
        self.module_mut(port.module)?
            .inputs
            .get_mut(port.index)
            .ok_or_else(|| CycleKitError::NotFound(format!("port {port}")))
    }

    pub fn output(&self, port: PortId) -> Result<&OutputPort> {
        if port.is_input() {
            return Err(CycleKitError::BadParam(format!("{port} is not an output")));
        }
        self.module(port.module)?
            .outputs
            .get(port.index)
            .ok_or_else(|| CycleKitError::NotFound(format!("port {port}")))
    }

    pub fn output_mut(&mut self, port: PortId) -> Result<&mut OutputPort> {
        if port.is_input() {
            return Err(CycleKitError::BadParam(format!("{port} is not an output")));
        }
        self.module_mut(port.module)?
            .outputs
            .get_mut(port.index)
            .ok_or_else(|| CycleKitError::NotFound(format!("port {port}")))
    }

    /// Data visible at an input: the upstream output's buffer when connected,
    /// the host-written data otherwise.
    pub fn input_data(&self, port: PortId) -> Option<&StreamData> {
        let input = self.input(port).ok()?;
        match input.conn {
            Some(up) => self.output(up).ok().map(|o| &o.data),
            None => Some(&input.data),
        }
    }

    pub fn input_data_mut(&mut self, port: PortId) -> Option<&mut StreamData> {
        let conn = self.input(port).ok()?.conn;
        match conn {
            Some(up) => self.output_mut(up).ok().map(|o| &mut o.data),
            None => self.input_mut(port).ok().map(|i| &mut i.data),
        }
    }

    pub fn take_input_data(&mut self, port: PortId) -> StreamData {
        self.input_data_mut(port).map(std::mem::take).unwrap_or_default()
    }

    pub fn put_input_data(&mut self, port: PortId, data: StreamData) {
        if let Some(slot) = self.input_data_mut(port) {
            *slot = data;
        }
    }

    /// Base state of a port: its own state downgraded by its sub-graph.
    pub fn base_state(&self, port: PortId) -> PortState {
        let Ok(module) = self.module(port.module) else {
            return PortState::Stopped;
        };
        let own = if port.is_input() {
            module.inputs.get(port.index).map(|p| p.common.own_state)
        } else {
            module.outputs.get(port.index).map(|p| p.common.own_state)
        };
        own.unwrap_or(PortState::Stopped).downgrade(self.subgraph_state(module.subgraph))
    }

    /// Effective state of the input reading `output`, if connected.
    pub fn downstream_state(&self, output: PortId) -> Option<PortState> {
        let conn = self.output(output).ok()?.conn?;
        self.input(conn).ok().map(|i| i.common.effective)
    }

    /// Iterates over every port of the graph.
    pub fn all_ports(&self) -> Vec<PortId> {
        let mut ports = Vec::new();
        for (id, module) in &self.modules {
            ports.extend((0..module.inputs.len()).map(|i| PortId::input(*id, i)));
            ports.extend((0..module.outputs.len()).map(|o| PortId::output(*id, o)));
        }
        ports
    }
}
