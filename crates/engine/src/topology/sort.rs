// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Run order, non-buffering linear chains and path delay.

use super::Topology;
use crate::host::ContainerCallbacks;
use crate::ids::{ModuleId, PortId};
use cyclekit_core::error::{CycleKitError, Result};
use indexmap::IndexMap;
use std::collections::VecDeque;

impl<H: ContainerCallbacks> Topology<H> {
    /// Orders modules so every module runs after the modules feeding it.
    /// Ties keep insertion order. A cycle leaves the previous order in place.
    pub(crate) fn sort_modules(&mut self) -> Result<()> {
        let mut indegree: IndexMap<ModuleId, usize> =
            self.graph.modules.keys().map(|id| (*id, 0)).collect();
        for entry in self.graph.modules.values() {
            for input in &entry.inputs {
                if input.conn.is_some() {
                    if let Some(d) = indegree.get_mut(&entry.id) {
                        *d += 1;
                    }
                }
            }
        }

        let mut ready: VecDeque<ModuleId> =
            indegree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
        let mut order = Vec::with_capacity(indegree.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            let Ok(entry) = self.graph.module(id) else {
                continue;
            };
            for down in entry.outputs.iter().filter_map(|o| o.conn) {
                if let Some(d) = indegree.get_mut(&down.module) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(down.module);
                    }
                }
            }
        }

        if order.len() != self.graph.modules.len() {
            tracing::error!(
                sorted = order.len(),
                modules = self.graph.modules.len(),
                "Graph has a cycle; keeping previous run order"
            );
            return Err(CycleKitError::Failed("graph has a cycle".to_string()));
        }
        tracing::debug!(?order, "Sorted modules");
        self.graph.sorted = order;
        self.compute_nblc();
        Ok(())
    }

    fn is_nblc_member(&self, id: ModuleId) -> bool {
        self.graph.module(id).is_ok_and(|m| {
            m.info.is_siso() && m.inplace_active && !m.info.caps.requires_data_buffering
        })
    }

    /// Marks maximal runs of connected single-input single-output modules
    /// that process in place without buffering. Each member's ports record
    /// the chain's first input and last output.
    pub(crate) fn compute_nblc(&mut self) {
        for entry in self.graph.modules.values_mut() {
            for p in &mut entry.inputs {
                p.common.nblc_start = None;
                p.common.nblc_end = None;
            }
            for p in &mut entry.outputs {
                p.common.nblc_start = None;
                p.common.nblc_end = None;
            }
        }

        let mut chains = 0usize;
        for id in self.graph.sorted.clone() {
            if !self.is_nblc_member(id) {
                continue;
            }
            let upstream_member = self
                .graph
                .input(PortId::input(id, 0))
                .ok()
                .and_then(|p| p.conn)
                .is_some_and(|up| self.is_nblc_member(up.module));
            if upstream_member {
                continue;
            }

            let members = self.chain_from(id);
            let (Some(head), Some(tail)) = (members.first(), members.last()) else {
                continue;
            };
            let start = PortId::input(*head, 0);
            let end = PortId::output(*tail, 0);
            for m in &members {
                if let Ok(entry) = self.graph.module_mut(*m) {
                    for c in [&mut entry.inputs[0].common, &mut entry.outputs[0].common] {
                        c.nblc_start = Some(start);
                        c.nblc_end = Some(end);
                    }
                }
            }
            chains += 1;
        }
        tracing::trace!(chains, "Computed non-buffering linear chains");
    }

    fn chain_from(&self, head: ModuleId) -> Vec<ModuleId> {
        let mut members = vec![head];
        let mut current = head;
        while let Some(next) = self
            .graph
            .output(PortId::output(current, 0))
            .ok()
            .and_then(|o| o.conn)
            .map(|p| p.module)
            .filter(|m| self.is_nblc_member(*m) && !members.contains(m))
        {
            members.push(next);
            current = next;
        }
        members
    }

    /// Ports whose threshold changes together with `port`: the port, its
    /// peer, and every port of its chain with their peers.
    pub(crate) fn threshold_scope(&self, port: PortId) -> Vec<PortId> {
        let mut scope = vec![port];
        let peer = |p: PortId| {
            if p.is_input() {
                self.graph.input(p).ok().and_then(|i| i.conn)
            } else {
                self.graph.output(p).ok().and_then(|o| o.conn)
            }
        };
        if let Some(q) = peer(port) {
            scope.push(q);
        }

        let chain = if port.is_input() {
            self.graph.input(port).ok().and_then(|p| p.common.nblc_start)
        } else {
            self.graph.output(port).ok().and_then(|p| p.common.nblc_start)
        };
        if let Some(start) = chain {
            for m in self.chain_from(start.module) {
                for p in [PortId::input(m, 0), PortId::output(m, 0)] {
                    if !scope.contains(&p) {
                        scope.push(p);
                    }
                    if let Some(q) = peer(p).filter(|q| !scope.contains(q)) {
                        scope.push(q);
                    }
                }
            }
        }
        scope
    }

    /// Longest sum of algorithmic delays along any path, including the
    /// container's delays at external ports.
    pub(crate) fn compute_path_delay(&self) -> u64 {
        let mut reach: IndexMap<ModuleId, u64> = IndexMap::new();
        let mut longest = 0u64;
        for id in &self.graph.sorted {
            let Ok(entry) = self.graph.module(*id) else {
                continue;
            };
            let mut upstream = 0u64;
            for (i, input) in entry.inputs.iter().enumerate() {
                let d = match input.conn {
                    Some(up) => reach.get(&up.module).copied().unwrap_or(0),
                    None => self.svc.host.aggregate_external_port_delay(PortId::input(*id, i)),
                };
                upstream = upstream.max(d);
            }
            let total = upstream.saturating_add(entry.perf.algo_delay_us);
            reach.insert(*id, total);

            if entry.outputs.is_empty() {
                longest = longest.max(total);
            }
            for (o, output) in entry.outputs.iter().enumerate() {
                if output.conn.is_none() {
                    let ext = self.svc.host.aggregate_external_port_delay(PortId::output(*id, o));
                    longest = longest.max(total.saturating_add(ext));
                }
            }
        }
        longest
    }
}
