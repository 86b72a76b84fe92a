// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared helpers for the engine integration tests.

#![allow(dead_code)]

use cyclekit_core::config::EngineConfig;
use cyclekit_core::metadata::{TrackingPolicy, TrackingReport, TrackingRequest};
use cyclekit_core::ModuleRegistry;
use cyclekit_engine::{Engine, ModuleId, PortId, RegistryContainer, SubgraphId, Topology};

pub type Topo = Topology<RegistryContainer>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Engine with every built-in module registered.
pub fn engine() -> Engine {
    let mut registry = ModuleRegistry::new();
    cyclekit_nodes::register_nodes(&mut registry);
    Engine::with_registry(registry)
}

pub fn topology(config: EngineConfig) -> Topo {
    init_tracing();
    engine().create_topology(config).unwrap_or_else(|e| panic!("{e}"))
}

/// Adds a built-in module, with parameters given as YAML.
pub fn add(topo: &mut Topo, sg: SubgraphId, kind: &str, params: &str) -> ModuleId {
    let params: Option<serde_json::Value> =
        if params.is_empty() { None } else { serde_saphyr::from_str(params).ok() };
    topo.add_module_instance(sg, kind, params.as_ref()).unwrap_or_else(|e| panic!("{kind}: {e}"))
}

pub fn link(topo: &mut Topo, from: ModuleId, out: usize, to: ModuleId, input: usize) {
    topo.connect(PortId::output(from, out), PortId::input(to, input))
        .unwrap_or_else(|e| panic!("{e}"));
}

pub fn tracked(token: u64) -> TrackingRequest {
    TrackingRequest { token, policy: TrackingPolicy::Last, report: TrackingReport::All }
}

pub fn samples(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
