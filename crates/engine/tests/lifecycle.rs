// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

mod common;

use common::{add, link, topology};
use cyclekit_core::config::EngineConfig;
use cyclekit_core::trigger_policy::TriggerType;
use cyclekit_engine::{PortId, TeardownReport};
use cyclekit_nodes::params::PARAM_BYTE_COUNT;

#[test]
fn finite_source_runs_to_completion() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let src = add(&mut topo, sg, "core::source", "bytes_per_call: 32\ntotal_bytes: 64\neos_at_end: true");
    let gain = add(&mut topo, sg, "audio::gain", "gain: 0.5");
    let sink = add(&mut topo, sg, "core::sink", "");
    link(&mut topo, src, 0, gain, 0);
    link(&mut topo, gain, 0, sink, 0);
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));

    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));
    let count = topo.get_param(sink, PARAM_BYTE_COUNT).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count, 64u64.to_le_bytes().to_vec());
    let stats = topo.module_stats(gain).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(stats.markers_propagated, 1);

    // Nothing left to do once the stream has ended.
    let report = topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(report.bytes_moved, 0);
    assert_eq!(topo.teardown(), TeardownReport::default());
}

#[test]
fn removing_the_producer_releases_its_buffers() {
    let mut topo = topology(EngineConfig { max_loop_iterations: 1, ..EngineConfig::default() });
    let upstream = topo.add_subgraph();
    let downstream = topo.add_subgraph();
    let src = add(&mut topo, upstream, "core::source", "bytes_per_call: 16");
    let sink = add(&mut topo, downstream, "core::sink", "");
    link(&mut topo, src, 0, sink, 0);
    topo.start_subgraph(upstream).unwrap_or_else(|e| panic!("{e}"));
    topo.start_subgraph(downstream).unwrap_or_else(|e| panic!("{e}"));

    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(topo.pool_stats().outstanding, 1);

    topo.remove_subgraph(upstream).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(topo.pool_stats().outstanding, 0);
    assert_eq!(topo.host().destroyed_modules(), &[src]);
    assert!(topo.input_stream(PortId::input(sink, 0)).is_some_and(|d| !d.has_data()));

    let report = topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(report.modules_run, 0);
    assert_eq!(topo.teardown(), TeardownReport::default());
}
