// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! End-of-stream handling across built-in modules: tracking, origin
//! bookkeeping, zero padding, squeeze and error drops.

mod common;

use common::{add, samples, topology, tracked};
use cyclekit_core::config::EngineConfig;
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::metadata::TrackingStatus;
use cyclekit_core::trigger_policy::TriggerType;
use cyclekit_engine::{HostEvent, PortId, TeardownReport};
use cyclekit_nodes::codecs::depacketizer::packet;

fn mono() -> MediaFormat {
    MediaFormat::pcm(8_000, 1, 16)
}

fn packetized() -> MediaFormat {
    MediaFormat::Packetized { format_id: 1, sample_rate: 8_000, channels: 1 }
}

#[test]
fn sink_renders_tracked_eos() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let sink = add(&mut topo, sg, "core::sink", "");
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
    let input = PortId::input(sink, 0);
    topo.set_external_input_media_format(input, &mono()).unwrap_or_else(|e| panic!("{e}"));

    topo.write_external_input(input, &[&[1; 10]], false).unwrap_or_else(|e| panic!("{e}"));
    topo.push_external_eos(input, true, Some(tracked(7))).unwrap_or_else(|e| panic!("{e}"));
    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));

    assert!(topo
        .host()
        .events()
        .contains(&HostEvent::MetadataTracking { token: 7, status: TrackingStatus::Rendered }));
    // The stream really ended; the host isn't asked to clear anything.
    assert!(topo.host().cleared_eos().is_empty());
    assert_eq!(topo.pending_eos(input).map(<[u32]>::len).ok(), Some(0));
    assert_eq!(topo.metadata_engine().cargo().live(), 0);
    assert_eq!(topo.metadata_engine().tracking().live(), 0);
}

#[test]
fn eos_leaving_the_graph_waits_for_the_host() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let pass = add(&mut topo, sg, "core::passthrough", "");
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
    let (input, output) = (PortId::input(pass, 0), PortId::output(pass, 0));
    topo.set_external_input_media_format(input, &mono()).unwrap_or_else(|e| panic!("{e}"));

    topo.write_external_input(input, &[&[5; 10]], false).unwrap_or_else(|e| panic!("{e}"));
    topo.push_external_eos(input, true, Some(tracked(3))).unwrap_or_else(|e| panic!("{e}"));
    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));

    let mut out = topo.take_external_output(output).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(out.len(), 10);
    assert_eq!(out.metadata.len(), 1);
    assert!(out.metadata[0].is_flushing_eos());
    assert_eq!(out.metadata[0].offset, 10);
    assert!(out.flags.end_of_frame);
    // Cargo came back with the marker; tracking is still open.
    assert_eq!(topo.pending_eos(input).map(<[u32]>::len).ok(), Some(0));
    assert!(!topo.host().events().iter().any(|e| matches!(e, HostEvent::MetadataTracking { .. })));

    topo.destroy_metadata(out.metadata.remove(0), TrackingStatus::Rendered);
    assert!(topo
        .host()
        .events()
        .contains(&HostEvent::MetadataTracking { token: 3, status: TrackingStatus::Rendered }));
    assert_eq!(topo.metadata_engine().tracking().live(), 0);
}

#[test]
fn fanned_out_eos_clears_its_origin_once() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let split = add(&mut topo, sg, "core::splitter", "outputs: 2");
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
    let input = PortId::input(split, 0);
    topo.set_external_input_media_format(input, &mono()).unwrap_or_else(|e| panic!("{e}"));

    topo.write_external_input(input, &[&[1, 2, 3, 4]], false).unwrap_or_else(|e| panic!("{e}"));
    let id = topo.push_external_eos(input, true, None).unwrap_or_else(|e| panic!("{e}"));
    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));
    for o in 0..2 {
        let data = topo.output_stream(PortId::output(split, o));
        assert_eq!(data.map(|d| d.metadata.len()), Some(1), "output {o}");
    }
    assert_eq!(topo.pending_eos(input).map(<[u32]>::len).ok(), Some(1));

    let report = topo.teardown();
    assert_eq!(topo.host().cleared_eos(), &[(input, id)]);
    assert_eq!(report, TeardownReport::default());
}

#[test]
fn delay_is_flushed_with_zeros() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let delay = add(&mut topo, sg, "audio::delay", "delay_us: 250");
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
    let input = PortId::input(delay, 0);
    topo.set_external_input_media_format(input, &mono()).unwrap_or_else(|e| panic!("{e}"));
    topo.handle_pending_events().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(topo.path_delay_us(), 250);

    let pcm: Vec<u8> = (1..=8).collect();
    topo.write_external_input(input, &[&pcm], false).unwrap_or_else(|e| panic!("{e}"));
    topo.push_external_eos(input, true, None).unwrap_or_else(|e| panic!("{e}"));
    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));

    let out = topo.take_external_output(PortId::output(delay, 0)).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(out.channels[0].as_ref(), &[0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(out.metadata.len(), 1);
    assert!(out.metadata[0].is_flushing_eos());
    assert_eq!(out.metadata[0].offset, 12);
}

#[test]
fn codec_keeps_eos_until_drained() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let dep = add(&mut topo, sg, "codecs::depacketizer", "");
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
    let (input, output) = (PortId::input(dep, 0), PortId::output(dep, 0));
    topo.set_external_input_media_format(input, &packetized()).unwrap_or_else(|e| panic!("{e}"));
    topo.set_port_threshold(output, 4).unwrap_or_else(|e| panic!("{e}"));

    topo.write_external_input(input, &[&packet(&[1, 2, 3, 4, 5, 6])], false)
        .unwrap_or_else(|e| panic!("{e}"));
    topo.push_external_eos(input, true, None).unwrap_or_else(|e| panic!("{e}"));

    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));
    let first = topo.take_external_output(output).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(first.channels[0].as_ref(), &[1, 2, 3, 4]);
    assert!(first.metadata.is_empty());
    assert_eq!(topo.held_markers(dep, 0).len(), 1);
    assert_eq!(topo.pending_eos(input).map(<[u32]>::len).ok(), Some(1));

    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));
    let second = topo.take_external_output(output).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(second.channels[0].as_ref(), &[5, 6]);
    assert_eq!(second.metadata.len(), 1);
    assert!(second.metadata[0].is_flushing_eos());
    assert_eq!(second.metadata[0].offset, 2);
    assert!(topo.held_markers(dep, 0).is_empty());
}

#[test]
fn failed_call_drops_its_markers() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let dep = add(&mut topo, sg, "codecs::depacketizer", "max_payload: 4");
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
    let input = PortId::input(dep, 0);
    topo.set_external_input_media_format(input, &packetized()).unwrap_or_else(|e| panic!("{e}"));

    topo.write_external_input(input, &[&packet(&[1, 2, 3, 4, 5, 6])], false)
        .unwrap_or_else(|e| panic!("{e}"));
    let id = topo.push_external_eos(input, true, Some(tracked(11))).unwrap_or_else(|e| panic!("{e}"));
    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));

    let stats = topo.module_stats(dep).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(stats.errored, 1);
    assert_eq!(topo.diagnostics().process_failures, 1);
    assert_eq!(topo.host().cleared_eos(), &[(input, id)]);
    assert!(topo
        .host()
        .events()
        .contains(&HostEvent::MetadataTracking { token: 11, status: TrackingStatus::Dropped }));
    assert_eq!(topo.pending_eos(input).map(<[u32]>::len).ok(), Some(0));
}

#[test]
fn one_mixer_input_ending_does_not_end_the_mix() {
    let mut topo = topology(EngineConfig::default());
    let sg = topo.add_subgraph();
    let mixer = add(&mut topo, sg, "audio::mixer", "inputs: 2");
    topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
    let (in0, in1) = (PortId::input(mixer, 0), PortId::input(mixer, 1));
    for port in [in0, in1] {
        topo.set_external_input_media_format(port, &mono()).unwrap_or_else(|e| panic!("{e}"));
        topo.write_external_input(port, &[&samples(&[10, 20])], false)
            .unwrap_or_else(|e| panic!("{e}"));
    }
    topo.push_external_eos(in0, true, None).unwrap_or_else(|e| panic!("{e}"));
    topo.process(TriggerType::Data).unwrap_or_else(|e| panic!("{e}"));

    let out = topo.take_external_output(PortId::output(mixer, 0)).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(out.channels[0].as_ref(), samples(&[20, 40]).as_slice());
    assert_eq!(out.metadata.len(), 1);
    assert!(out.metadata[0].is_eos());
    assert!(!out.metadata[0].is_flushing_eos());
}
