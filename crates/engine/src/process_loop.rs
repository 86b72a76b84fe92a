// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! One execution cycle.
//!
//! A cycle walks the sorted module list, asks the trigger engine whether each
//! module may run, hands it its ports, and afterwards moves markers, flags and
//! flow states along with the bytes it consumed and produced. The walk repeats
//! while any module made progress, up to `max_loop_iterations` passes.
//!
//! Port data is moved out of the graph for the duration of a call and put
//! back afterwards, so a module sees plain owned values and the graph never
//! aliases.

use crate::host::ContainerCallbacks;
use crate::ids::{ModuleId, PortId};
use crate::metadata::{is_crossed, pad_with_zeros};
use crate::topology::{ModuleEntry, Topology};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::metadata::{
    has_flushing_eos, insert_ordered, Metadata, MetadataHandler, MetadataList, PropagateParams,
};
use cyclekit_core::module::{
    BufferAccessMode, EventSink, InputStream, ModuleEvent, ModuleInfo, OutputStream,
    ProcessContext,
};
use cyclekit_core::state::DataFlowState;
use cyclekit_core::stream::StreamData;
use cyclekit_core::trigger_policy::TriggerType;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one call to [`Topology::process`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Module invocations, counting repeat visits.
    pub modules_run: usize,
    /// Passes over the module list.
    pub iterations: u32,
    /// Bytes consumed plus bytes produced, per channel buffer.
    pub bytes_moved: u64,
}

type Streams<T> = SmallVec<[T; 4]>;

/// Per-invocation working set.
struct Call {
    id: ModuleId,
    trigger: TriggerType,
    info: ModuleInfo,
    bypassed: bool,
    inplace: bool,
    access_module: bool,
    squeeze: bool,
    algo_delay_us: u64,
    in_formats: Streams<Option<Arc<MediaFormat>>>,
    out_formats: Streams<Option<Arc<MediaFormat>>>,
    in_thresholds: Streams<usize>,
    out_thresholds: Streams<usize>,
    inputs: Streams<InputStream>,
    outputs: Streams<OutputStream>,
    in_lens: Streams<usize>,
    out_initial: Streams<usize>,
    hold_flushing_eos: bool,
    padded: usize,
    markers_moved: usize,
}

/// In-place calls need the capability switched on, no internal buffering,
/// and both ports inside the same non-buffering linear chain.
fn runs_in_place(entry: &ModuleEntry) -> bool {
    let same_chain = match (entry.inputs.first(), entry.outputs.first()) {
        (Some(i), Some(o)) => i.common.nblc_end.is_some() && i.common.nblc_end == o.common.nblc_end,
        _ => false,
    };
    entry.inplace_active && !entry.info.caps.requires_data_buffering && same_chain
}

impl Call {
    fn produced(&self, o: usize) -> usize {
        self.outputs[o].data.actual_len().saturating_sub(self.out_initial[o])
    }

    fn is_sink(&self) -> bool {
        self.info.is_sink()
    }
}

impl<H: ContainerCallbacks> Topology<H> {
    /// Runs one cycle for `trigger`.
    ///
    /// # Errors
    ///
    /// `BadParam` for an invalid trigger, `Failed` when a cycle is already
    /// running or the graph can't be sorted.
    pub fn process(&mut self, trigger: TriggerType) -> Result<CycleReport> {
        if trigger == TriggerType::Invalid {
            return Err(CycleKitError::BadParam("process needs a data or signal trigger".into()));
        }
        if self.trigger != TriggerType::Invalid {
            return Err(CycleKitError::Failed(format!(
                "{:?} cycle already in progress",
                self.trigger
            )));
        }
        self.trigger = trigger;
        let result = self.run_cycle(trigger);
        self.trigger = TriggerType::Invalid;
        result
    }

    fn run_cycle(&mut self, trigger: TriggerType) -> Result<CycleReport> {
        self.handle_pending_events()?;
        let misses_before = self.svc.pool.stats().misses;

        let order: SmallVec<[ModuleId; 16]> = self.graph.sorted.iter().copied().collect();
        for id in &order {
            if let Ok(entry) = self.graph.module_mut(*id) {
                entry.failed_this_cycle = false;
                entry.ran_this_cycle = false;
            }
        }

        let mut report = CycleReport::default();
        loop {
            report.iterations += 1;
            let mut changed = false;
            for id in &order {
                let skip = self.graph.module(*id).map_or(true, |m| {
                    m.failed_this_cycle || (trigger == TriggerType::Signal && m.ran_this_cycle)
                });
                if skip {
                    continue;
                }
                if !self.check_module_admission(*id, trigger) {
                    if let Ok(entry) = self.graph.module_mut(*id) {
                        entry.stats.refused();
                    }
                    continue;
                }
                let (bytes, progressed) = self.run_module(*id, trigger);
                report.modules_run += 1;
                report.bytes_moved += bytes;
                changed |= progressed;
            }
            if !changed || report.iterations >= self.config.max_loop_iterations {
                break;
            }
        }

        self.finish_cycle(misses_before);
        tracing::trace!(?trigger, ?report, "Cycle complete");
        Ok(report)
    }

    fn finish_cycle(&mut self, misses_before: u64) {
        let mut released = 0usize;
        for entry in self.graph.modules.values_mut() {
            let inputs = entry.inputs.iter_mut().filter(|p| p.is_external()).map(|p| &mut p.data);
            let outputs = entry.outputs.iter_mut().map(|p| &mut p.data);
            for data in inputs.chain(outputs) {
                if data.buf.as_ref().is_some_and(cyclekit_core::buffer::Buffer::is_empty) {
                    if let Some(buf) = data.buf.take() {
                        self.svc.pool.release(buf);
                        released += 1;
                    }
                }
            }
        }
        let evicted = self.svc.pool.maybe_sweep(Instant::now(), self.svc.gate.is_active());
        self.svc.diag.pool_misses(self.svc.pool.stats().misses.saturating_sub(misses_before));
        self.apply_cleared_origins();
        if released > 0 || evicted > 0 {
            tracing::trace!(released, evicted, "Returned idle buffers");
        }
    }

    /// Runs one admitted module. Returns the bytes moved and whether anything
    /// advanced.
    fn run_module(&mut self, id: ModuleId, trigger: TriggerType) -> (u64, bool) {
        let Some(mut call) = self.prepare_call(id, trigger) else {
            return (0, false);
        };
        call.hold_flushing_eos = self.zero_pad(&mut call);
        call.in_lens = call.inputs.iter().map(|s| s.data.actual_len()).collect();
        let in_place = self.assign_buffers(&mut call);
        call.out_initial = call.outputs.iter().map(|s| s.data.actual_len()).collect();

        let mut events = EventSink::new();
        let result = self.invoke(&mut call, &mut events);
        match result {
            Ok(()) => {
                if in_place {
                    move_in_place(&mut call);
                }
                for (s, len) in call.inputs.iter_mut().zip(&call.in_lens) {
                    if s.consumed > *len {
                        tracing::warn!(module = %id, consumed = s.consumed, len, "Module over-consumed its input");
                        s.consumed = *len;
                    }
                }
            },
            Err(e) => self.fail_call(&mut call, &e),
        }

        self.demote_stale_output_markers(&mut call);
        let gaps = crossed_gaps(&call);
        self.propagate_markers(&mut call);
        let bytes = self.settle(&mut call, &gaps);
        self.return_ports(call);

        let raised: Vec<ModuleEvent> = events.drain().collect();
        if !raised.is_empty() {
            if let Err(e) = self.handle_module_events(id, raised) {
                tracing::warn!(module = %id, error = %e, "Event raised during process was rejected");
            }
        }
        bytes
    }

    fn prepare_call(&mut self, id: ModuleId, trigger: TriggerType) -> Option<Call> {
        let entry = self.graph.module(id).ok()?;
        let formats = &self.svc.formats;
        let format_of = |h: Option<&cyclekit_core::format_registry::FormatHandle>| {
            h.and_then(|h| formats.get_arc(h))
        };
        let bypassed = entry.is_bypassed();
        let mut call = Call {
            id,
            trigger,
            info: entry.info,
            bypassed,
            inplace: !bypassed && runs_in_place(entry),
            access_module: entry.access_mode == BufferAccessMode::Module,
            squeeze: self.variant.squeeze_enabled() && entry.info.kind.is_codec_like(),
            algo_delay_us: if bypassed { 0 } else { entry.perf.algo_delay_us },
            in_formats: entry.inputs.iter().map(|p| format_of(p.common.format.as_ref())).collect(),
            out_formats: entry.outputs.iter().map(|p| format_of(p.common.format.as_ref())).collect(),
            in_thresholds: entry.inputs.iter().map(|p| p.common.threshold).collect(),
            out_thresholds: entry.outputs.iter().map(|p| p.common.threshold).collect(),
            inputs: Streams::new(),
            outputs: Streams::new(),
            in_lens: Streams::new(),
            out_initial: Streams::new(),
            hold_flushing_eos: false,
            padded: 0,
            markers_moved: 0,
        };
        let in_avail: Streams<bool> =
            entry.inputs.iter().map(|p| p.common.is_started() && !p.common.blocked).collect();
        let out_avail: Streams<bool> =
            entry.outputs.iter().map(|p| p.common.is_started() && !p.common.blocked).collect();

        for (i, available) in in_avail.into_iter().enumerate() {
            let data = if available {
                self.graph.take_input_data(PortId::input(id, i))
            } else {
                StreamData::default()
            };
            call.inputs.push(InputStream {
                data,
                format: call.in_formats[i].clone(),
                consumed: 0,
                available,
            });
        }
        for (o, available) in out_avail.into_iter().enumerate() {
            let data = if available {
                self.graph
                    .output_mut(PortId::output(id, o))
                    .map(|p| std::mem::take(&mut p.data))
                    .unwrap_or_default()
            } else {
                StreamData::default()
            };
            call.outputs.push(OutputStream { data, format: call.out_formats[o].clone(), available });
        }
        Some(call)
    }

    /// Feeds zeros after a flushing end-of-stream so a delaying module can
    /// drain. Returns whether padding is still pending, in which case the
    /// end-of-stream must not leave the input yet.
    fn zero_pad(&mut self, call: &mut Call) -> bool {
        if !call.info.is_siso()
            || call.info.caps.supports_metadata
            || call.algo_delay_us == 0
            || !call.inputs[0].available
        {
            return false;
        }
        let Ok(entry) = self.graph.module_mut(call.id) else {
            return false;
        };
        let mut pad = entry.zero_pad;
        let input = &mut call.inputs[0];
        let len = input.data.actual_len();
        let eos_at_end =
            input.data.metadata.iter().any(|m| m.is_flushing_eos() && m.offset == len);
        if !pad.armed && eos_at_end {
            pad.armed = true;
            pad.pending = call.in_formats[0].as_ref().map_or(0, |f| f.us_to_bytes(call.algo_delay_us));
            tracing::debug!(module = %call.id, pending = pad.pending, "Zero padding armed");
        }
        if pad.pending > 0 {
            if input.data.buf.is_none() {
                let num_bufs = call.in_formats[0].as_ref().map_or(1, |f| f.num_bufs());
                match self.svc.pool.acquire(num_bufs, call.in_thresholds[0], self.svc.gate.is_active()) {
                    Ok(buf) => input.data.buf = Some(buf),
                    Err(e) => tracing::warn!(module = %call.id, error = %e, "No buffer for zero padding"),
                }
            }
            call.padded = pad_with_zeros(&mut input.data, &mut pad.pending);
        }
        entry.zero_pad = pad;
        pad.pending > 0
    }

    /// Gives every available output a buffer, or prepares an in-place call.
    /// Returns whether the call runs in place.
    fn assign_buffers(&mut self, call: &mut Call) -> bool {
        if call.access_module {
            return false;
        }
        let in_place = call.inplace
            && call.info.is_siso()
            && call.inputs[0].available
            && call.outputs[0].available
            && call.inputs[0].data.has_data()
            && !call.outputs[0].data.has_data();
        if in_place {
            if let Some(buf) = call.outputs[0].data.buf.take() {
                self.svc.pool.release(buf);
            }
            return true;
        }

        let low_power = self.svc.gate.is_active();
        for (o, stream) in call.outputs.iter_mut().enumerate() {
            if !stream.available {
                continue;
            }
            let num_bufs = call.out_formats[o].as_ref().map_or(1, |f| f.num_bufs());
            let threshold = call.out_thresholds[o];
            let mismatched = stream.data.buf.as_ref().is_some_and(|b| {
                b.is_empty() && (b.max_len() != threshold || b.num_bufs() != num_bufs)
            });
            if mismatched {
                if let Some(buf) = stream.data.buf.take() {
                    self.svc.pool.release(buf);
                }
            }
            if stream.data.buf.is_none() {
                match self.svc.pool.acquire(num_bufs, threshold, low_power) {
                    Ok(buf) => stream.data.buf = Some(buf),
                    Err(e) => {
                        tracing::warn!(module = %call.id, output = o, error = %e, "No output buffer");
                    },
                }
            }
        }
        false
    }

    fn invoke(&mut self, call: &mut Call, events: &mut EventSink) -> Result<()> {
        if call.bypassed {
            bypass_copy(call);
            return Ok(());
        }
        let entry = self
            .graph
            .modules
            .get_mut(&call.id)
            .ok_or_else(|| CycleKitError::NotFound(format!("module {}", call.id)))?;
        let mut md = self.svc.md();
        let mut ctx = ProcessContext {
            trigger: call.trigger,
            inputs: &mut call.inputs[..],
            outputs: &mut call.outputs[..],
            metadata: &mut md,
            events,
        };
        entry.instance.process(&mut ctx)
    }

    /// A failed call loses its input: bytes are discarded, markers go through
    /// the drop path, and partial output is truncated.
    fn fail_call(&mut self, call: &mut Call, error: &CycleKitError) {
        let name = self.graph.module(call.id).map(|m| m.name.clone()).unwrap_or_default();
        self.svc.diag.process_failed(&mut self.svc.host, &name, error);

        let mut dropped = 0;
        for stream in call.inputs.iter_mut().filter(|s| s.available) {
            dropped += self.svc.md().drop_list(&mut stream.data.metadata, "module_error");
            stream.consumed = stream.data.actual_len();
            stream.data.flags.marker_eos = false;
        }
        for (stream, initial) in call.outputs.iter_mut().zip(&call.out_initial) {
            if let Some(buf) = stream.data.buf.as_mut() {
                buf.set_actual_len(*initial);
            }
        }
        if let Ok(entry) = self.graph.module_mut(call.id) {
            entry.stats.errored();
            entry.stats.dropped(dropped);
            entry.failed_this_cycle = true;
        }
    }

    /// Markers already sitting on an output now have data behind them.
    /// Markers at the very end, such as one the module just attached after
    /// its last byte, are left alone.
    fn demote_stale_output_markers(&mut self, call: &mut Call) {
        for o in 0..call.outputs.len() {
            if call.produced(o) == 0 || call.outputs[o].data.metadata.is_empty() {
                continue;
            }
            let len = call.outputs[o].data.actual_len();
            let list = &mut call.outputs[o].data.metadata;
            let split = list.iter().position(|m| m.offset >= len).unwrap_or(list.len());
            let mut at_end = list.split_off(split);
            let touched = self.svc.md().modify_md_when_new_data_arrives(list);
            list.append(&mut at_end);
            if touched > 0 {
                tracing::debug!(module = %call.id, output = o, touched, "Output markers superseded by new data");
            }
        }
    }

    /// Moves markers across a module that doesn't handle metadata itself.
    fn propagate_markers(&mut self, call: &mut Call) {
        if call.info.caps.supports_metadata && !call.bypassed {
            return;
        }
        let Ok(entry) = self.graph.module_mut(call.id) else {
            return;
        };
        let mut held = std::mem::take(&mut entry.held);
        held.resize_with(call.inputs.len(), MetadataList::new);

        let sink = call.is_sink();
        let reference = call.outputs.iter().position(|s| s.available && s.data.buf.is_some());
        let mut reset = false;

        for i in 0..call.inputs.len() {
            if !call.inputs[i].available
                || (call.inputs[i].data.metadata.is_empty() && held[i].is_empty())
            {
                continue;
            }
            let consumed = call.inputs[i].consumed;
            // Sinks and modules with nowhere to send markers release them as
            // soon as the bytes they belong to are consumed.
            let (out_format, produced, delay, squeeze) = match reference {
                Some(o) if !sink => {
                    (call.out_formats[o].clone(), call.produced(o), call.algo_delay_us, call.squeeze)
                },
                _ => (call.in_formats[i].clone(), consumed, 0, false),
            };
            let mut moved = MetadataList::new();
            let params = PropagateParams {
                input: &mut call.inputs[i].data.metadata,
                held: &mut held[i],
                output: &mut moved,
                in_format: call.in_formats[i].as_deref(),
                out_format: out_format.as_deref(),
                input_len: call.in_lens[i],
                consumed,
                out_initial: 0,
                produced,
                algo_delay_us: delay,
                squeeze,
                hold_flushing_eos: i == 0 && call.hold_flushing_eos,
            };
            let outcome = match self.svc.md().propagate(params) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(module = %call.id, input = i, error = %e, "Marker propagation failed");
                    continue;
                },
            };
            call.markers_moved += outcome.moved;
            reset |= squeeze && outcome.flushing_eos_out;

            if call.inputs.len() > 1 && has_flushing_eos(&moved) && !self.others_idle(call, i) {
                // One input ending doesn't end the mix.
                for md in moved.iter_mut().filter(|m| m.is_flushing_eos()) {
                    md.flags.flushing = false;
                }
            }
            self.distribute(call, moved, sink);
        }

        if let Ok(entry) = self.graph.module_mut(call.id) {
            entry.held = held;
            if reset {
                entry.instance.reset();
                tracing::debug!(module = %call.id, "Flushing end-of-stream left; module state reset");
            }
        }
    }

    fn others_idle(&self, call: &Call, except: usize) -> bool {
        (0..call.inputs.len()).filter(|j| *j != except).all(|j| {
            let at_gap = self
                .graph
                .input(PortId::input(call.id, j))
                .is_ok_and(|p| !p.common.flow.is_flowing());
            let stream = &call.inputs[j];
            at_gap && stream.remaining() == 0 && stream.data.metadata.is_empty()
        })
    }

    /// Hands markers that crossed the module to its outputs, cloning for
    /// fan-out, or releases them at a sink.
    fn distribute(&mut self, call: &mut Call, moved: MetadataList, sink: bool) {
        if moved.is_empty() {
            return;
        }
        let mut md = self.svc.md();
        if sink {
            for marker in moved {
                md.detach_at_terminal(marker);
            }
            return;
        }
        let targets: Streams<usize> =
            (0..call.outputs.len()).filter(|o| call.outputs[*o].available).collect();
        let Some((&last, rest)) = targets.split_last() else {
            let mut moved = moved;
            md.drop_list(&mut moved, "no_active_output");
            return;
        };

        let mut dropped = 0;
        for mut marker in moved {
            for &o in rest {
                let mut copy: Metadata = marker.clone();
                copy.offset = rebase(call, o, copy.offset);
                if let Err(e) = md.clone_into(&copy, &mut call.outputs[o].data.metadata) {
                    tracing::warn!(module = %call.id, output = o, error = %e, "Marker fan-out failed");
                    dropped += 1;
                }
            }
            marker.offset = rebase(call, last, marker.offset);
            insert_ordered(&mut call.outputs[last].data.metadata, marker);
        }
        md.diag.markers_dropped(dropped, "fan_out_failed");
    }

    /// Consumes input bytes, moves flags and flow states, updates stats and
    /// drops output nobody will read. Returns bytes moved and whether the
    /// call made progress.
    fn settle(&mut self, call: &mut Call, gaps: &[bool]) -> (u64, bool) {
        let id = call.id;
        let sink = call.is_sink();
        let held_eos: Streams<bool> = self
            .graph
            .module(id)
            .map(|m| m.held.iter().map(|h| has_flushing_eos(h)).collect())
            .unwrap_or_default();

        let mut consumed_total = 0usize;
        let mut frame_ended = false;
        for (i, stream) in call.inputs.iter_mut().enumerate() {
            if !stream.available {
                continue;
            }
            let fully = stream.consumed == call.in_lens[i];
            if let Some(buf) = stream.data.buf.as_mut() {
                buf.consume_front(stream.consumed);
            }
            consumed_total += stream.consumed;
            if fully && stream.data.flags.end_of_frame {
                frame_ended = true;
                stream.data.flags.end_of_frame = false;
            }
            if sink && fully {
                stream.data.flags.erasure = false;
            }
            stream.data.flags.marker_eos = has_flushing_eos(&stream.data.metadata)
                || held_eos.get(i).copied().unwrap_or(false);

            let port = PortId::input(id, i);
            let gap = gaps.get(i).copied().unwrap_or(false) && !stream.data.has_data();
            if let Ok(input) = self.graph.input_mut(port) {
                if gap {
                    input.common.flow = DataFlowState::AtGap;
                } else if stream.consumed > 0 {
                    input.common.flow = DataFlowState::Flowing;
                }
            }
        }

        let mut produced_total = 0usize;
        for o in 0..call.outputs.len() {
            let produced = call.produced(o);
            produced_total += produced;
            let stream = &mut call.outputs[o].data;
            if frame_ended && (produced > 0 || !stream.metadata.is_empty()) {
                stream.flags.end_of_frame = true;
            }
            stream.refresh_marker_eos();
            if produced == 0 {
                continue;
            }
            let port = PortId::output(id, o);
            let down = self.graph.output(port).ok().and_then(|p| p.conn);
            if let Ok(output) = self.graph.output_mut(port) {
                output.common.flow = DataFlowState::Flowing;
            }
            if let Some(input) = down.and_then(|d| self.graph.input_mut(d).ok()) {
                input.common.flow = DataFlowState::Flowing;
            }
        }

        let mut dropped = 0;
        for o in 0..call.outputs.len() {
            if !call.outputs[o].available || !call.outputs[o].data.has_pending() {
                continue;
            }
            let Some(state) = self.graph.downstream_state(PortId::output(id, o)) else {
                continue;
            };
            let stale = state.drops_data() || (call.trigger == TriggerType::Signal && !state.is_started());
            if stale {
                dropped += self.svc.drop_stream(&mut call.outputs[o].data, "stale_output");
            }
        }

        let progressed = consumed_total > 0
            || produced_total > 0
            || call.markers_moved > 0
            || call.padded > 0
            || frame_ended;
        if let Ok(entry) = self.graph.module_mut(id) {
            if !call.bypassed {
                entry.stats.invoked();
            }
            entry.stats.moved(consumed_total, produced_total);
            entry.stats.propagated(call.markers_moved);
            entry.stats.dropped(dropped);
            entry.ran_this_cycle = true;
            if entry.zero_pad.armed
                && entry.zero_pad.pending == 0
                && !call.inputs.first().is_some_and(|s| has_flushing_eos(&s.data.metadata))
            {
                entry.zero_pad.armed = false;
            }
        }
        ((consumed_total + produced_total) as u64, progressed)
    }

    fn return_ports(&mut self, call: Call) {
        let id = call.id;
        for (i, stream) in call.inputs.into_iter().enumerate() {
            if stream.available {
                self.graph.put_input_data(PortId::input(id, i), stream.data);
            }
        }
        for (o, stream) in call.outputs.into_iter().enumerate() {
            if !stream.available {
                continue;
            }
            if let Ok(output) = self.graph.output_mut(PortId::output(id, o)) {
                output.data = stream.data;
            }
        }
    }
}

/// Whether an end-of-stream or gap marker crossed each input this call.
fn crossed_gaps(call: &Call) -> Streams<bool> {
    call.inputs
        .iter()
        .zip(&call.in_lens)
        .map(|(s, len)| {
            s.data.metadata.iter().any(|m| {
                (m.is_eos() || m.is_data_flow_gap()) && is_crossed(m.offset, s.consumed, *len)
            })
        })
        .collect()
}

/// Re-bases a marker offset from the start of this call's output onto an
/// output's full data.
fn rebase(call: &Call, output: usize, offset: usize) -> usize {
    (call.out_initial[output] + offset).min(call.outputs[output].data.actual_len())
}

/// The module processed its input buffer in place; the buffer becomes the
/// output once fully consumed.
fn move_in_place(call: &mut Call) {
    if call.inputs[0].consumed == call.in_lens[0] && call.outputs[0].data.buf.is_none() {
        call.outputs[0].data.buf = call.inputs[0].data.buf.take();
    }
}

/// Disabled single-input single-output modules pass data straight through.
fn bypass_copy(call: &mut Call) {
    let (Some(input), Some(output)) = (call.inputs.first_mut(), call.outputs.first_mut()) else {
        return;
    };
    if !input.available || !output.available {
        return;
    }
    if let (Some(src), Some(dst)) = (input.data.buf.as_ref(), output.data.buf.as_mut()) {
        input.consumed = dst.append_from(src);
    }
    output.data.flags.erasure |= input.data.flags.erasure;
}
