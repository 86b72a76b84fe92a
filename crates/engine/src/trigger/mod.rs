// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Trigger policy engine: per-cycle admission of modules.
//!
//! Admission is a pure function of the graph state. It records, per port,
//! whether the port satisfied the check and whether the policy withholds it
//! from the module; the process loop reads both when it builds the module's
//! view of its ports.

mod policy;
mod signal;

pub use policy::{install, PolicyChange, PortReadiness, TriggerPolicy};
pub use signal::{set_allow_data_trigger_in_st, StOptIn};

use crate::host::ContainerCallbacks;
use crate::ids::{ModuleId, PortId};
use crate::topology::{Graph, ModuleEntry};
use crate::variant::TopologyVariant;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::metadata::has_flushing_eos;
use cyclekit_core::module::{BufferAccessMode, ModuleKind};
use cyclekit_core::stream::StreamData;
use cyclekit_core::trigger_policy::{NonTriggerPolicy, TriggerPolicyRequest, TriggerType};
use smallvec::SmallVec;

/// Container-level inputs to an admission decision.
#[derive(Clone, Copy)]
pub struct AdmissionEnv<'a> {
    pub host: &'a dyn ContainerCallbacks,
    pub variant: &'a dyn TopologyVariant,
    pub signal_triggered: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct PortVerdict {
    satisfied: bool,
    blocked: bool,
}

/// Snapshot of one input for the checks below.
#[derive(Debug, Clone, Copy, Default)]
struct InputSnapshot {
    started: bool,
    flowing: bool,
    /// Bytes, markers or a flush flag waiting.
    pending: bool,
    /// Ready to be processed on a data trigger.
    ready: bool,
    flushing_eos: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct OutputSnapshot {
    started: bool,
    space: bool,
}

type PortList<T> = SmallVec<[T; 4]>;

struct Verdict {
    admit: bool,
    inputs: PortList<PortVerdict>,
    outputs: PortList<PortVerdict>,
}

impl Verdict {
    fn refuse(entry: &ModuleEntry) -> Self {
        Self {
            admit: false,
            inputs: SmallVec::from_elem(PortVerdict::default(), entry.inputs.len()),
            outputs: SmallVec::from_elem(PortVerdict::default(), entry.outputs.len()),
        }
    }
}

/// Decides whether `id` may run on `trigger` and records per-port results.
///
/// Calling this repeatedly without any state change returns the same answer.
pub fn check_module_admission(
    graph: &mut Graph,
    env: AdmissionEnv<'_>,
    id: ModuleId,
    trigger: TriggerType,
) -> bool {
    let Some(verdict) = evaluate(graph, env, id, trigger) else {
        return false;
    };
    if let Ok(entry) = graph.module_mut(id) {
        for (port, v) in entry.inputs.iter_mut().zip(&verdict.inputs) {
            port.common.satisfied = v.satisfied;
            port.common.blocked = v.blocked;
        }
        for (port, v) in entry.outputs.iter_mut().zip(&verdict.outputs) {
            port.common.satisfied = v.satisfied;
            port.common.blocked = v.blocked;
        }
    }
    verdict.admit
}

fn evaluate(graph: &Graph, env: AdmissionEnv<'_>, id: ModuleId, trigger: TriggerType) -> Option<Verdict> {
    let entry = graph.module(id).ok()?;
    let mut verdict = Verdict::refuse(entry);
    if trigger == TriggerType::Invalid
        || !graph.subgraph_started(entry)
        || !(entry.is_enabled() || entry.is_bypassed())
    {
        return Some(verdict);
    }

    let inputs: PortList<InputSnapshot> =
        (0..entry.inputs.len()).map(|i| snapshot_input(graph, env, entry, i)).collect();
    let outputs: PortList<OutputSnapshot> =
        (0..entry.outputs.len()).map(|o| snapshot_output(env, entry, o)).collect();

    let policy = if env.variant.supports_trigger_policy() {
        match trigger {
            TriggerType::Data => entry.data_policy.as_ref(),
            TriggerType::Signal => entry.signal_policy.as_ref(),
            TriggerType::Invalid => None,
        }
    } else {
        None
    };

    let admit = match (trigger, policy) {
        (_, Some(policy)) => evaluate_policy(policy, &inputs, &outputs, &mut verdict),
        (TriggerType::Data, None) if env.signal_triggered => match entry.st_opt_in {
            Some(opt) => default_rule(
                entry,
                trigger,
                &inputs,
                &outputs,
                opt.needs_input || entry.info.is_sink(),
                opt.needs_output || entry.info.is_source(),
                &mut verdict,
            ),
            None => false,
        },
        (_, None) => default_rule(entry, trigger, &inputs, &outputs, true, true, &mut verdict),
    };
    verdict.admit = admit;
    Some(verdict)
}

fn snapshot_input(graph: &Graph, env: AdmissionEnv<'_>, entry: &ModuleEntry, index: usize) -> InputSnapshot {
    let port = &entry.inputs[index];
    let id = PortId::input(entry.id, index);
    let Some(data) = graph.input_data(id) else {
        return InputSnapshot::default();
    };
    let external = port.is_external();
    InputSnapshot {
        started: port.common.is_started(),
        flowing: port.common.flow.is_flowing(),
        pending: data.has_pending(),
        ready: input_ready(entry, data, port.common.format.is_some(), || {
            external && !env.host.ext_port_has_data(id)
        }),
        flushing_eos: data.flags.marker_eos || has_flushing_eos(&data.metadata),
    }
}

/// Data-trigger readiness of one input.
///
/// Markers always need a call to move them on. Otherwise the input must
/// hold data with a known format and either be full, end a frame, or be an
/// external input the host has nothing more queued for.
fn input_ready<F>(entry: &ModuleEntry, data: &StreamData, has_format: bool, drained: F) -> bool
where
    F: FnOnce() -> bool,
{
    if !data.metadata.is_empty() {
        return true;
    }
    if !data.has_data() || !has_format {
        return false;
    }
    if entry.info.caps.requires_fixed_frame {
        return data.is_full();
    }
    data.is_full() || data.flags.end_of_frame || drained()
}

/// An external output also needs the container to have a buffer ready to
/// take what the module writes.
fn snapshot_output(env: AdmissionEnv<'_>, entry: &ModuleEntry, index: usize) -> OutputSnapshot {
    let port = &entry.outputs[index];
    let host_ready =
        !port.is_external() || env.host.ext_port_has_buffer(PortId::output(entry.id, index));
    OutputSnapshot {
        started: port.common.is_started(),
        space: host_ready && (entry.access_mode == BufferAccessMode::Module || port.has_space()),
    }
}

/// Default admission rule.
fn default_rule(
    entry: &ModuleEntry,
    trigger: TriggerType,
    inputs: &[InputSnapshot],
    outputs: &[OutputSnapshot],
    check_inputs: bool,
    check_outputs: bool,
    verdict: &mut Verdict,
) -> bool {
    let source = entry.info.is_source();
    let sink = entry.info.is_sink();
    let any_started_input = inputs.iter().any(|p| p.started);
    let any_started_output = outputs.iter().any(|p| p.started);
    if source {
        if !any_started_output {
            return false;
        }
    } else if !any_started_input && entry.info.kind != ModuleKind::HwEndpoint {
        return false;
    }

    let mut any_pending = false;
    if !source && check_inputs {
        for (port, v) in inputs.iter().zip(verdict.inputs.iter_mut()) {
            if !port.started {
                continue;
            }
            any_pending |= port.pending;
            // A flushing end-of-stream makes the port optional so terminal
            // markers can't deadlock the module. Ports at a gap expect nothing.
            if port.flushing_eos || (!port.flowing && !port.pending) {
                v.satisfied = true;
                continue;
            }
            v.satisfied = trigger == TriggerType::Signal || port.ready;
            if !v.satisfied {
                return false;
            }
        }
    }

    if !sink && check_outputs {
        for (port, v) in outputs.iter().zip(verdict.outputs.iter_mut()) {
            if !port.started {
                continue;
            }
            v.satisfied = port.space;
            if !v.satisfied {
                return false;
            }
        }
    }

    if trigger == TriggerType::Data && !source && check_inputs {
        return any_pending || entry.has_internal_work();
    }
    true
}

fn evaluate_policy(
    policy: &TriggerPolicy,
    inputs: &[InputSnapshot],
    outputs: &[OutputSnapshot],
    verdict: &mut Verdict,
) -> bool {
    let in_ready: PortList<PortReadiness> = inputs
        .iter()
        .map(|p| PortReadiness { started: p.started, ready: p.ready || p.flushing_eos })
        .collect();
    let out_ready: PortList<PortReadiness> = outputs
        .iter()
        .map(|p| PortReadiness { started: p.started, ready: p.started && p.space })
        .collect();

    for (i, v) in verdict.inputs.iter_mut().enumerate() {
        v.satisfied = in_ready[i].started && in_ready[i].ready;
        v.blocked = policy.input_class(i) == NonTriggerPolicy::Blocked;
    }
    for (o, v) in verdict.outputs.iter_mut().enumerate() {
        v.satisfied = out_ready[o].ready;
        v.blocked = policy.output_class(o) == NonTriggerPolicy::Blocked;
    }
    policy.evaluate(&in_ready, &out_ready)
}

/// Registers, updates or removes a trigger policy.
///
/// Validation happens on a local candidate; on error the stored record is
/// untouched.
///
/// # Errors
///
/// - `Unsupported` when the variant has no policy support or the module is bypassed
/// - `BadParam` for an invalid trigger type, a malformed request, or a signal
///   policy on a module opted in to data triggers
pub fn register_trigger_policy(
    graph: &mut Graph,
    variant: &dyn TopologyVariant,
    id: ModuleId,
    trigger: TriggerType,
    request: &TriggerPolicyRequest,
) -> Result<PolicyChange> {
    if !variant.supports_trigger_policy() {
        return Err(CycleKitError::Unsupported(format!(
            "{:?} topology has no trigger policy support",
            variant.kind()
        )));
    }
    let entry = graph.module_mut(id)?;
    if entry.is_bypassed() {
        return Err(CycleKitError::Unsupported(format!(
            "{id} is bypassed; enable it before changing its trigger policy"
        )));
    }
    let candidate = if request.is_removal() {
        None
    } else {
        Some(TriggerPolicy::from_request(request, entry.inputs.len(), entry.outputs.len())?)
    };
    let slot = match trigger {
        TriggerType::Data => &mut entry.data_policy,
        TriggerType::Signal => {
            if candidate.is_some() && entry.st_opt_in.is_some() {
                return Err(CycleKitError::BadParam(format!(
                    "{id} follows data triggers and can't register a signal trigger policy"
                )));
            }
            &mut entry.signal_policy
        },
        TriggerType::Invalid => {
            return Err(CycleKitError::BadParam("invalid trigger type".to_string()));
        },
    };
    let change = install(slot, candidate);
    tracing::debug!(module = %id, ?trigger, ?change, "Trigger policy registration");
    Ok(change)
}

/// Whether a module counts towards performance aggregation.
///
/// The sub-graph must be started and the module must have a started port,
/// be a hardware endpoint, or (unless `ignore_trigger_policy`) hold an
/// active trigger policy. Disabled modules only count while bypassed.
pub fn is_module_active(graph: &Graph, id: ModuleId, ignore_trigger_policy: bool) -> bool {
    let Ok(entry) = graph.module(id) else {
        return false;
    };
    let has_active_policy = !ignore_trigger_policy
        && (entry.data_policy.as_ref().is_some_and(TriggerPolicy::is_active)
            || entry.signal_policy.as_ref().is_some_and(TriggerPolicy::is_active));
    let runnable = graph.subgraph_started(entry)
        && (entry.has_started_port()
            || entry.info.kind == ModuleKind::HwEndpoint
            || has_active_policy);
    runnable && (entry.is_enabled() || entry.is_bypassed())
}
