// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Data triggers inside signal-triggered containers.
//!
//! By default a signal-triggered container only runs modules on the signal.
//! A module opts in to data triggers once; the opt-in then spreads forward
//! through single-input modules and backward through single-output modules,
//! so the whole linear stretch around it follows data arrival. Spreading
//! stops at branching modules, at modules already opted in, and at modules
//! running a signal trigger policy.

use crate::ids::ModuleId;
use crate::topology::Graph;
use cyclekit_core::error::{CycleKitError, Result};

/// Opt-in record. `origin` is the module whose request caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StOptIn {
    pub origin: ModuleId,
    pub needs_input: bool,
    pub needs_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Forward,
    Backward,
}

/// Records the opt-in for `id` and spreads it. Returns every module that
/// ended up opted in by this call, `id` first.
///
/// Passing `false` for both directions withdraws the opt-in of `id` and of
/// every module it spread to.
///
/// # Errors
///
/// `BadParam` when the module runs a signal trigger policy; the two can't
/// be combined.
pub fn set_allow_data_trigger_in_st(
    graph: &mut Graph,
    id: ModuleId,
    needs_input: bool,
    needs_output: bool,
) -> Result<Vec<ModuleId>> {
    let entry = graph.module_mut(id)?;
    if entry.signal_policy.is_some() {
        return Err(CycleKitError::BadParam(format!(
            "{id} uses a signal trigger policy and can't also follow data triggers"
        )));
    }

    if !needs_input && !needs_output {
        let mut withdrawn = 0usize;
        for module in graph.modules.values_mut() {
            if module.st_opt_in.is_some_and(|o| o.origin == id) {
                module.st_opt_in = None;
                withdrawn += 1;
            }
        }
        tracing::debug!(module = %id, withdrawn, "Withdrew data-trigger opt-in");
        return Ok(Vec::new());
    }

    if let Some(previous) = entry.st_opt_in.filter(|o| o.origin != id) {
        tracing::warn!(
            module = %id,
            previous_origin = %previous.origin,
            "Module was already opted in through another path; taking over the opt-in"
        );
    }
    entry.st_opt_in = Some(StOptIn { origin: id, needs_input, needs_output });

    let mut opted = vec![id];
    if needs_output {
        spread(graph, id, Walk::Forward, &mut opted);
    }
    if needs_input {
        spread(graph, id, Walk::Backward, &mut opted);
    }
    tracing::debug!(module = %id, opted = opted.len(), "Data-trigger opt-in recorded");
    Ok(opted)
}

fn neighbours(graph: &Graph, id: ModuleId, walk: Walk) -> Vec<ModuleId> {
    let Ok(entry) = graph.module(id) else {
        return Vec::new();
    };
    let mut out: Vec<ModuleId> = match walk {
        Walk::Forward => entry.outputs.iter().filter_map(|p| p.conn).map(|p| p.module).collect(),
        Walk::Backward => entry.inputs.iter().filter_map(|p| p.conn).map(|p| p.module).collect(),
    };
    out.dedup();
    out
}

fn spread(graph: &mut Graph, origin: ModuleId, walk: Walk, opted: &mut Vec<ModuleId>) {
    let mut stack = neighbours(graph, origin, walk);
    while let Some(next) = stack.pop() {
        if next == origin || opted.contains(&next) {
            continue;
        }
        let Ok(entry) = graph.module_mut(next) else {
            continue;
        };
        let branching = match walk {
            Walk::Forward => entry.inputs.len() > 1,
            Walk::Backward => entry.outputs.len() > 1,
        };
        if branching {
            tracing::debug!(module = %next, ?walk, "Data-trigger opt-in stops at branching module");
            continue;
        }
        if let Some(existing) = entry.st_opt_in {
            if existing.origin != origin {
                tracing::warn!(
                    module = %next,
                    origin = %origin,
                    other_origin = %existing.origin,
                    "Data-trigger opt-in paths intersect; behaviour is not verified"
                );
            }
            continue;
        }
        if entry.signal_policy.is_some() {
            tracing::warn!(
                module = %next,
                origin = %origin,
                "Data-trigger opt-in stops at a module with a signal trigger policy"
            );
            continue;
        }
        entry.st_opt_in = Some(StOptIn { origin, needs_input: true, needs_output: true });
        opted.push(next);
        stack.extend(neighbours(graph, next, walk));
    }
}
