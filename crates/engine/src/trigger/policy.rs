// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Registered trigger-policy records: validation, storage and evaluation.

use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::trigger_policy::{
    NonTriggerGroup, NonTriggerPolicy, PortsPolicy, TriggerAffinity, TriggerGroup,
    TriggerPolicyRequest,
};

/// A module's live policy for one trigger type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub ports_policy: PortsPolicy,
    pub groups: Vec<TriggerGroup>,
    pub non_trigger: Option<NonTriggerGroup>,
}

/// What a registration did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyChange {
    Created,
    /// Same shape; contents overwritten in place.
    Updated,
    /// Group count or non-trigger presence changed; record rebuilt.
    Replaced,
    Removed,
    /// Removal requested but nothing was registered.
    Unchanged,
}

impl TriggerPolicy {
    /// Builds a record from `request` after checking it against the module's ports.
    ///
    /// # Errors
    ///
    /// `BadParam` when a group or the non-trigger group doesn't cover exactly
    /// the module's ports, or when a port has both a trigger affinity and a
    /// non-trigger classification.
    pub fn from_request(
        request: &TriggerPolicyRequest,
        num_inputs: usize,
        num_outputs: usize,
    ) -> Result<Self> {
        for (i, group) in request.groups.iter().enumerate() {
            if group.inputs.len() != num_inputs || group.outputs.len() != num_outputs {
                return Err(CycleKitError::BadParam(format!(
                    "trigger group {i} covers {}/{} ports, module has {num_inputs}/{num_outputs}",
                    group.inputs.len(),
                    group.outputs.len()
                )));
            }
        }
        if let Some(nt) = &request.non_trigger {
            if nt.inputs.len() != num_inputs || nt.outputs.len() != num_outputs {
                return Err(CycleKitError::BadParam(format!(
                    "non-trigger group covers {}/{} ports, module has {num_inputs}/{num_outputs}",
                    nt.inputs.len(),
                    nt.outputs.len()
                )));
            }
            check_overlap("input", &request.groups, &nt.inputs, |g| &g.inputs)?;
            check_overlap("output", &request.groups, &nt.outputs, |g| &g.outputs)?;
        }
        Ok(Self {
            ports_policy: request.ports_policy,
            groups: request.groups.clone(),
            non_trigger: request.non_trigger.clone(),
        })
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.groups.len() == other.groups.len()
            && self.non_trigger.is_some() == other.non_trigger.is_some()
    }

    /// Whether the module participates in this trigger at all.
    pub fn is_active(&self) -> bool {
        self.groups.iter().any(|g| !g.is_empty())
    }

    pub fn input_class(&self, index: usize) -> NonTriggerPolicy {
        self.non_trigger
            .as_ref()
            .and_then(|nt| nt.inputs.get(index).copied())
            .unwrap_or_default()
    }

    pub fn output_class(&self, index: usize) -> NonTriggerPolicy {
        self.non_trigger
            .as_ref()
            .and_then(|nt| nt.outputs.get(index).copied())
            .unwrap_or_default()
    }

    /// Evaluates the groups against per-port readiness.
    ///
    /// `inputs[i]` tells whether input `i` holds something to process,
    /// `outputs[j]` whether output `j` has room. Ports that are not started
    /// never satisfy `Present`.
    pub fn evaluate(&self, inputs: &[PortReadiness], outputs: &[PortReadiness]) -> bool {
        let mut verdicts = self
            .groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| self.evaluate_group(g, inputs, outputs))
            .peekable();
        if verdicts.peek().is_none() {
            return false;
        }
        match self.ports_policy {
            // Any one mandatory group suffices.
            PortsPolicy::Mandatory => verdicts.any(|ok| ok),
            // Every optional group must hold.
            PortsPolicy::Optional => verdicts.all(|ok| ok),
        }
    }

    fn evaluate_group(
        &self,
        group: &TriggerGroup,
        inputs: &[PortReadiness],
        outputs: &[PortReadiness],
    ) -> bool {
        let mut ports = group
            .inputs
            .iter()
            .zip(inputs)
            .chain(group.outputs.iter().zip(outputs))
            .filter_map(|(affinity, ready)| match affinity {
                TriggerAffinity::None => None,
                TriggerAffinity::Present => Some(ready.started && ready.ready),
                TriggerAffinity::Absent => Some(!ready.ready),
            });
        match self.ports_policy {
            PortsPolicy::Mandatory => ports.all(|ok| ok),
            PortsPolicy::Optional => ports.any(|ok| ok),
        }
    }
}

fn check_overlap<F>(
    side: &str,
    groups: &[TriggerGroup],
    classes: &[NonTriggerPolicy],
    ports_of: F,
) -> Result<()>
where
    F: Fn(&TriggerGroup) -> &Vec<TriggerAffinity>,
{
    for (index, class) in classes.iter().enumerate() {
        if *class == NonTriggerPolicy::Invalid {
            continue;
        }
        let has_affinity = groups
            .iter()
            .any(|g| ports_of(g).get(index).is_some_and(|a| *a != TriggerAffinity::None));
        if has_affinity {
            return Err(CycleKitError::BadParam(format!(
                "{side} {index} has both a trigger affinity and a non-trigger policy"
            )));
        }
    }
    Ok(())
}

/// Readiness of one port as seen by the policy evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortReadiness {
    pub started: bool,
    /// Input: data or markers to process. Output: room to write.
    pub ready: bool,
}

/// Stores `candidate` into `slot`, updating in place when the shape is unchanged.
pub fn install(slot: &mut Option<TriggerPolicy>, candidate: Option<TriggerPolicy>) -> PolicyChange {
    let Some(new) = candidate else {
        return if slot.take().is_some() { PolicyChange::Removed } else { PolicyChange::Unchanged };
    };
    if let Some(current) = slot.as_mut() {
        if current.same_shape(&new) {
            current.ports_policy = new.ports_policy;
            for (dst, src) in current.groups.iter_mut().zip(new.groups) {
                *dst = src;
            }
            current.non_trigger = new.non_trigger;
            return PolicyChange::Updated;
        }
        *slot = Some(new);
        return PolicyChange::Replaced;
    }
    *slot = Some(new);
    PolicyChange::Created
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn ready(ready: bool) -> PortReadiness {
        PortReadiness { started: true, ready }
    }

    fn two_in_one_out(policy: PortsPolicy) -> TriggerPolicy {
        let request = TriggerPolicyRequest::new(policy)
            .group(
                TriggerGroup::empty(2, 1)
                    .input(0, TriggerAffinity::Present)
                    .output(0, TriggerAffinity::Present),
            )
            .group(TriggerGroup::empty(2, 1).input(1, TriggerAffinity::Present));
        TriggerPolicy::from_request(&request, 2, 1).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn mandatory_groups_are_alternatives() {
        let policy = two_in_one_out(PortsPolicy::Mandatory);
        // First group needs input 0 and output space.
        assert!(policy.evaluate(&[ready(true), ready(false)], &[ready(true)]));
        assert!(!policy.evaluate(&[ready(true), ready(false)], &[ready(false)]));
        // Second group alone is enough.
        assert!(policy.evaluate(&[ready(false), ready(true)], &[ready(false)]));
    }

    #[test]
    fn optional_groups_must_all_hold() {
        let policy = two_in_one_out(PortsPolicy::Optional);
        // Inside a group any port suffices; across groups all must hold.
        assert!(policy.evaluate(&[ready(false), ready(true)], &[ready(true)]));
        assert!(!policy.evaluate(&[ready(true), ready(false)], &[ready(true)]));
    }

    #[test]
    fn absent_affinity_wants_empty_port() {
        let request = TriggerPolicyRequest::new(PortsPolicy::Mandatory)
            .group(TriggerGroup::empty(1, 0).input(0, TriggerAffinity::Absent));
        let policy = TriggerPolicy::from_request(&request, 1, 0).unwrap_or_else(|e| panic!("{e}"));
        assert!(policy.evaluate(&[ready(false)], &[]));
        assert!(!policy.evaluate(&[ready(true)], &[]));
    }

    #[test]
    fn overlap_with_non_trigger_is_rejected() {
        let request = TriggerPolicyRequest::new(PortsPolicy::Mandatory)
            .group(TriggerGroup::empty(1, 1).input(0, TriggerAffinity::Present))
            .non_trigger(NonTriggerGroup::empty(1, 1).input(0, NonTriggerPolicy::Blocked));
        assert!(matches!(
            TriggerPolicy::from_request(&request, 1, 1),
            Err(CycleKitError::BadParam(_))
        ));
    }

    #[test]
    fn wrong_port_count_is_rejected() {
        let request = TriggerPolicyRequest::new(PortsPolicy::Mandatory)
            .group(TriggerGroup::empty(2, 1).input(0, TriggerAffinity::Present));
        assert!(TriggerPolicy::from_request(&request, 1, 1).is_err());
    }

    #[test]
    fn install_updates_in_place_or_replaces() {
        let mut slot = None;
        let first = two_in_one_out(PortsPolicy::Mandatory);
        assert_eq!(install(&mut slot, Some(first.clone())), PolicyChange::Created);

        let mut same_shape = first.clone();
        same_shape.ports_policy = PortsPolicy::Optional;
        assert_eq!(install(&mut slot, Some(same_shape)), PolicyChange::Updated);
        assert_eq!(slot.as_ref().map(|p| p.ports_policy), Some(PortsPolicy::Optional));

        let mut reshaped = first;
        reshaped.groups.pop();
        assert_eq!(install(&mut slot, Some(reshaped)), PolicyChange::Replaced);
        assert_eq!(install(&mut slot, None), PolicyChange::Removed);
        assert_eq!(install(&mut slot, None), PolicyChange::Unchanged);
    }

    #[test]
    fn empty_groups_never_admit() {
        let request =
            TriggerPolicyRequest::new(PortsPolicy::Mandatory).group(TriggerGroup::empty(1, 1));
        let policy = TriggerPolicy::from_request(&request, 1, 1).unwrap_or_else(|e| panic!("{e}"));
        assert!(!policy.is_active());
        assert!(!policy.evaluate(&[ready(true)], &[ready(true)]));
    }
}
