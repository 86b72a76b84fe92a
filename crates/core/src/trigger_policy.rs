// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Trigger-policy vocabulary shared by modules and the engine.
//!
//! A module that is not happy with the default admission rule describes when
//! it wants to run as a set of affinity groups. Each group assigns every port
//! an affinity; the ports policy decides how ports combine inside a group and
//! (inversely) how groups combine with each other:
//!
//! | ports policy | inside a group | across groups |
//! |--------------|----------------|---------------|
//! | `Mandatory`  | all ports      | any group     |
//! | `Optional`   | any port       | all groups    |
//!
//! Ports that should never trigger the module are listed in the optional
//! non-trigger group instead.

use serde::{Deserialize, Serialize};

/// Cause of the current process cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// No cycle in progress.
    #[default]
    Invalid,
    /// Data or buffer availability.
    Data,
    /// Periodic timer or hardware interrupt.
    Signal,
}

/// How a port takes part in an affinity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAffinity {
    /// Not part of this group.
    #[default]
    None,
    /// Satisfied when data (input) or space (output) is available.
    Present,
    /// Satisfied when the port holds no data.
    Absent,
}

/// Classification of a port that never triggers the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonTriggerPolicy {
    /// Not classified.
    #[default]
    Invalid,
    /// Data is handed over when present but never required.
    Optional,
    /// Data is withheld from the module.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortsPolicy {
    #[default]
    Mandatory,
    Optional,
}

/// One affinity group: an affinity per input and per output port.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerGroup {
    pub inputs: Vec<TriggerAffinity>,
    pub outputs: Vec<TriggerAffinity>,
}

impl TriggerGroup {
    /// Group with every port set to `None`.
    pub fn empty(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            inputs: vec![TriggerAffinity::None; num_inputs],
            outputs: vec![TriggerAffinity::None; num_outputs],
        }
    }

    #[must_use]
    pub fn input(mut self, index: usize, affinity: TriggerAffinity) -> Self {
        if let Some(slot) = self.inputs.get_mut(index) {
            *slot = affinity;
        }
        self
    }

    #[must_use]
    pub fn output(mut self, index: usize, affinity: TriggerAffinity) -> Self {
        if let Some(slot) = self.outputs.get_mut(index) {
            *slot = affinity;
        }
        self
    }

    /// Whether any port participates in this group.
    pub fn is_empty(&self) -> bool {
        self.inputs.iter().chain(&self.outputs).all(|a| *a == TriggerAffinity::None)
    }
}

/// Per-port non-trigger classification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NonTriggerGroup {
    pub inputs: Vec<NonTriggerPolicy>,
    pub outputs: Vec<NonTriggerPolicy>,
}

impl NonTriggerGroup {
    pub fn empty(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            inputs: vec![NonTriggerPolicy::Invalid; num_inputs],
            outputs: vec![NonTriggerPolicy::Invalid; num_outputs],
        }
    }

    #[must_use]
    pub fn input(mut self, index: usize, policy: NonTriggerPolicy) -> Self {
        if let Some(slot) = self.inputs.get_mut(index) {
            *slot = policy;
        }
        self
    }

    #[must_use]
    pub fn output(mut self, index: usize, policy: NonTriggerPolicy) -> Self {
        if let Some(slot) = self.outputs.get_mut(index) {
            *slot = policy;
        }
        self
    }
}

/// What a module asks for when it registers a trigger policy.
///
/// A request with no groups and no non-trigger group removes the policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerPolicyRequest {
    pub ports_policy: PortsPolicy,
    pub groups: Vec<TriggerGroup>,
    #[serde(default)]
    pub non_trigger: Option<NonTriggerGroup>,
}

impl TriggerPolicyRequest {
    pub const fn new(ports_policy: PortsPolicy) -> Self {
        Self { ports_policy, groups: Vec::new(), non_trigger: None }
    }

    #[must_use]
    pub fn group(mut self, group: TriggerGroup) -> Self {
        self.groups.push(group);
        self
    }

    #[must_use]
    pub fn non_trigger(mut self, group: NonTriggerGroup) -> Self {
        self.non_trigger = Some(group);
        self
    }

    pub fn is_removal(&self) -> bool {
        self.groups.is_empty() && self.non_trigger.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_requested_slots_only() {
        let group = TriggerGroup::empty(2, 1)
            .input(1, TriggerAffinity::Present)
            .input(5, TriggerAffinity::Present);
        assert_eq!(group.inputs, vec![TriggerAffinity::None, TriggerAffinity::Present]);
        assert!(!group.is_empty());
        assert!(TriggerGroup::empty(1, 1).is_empty());
    }

    #[test]
    fn empty_request_means_removal() {
        assert!(TriggerPolicyRequest::new(PortsPolicy::Optional).is_removal());
        let req = TriggerPolicyRequest::new(PortsPolicy::Mandatory)
            .non_trigger(NonTriggerGroup::empty(1, 0));
        assert!(!req.is_removal());
    }

    #[test]
    fn request_parses_from_json() {
        let req: TriggerPolicyRequest = serde_json::from_str(
            r#"{"ports_policy":"optional","groups":[{"inputs":["present"],"outputs":["none"]}]}"#,
        )
        .unwrap_or_default();
        assert_eq!(req.ports_policy, PortsPolicy::Optional);
        assert_eq!(req.groups.len(), 1);
        assert_eq!(req.groups[0].inputs[0], TriggerAffinity::Present);
    }
}
