// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Topology variants.
//!
//! Containers pick one of two feature sets when they create a topology. The
//! basic variant schedules every module with the default admission rule and
//! treats codec-like modules like any other; the advanced one adds
//! registered trigger policies and end-of-stream squeeze.

use cyclekit_core::config::VariantKind;

pub trait TopologyVariant: Send + std::fmt::Debug {
    fn kind(&self) -> VariantKind;

    /// Whether modules may register data or signal trigger policies.
    fn supports_trigger_policy(&self) -> bool;

    /// Whether codec-like modules hold a flushing end-of-stream until they
    /// stop producing output.
    fn squeeze_enabled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Basic;

impl TopologyVariant for Basic {
    fn kind(&self) -> VariantKind {
        VariantKind::Basic
    }

    fn supports_trigger_policy(&self) -> bool {
        false
    }

    fn squeeze_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Advanced;

impl TopologyVariant for Advanced {
    fn kind(&self) -> VariantKind {
        VariantKind::Advanced
    }

    fn supports_trigger_policy(&self) -> bool {
        true
    }

    fn squeeze_enabled(&self) -> bool {
        true
    }
}

/// Instantiates the variant named in the configuration.
pub fn for_kind(kind: VariantKind) -> Box<dyn TopologyVariant> {
    match kind {
        VariantKind::Basic => Box::new(Basic),
        VariantKind::Advanced => Box::new(Advanced),
    }
}
