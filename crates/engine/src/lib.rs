// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! engine: The cycle-driven topology execution engine for CycleKit.
//!
//! A [`Topology`] holds one graph of modules. Its container calls
//! [`Topology::process`] once per data or signal trigger; the engine decides
//! which modules run, moves buffers and stream markers between them, and
//! keeps buffer and media-format lifetimes in check.

use std::sync::{Arc, RwLock};

use cyclekit_core::config::EngineConfig;
use cyclekit_core::error::Result;
use cyclekit_core::registry::ModuleRegistry;

// --- Public Modules ---

pub mod constants;
pub mod container;
pub mod diagnostics;
pub mod events;
pub mod host;
pub mod ids;
pub mod metadata;
pub mod process_loop;
pub mod topology;
pub mod trigger;
pub mod variant;

// Re-exports
pub use container::RegistryContainer;
pub use diagnostics::DiagnosticCounts;
pub use events::{AsyncEventSender, EventFlags};
pub use host::{ContainerCallbacks, HostEvent, LowPowerGate, NullHost};
pub use ids::{Direction, ModuleId, PortId, SubgraphId};
pub use metadata::{MdCtx, MetadataEngine};
pub use process_loop::CycleReport;
pub use topology::{ExternalOutput, TeardownReport, Topology};
pub use trigger::PolicyChange;
pub use variant::{Advanced, Basic, TopologyVariant};

/// Entry point holding the module registry shared by every topology it creates.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    pub registry: Arc<RwLock<ModuleRegistry>>,
}

impl Engine {
    /// Creates an engine with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: ModuleRegistry) -> Self {
        Self { registry: Arc::new(RwLock::new(registry)) }
    }

    /// Creates a topology whose container builds modules from this engine's
    /// registry.
    ///
    /// # Errors
    ///
    /// `Configuration` when `config` fails validation.
    pub fn create_topology(&self, config: EngineConfig) -> Result<Topology<RegistryContainer>> {
        Topology::new(config, RegistryContainer::new(Arc::clone(&self.registry)))
    }
}

#[cfg(test)]
mod tests;
