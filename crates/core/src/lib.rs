// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! CycleKit Core - Data model and contracts for the cycle-driven media engine.
//!
//! ## Core Modules
//!
//! - [`media_format`]: Media-format descriptors
//! - [`format_registry`]: Interning, reference-counted format registry
//! - [`buffer`]: Channelized staging buffers
//! - [`buffer_pool`]: Free-list buffer pool with periodic eviction
//! - [`stream`]: Per-port stream data and flags
//! - [`metadata`]: Stream markers and the metadata callback trait
//! - [`trigger_policy`]: Trigger types, affinities and policy requests
//! - [`module`]: Module trait, capabilities and events
//! - [`state`]: Port and sub-graph lifecycle states
//! - [`stats`]: Per-module statistics
//! - [`registry`]: Module factory registry
//! - [`config`]: Engine configuration
//! - [`helpers`]: Parameter parsing and PCM helpers
//! - [`error`]: Error types and handling
//!
//! ## Quick Start
//!
//! ```ignore
//! use cyclekit_core::module::{Module, ModuleInfo, ModuleKind, ProcessContext};
//!
//! struct Halve;
//!
//! impl Module for Halve {
//!     fn info(&self) -> ModuleInfo { ModuleInfo::new(ModuleKind::Generic, 1, 1) }
//!     fn process(&mut self, ctx: &mut ProcessContext<'_>) -> cyclekit_core::Result<()> { /* ... */ }
//! }
//! ```

pub mod buffer;
pub mod buffer_pool;
pub mod config;
pub mod error;
pub mod format_registry;
pub mod helpers;
pub mod media_format;
pub mod metadata;
pub mod module;
pub mod registry;
pub mod state;
pub mod stats;
pub mod stream;
pub mod trigger_policy;

// Error handling
pub use error::{CycleKitError, Result};

// Module contract
pub use module::{
    EventSink, InputStream, Module, ModuleCaps, ModuleEvent, ModuleInfo, ModuleKind,
    OutputStream, PerfFigures, ProcessContext,
};

// Data model
pub use buffer::{Buffer, BufferOrigin};
pub use buffer_pool::{BufferPool, PoolStats};
pub use format_registry::{FormatHandle, MediaFormatRegistry};
pub use media_format::{MediaFormat, PcmFormat};
pub use metadata::{Metadata, MetadataFlags, MetadataHandler, MetadataId, MetadataList};
pub use stream::{StreamData, StreamFlags};
pub use trigger_policy::{TriggerPolicyRequest, TriggerType};

// State tracking
pub use state::{DataFlowState, PortState, ProcessState, SubgraphState};

// Statistics
pub use stats::ModuleStats;

// Helpers
pub use helpers::{config_helpers, pcm_helpers};

// Registry and configuration
pub use config::{EngineConfig, PoolSettings, VariantKind};
pub use registry::{ModuleDefinition, ModuleRegistry};
