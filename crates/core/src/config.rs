// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Runtime configuration for a topology instance.
//!
//! Settings are usually fixed when the container creates its topology and
//! remain constant for its lifetime. Every field has a default, so a YAML
//! document only needs to list what it overrides:
//!
//! ```yaml
//! signal_triggered: true
//! variant: advanced
//! pool:
//!   sweep_interval_ms: 50
//! ```
//!
//! ## Default Values
//!
//! - `signal_triggered`: false (data-driven container)
//! - `variant`: advanced
//! - `pool.sweep_interval_ms`: 100
//! - `pool.max_unused_count`: 10
//! - `max_loop_iterations`: 32
//! - `default_port_threshold`: 4096 bytes
//! - `error_print_interval_ms`: 1000

use crate::error::{CycleKitError, Result};
use serde::{Deserialize, Serialize};

/// Default time between two buffer-pool sweeps.
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 100;

/// Default number of sweeps a free buffer may survive unused.
const DEFAULT_MAX_UNUSED_COUNT: u32 = 10;

/// Default bound on process-loop passes per trigger.
const DEFAULT_MAX_LOOP_ITERATIONS: u32 = 32;

/// Default per-channel port threshold when nothing else is known.
const DEFAULT_PORT_THRESHOLD: usize = 4096;

/// Default minimum spacing of rate-limited error logs.
const DEFAULT_ERROR_PRINT_INTERVAL_MS: u64 = 1000;

/// Which topology implementation a container runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// Default trigger policy only, no policy registration, no codec squeeze.
    Basic,
    /// Full feature set.
    #[default]
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Minimum time between two sweeps of the free list.
    pub sweep_interval_ms: u64,
    /// A free entry is evicted once it has been unused for more than this many sweeps.
    pub max_unused_count: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            max_unused_count: DEFAULT_MAX_UNUSED_COUNT,
        }
    }
}

/// Configuration for one topology instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the owning container is driven by a periodic signal (timer or
    /// hardware interrupt) rather than by data arrival.
    pub signal_triggered: bool,
    pub variant: VariantKind,
    pub pool: PoolSettings,
    /// Upper bound on repeated passes over the module list within one trigger.
    pub max_loop_iterations: u32,
    /// Threshold (bytes per channel buffer) used for ports whose module never reported one.
    pub default_port_threshold: usize,
    /// Minimum spacing of rate-limited error logs.
    pub error_print_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signal_triggered: false,
            variant: VariantKind::default(),
            pool: PoolSettings::default(),
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            default_port_threshold: DEFAULT_PORT_THRESHOLD,
            error_print_interval_ms: DEFAULT_ERROR_PRINT_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    /// Parses a YAML document and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`CycleKitError::Configuration`] if the document can't be parsed
    /// or contains out-of-range values.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_saphyr::from_str(text)
            .map_err(|e| CycleKitError::Configuration(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine can't operate with.
    ///
    /// # Errors
    ///
    /// Returns [`CycleKitError::Configuration`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.max_loop_iterations == 0 {
            return Err(CycleKitError::Configuration(
                "max_loop_iterations must be at least 1".to_string(),
            ));
        }
        if self.default_port_threshold == 0 {
            return Err(CycleKitError::Configuration(
                "default_port_threshold must be non-zero".to_string(),
            ));
        }
        if self.pool.sweep_interval_ms == 0 {
            return Err(CycleKitError::Configuration(
                "pool.sweep_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
