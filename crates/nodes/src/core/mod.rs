// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! General-purpose modules that don't look at sample values.

use cyclekit_core::{config_helpers, CycleKitError, Module, ModuleRegistry};

#[cfg(feature = "passthrough")]
mod passthrough;
pub mod sink;
pub mod source;
pub mod splitter;

#[cfg(feature = "passthrough")]
pub use passthrough::PassthroughModule;
pub use sink::NullSinkModule;
pub use source::{SourceConfig, SourceModule};
pub use splitter::{SplitterConfig, SplitterModule};

/// Registers all available core modules with the registry.
pub fn register_core_modules(registry: &mut ModuleRegistry) {
    #[cfg(feature = "passthrough")]
    registry.register_with_description(
        "core::passthrough",
        |_params| Ok(Box::new(PassthroughModule) as Box<dyn Module>),
        vec!["core".to_string()],
        "Forwards data unchanged. Runs in place when the engine allows it.",
    );

    registry.register_with_description(
        "core::source",
        |params| {
            let config: SourceConfig = config_helpers::parse_config_optional(params)?;
            Ok(Box::new(SourceModule::new(config)) as Box<dyn Module>)
        },
        vec!["core".to_string(), "io".to_string()],
        "Produces a constant 16-bit sample pattern, optionally ending with a \
         flushing end-of-stream after a fixed number of bytes.",
    );

    registry.register_with_description(
        "core::sink",
        |_params| Ok(Box::new(NullSinkModule::default()) as Box<dyn Module>),
        vec!["core".to_string(), "io".to_string()],
        "Consumes and counts everything it receives.",
    );

    registry.register_with_description(
        "core::splitter",
        |params| {
            let config: SplitterConfig = config_helpers::parse_config_optional(params)?;
            let module = SplitterModule::new(config).map_err(|e| {
                CycleKitError::Configuration(format!("Invalid splitter configuration: {e}"))
            })?;
            Ok(Box::new(module) as Box<dyn Module>)
        },
        vec!["core".to_string(), "routing".to_string()],
        "Copies its input to every started output.",
    );
}
