// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Codec-like modules. The engine squeezes these: a flushing end-of-stream
//! stays with the module until a call produces no more output.

#[allow(unused_imports)]
use cyclekit_core::{config_helpers, Module, ModuleRegistry};

#[cfg(feature = "depacketizer")]
pub mod depacketizer;

/// Registers all available codec modules with the registry.
pub fn register_codec_modules(registry: &mut ModuleRegistry) {
    #[cfg(feature = "depacketizer")]
    {
        use depacketizer::{DepacketizerConfig, DepacketizerModule};
        registry.register_with_description(
            "codecs::depacketizer",
            |params: Option<&serde_json::Value>| {
                let config: DepacketizerConfig = config_helpers::parse_config_optional(params)?;
                Ok(Box::new(DepacketizerModule::new(config)) as Box<dyn Module>)
            },
            vec!["codecs".to_string()],
            "Unwraps length-prefixed packets of 16-bit PCM into a continuous stream.",
        );
    }
}
