// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

// Use the module structs from their respective files.
#[allow(unused_imports)]
use cyclekit_core::{config_helpers, CycleKitError, Module, ModuleRegistry};

#[cfg(feature = "audio_delay")]
pub mod delay;
#[cfg(feature = "audio_gain")]
pub mod gain;
#[cfg(feature = "audio_mixer")]
pub mod mixer;
#[cfg(feature = "audio_rate_converter")]
pub mod rate_converter;

/// Registers all available audio filter modules with the registry.
pub fn register_audio_filters(registry: &mut ModuleRegistry) {
    // --- Register GainModule ---
    #[cfg(feature = "audio_gain")]
    {
        use gain::{GainConfig, GainModule};
        registry.register_with_description(
            "audio::gain",
            |params: Option<&serde_json::Value>| {
                let config: GainConfig = config_helpers::parse_config_optional(params)?;
                let module = GainModule::new(config).map_err(|e| {
                    CycleKitError::Configuration(format!("Invalid gain configuration: {e}"))
                })?;
                Ok(Box::new(module) as Box<dyn Module>)
            },
            vec!["audio".to_string(), "filters".to_string()],
            "Applies a linear gain to 16-bit PCM. Works in place and supports \
             real-time tuning through set_param.",
        );
    }

    // --- Register MixerModule ---
    #[cfg(feature = "audio_mixer")]
    {
        use mixer::{MixerConfig, MixerModule};
        registry.register_with_description(
            "audio::mixer",
            |params: Option<&serde_json::Value>| {
                let config: MixerConfig = config_helpers::parse_config_optional(params)?;
                let module = MixerModule::new(config).map_err(|e| {
                    CycleKitError::Configuration(format!("Invalid mixer configuration: {e}"))
                })?;
                Ok(Box::new(module) as Box<dyn Module>)
            },
            vec!["audio".to_string(), "filters".to_string()],
            "Sums several 16-bit PCM streams into one output with saturation.",
        );
    }

    // --- Register RateConverterModule ---
    #[cfg(feature = "audio_rate_converter")]
    {
        use rate_converter::{RateConverterConfig, RateConverterModule};
        registry.register_with_description(
            "audio::rate_converter",
            |params: Option<&serde_json::Value>| {
                let config: RateConverterConfig = config_helpers::parse_config_optional(params)?;
                let module = RateConverterModule::new(config).map_err(|e| {
                    CycleKitError::Configuration(format!("Invalid rate converter configuration: {e}"))
                })?;
                Ok(Box::new(module) as Box<dyn Module>)
            },
            vec!["audio".to_string(), "filters".to_string()],
            "Converts the sample rate of 16-bit PCM with rubato in fixed input chunks.",
        );
    }

    // --- Register DelayModule ---
    #[cfg(feature = "audio_delay")]
    {
        use delay::{DelayConfig, DelayModule};
        registry.register_with_description(
            "audio::delay",
            |params: Option<&serde_json::Value>| {
                let config: DelayConfig = config_helpers::parse_config_optional(params)?;
                Ok(Box::new(DelayModule::new(config)) as Box<dyn Module>)
            },
            vec!["audio".to_string(), "filters".to_string()],
            "Delays its input by a fixed duration and reports it as algorithmic delay.",
        );
    }
}
