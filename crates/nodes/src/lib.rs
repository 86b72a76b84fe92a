// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use cyclekit_core::ModuleRegistry;

// Declare the top-level feature modules directly.
pub mod audio;
pub mod codecs;
pub mod core;

// Shared parameter encoding
pub mod params;

#[cfg(test)]
pub mod test_utils;

/// A single function to register all built-in modules.
pub fn register_nodes(registry: &mut ModuleRegistry) {
    // Call the registration function for each feature module.
    core::register_core_modules(registry);
    audio::register_audio_modules(registry);
    codecs::register_codec_modules(registry);

    tracing::info!("Finished registering built-in modules.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_is_registered() {
        let mut registry = ModuleRegistry::new();
        register_nodes(&mut registry);
        for kind in [
            "core::passthrough",
            "core::source",
            "core::sink",
            "core::splitter",
            "audio::gain",
            "audio::mixer",
            "audio::rate_converter",
            "audio::delay",
            "codecs::depacketizer",
        ] {
            assert!(registry.contains(kind), "{kind} missing");
        }
        let defs = registry.definitions();
        let gain = defs.iter().find(|d| d.kind == "audio::gain");
        assert!(gain.is_some_and(|d| d.info.caps.inplace));
    }
}
