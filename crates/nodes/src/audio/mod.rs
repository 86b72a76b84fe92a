// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! This module contains all built-in audio modules and their registration logic.

use cyclekit_core::ModuleRegistry;

pub mod filters;

/// Registers all available audio modules with the registry.
pub fn register_audio_modules(registry: &mut ModuleRegistry) {
    filters::register_audio_filters(registry);
}

/// Accepts only 16-bit PCM, the one sample type the audio modules handle.
pub(crate) fn require_pcm16(
    format: &cyclekit_core::MediaFormat,
    module: &str,
) -> cyclekit_core::Result<cyclekit_core::PcmFormat> {
    match format.as_pcm() {
        Some(pcm) if pcm.bits_per_sample == 16 => Ok(*pcm),
        _ => Err(cyclekit_core::CycleKitError::Unsupported(format!(
            "{module} handles 16-bit PCM only, got {format:?}"
        ))),
    }
}
