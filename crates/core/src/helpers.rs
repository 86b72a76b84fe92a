// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Utility functions for module configuration and PCM sample handling.
//!
//! - [`config_helpers`]: Parse module parameters from JSON
//! - [`pcm_helpers`]: Read and write little-endian PCM samples in place

/// Helper functions for parsing module parameters from JSON values.
pub mod config_helpers {
    use crate::error::{CycleKitError, Result};
    use serde::Deserialize;

    /// Parses parameters from an optional JSON value, using defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns `CycleKitError::Configuration` if a value is present but doesn't parse.
    pub fn parse_config_optional<T>(params: Option<&serde_json::Value>) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        params.map_or_else(
            || Ok(T::default()),
            |p| {
                serde_json::from_value(p.clone()).map_err(|e| {
                    CycleKitError::Configuration(format!("Failed to parse module params: {e}"))
                })
            },
        )
    }

    /// Parses parameters from an optional JSON value, returning an error if not provided.
    ///
    /// # Errors
    ///
    /// Returns `CycleKitError::Configuration` if `params` is `None` or if deserialization fails.
    pub fn parse_config_required<T>(params: Option<&serde_json::Value>, context: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        params.map_or_else(
            || Err(CycleKitError::Configuration(format!("{context} configuration required"))),
            |p| {
                serde_json::from_value(p.clone()).map_err(|e| {
                    CycleKitError::Configuration(format!("Failed to parse {context}: {e}"))
                })
            },
        )
    }
}

/// Helpers for 16-bit little-endian PCM, the sample type the built-in modules work on.
pub mod pcm_helpers {
    /// Scales every sample of `bytes` by `gain`, saturating at the sample range.
    pub fn apply_gain_i16(bytes: &mut [u8], gain: f32) {
        for chunk in bytes.chunks_exact_mut(2) {
            let sample = f32::from(i16::from_le_bytes([chunk[0], chunk[1]]));
            #[allow(clippy::cast_possible_truncation)]
            let scaled = (sample * gain).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
            chunk.copy_from_slice(&scaled.to_le_bytes());
        }
    }

    /// Adds `src` into `dst` sample by sample, saturating.
    pub fn mix_i16(dst: &mut [u8], src: &[u8]) {
        for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
            let a = i16::from_le_bytes([d[0], d[1]]);
            let b = i16::from_le_bytes([s[0], s[1]]);
            d.copy_from_slice(&a.saturating_add(b).to_le_bytes());
        }
    }

    /// Reads sample `index` of a byte slice.
    pub fn sample_i16(bytes: &[u8], index: usize) -> Option<i16> {
        let b = bytes.get(index * 2..index * 2 + 2)?;
        Some(i16::from_le_bytes([b[0], b[1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::config_helpers::{parse_config_optional, parse_config_required};
    use super::pcm_helpers::{apply_gain_i16, mix_i16, sample_i16};
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Params {
        bytes_per_call: usize,
    }

    #[test]
    fn optional_params_fall_back_to_default() {
        let parsed: Params = parse_config_optional(None).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(parsed, Params::default());

        let value = serde_json::json!({ "bytes_per_call": 50 });
        let parsed: Params = parse_config_optional(Some(&value)).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(parsed.bytes_per_call, 50);

        let bad = serde_json::json!({ "bytes_per_call": "many" });
        assert!(parse_config_optional::<Params>(Some(&bad)).is_err());
    }

    #[test]
    fn required_params_reject_none() {
        assert!(parse_config_required::<Params>(None, "source").is_err());
    }

    #[test]
    fn gain_and_mix_saturate() {
        let mut samples = [0u8; 4];
        samples[..2].copy_from_slice(&20_000i16.to_le_bytes());
        samples[2..].copy_from_slice(&(-100i16).to_le_bytes());
        apply_gain_i16(&mut samples, 2.0);
        assert_eq!(sample_i16(&samples, 0), Some(i16::MAX));
        assert_eq!(sample_i16(&samples, 1), Some(-200));

        let other = 1_000i16.to_le_bytes();
        mix_i16(&mut samples[..2], &other);
        assert_eq!(sample_i16(&samples, 0), Some(i16::MAX));
        assert_eq!(sample_i16(&samples, 2), None);
    }
}
