// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Parameter ids understood by the built-in modules and their payload encoding.
//!
//! Payloads are little-endian scalars.

use cyclekit_core::error::{CycleKitError, Result};

/// Linear gain as `f32`.
pub const PARAM_GAIN: u32 = 0x0001_0001;
/// Bytes a source produces per call, as `u32`. Zero fills the output.
pub const PARAM_BYTES_PER_CALL: u32 = 0x0001_0002;
/// Total bytes a module has produced or received, as `u64`. Read-only.
pub const PARAM_BYTE_COUNT: u32 = 0x0001_0003;
/// Algorithmic delay in microseconds, as `u64`.
pub const PARAM_DELAY_US: u32 = 0x0001_0004;

fn fixed<const N: usize>(payload: &[u8], param_id: u32) -> Result<[u8; N]> {
    payload.try_into().map_err(|_| {
        CycleKitError::BadParam(format!(
            "param {param_id:#x} expects {N} bytes, got {}",
            payload.len()
        ))
    })
}

/// # Errors
///
/// `BadParam` when `payload` is not exactly four bytes.
pub fn decode_u32(payload: &[u8], param_id: u32) -> Result<u32> {
    fixed::<4>(payload, param_id).map(u32::from_le_bytes)
}

/// # Errors
///
/// `BadParam` when `payload` is not exactly eight bytes.
pub fn decode_u64(payload: &[u8], param_id: u32) -> Result<u64> {
    fixed::<8>(payload, param_id).map(u64::from_le_bytes)
}

/// # Errors
///
/// `BadParam` when `payload` is not exactly four bytes.
pub fn decode_f32(payload: &[u8], param_id: u32) -> Result<f32> {
    fixed::<4>(payload, param_id).map(f32::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_is_checked() {
        assert_eq!(decode_u32(&7u32.to_le_bytes(), PARAM_BYTES_PER_CALL).ok(), Some(7));
        assert!(decode_u32(&[1, 2], PARAM_BYTES_PER_CALL).is_err());
        assert!(decode_u64(&[0; 4], PARAM_DELAY_US).is_err());
        assert_eq!(decode_f32(&0.5f32.to_le_bytes(), PARAM_GAIN).ok(), Some(0.5));
    }
}
