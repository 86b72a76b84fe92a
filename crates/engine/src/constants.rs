// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared constants for the topology engine.
//!
//! Tunables that hosts may want to change live in
//! [`cyclekit_core::config::EngineConfig`]; the values here are fixed limits
//! and names.

// === Metrics ===

/// Name of the OpenTelemetry meter used by the engine.
pub const METER_NAME: &str = "cyclekit_engine";

// === Metadata ===

/// Largest payload accepted when creating a marker.
///
/// Payloads travel with every copy of a marker across fan-out, so they are
/// kept small. 4 KiB covers every built-in marker with plenty of headroom.
pub const MAX_METADATA_PAYLOAD: usize = 4 * 1024;

/// Upper bound on live cargo objects per topology.
///
/// Reaching it means end-of-stream markers are leaking; creation fails with
/// `NoMemory` instead of growing without bound.
pub const MAX_LIVE_CARGO: usize = 1024;

/// Upper bound on live tracking records per topology.
pub const MAX_LIVE_TRACKING: usize = 4096;

// === Graph ===

/// Largest number of ports a single module may declare on one side.
pub const MAX_PORTS_PER_SIDE: usize = 64;
