// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Out-of-band stream markers and the callback table modules use to manage them.
//!
//! A marker's `offset` is always relative to the start of the *not yet
//! consumed* bytes of the buffer it currently travels with, per channel
//! buffer. Lists are kept ordered by offset, markers at the same offset keep
//! insertion order.
//!
//! Modules never edit marker lists directly. They go through a
//! [`MetadataHandler`], which the engine implements so that reference-counted
//! end-of-stream cargo and completion tracking stay consistent.

use crate::error::Result;
use crate::media_format::MediaFormat;
use serde::{Deserialize, Serialize};

/// What a marker means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataId {
    /// End of stream.
    Eos,
    /// Upstream paused without ending the stream.
    DataFlowGap,
    /// Module-defined marker.
    Custom(u32),
}

/// Who created a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataOrigin {
    #[default]
    Client,
    /// Created by the engine itself. Internal markers are destroyed rather
    /// than demoted when they end up in the middle of a buffer.
    Internal,
}

/// Memory class the marker was allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeapClass {
    #[default]
    Default,
    LowPower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataFlags {
    /// Sample-associated markers follow the samples they're attached to,
    /// including algorithmic delay and rate changes. Buffer-associated ones
    /// only follow raw byte accounting.
    pub sample_associated: bool,
    /// Only meaningful for end-of-stream: downstream must drain delayed data.
    pub flushing: bool,
    #[serde(default)]
    pub origin: MetadataOrigin,
    #[serde(default)]
    pub heap: HeapClass,
}

impl MetadataFlags {
    pub const fn sample() -> Self {
        Self {
            sample_associated: true,
            flushing: false,
            origin: MetadataOrigin::Client,
            heap: HeapClass::Default,
        }
    }

    pub const fn buffer() -> Self {
        Self {
            sample_associated: false,
            flushing: false,
            origin: MetadataOrigin::Client,
            heap: HeapClass::Default,
        }
    }

    #[must_use]
    pub const fn flushing(mut self, flushing: bool) -> Self {
        self.flushing = flushing;
        self
    }

    #[must_use]
    pub const fn internal(mut self) -> Self {
        self.origin = MetadataOrigin::Internal;
        self
    }

    #[must_use]
    pub const fn low_power(mut self) -> Self {
        self.heap = HeapClass::LowPower;
        self
    }
}

/// Slot of an end-of-stream cargo in the engine's cargo arena.
///
/// The generation changes every time the slot is reused, so an id kept by a
/// stale copy never matches a newer cargo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CargoId {
    index: u32,
    generation: u32,
}

impl CargoId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Slot of a completion-tracking record in the engine's tracking arena.
/// Generations work as for [`CargoId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingId {
    index: u32,
    generation: u32,
}

impl TrackingId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// How a tracked marker left the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// Reached a sink or an engine output.
    Rendered,
    /// Discarded before reaching any sink.
    Dropped,
}

/// When completion is reported for a marker that was fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPolicy {
    /// Once, after the last copy is gone.
    #[default]
    Last,
    /// For every copy.
    Each,
}

/// Which outcomes the requester wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingReport {
    DropsOnly,
    #[default]
    All,
}

/// Caller-supplied completion tracking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingRequest {
    /// Opaque token echoed back in the completion notification.
    pub token: u64,
    #[serde(default)]
    pub policy: TrackingPolicy,
    #[serde(default)]
    pub report: TrackingReport,
}

/// A marker travelling alongside stream data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: MetadataId,
    pub offset: usize,
    pub flags: MetadataFlags,
    pub payload: Vec<u8>,
    pub cargo: Option<CargoId>,
    pub tracking: Option<TrackingId>,
}

impl Metadata {
    pub fn new(id: MetadataId, offset: usize, flags: MetadataFlags) -> Self {
        Self { id, offset, flags, payload: Vec::new(), cargo: None, tracking: None }
    }

    pub fn is_eos(&self) -> bool {
        self.id == MetadataId::Eos
    }

    pub fn is_flushing_eos(&self) -> bool {
        self.is_eos() && self.flags.flushing
    }

    pub fn is_data_flow_gap(&self) -> bool {
        self.id == MetadataId::DataFlowGap
    }

    pub fn is_internal(&self) -> bool {
        self.flags.origin == MetadataOrigin::Internal
    }
}

/// Ordered list of markers attached to a port or held inside a module.
pub type MetadataList = Vec<Metadata>;

/// Inserts `md` after every marker whose offset is not greater than its own.
pub fn insert_ordered(list: &mut MetadataList, md: Metadata) {
    let pos = list.iter().rposition(|m| m.offset <= md.offset).map_or(0, |p| p + 1);
    list.insert(pos, md);
}

pub fn has_flushing_eos(list: &[Metadata]) -> bool {
    list.iter().any(Metadata::is_flushing_eos)
}

/// Everything needed to create a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSpec {
    pub id: MetadataId,
    pub offset: usize,
    pub flags: MetadataFlags,
    pub payload: Vec<u8>,
}

impl MetadataSpec {
    pub const fn new(id: MetadataId, offset: usize, flags: MetadataFlags) -> Self {
        Self { id, offset, flags, payload: Vec::new() }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}

/// Byte accounting of one module invocation for a single input/output pair.
///
/// Lengths are per channel buffer. `held` is the module's internal holding
/// list; markers that crossed the input but aren't covered by output yet wait
/// there with offsets expressed in output bytes still to be produced.
#[derive(Debug)]
pub struct PropagateParams<'a> {
    pub input: &'a mut MetadataList,
    pub held: &'a mut MetadataList,
    pub output: &'a mut MetadataList,
    pub in_format: Option<&'a MediaFormat>,
    pub out_format: Option<&'a MediaFormat>,
    /// Bytes present on the input before the call.
    pub input_len: usize,
    pub consumed: usize,
    /// Bytes present on the output before the call.
    pub out_initial: usize,
    pub produced: usize,
    pub algo_delay_us: u64,
    /// Hold flushing end-of-stream until a call produces nothing.
    pub squeeze: bool,
    /// Flushing end-of-stream may not leave the input yet (zero padding pending).
    pub hold_flushing_eos: bool,
}

/// What a propagation call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagateOutcome {
    /// Markers that reached the output list.
    pub moved: usize,
    /// A flushing end-of-stream moved to the output.
    pub flushing_eos_out: bool,
    /// A flushing end-of-stream sits in the holding list.
    pub flushing_eos_held: bool,
}

/// Metadata callback table offered to modules.
pub trait MetadataHandler {
    /// Creates a marker in `list`. `buf_len` is the current data length the
    /// list travels with; the offset may not exceed it.
    ///
    /// # Errors
    ///
    /// `BadParam` when the offset is past the data, `NoMemory` when the
    /// low-power gate or allocation fails.
    fn create(&mut self, list: &mut MetadataList, spec: MetadataSpec, buf_len: usize)
        -> Result<()>;

    /// Like [`MetadataHandler::create`], attaching completion tracking.
    ///
    /// # Errors
    ///
    /// As [`MetadataHandler::create`].
    fn create_with_tracking(
        &mut self,
        list: &mut MetadataList,
        spec: MetadataSpec,
        buf_len: usize,
        tracking: TrackingRequest,
    ) -> Result<()>;

    /// Appends a copy of `md` to `dest`, taking new references on its cargo and tracking.
    ///
    /// # Errors
    ///
    /// `NoMemory` when the low-power gate refuses.
    fn clone_into(&mut self, md: &Metadata, dest: &mut MetadataList) -> Result<()>;

    /// Releases a marker, reporting it to its tracker with `status`.
    fn destroy(&mut self, md: Metadata, status: TrackingStatus);

    /// Moves markers from input to output according to bytes consumed and produced.
    ///
    /// # Errors
    ///
    /// `BadParam` for inconsistent byte counts.
    fn propagate(&mut self, params: PropagateParams<'_>) -> Result<PropagateOutcome>;

    /// Adjusts a list when data starts flowing again after a gap.
    fn modify_at_data_flow_start(&mut self, list: &mut MetadataList);
}
