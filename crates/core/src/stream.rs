// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-port stream state handed to modules.

use crate::buffer::Buffer;
use crate::metadata::{has_flushing_eos, MetadataList};

/// Stream-level flags carried with the data of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFlags {
    /// The data ends a frame; downstream may process a partial buffer.
    pub end_of_frame: bool,
    /// A flushing end-of-stream is attached or held for this stream.
    pub marker_eos: bool,
    /// The data is a concealment placeholder.
    pub erasure: bool,
    pub timestamp_valid: bool,
}

/// Data, flags and markers of one port.
#[derive(Debug, Default)]
pub struct StreamData {
    pub buf: Option<Buffer>,
    pub flags: StreamFlags,
    pub timestamp: i64,
    pub metadata: MetadataList,
}

impl StreamData {
    /// Valid bytes per channel buffer, zero without a buffer.
    pub fn actual_len(&self) -> usize {
        self.buf.as_ref().map_or(0, Buffer::actual_len)
    }

    pub fn max_len(&self) -> usize {
        self.buf.as_ref().map_or(0, Buffer::max_len)
    }

    pub fn free_space(&self) -> usize {
        self.buf.as_ref().map_or(0, Buffer::free_space)
    }

    pub fn has_data(&self) -> bool {
        self.actual_len() > 0
    }

    pub fn is_full(&self) -> bool {
        self.buf.as_ref().is_some_and(|b| b.max_len() > 0 && b.is_full())
    }

    /// Anything a consumer would have to look at: bytes, markers or a flush flag.
    pub fn has_pending(&self) -> bool {
        self.has_data() || !self.metadata.is_empty() || self.flags.marker_eos
    }

    /// Recomputes `marker_eos` from the attached markers.
    pub fn refresh_marker_eos(&mut self) {
        self.flags.marker_eos = has_flushing_eos(&self.metadata);
    }
}
