// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! End-of-stream handling: creation at ingress, demotion when new data
//! follows, release at sinks and output boundaries, and zero padding.

use super::{CargoRelease, MdCtx};
use crate::ids::PortId;
use cyclekit_core::error::Result;
use cyclekit_core::metadata::{
    insert_ordered, Metadata, MetadataFlags, MetadataId, MetadataList, TrackingRequest,
    TrackingStatus,
};
use cyclekit_core::stream::StreamData;

impl MdCtx<'_> {
    /// Creates an end-of-stream marker at `offset` of `list`.
    ///
    /// A flushing end-of-stream entering at an ingress port carries cargo so
    /// the container hears back once its last copy is gone. Returns the
    /// sequence number assigned to it.
    ///
    /// # Errors
    ///
    /// `NoMemory` when cargo, tracking or the low-power gate fail. Nothing is
    /// left allocated in that case.
    pub fn create_eos(
        &mut self,
        list: &mut MetadataList,
        offset: usize,
        flushing: bool,
        origin: Option<PortId>,
        tracking: Option<TrackingRequest>,
    ) -> Result<u32> {
        let flags = MetadataFlags::sample().flushing(flushing);
        self.gate.ensure_non_low_power(self.host)?;

        let origin_id = self.engine.next_eos_id;
        let cargo = match origin {
            Some(port) if flushing => Some(self.engine.cargo.alloc(port, origin_id)?),
            _ => None,
        };
        let tracking = match tracking.map(|req| self.engine.tracking.alloc(req)).transpose() {
            Ok(tracking) => tracking,
            Err(e) => {
                if let Some(id) = cargo {
                    self.engine.cargo.release(id);
                }
                return Err(e);
            },
        };

        self.engine.next_eos_id = self.engine.next_eos_id.wrapping_add(1);
        self.engine.created += 1;
        let mut md = Metadata::new(MetadataId::Eos, offset, flags);
        md.cargo = cargo;
        md.tracking = tracking;
        insert_ordered(list, md);
        tracing::debug!(?origin, origin_id, offset, flushing, "Created end-of-stream");
        Ok(origin_id)
    }

    /// New data arrived behind markers already in `list`.
    ///
    /// A flushing end-of-stream becomes non-flushing, since the stream didn't
    /// actually end. Gap markers and engine-internal markers are destroyed as
    /// dropped. Returns how many markers were touched.
    pub fn modify_md_when_new_data_arrives(&mut self, list: &mut MetadataList) -> usize {
        let mut touched = 0;
        let mut kept = MetadataList::with_capacity(list.len());
        for mut md in list.drain(..) {
            if md.is_data_flow_gap() || md.is_internal() {
                touched += 1;
                self.release(md, TrackingStatus::Dropped);
                self.diag.markers_dropped(1, "superseded");
            } else {
                if md.is_flushing_eos() {
                    md.flags.flushing = false;
                    touched += 1;
                }
                kept.push(md);
            }
        }
        *list = kept;
        touched
    }

    /// A marker reached a sink and leaves the graph rendered.
    ///
    /// Detaching doesn't notify the container through `clear_eos`; the stream
    /// really ended. Origin bookkeeping is still cleared on the zero crossing.
    pub fn detach_at_terminal(&mut self, md: Metadata) {
        self.engine.destroyed += 1;
        if let Some(cargo_id) = md.cargo {
            if let CargoRelease::ZeroCrossing { cargo, .. } = self.engine.cargo.detach(cargo_id) {
                self.engine.cleared_origins.push((cargo.origin, cargo.origin_id));
            }
        }
        if let Some(tracking_id) = md.tracking {
            let notice = self.engine.tracking.complete(tracking_id, TrackingStatus::Rendered);
            self.notify(notice);
        }
    }

    /// A marker leaves through an external output.
    ///
    /// The cargo reference is given back here. Tracking stays attached; the
    /// container reports the outcome later by destroying the marker.
    pub fn detach_at_boundary(&mut self, md: &mut Metadata) {
        if let Some(cargo_id) = md.cargo.take() {
            if let CargoRelease::ZeroCrossing { cargo, .. } = self.engine.cargo.detach(cargo_id) {
                self.engine.cleared_origins.push((cargo.origin, cargo.origin_id));
            }
        }
    }
}

/// Appends up to `pending` zero bytes to `stream`, moving any flushing
/// end-of-stream that sat at the old end of the data to the new end.
///
/// Returns the number of bytes written per channel buffer; `pending` is
/// decremented by that amount.
pub fn pad_with_zeros(stream: &mut StreamData, pending: &mut usize) -> usize {
    let Some(buf) = stream.buf.as_mut() else {
        return 0;
    };
    let old_len = buf.actual_len();
    let written = buf.push_zeros(*pending);
    *pending -= written;
    if written > 0 {
        for md in stream.metadata.iter_mut().filter(|m| m.is_flushing_eos()) {
            if md.offset == old_len {
                md.offset = old_len + written;
            }
        }
    }
    written
}
