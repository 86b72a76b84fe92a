// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Metadata engine: creation, cloning, destruction and propagation of stream
//! markers, with end-of-stream cargo and completion tracking.
//!
//! [`MetadataEngine`] owns the arenas and lives inside the topology.
//! [`MdCtx`] borrows it together with the container callbacks for the
//! duration of one operation and implements the module-facing
//! [`MetadataHandler`] table.

mod cargo;
mod eos;
mod propagate;
mod tracking;

pub use cargo::{Cargo, CargoArena, CargoRelease};
pub use eos::pad_with_zeros;
pub use propagate::{is_crossed, propagate_markers, sub_offset};
pub use tracking::{TrackingArena, TrackingNotice};

use crate::constants::MAX_METADATA_PAYLOAD;
use crate::diagnostics::Diagnostics;
use crate::host::{ContainerCallbacks, HostEvent, LowPowerGate};
use crate::ids::PortId;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::metadata::{
    insert_ordered, HeapClass, Metadata, MetadataFlags, MetadataHandler, MetadataList,
    MetadataSpec, PropagateOutcome, PropagateParams, TrackingRequest, TrackingStatus,
};

/// Marker bookkeeping owned by a topology.
#[derive(Debug, Default)]
pub struct MetadataEngine {
    cargo: CargoArena,
    tracking: TrackingArena,
    next_eos_id: u32,
    /// Ingress ports whose end-of-stream bookkeeping can be cleared.
    cleared_origins: Vec<(PortId, u32)>,
    created: u64,
    destroyed: u64,
}

impl MetadataEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn cargo(&self) -> &CargoArena {
        &self.cargo
    }

    pub const fn tracking(&self) -> &TrackingArena {
        &self.tracking
    }

    pub const fn created(&self) -> u64 {
        self.created
    }

    pub const fn destroyed(&self) -> u64 {
        self.destroyed
    }

    /// Ingress ports whose last end-of-stream copy is gone since the previous call.
    pub fn take_cleared_origins(&mut self) -> Vec<(PortId, u32)> {
        std::mem::take(&mut self.cleared_origins)
    }

    /// Frees all arenas. Returns the number of cargo and tracking records still alive.
    pub fn teardown(&mut self) -> (usize, usize) {
        let cargo = self.cargo.clear();
        let tracking = self.tracking.clear();
        if cargo > 0 || tracking > 0 {
            tracing::warn!(cargo, tracking, "Metadata engine torn down with live records");
        }
        self.cleared_origins.clear();
        (cargo, tracking)
    }
}

/// Short-lived view combining the metadata engine with the container.
pub struct MdCtx<'a> {
    pub(crate) engine: &'a mut MetadataEngine,
    pub(crate) host: &'a mut dyn ContainerCallbacks,
    pub(crate) gate: &'a mut LowPowerGate,
    pub(crate) diag: &'a mut Diagnostics,
}

impl<'a> MdCtx<'a> {
    pub fn new(
        engine: &'a mut MetadataEngine,
        host: &'a mut dyn ContainerCallbacks,
        gate: &'a mut LowPowerGate,
        diag: &'a mut Diagnostics,
    ) -> Self {
        Self { engine, host, gate, diag }
    }

    /// Regular-heap markers may only be allocated outside low-power mode.
    fn ensure_heap(&mut self, flags: MetadataFlags) -> Result<()> {
        if flags.heap == HeapClass::Default {
            self.gate.ensure_non_low_power(self.host)?;
        }
        Ok(())
    }

    fn build(
        &mut self,
        spec: MetadataSpec,
        buf_len: usize,
        tracking: Option<TrackingRequest>,
    ) -> Result<Metadata> {
        if spec.offset > buf_len {
            return Err(CycleKitError::BadParam(format!(
                "marker offset {} is past the {buf_len} bytes of data",
                spec.offset
            )));
        }
        if spec.payload.len() > MAX_METADATA_PAYLOAD {
            return Err(CycleKitError::BadParam(format!(
                "marker payload of {} bytes exceeds {MAX_METADATA_PAYLOAD}",
                spec.payload.len()
            )));
        }
        self.ensure_heap(spec.flags)?;
        let tracking = tracking.map(|req| self.engine.tracking.alloc(req)).transpose()?;
        self.engine.created += 1;
        Ok(Metadata {
            id: spec.id,
            offset: spec.offset,
            flags: spec.flags,
            payload: spec.payload,
            cargo: None,
            tracking,
        })
    }

    fn notify(&mut self, notice: Option<TrackingNotice>) {
        if let Some(TrackingNotice { token, status }) = notice {
            tracing::debug!(token, ?status, "Tracked marker completed");
            self.host.raise_event_to_host(HostEvent::MetadataTracking { token, status });
        }
    }

    /// Destroys every marker of `list` as dropped. Returns the number destroyed.
    pub fn drop_list(&mut self, list: &mut MetadataList, reason: &'static str) -> usize {
        let count = list.len();
        for md in list.drain(..) {
            self.release(md, TrackingStatus::Dropped);
        }
        self.diag.markers_dropped(count, reason);
        count
    }

    fn release(&mut self, md: Metadata, status: TrackingStatus) {
        self.engine.destroyed += 1;
        if let Some(cargo_id) = md.cargo {
            if let CargoRelease::ZeroCrossing { cargo, detached } =
                self.engine.cargo.release(cargo_id)
            {
                if !detached {
                    self.host.clear_eos(cargo.origin, cargo.origin_id, &md);
                }
                self.engine.cleared_origins.push((cargo.origin, cargo.origin_id));
            }
        }
        if let Some(tracking_id) = md.tracking {
            let notice = self.engine.tracking.complete(tracking_id, status);
            self.notify(notice);
        }
    }
}

impl MetadataHandler for MdCtx<'_> {
    fn create(
        &mut self,
        list: &mut MetadataList,
        spec: MetadataSpec,
        buf_len: usize,
    ) -> Result<()> {
        let md = self.build(spec, buf_len, None)?;
        insert_ordered(list, md);
        Ok(())
    }

    fn create_with_tracking(
        &mut self,
        list: &mut MetadataList,
        spec: MetadataSpec,
        buf_len: usize,
        tracking: TrackingRequest,
    ) -> Result<()> {
        let md = self.build(spec, buf_len, Some(tracking))?;
        insert_ordered(list, md);
        Ok(())
    }

    fn clone_into(&mut self, md: &Metadata, dest: &mut MetadataList) -> Result<()> {
        self.ensure_heap(md.flags)?;
        let copy = md.clone();
        if let Some(cargo) = copy.cargo {
            self.engine.cargo.add_ref(cargo);
        }
        if let Some(tracking) = copy.tracking {
            self.engine.tracking.add_copy(tracking);
        }
        self.engine.created += 1;
        insert_ordered(dest, copy);
        Ok(())
    }

    fn destroy(&mut self, md: Metadata, status: TrackingStatus) {
        if status == TrackingStatus::Dropped {
            self.diag.markers_dropped(1, "destroyed");
        }
        self.release(md, status);
    }

    fn propagate(&mut self, params: PropagateParams<'_>) -> Result<PropagateOutcome> {
        let (outcome, underflows) = propagate_markers(params)?;
        self.diag.offset_underflow(self.host, underflows);
        Ok(outcome)
    }

    fn modify_at_data_flow_start(&mut self, list: &mut MetadataList) {
        let mut demoted = 0;
        for md in list.iter_mut().filter(|m| m.is_flushing_eos()) {
            md.flags.flushing = false;
            demoted += 1;
        }
        if demoted > 0 {
            tracing::debug!(demoted, "Demoted stale flushing end-of-stream at data-flow start");
        }
    }
}
