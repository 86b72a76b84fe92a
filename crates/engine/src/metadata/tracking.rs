// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Completion tracking for markers whose creator asked to hear back.

use crate::constants::MAX_LIVE_TRACKING;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::metadata::{
    TrackingId, TrackingPolicy, TrackingReport, TrackingRequest, TrackingStatus,
};

/// Completion to deliver to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingNotice {
    pub token: u64,
    pub status: TrackingStatus,
}

#[derive(Debug)]
struct Record {
    request: TrackingRequest,
    copies: u32,
    rendered: bool,
}

impl Record {
    fn wants(&self, status: TrackingStatus) -> bool {
        match self.request.report {
            TrackingReport::All => true,
            TrackingReport::DropsOnly => status == TrackingStatus::Dropped,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    record: Option<Record>,
}

fn slot_index(index: usize) -> Result<u32> {
    u32::try_from(index)
        .map_err(|_| CycleKitError::NoMemory("tracking arena exhausted".to_string()))
}

#[derive(Debug, Default)]
pub struct TrackingArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl TrackingArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `NoMemory` once [`MAX_LIVE_TRACKING`] records are alive.
    pub fn alloc(&mut self, request: TrackingRequest) -> Result<TrackingId> {
        if self.live >= MAX_LIVE_TRACKING {
            return Err(CycleKitError::NoMemory(format!(
                "{MAX_LIVE_TRACKING} tracking records already alive"
            )));
        }
        let record = Record { request, copies: 1, rendered: false };
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.record = Some(record);
            TrackingId::new(slot_index(index)?, slot.generation)
        } else {
            let index = slot_index(self.slots.len())?;
            self.slots.push(Slot { generation: 0, record: Some(record) });
            TrackingId::new(index, 0)
        };
        self.live += 1;
        Ok(id)
    }

    fn slot_mut(&mut self, id: TrackingId) -> Option<&mut Slot> {
        self.slots.get_mut(id.index()).filter(|s| s.generation == id.generation())
    }

    /// Registers one more live copy of the tracked marker.
    pub fn add_copy(&mut self, id: TrackingId) -> bool {
        match self.slot_mut(id).and_then(|s| s.record.as_mut()) {
            Some(record) => {
                record.copies += 1;
                true
            },
            None => false,
        }
    }

    /// One copy finished with `status`. Returns the notice to deliver, if any.
    ///
    /// With [`TrackingPolicy::Each`] every copy may produce a notice. With
    /// [`TrackingPolicy::Last`] only the final copy does, reporting
    /// `Rendered` if any copy was rendered.
    pub fn complete(&mut self, id: TrackingId, status: TrackingStatus) -> Option<TrackingNotice> {
        let slot = self.slot_mut(id)?;
        let record = slot.record.as_mut()?;
        record.copies = record.copies.saturating_sub(1);
        record.rendered |= status == TrackingStatus::Rendered;

        let notice = match record.request.policy {
            TrackingPolicy::Each => record
                .wants(status)
                .then_some(TrackingNotice { token: record.request.token, status }),
            TrackingPolicy::Last if record.copies == 0 => {
                let final_status = if record.rendered {
                    TrackingStatus::Rendered
                } else {
                    TrackingStatus::Dropped
                };
                record
                    .wants(final_status)
                    .then_some(TrackingNotice { token: record.request.token, status: final_status })
            },
            TrackingPolicy::Last => None,
        };

        if record.copies == 0 {
            slot.record = None;
            self.free.push(id.index());
            self.live -= 1;
        }
        notice
    }

    pub const fn live(&self) -> usize {
        self.live
    }

    pub fn clear(&mut self) -> usize {
        let live = self.live;
        self.slots.clear();
        self.free.clear();
        self.live = 0;
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(policy: TrackingPolicy, report: TrackingReport) -> TrackingRequest {
        TrackingRequest { token: 42, policy, report }
    }

    #[test]
    fn last_policy_reports_once_rendered_if_any_copy_rendered() {
        let mut arena = TrackingArena::new();
        let id = arena
            .alloc(request(TrackingPolicy::Last, TrackingReport::All))
            .unwrap_or_else(|e| panic!("{e}"));
        arena.add_copy(id);
        assert_eq!(arena.complete(id, TrackingStatus::Dropped), None);
        assert_eq!(
            arena.complete(id, TrackingStatus::Rendered),
            Some(TrackingNotice { token: 42, status: TrackingStatus::Rendered })
        );
        assert_eq!(arena.live(), 0);
        assert_eq!(arena.complete(id, TrackingStatus::Rendered), None);
    }

    #[test]
    fn each_policy_with_drops_only() {
        let mut arena = TrackingArena::new();
        let id = arena
            .alloc(request(TrackingPolicy::Each, TrackingReport::DropsOnly))
            .unwrap_or_else(|e| panic!("{e}"));
        arena.add_copy(id);
        assert_eq!(arena.complete(id, TrackingStatus::Rendered), None);
        assert_eq!(
            arena.complete(id, TrackingStatus::Dropped),
            Some(TrackingNotice { token: 42, status: TrackingStatus::Dropped })
        );
    }

    #[test]
    fn stale_id_is_ignored_after_reuse() {
        let mut arena = TrackingArena::new();
        let old = arena
            .alloc(request(TrackingPolicy::Last, TrackingReport::All))
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(arena.complete(old, TrackingStatus::Rendered).is_some());
        let new = arena
            .alloc(request(TrackingPolicy::Last, TrackingReport::All))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(old.index(), new.index());

        assert!(!arena.add_copy(old));
        assert_eq!(arena.complete(old, TrackingStatus::Dropped), None);
        assert_eq!(arena.live(), 1);
        assert_eq!(
            arena.complete(new, TrackingStatus::Rendered),
            Some(TrackingNotice { token: 42, status: TrackingStatus::Rendered })
        );
    }
}
