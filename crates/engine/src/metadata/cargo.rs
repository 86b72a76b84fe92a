// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Reference-counted end-of-stream cargo.
//!
//! Every copy of a flushing end-of-stream holds one reference on its cargo.
//! The zero crossing is the single authoritative release: it happens once,
//! after which the id is gone and further releases are ignored, even when a
//! later cargo reuses the slot.

use crate::constants::MAX_LIVE_CARGO;
use crate::ids::PortId;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::metadata::CargoId;

/// Origin record of a flushing end-of-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cargo {
    /// Ingress port the stream ended on.
    pub origin: PortId,
    /// Sequence number of the end-of-stream on that port.
    pub origin_id: u32,
    ref_count: u32,
    /// At least one copy left the graph through a sink or an output boundary.
    detached: bool,
}

impl Cargo {
    pub const fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub const fn is_detached(&self) -> bool {
        self.detached
    }
}

/// Result of giving back one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CargoRelease {
    /// Other copies are still alive.
    Pending,
    /// Last reference gone. `detached` tells whether any copy left the graph.
    ZeroCrossing { cargo: Cargo, detached: bool },
    /// The id was not live; ignored.
    Unknown,
}

fn slot_index(index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| CycleKitError::NoMemory("cargo arena exhausted".to_string()))
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    cargo: Option<Cargo>,
}

#[derive(Debug, Default)]
pub struct CargoArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    zero_crossings: u64,
}

impl CargoArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a cargo holding one reference.
    ///
    /// # Errors
    ///
    /// `NoMemory` once [`MAX_LIVE_CARGO`] cargo objects are alive.
    pub fn alloc(&mut self, origin: PortId, origin_id: u32) -> Result<CargoId> {
        if self.live >= MAX_LIVE_CARGO {
            return Err(CycleKitError::NoMemory(format!(
                "{MAX_LIVE_CARGO} end-of-stream cargo objects already alive"
            )));
        }
        let cargo = Cargo { origin, origin_id, ref_count: 1, detached: false };
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.cargo = Some(cargo);
            CargoId::new(slot_index(index)?, slot.generation)
        } else {
            let index = slot_index(self.slots.len())?;
            self.slots.push(Slot { generation: 0, cargo: Some(cargo) });
            CargoId::new(index, 0)
        };
        self.live += 1;
        Ok(id)
    }

    fn slot_mut(&mut self, id: CargoId) -> Option<&mut Slot> {
        self.slots.get_mut(id.index()).filter(|s| s.generation == id.generation())
    }

    pub fn get(&self, id: CargoId) -> Option<&Cargo> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.cargo.as_ref())
    }

    /// Takes another reference for a fan-out copy. Returns false for a dead id.
    pub fn add_ref(&mut self, id: CargoId) -> bool {
        match self.slot_mut(id).and_then(|s| s.cargo.as_mut()) {
            Some(cargo) => {
                cargo.ref_count += 1;
                true
            },
            None => false,
        }
    }

    /// Gives back one reference of a copy destroyed inside the graph.
    pub fn release(&mut self, id: CargoId) -> CargoRelease {
        self.put(id, false)
    }

    /// Gives back one reference of a copy that left the graph.
    pub fn detach(&mut self, id: CargoId) -> CargoRelease {
        self.put(id, true)
    }

    fn put(&mut self, id: CargoId, detaching: bool) -> CargoRelease {
        let Some(slot) = self.slot_mut(id) else {
            tracing::warn!(cargo = id.index(), "Release of a cargo from an earlier generation");
            return CargoRelease::Unknown;
        };
        let Some(cargo) = slot.cargo.as_mut() else {
            tracing::warn!(cargo = id.index(), "Release of a cargo that was already cleared");
            return CargoRelease::Unknown;
        };
        cargo.detached |= detaching;
        cargo.ref_count = cargo.ref_count.saturating_sub(1);
        if cargo.ref_count > 0 {
            return CargoRelease::Pending;
        }
        let Some(cargo) = slot.cargo.take() else {
            return CargoRelease::Unknown;
        };
        self.free.push(id.index());
        self.live -= 1;
        self.zero_crossings += 1;
        let detached = cargo.detached;
        CargoRelease::ZeroCrossing { cargo, detached }
    }

    pub const fn live(&self) -> usize {
        self.live
    }

    pub const fn zero_crossings(&self) -> u64 {
        self.zero_crossings
    }

    /// Frees every cargo without callbacks. Returns how many were alive.
    pub fn clear(&mut self) -> usize {
        let live = self.live;
        self.slots.clear();
        self.free.clear();
        self.live = 0;
        live
    }
}
