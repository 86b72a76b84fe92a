// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Free-list pool for inter-module staging buffers.
//!
//! The pool is intentionally simple:
//! - first-fit over a single free list (most recently released first)
//! - released buffers are kept, not freed
//! - a time-driven sweep evicts entries that went unused for too many sweeps
//!
//! Memory obtained while in low-power mode is tagged and only ever matched
//! against low-power requests. While low-power mode is active the sweep may
//! only free low-power entries.

use crate::buffer::{Buffer, BufferOrigin};
use crate::config::PoolSettings;
use crate::error::{CycleKitError, Result};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquire calls served from the free list.
    pub hits: u64,
    /// Acquire calls that allocated fresh memory.
    pub misses: u64,
    /// Entries freed by the sweep.
    pub evictions: u64,
    /// Buffers handed out and not yet released.
    pub outstanding: usize,
    pub free_entries: usize,
    pub free_bytes: usize,
}

#[derive(Debug)]
struct FreeEntry {
    storage: Vec<u8>,
    unused_count: u32,
    reuse_count: u64,
    low_power: bool,
}

impl FreeEntry {
    fn size(&self) -> usize {
        self.storage.len()
    }
}

/// Per-topology buffer pool.
#[derive(Debug)]
pub struct BufferPool {
    free: VecDeque<FreeEntry>,
    outstanding: usize,
    sweep_interval: Duration,
    max_unused_count: u32,
    last_sweep: Option<Instant>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(&PoolSettings::default())
    }
}

impl BufferPool {
    pub fn new(settings: &PoolSettings) -> Self {
        Self {
            free: VecDeque::new(),
            outstanding: 0,
            sweep_interval: Duration::from_millis(settings.sweep_interval_ms),
            max_unused_count: settings.max_unused_count,
            last_sweep: None,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Hands out an empty buffer with `num_bufs` sub-buffers of `max_len` bytes.
    ///
    /// The first free entry large enough (and from the same memory class) is
    /// reused; otherwise fresh memory is allocated.
    pub fn acquire(&mut self, num_bufs: usize, max_len: usize, low_power: bool) -> Result<Buffer> {
        let num_bufs = num_bufs.max(1);
        let size = num_bufs.checked_mul(max_len).ok_or_else(|| {
            CycleKitError::NoMemory(format!("{num_bufs} buffers of {max_len} bytes overflow"))
        })?;
        let origin = if low_power { BufferOrigin::LowPowerPool } else { BufferOrigin::Pool };

        if let Some(pos) =
            self.free.iter().position(|e| e.low_power == low_power && e.size() >= size)
        {
            if let Some(mut entry) = self.free.remove(pos) {
                entry.reuse_count += 1;
                self.hits += 1;
                self.outstanding += 1;
                tracing::trace!(size, reuse_count = entry.reuse_count, "Buffer pool hit");
                let reuse_count = entry.reuse_count;
                return Buffer::from_storage(entry.storage, num_bufs, max_len, origin)
                    .map(|b| b.reused(reuse_count));
            }
        }

        let mut storage = Vec::new();
        storage.try_reserve_exact(size).map_err(|e| {
            CycleKitError::NoMemory(format!("buffer pool could not allocate {size} bytes: {e}"))
        })?;
        storage.resize(size, 0);
        self.misses += 1;
        self.outstanding += 1;
        tracing::trace!(size, "Buffer pool miss, allocated fresh storage");
        Buffer::from_storage(storage, num_bufs, max_len, origin)
    }

    /// Returns a buffer to the free list. Buffers not obtained from a pool are
    /// simply dropped.
    pub fn release(&mut self, buffer: Buffer) {
        let origin = buffer.origin();
        if !origin.is_pooled() {
            return;
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        let reuse_count = buffer.reuse_count();
        self.free.push_front(FreeEntry {
            storage: buffer.into_storage(),
            unused_count: 0,
            reuse_count,
            low_power: origin == BufferOrigin::LowPowerPool,
        });
    }

    /// Runs a sweep if the sweep interval has elapsed since the previous one.
    ///
    /// Each sweep ages every free entry by one and frees those whose unused
    /// count exceeds the configured maximum. Returns the number of evicted entries.
    pub fn maybe_sweep(&mut self, now: Instant, in_low_power: bool) -> usize {
        match self.last_sweep {
            Some(last) if now.saturating_duration_since(last) < self.sweep_interval => return 0,
            None => {
                self.last_sweep = Some(now);
                return 0;
            },
            Some(_) => {},
        }
        self.last_sweep = Some(now);

        let max_unused = self.max_unused_count;
        let before = self.free.len();
        self.free.retain_mut(|entry| {
            entry.unused_count = entry.unused_count.saturating_add(1);
            let expired = entry.unused_count > max_unused;
            // Regular memory can't be handed back to the allocator from low-power mode.
            let may_free = !in_low_power || entry.low_power;
            !(expired && may_free)
        });
        let evicted = before - self.free.len();
        if evicted > 0 {
            self.evictions += evicted as u64;
            tracing::debug!(evicted, remaining = self.free.len(), "Buffer pool sweep");
        }
        evicted
    }

    /// Frees all pooled memory. Returns the number of buffers that were never released.
    pub fn teardown(&mut self) -> usize {
        let leaked = self.outstanding;
        if leaked > 0 {
            tracing::error!(leaked, "Buffer pool torn down with outstanding buffers");
        }
        self.free.clear();
        self.outstanding = 0;
        self.last_sweep = None;
        leaked
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            outstanding: self.outstanding,
            free_entries: self.free.len(),
            free_bytes: self.free.iter().map(FreeEntry::size).sum(),
        }
    }
}
