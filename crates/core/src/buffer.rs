// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Staging buffers exchanged between ports.
//!
//! A [`Buffer`] is one contiguous allocation split into `num_bufs` equally sized
//! sub-buffers. Interleaved data uses a single sub-buffer; deinterleaved PCM uses
//! one per channel. All sub-buffers always hold the same number of valid bytes,
//! so lengths are tracked once, per sub-buffer.

use crate::error::{CycleKitError, Result};

/// Where a buffer's memory came from. Only pool-backed buffers go back to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferOrigin {
    Pool,
    LowPowerPool,
    External,
    Module,
    Heap,
}

impl BufferOrigin {
    pub const fn is_pooled(self) -> bool {
        matches!(self, Self::Pool | Self::LowPowerPool)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    num_bufs: usize,
    max_len: usize,
    actual_len: usize,
    origin: BufferOrigin,
    reuse_count: u64,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("num_bufs", &self.num_bufs)
            .field("max_len", &self.max_len)
            .field("actual_len", &self.actual_len)
            .field("origin", &self.origin)
            .field("reuse_count", &self.reuse_count)
            .finish_non_exhaustive()
    }
}

impl Buffer {
    /// Creates an empty buffer with `num_bufs` sub-buffers of `max_len` bytes each.
    ///
    /// # Errors
    ///
    /// `NoMemory` when the total size doesn't fit in `usize`.
    pub fn new(num_bufs: usize, max_len: usize, origin: BufferOrigin) -> Result<Self> {
        let num_bufs = num_bufs.max(1);
        let size = storage_len(num_bufs, max_len)?;
        Ok(Self { data: vec![0; size], num_bufs, max_len, actual_len: 0, origin, reuse_count: 0 })
    }

    /// Wraps existing storage. `storage` must be at least `num_bufs * max_len` bytes;
    /// it is grown with zeros otherwise.
    ///
    /// # Errors
    ///
    /// `NoMemory` when the total size doesn't fit in `usize`.
    pub fn from_storage(
        mut storage: Vec<u8>,
        num_bufs: usize,
        max_len: usize,
        origin: BufferOrigin,
    ) -> Result<Self> {
        let num_bufs = num_bufs.max(1);
        let needed = storage_len(num_bufs, max_len)?;
        if storage.len() < needed {
            storage.resize(needed, 0);
        }
        Ok(Self { data: storage, num_bufs, max_len, actual_len: 0, origin, reuse_count: 0 })
    }

    /// Marks storage that came back from a free list for the `count`th time.
    #[must_use]
    pub const fn reused(mut self, count: u64) -> Self {
        self.reuse_count = count;
        self
    }

    /// Single sub-buffer already full of `bytes`, as handed in by a host.
    pub fn from_bytes(bytes: &[u8], origin: BufferOrigin) -> Self {
        Self {
            data: bytes.to_vec(),
            num_bufs: 1,
            max_len: bytes.len(),
            actual_len: bytes.len(),
            origin,
            reuse_count: 0,
        }
    }

    pub const fn num_bufs(&self) -> usize {
        self.num_bufs
    }

    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    pub const fn actual_len(&self) -> usize {
        self.actual_len
    }

    pub const fn origin(&self) -> BufferOrigin {
        self.origin
    }

    /// How many times this buffer's storage was handed out again by a pool.
    pub const fn reuse_count(&self) -> u64 {
        self.reuse_count
    }

    pub const fn free_space(&self) -> usize {
        self.max_len - self.actual_len
    }

    pub const fn is_empty(&self) -> bool {
        self.actual_len == 0
    }

    pub const fn is_full(&self) -> bool {
        self.actual_len == self.max_len
    }

    /// Total bytes of backing storage.
    pub fn capacity_bytes(&self) -> usize {
        self.data.len()
    }

    /// Valid bytes of sub-buffer `index`.
    pub fn channel(&self, index: usize) -> &[u8] {
        let start = index * self.max_len;
        self.data.get(start..start + self.actual_len).unwrap_or(&[])
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.max_len;
        let end = start + self.actual_len;
        self.data.get_mut(start..end).unwrap_or(&mut [])
    }

    /// Appends `src` to a single-sub-buffer buffer. Returns the number of bytes written.
    pub fn push_bytes(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free_space());
        for ch in 0..self.num_bufs {
            let start = ch * self.max_len + self.actual_len;
            self.data[start..start + n].copy_from_slice(&src[..n]);
        }
        self.actual_len += n;
        n
    }

    /// Appends one slice per sub-buffer. The count written is bounded by the
    /// shortest slice and the free space, and is the same for every sub-buffer.
    /// Nothing is written when fewer slices than sub-buffers are given.
    pub fn push_channels(&mut self, src: &[&[u8]]) -> usize {
        if src.len() < self.num_bufs {
            return 0;
        }
        let shortest = src.iter().map(|s| s.len()).min().unwrap_or(0);
        let n = shortest.min(self.free_space());
        for (ch, slice) in src.iter().take(self.num_bufs).enumerate() {
            let start = ch * self.max_len + self.actual_len;
            self.data[start..start + n].copy_from_slice(&slice[..n]);
        }
        self.actual_len += n;
        n
    }

    /// Appends up to `n` zero bytes to every sub-buffer.
    pub fn push_zeros(&mut self, n: usize) -> usize {
        let n = n.min(self.free_space());
        for ch in 0..self.num_bufs {
            let start = ch * self.max_len + self.actual_len;
            self.data[start..start + n].fill(0);
        }
        self.actual_len += n;
        n
    }

    /// Appends bytes from the front of `other`'s valid region. Returns bytes copied per sub-buffer.
    pub fn append_from(&mut self, other: &Self) -> usize {
        let n = other.actual_len.min(self.free_space());
        let channels = self.num_bufs.min(other.num_bufs);
        for ch in 0..channels {
            let dst = ch * self.max_len + self.actual_len;
            let src = ch * other.max_len;
            self.data[dst..dst + n].copy_from_slice(&other.data[src..src + n]);
        }
        self.actual_len += n;
        n
    }

    /// Appends up to `max` bytes of `other` starting `skip` bytes into its
    /// valid region. Returns bytes copied per sub-buffer.
    pub fn append_range(&mut self, other: &Self, skip: usize, max: usize) -> usize {
        let available = other.actual_len.saturating_sub(skip);
        let n = available.min(max).min(self.free_space());
        let channels = self.num_bufs.min(other.num_bufs);
        for ch in 0..channels {
            let dst = ch * self.max_len + self.actual_len;
            let src = ch * other.max_len + skip;
            self.data[dst..dst + n].copy_from_slice(&other.data[src..src + n]);
        }
        self.actual_len += n;
        n
    }

    /// Drops `n` bytes from the front of every sub-buffer, shifting the rest down.
    pub fn consume_front(&mut self, n: usize) {
        let n = n.min(self.actual_len);
        if n == 0 {
            return;
        }
        let remaining = self.actual_len - n;
        for ch in 0..self.num_bufs {
            let base = ch * self.max_len;
            self.data.copy_within(base + n..base + self.actual_len, base);
        }
        self.actual_len = remaining;
    }

    /// Sets the valid length directly, clamped to the maximum.
    pub fn set_actual_len(&mut self, len: usize) {
        self.actual_len = len.min(self.max_len);
    }

    pub fn clear(&mut self) {
        self.actual_len = 0;
    }

    /// Gives back the storage so it can be returned to a pool.
    pub fn into_storage(self) -> Vec<u8> {
        self.data
    }
}

fn storage_len(num_bufs: usize, max_len: usize) -> Result<usize> {
    num_bufs.checked_mul(max_len).ok_or_else(|| {
        CycleKitError::NoMemory(format!("{num_bufs} buffers of {max_len} bytes overflow"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_consume_keep_channels_aligned() {
        let mut buf = Buffer::new(2, 8, BufferOrigin::Heap).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(buf.push_channels(&[&[1, 2, 3, 4], &[5, 6, 7, 8, 9]]), 4);
        assert_eq!(buf.channel(0), &[1, 2, 3, 4]);
        assert_eq!(buf.channel(1), &[5, 6, 7, 8]);

        buf.consume_front(3);
        assert_eq!(buf.actual_len(), 1);
        assert_eq!(buf.channel(0), &[4]);
        assert_eq!(buf.channel(1), &[8]);
    }

    #[test]
    fn writes_stop_at_capacity() {
        let mut buf = Buffer::new(1, 4, BufferOrigin::Pool).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(buf.push_bytes(&[1, 2, 3]), 3);
        assert_eq!(buf.push_zeros(5), 1);
        assert!(buf.is_full());
        assert_eq!(buf.channel(0), &[1, 2, 3, 0]);
        assert_eq!(buf.push_bytes(&[9]), 0);
    }

    #[test]
    fn append_from_other_buffer() {
        let src = Buffer::from_bytes(&[7, 7, 7], BufferOrigin::External);
        let mut dst = Buffer::new(1, 5, BufferOrigin::Pool).unwrap_or_else(|e| panic!("{e}"));
        dst.push_bytes(&[1]);
        assert_eq!(dst.append_from(&src), 3);
        assert_eq!(dst.channel(0), &[1, 7, 7, 7]);
    }

    #[test]
    fn append_range_skips_and_limits() {
        let mut src = Buffer::new(2, 6, BufferOrigin::Heap).unwrap_or_else(|e| panic!("{e}"));
        src.push_channels(&[&[1, 2, 3, 4, 5], &[6, 7, 8, 9, 10]]);
        let mut dst = Buffer::new(2, 3, BufferOrigin::Pool).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(dst.append_range(&src, 1, 10), 3);
        assert_eq!(dst.channel(0), &[2, 3, 4]);
        assert_eq!(dst.channel(1), &[7, 8, 9]);
        assert_eq!(dst.append_range(&src, 9, 10), 0);
    }

    #[test]
    fn missing_channel_slices_write_nothing() {
        let mut buf = Buffer::new(2, 8, BufferOrigin::Heap).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(buf.push_channels(&[&[1, 2, 3]]), 0);
        assert!(buf.is_empty());
        assert_eq!(buf.push_channels(&[]), 0);
    }

    #[test]
    fn oversized_layout_is_refused() {
        let err = Buffer::new(2, usize::MAX, BufferOrigin::Heap);
        assert!(matches!(err, Err(CycleKitError::NoMemory(_))));
        let err = Buffer::from_storage(Vec::new(), 3, usize::MAX / 2, BufferOrigin::Pool);
        assert!(matches!(err, Err(CycleKitError::NoMemory(_))));
    }
}
