// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Interning registry for media-format descriptors.
//!
//! Ports point at formats through a [`FormatHandle`]. Handles are neither
//! `Copy` nor `Clone`: a second reference must be obtained through
//! [`MediaFormatRegistry::share`], and every handle must be given back through
//! [`MediaFormatRegistry::release`]. The entry is removed exactly once, when the
//! last handle is released.

use crate::media_format::MediaFormat;
use std::sync::Arc;

/// Stable identifier of an interned descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatId(u32);

/// An owned reference to an interned descriptor.
#[derive(Debug, PartialEq, Eq)]
pub struct FormatHandle {
    id: FormatId,
}

impl FormatHandle {
    pub const fn id(&self) -> FormatId {
        self.id
    }
}

#[derive(Debug)]
struct Entry {
    id: FormatId,
    format: Arc<MediaFormat>,
    ref_count: u32,
}

/// Counters describing registry activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Descriptors allocated because no equal entry existed.
    pub allocations: u64,
    /// Intern calls satisfied by an existing entry.
    pub dedup_hits: u64,
    /// Entries removed after their last reference was released.
    pub removals: u64,
}

/// Owned per-topology interning list.
#[derive(Debug, Default)]
pub struct MediaFormatRegistry {
    entries: Vec<Entry>,
    next_id: u32,
    stats: RegistryStats,
}

impl MediaFormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to a descriptor equal to `format`, allocating one if needed.
    pub fn intern(&mut self, format: &MediaFormat) -> FormatHandle {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.format.as_ref() == format) {
            entry.ref_count += 1;
            self.stats.dedup_hits += 1;
            return FormatHandle { id: entry.id };
        }

        let id = FormatId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Entry { id, format: Arc::new(format.clone()), ref_count: 1 });
        self.stats.allocations += 1;
        tracing::trace!(?id, ?format, "Interned new media format");
        FormatHandle { id }
    }

    /// Issues another handle to the same descriptor.
    ///
    /// Returns `None` if the handle no longer refers to a live entry, which
    /// can only happen if it was forged from another registry.
    pub fn share(&mut self, handle: &FormatHandle) -> Option<FormatHandle> {
        let entry = self.entries.iter_mut().find(|e| e.id == handle.id)?;
        entry.ref_count += 1;
        Some(FormatHandle { id: entry.id })
    }

    /// Gives a handle back. Returns `true` when this was the last reference and
    /// the descriptor was removed.
    pub fn release(&mut self, handle: FormatHandle) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == handle.id) else {
            tracing::error!(id = ?handle.id, "Released a media format that is not registered");
            return false;
        };
        let entry = &mut self.entries[pos];
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return false;
        }
        self.entries.swap_remove(pos);
        self.stats.removals += 1;
        true
    }

    pub fn get(&self, handle: &FormatHandle) -> Option<&MediaFormat> {
        self.entries.iter().find(|e| e.id == handle.id).map(|e| e.format.as_ref())
    }

    /// Cheap shared copy of the descriptor for code that must outlive a borrow of the registry.
    pub fn get_arc(&self, handle: &FormatHandle) -> Option<Arc<MediaFormat>> {
        self.entries.iter().find(|e| e.id == handle.id).map(|e| e.format.clone())
    }

    pub fn ref_count(&self, handle: &FormatHandle) -> u32 {
        self.entries.iter().find(|e| e.id == handle.id).map_or(0, |e| e.ref_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn stats(&self) -> RegistryStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_formats_share_one_entry() {
        let mut reg = MediaFormatRegistry::new();
        let fmt = MediaFormat::pcm(48_000, 2, 16);
        let a = reg.intern(&fmt);
        let b = reg.intern(&fmt);
        assert_eq!(a.id(), b.id());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.ref_count(&a), 2);
        assert_eq!(reg.stats().allocations, 1);
        assert_eq!(reg.stats().dedup_hits, 1);

        let other = reg.intern(&MediaFormat::pcm(16_000, 1, 16));
        assert_ne!(other.id(), a.id());
        assert_eq!(reg.len(), 2);

        assert!(!reg.release(a));
        assert!(reg.release(b));
        assert!(reg.release(other));
        assert!(reg.is_empty());
    }

    #[test]
    fn released_format_is_removed_once_and_reinterned_fresh() {
        let mut reg = MediaFormatRegistry::new();
        let fmt = MediaFormat::pcm(44_100, 1, 24);
        let first = reg.intern(&fmt);
        let shared = reg.share(&first).unwrap_or_else(|| panic!("share failed"));
        assert_eq!(reg.ref_count(&first), 2);

        assert!(!reg.release(shared));
        assert!(reg.release(first));
        assert_eq!(reg.stats().removals, 1);
        assert!(reg.is_empty());

        let again = reg.intern(&fmt);
        let again2 = reg.intern(&fmt);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.stats().allocations, 2);
        assert_eq!(reg.get(&again), Some(&fmt));
        assert!(!reg.release(again));
        assert!(reg.release(again2));
        assert_eq!(reg.stats().removals, 2);
    }
}
