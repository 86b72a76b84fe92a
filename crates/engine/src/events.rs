// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Split event accumulators.
//!
//! The data path (and command code running synchronized with it) sets
//! [`EventFlags`] directly on the topology. Command code running concurrently
//! with processing holds an [`AsyncEventSender`] instead; its patches queue up
//! in a channel and are folded in only by [`EventAccumulator::reconcile`],
//! which the topology calls at the start of `process` and of event handling.

use tokio::sync::mpsc;

/// Pending work items discovered since the last event handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFlags {
    pub sort_dirty: bool,
    pub port_state_changed: bool,
    pub media_format_changed: bool,
    pub threshold_changed: bool,
    pub perf_changed: bool,
    pub algo_delay_changed: bool,
    pub process_state_changed: bool,
    pub inplace_changed: bool,
    pub trigger_policy_changed: bool,
}

impl EventFlags {
    /// Sets every flag that is set in `other`.
    pub const fn merge(&mut self, other: Self) {
        self.sort_dirty |= other.sort_dirty;
        self.port_state_changed |= other.port_state_changed;
        self.media_format_changed |= other.media_format_changed;
        self.threshold_changed |= other.threshold_changed;
        self.perf_changed |= other.perf_changed;
        self.algo_delay_changed |= other.algo_delay_changed;
        self.process_state_changed |= other.process_state_changed;
        self.inplace_changed |= other.inplace_changed;
        self.trigger_policy_changed |= other.trigger_policy_changed;
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the current flags and clears them.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Cloneable handle for setting event flags from outside the data path.
#[derive(Debug, Clone)]
pub struct AsyncEventSender {
    tx: mpsc::UnboundedSender<EventFlags>,
}

impl AsyncEventSender {
    /// Queues a patch. Returns false once the topology is gone.
    pub fn send(&self, flags: EventFlags) -> bool {
        self.tx.send(flags).is_ok()
    }
}

/// The synchronous flags plus the receiving end of the asynchronous channel.
#[derive(Debug)]
pub struct EventAccumulator {
    sync: EventFlags,
    tx: mpsc::UnboundedSender<EventFlags>,
    rx: mpsc::UnboundedReceiver<EventFlags>,
}

impl Default for EventAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventAccumulator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { sync: EventFlags::default(), tx, rx }
    }

    pub fn async_sender(&self) -> AsyncEventSender {
        AsyncEventSender { tx: self.tx.clone() }
    }

    /// Synchronous flags, for data-path updates.
    pub const fn flags_mut(&mut self) -> &mut EventFlags {
        &mut self.sync
    }

    pub const fn flags(&self) -> &EventFlags {
        &self.sync
    }

    /// Folds every queued asynchronous patch into the synchronous flags.
    /// Returns the number of patches merged.
    pub fn reconcile(&mut self) -> usize {
        let mut merged = 0;
        while let Ok(patch) = self.rx.try_recv() {
            self.sync.merge(patch);
            merged += 1;
        }
        if merged > 0 {
            tracing::trace!(merged, "Reconciled asynchronous event flags");
        }
        merged
    }

    /// Returns the pending flags and clears them.
    pub fn take(&mut self) -> EventFlags {
        self.sync.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_patches_only_visible_after_reconcile() {
        let mut acc = EventAccumulator::new();
        let sender = acc.async_sender();
        assert!(sender.send(EventFlags { perf_changed: true, ..EventFlags::default() }));
        assert!(acc.flags().is_empty());

        acc.flags_mut().sort_dirty = true;
        assert_eq!(acc.reconcile(), 1);
        let flags = acc.take();
        assert!(flags.perf_changed);
        assert!(flags.sort_dirty);
        assert!(acc.flags().is_empty());
    }

    #[tokio::test]
    async fn patches_from_another_task_are_merged() {
        let mut acc = EventAccumulator::new();
        let sender = acc.async_sender();
        let task = tokio::spawn(async move {
            sender.send(EventFlags { algo_delay_changed: true, ..EventFlags::default() });
            sender.send(EventFlags { threshold_changed: true, ..EventFlags::default() });
        });
        task.await.unwrap_or_else(|e| panic!("sender task failed: {e}"));
        assert_eq!(acc.reconcile(), 2);
        let flags = acc.take();
        assert!(flags.algo_delay_changed);
        assert!(flags.threshold_changed);
        assert!(!flags.sort_dirty);
    }
}
