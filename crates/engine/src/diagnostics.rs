// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Rate-limited error reporting and engine metrics.
//!
//! Data-path failures never abort a cycle. They are counted here, exported
//! as OpenTelemetry counters and logged at most once per print interval (and
//! only when the container's `check_for_error_print` gate agrees).

use crate::constants::METER_NAME;
use crate::host::ContainerCallbacks;
use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;
use std::time::{Duration, Instant};

/// Aggregate counters visible to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounts {
    pub process_failures: u64,
    pub markers_dropped: u64,
    pub offset_underflows: u64,
    /// Bytes a host write could not fit into an external input.
    pub overflowed_bytes: u64,
    pub suppressed_logs: u64,
}

pub struct Diagnostics {
    interval: Duration,
    last_print: Option<Instant>,
    counts: DiagnosticCounts,
    process_failures_counter: Counter<u64>,
    markers_dropped_counter: Counter<u64>,
    pool_misses_counter: Counter<u64>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("interval", &self.interval)
            .field("counts", &self.counts)
            .finish_non_exhaustive()
    }
}

impl Diagnostics {
    pub fn new(interval: Duration) -> Self {
        let meter = opentelemetry::global::meter(METER_NAME);
        let process_failures_counter = meter
            .u64_counter("topology.process_failures")
            .with_description("Number of module process calls that returned an error")
            .build();
        let markers_dropped_counter = meter
            .u64_counter("topology.markers_dropped")
            .with_description("Number of stream markers dropped before reaching a sink")
            .build();
        let pool_misses_counter = meter
            .u64_counter("topology.pool_misses")
            .with_description("Number of buffer pool requests that allocated fresh memory")
            .build();
        Self {
            interval,
            last_print: None,
            counts: DiagnosticCounts::default(),
            process_failures_counter,
            markers_dropped_counter,
            pool_misses_counter,
        }
    }

    pub const fn counts(&self) -> DiagnosticCounts {
        self.counts
    }

    /// Whether an error log may be emitted now. Suppressed logs are counted.
    pub fn should_print(&mut self, host: &mut dyn ContainerCallbacks) -> bool {
        let now = Instant::now();
        let due = self.last_print.is_none_or(|last| now.duration_since(last) >= self.interval);
        if due && host.check_for_error_print() {
            self.last_print = Some(now);
            true
        } else {
            self.counts.suppressed_logs += 1;
            false
        }
    }

    pub fn process_failed(
        &mut self,
        host: &mut dyn ContainerCallbacks,
        module: &str,
        error: &cyclekit_core::CycleKitError,
    ) {
        self.counts.process_failures += 1;
        self.process_failures_counter.add(1, &[KeyValue::new("kind", error.kind())]);
        if self.should_print(host) {
            tracing::error!(
                module,
                %error,
                failures = self.counts.process_failures,
                suppressed = self.counts.suppressed_logs,
                "Module process failed"
            );
        }
    }

    pub fn markers_dropped(&mut self, count: usize, reason: &'static str) {
        if count == 0 {
            return;
        }
        self.counts.markers_dropped += count as u64;
        self.markers_dropped_counter.add(count as u64, &[KeyValue::new("reason", reason)]);
        tracing::debug!(count, reason, "Dropped stream markers");
    }

    pub fn offset_underflow(&mut self, host: &mut dyn ContainerCallbacks, count: usize) {
        if count == 0 {
            return;
        }
        self.counts.offset_underflows += count as u64;
        if self.should_print(host) {
            tracing::error!(count, "Marker offset underflow, clamped to zero");
        }
    }

    pub fn write_overflow(
        &mut self,
        host: &mut dyn ContainerCallbacks,
        port: &crate::ids::PortId,
        dropped: usize,
    ) {
        if dropped == 0 {
            return;
        }
        self.counts.overflowed_bytes += dropped as u64;
        if self.should_print(host) {
            tracing::error!(%port, dropped, "External input overflow, excess bytes not accepted");
        }
    }

    pub fn pool_misses(&self, count: u64) {
        if count > 0 {
            self.pool_misses_counter.add(count, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    #[test]
    fn second_error_within_interval_is_suppressed() {
        let mut diag = Diagnostics::new(Duration::from_secs(60));
        let mut host = NullHost;
        assert!(diag.should_print(&mut host));
        assert!(!diag.should_print(&mut host));
        assert_eq!(diag.counts().suppressed_logs, 1);
    }

    #[test]
    fn failures_are_counted_even_when_suppressed() {
        let mut diag = Diagnostics::new(Duration::from_secs(60));
        let mut host = NullHost;
        let err = cyclekit_core::CycleKitError::Failed("boom".to_string());
        diag.process_failed(&mut host, "m0", &err);
        diag.process_failed(&mut host, "m0", &err);
        assert_eq!(diag.counts().process_failures, 2);
        assert_eq!(diag.counts().suppressed_logs, 1);
    }
}
