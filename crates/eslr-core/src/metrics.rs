//! Counters for the silently-dropped cases of spec §7.
//!
//! "No error is ever surfaced to the host stack; the routing protocol
//! is always-on best-effort from the stack's perspective." These
//! counters are the ambient observability surface that replaces the
//! errors a less best-effort protocol would return — a host can sample
//! them the way the teacher's daemons expose a `MetricsCollector`
//! (`neighsyncd::metrics`), without the engine itself depending on any
//! particular metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters, one per dropped-packet cause (spec §7).
#[derive(Debug, Default)]
pub struct DropCounters {
    decode_errors: AtomicU64,
    authentication_failures: AtomicU64,
    loopback_source: AtomicU64,
    excluded_interface: AtomicU64,
    unknown_neighbor: AtomicU64,
    stale_sequence: AtomicU64,
}

/// Point-in-time snapshot of [`DropCounters`], safe to log or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DropCountersSnapshot {
    pub decode_errors: u64,
    pub authentication_failures: u64,
    pub loopback_source: u64,
    pub excluded_interface: u64,
    pub unknown_neighbor: u64,
    pub stale_sequence: u64,
}

macro_rules! counter_methods {
    ($($field:ident => $inc:ident),* $(,)?) => {
        impl DropCounters {
            $(
                pub fn $inc(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> DropCountersSnapshot {
                DropCountersSnapshot {
                    $( $field: self.$field.load(Ordering::Relaxed), )*
                }
            }
        }
    };
}

counter_methods!(
    decode_errors => record_decode_error,
    authentication_failures => record_authentication_failure,
    loopback_source => record_loopback_source,
    excluded_interface => record_excluded_interface,
    unknown_neighbor => record_unknown_neighbor,
    stale_sequence => record_stale_sequence,
);
