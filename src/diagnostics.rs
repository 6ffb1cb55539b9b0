//! Recoverable anomaly counters
//!
//! Every component shares one `Diagnostics` instance. Counters only ever
//! grow; `snapshot` gives a consistent-enough copy for reporting.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Diagnostics {
    records_decoded: AtomicU64,
    events_emitted: AtomicU64,
    filtered_records: AtomicU64,
    malformed_tokens: AtomicU64,
    invalid_records: AtomicU64,
    skipped_bytes: AtomicU64,
    duplicate_starts: AtomicU64,
    orphan_exits: AtomicU64,
    late_classifications: AtomicU64,
    saturated_classifications: AtomicU64,
    truncated_ancestry: AtomicU64,
    dropped_notifications: AtomicU64,
    evicted_records: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub records_decoded: u64,
    pub events_emitted: u64,
    pub filtered_records: u64,
    pub malformed_tokens: u64,
    pub invalid_records: u64,
    pub skipped_bytes: u64,
    pub duplicate_starts: u64,
    pub orphan_exits: u64,
    pub late_classifications: u64,
    pub saturated_classifications: u64,
    pub truncated_ancestry: u64,
    pub dropped_notifications: u64,
    pub evicted_records: u64,
}

macro_rules! counters {
    ($($field:ident => $inc:ident),* $(,)?) => {
        impl Diagnostics {
            $(
                pub fn $inc(&self, n: u64) {
                    self.$field.fetch_add(n, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> DiagnosticsSnapshot {
                DiagnosticsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    records_decoded => add_records_decoded,
    events_emitted => add_events_emitted,
    filtered_records => add_filtered_records,
    malformed_tokens => add_malformed_tokens,
    invalid_records => add_invalid_records,
    skipped_bytes => add_skipped_bytes,
    duplicate_starts => add_duplicate_starts,
    orphan_exits => add_orphan_exits,
    late_classifications => add_late_classifications,
    saturated_classifications => add_saturated_classifications,
    truncated_ancestry => add_truncated_ancestry,
    dropped_notifications => add_dropped_notifications,
    evicted_records => add_evicted_records,
}

impl DiagnosticsSnapshot {
    /// Total number of recoverable anomalies
    pub fn anomalies(&self) -> u64 {
        self.malformed_tokens
            + self.invalid_records
            + self.duplicate_starts
            + self.orphan_exits
            + self.late_classifications
            + self.saturated_classifications
            + self.truncated_ancestry
            + self.dropped_notifications
    }
}
