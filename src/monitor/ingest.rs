//! Ingestion: decoded events applied to the table, hub and classifier

use std::sync::Arc;
use std::time::Instant;

use log::trace;

use crate::audit::StreamDecoder;
use crate::dispatch::DispatchHub;
use crate::logging;
use crate::models::{AuditEvent, ProcessEvent, Timestamp};
use crate::signing::ClassifierPool;
use crate::table::ProcessTable;

/// Owned by the ingestion thread. Applies each event to the table first,
/// then notifies subscribers, then queues classification.
pub struct Ingestor {
    decoder: StreamDecoder,
    table: Arc<ProcessTable>,
    hub: Arc<DispatchHub>,
    classifier: Arc<ClassifierPool>,
    /// Latest audit timestamp and when it was seen; retention is measured
    /// on the audit clock so replayed trails age the same way live ones do
    clock: Option<(Timestamp, Instant)>,
}

impl Ingestor {
    pub fn new(
        decoder: StreamDecoder,
        table: Arc<ProcessTable>,
        hub: Arc<DispatchHub>,
        classifier: Arc<ClassifierPool>,
    ) -> Self {
        Self {
            decoder,
            table,
            hub,
            classifier,
            clock: None,
        }
    }

    /// Decode `chunk` and apply every completed event. Returns how many
    /// events were decoded.
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        let events = self.decoder.feed(chunk);
        let count = events.len();
        for event in events {
            self.apply(event);
        }
        self.expire();
        count
    }

    /// No data this poll interval
    pub fn idle(&mut self) {
        self.expire();
    }

    /// End of stream
    pub fn finish(&mut self) {
        self.decoder.finish();
    }

    fn apply(&mut self, event: AuditEvent) {
        let timestamp = event.timestamp();
        if self.clock.map_or(true, |(latest, _)| timestamp >= latest) {
            self.clock = Some((timestamp, Instant::now()));
        }
        match event {
            AuditEvent::ProcessStarted(started) => {
                let previous = self.table.get(started.pid).filter(|record| record.is_alive());
                if let Ok(record) = self.table.on_started(&started) {
                    // exec without an exit ends the previous image
                    if let Some(replaced) = previous.and_then(|old| self.table.get_by_key(&old.key())) {
                        let event = ProcessEvent::Exited(replaced);
                        logging::log_event(&event);
                        self.hub.publish(&event);
                    }
                    let event = ProcessEvent::Started(record);
                    logging::log_event(&event);
                    self.hub.publish(&event);
                    self.classifier.submit(event.record());
                }
            }
            AuditEvent::ProcessExited(exited) => {
                if let Some(record) = self.table.on_exited(&exited) {
                    let event = ProcessEvent::Exited(record);
                    logging::log_event(&event);
                    self.hub.publish(&event);
                }
            }
        }
    }

    fn now(&self) -> Option<Timestamp> {
        let (latest, seen) = self.clock?;
        let elapsed = chrono::Duration::from_std(seen.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        Some(latest + elapsed)
    }

    fn expire(&self) {
        if let Some(now) = self.now() {
            let evicted = self.table.evict_expired(now);
            if evicted > 0 {
                trace!("Retention sweep at {} evicted {} records", now, evicted);
            }
        }
    }
}
