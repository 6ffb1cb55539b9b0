//! Bounded classification worker pool
//!
//! Ingestion submits freshly started records; workers classify them and
//! write the verdict back with `attach_signing`. Submission never blocks:
//! beyond the queue limit a record is marked `Unavailable` instead.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use super::Classifier;
use crate::constants::CLASSIFICATION_SATURATED;
use crate::diagnostics::Diagnostics;
use crate::models::{MonitorError, ProcessKey, ProcessRecord, SigningState};
use crate::table::ProcessTable;

/// Queued plus running classifications
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases one in-flight slot, also when the task panics
struct Slot(Arc<InFlight>);

impl Drop for Slot {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

pub struct ClassifierPool {
    pool: rayon::ThreadPool,
    classifier: Arc<Classifier>,
    table: Arc<ProcessTable>,
    diagnostics: Arc<Diagnostics>,
    queue_limit: usize,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
}

impl ClassifierPool {
    pub fn new(
        workers: usize,
        queue_limit: usize,
        classifier: Arc<Classifier>,
        table: Arc<ProcessTable>,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self, MonitorError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("procinfo-classify-{}", i))
            .panic_handler(|_| error!("Classification task panicked"))
            .build()?;
        Ok(Self {
            pool,
            classifier,
            table,
            diagnostics,
            queue_limit: queue_limit.max(1),
            in_flight: Arc::new(InFlight::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Queue classification of `record`. Returns false when the record was
    /// not queued (pool closed or saturated).
    pub fn submit(&self, record: &ProcessRecord) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let key = record.key();
        {
            let mut count = self.in_flight.lock();
            if *count >= self.queue_limit {
                drop(count);
                self.saturated(key);
                return false;
            }
            *count += 1;
        }

        let slot = Slot(self.in_flight.clone());
        let classifier = self.classifier.clone();
        let table = self.table.clone();
        let path: PathBuf = record.path.clone();
        self.pool.spawn(move || {
            let _slot = slot;
            let signing = classifier.classify(&path);
            if !table.attach_signing(key, signing) {
                debug!("Discarded classification of pid {} ({})", key.pid, path.display());
            }
        });
        true
    }

    fn saturated(&self, key: ProcessKey) {
        self.diagnostics.add_saturated_classifications(1);
        warn!("Classification queue full, pid {} left unclassified", key.pid);
        self.table
            .attach_signing(key, SigningState::Unavailable(CLASSIFICATION_SATURATED.to_string()));
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Stop accepting work and wait up to `timeout` for queued work to
    /// finish. Returns whether everything finished in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::Release);
        self.wait_idle(timeout)
    }

    /// Wait up to `timeout` for the queue to empty
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.lock();
        while *count > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("{} classifications still running at shutdown", *count);
                return false;
            }
            count = self
                .in_flight
                .idle
                .wait_timeout(count, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }
}
