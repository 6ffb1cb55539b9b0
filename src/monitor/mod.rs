//! Monitor context
//!
//! Owns the ingestion thread, the process table, the classification pool,
//! the dispatch hub and the diagnostics counters for one monitoring session.
//! Everything is torn down by [`Monitor::stop`] (or on drop).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::audit::{Assembler, AuditPipe, NoParentResolver, ParentResolver, RecordSource, StreamDecoder, SystemParentResolver};
use crate::config::MonitorConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::dispatch::{DispatchHub, Subscription};
use crate::models::{MonitorError, Pid, ProcessEvent, ProcessRecord};
use crate::signing::{
    Classifier, ClassifierPool, CodesignEntitlements, CodesignVerifier, EntitlementReader, SigningError,
    TrustVerifier,
};
use crate::table::ProcessTable;

pub mod ingest;
pub mod seed;

pub use ingest::Ingestor;

type IngestHandle = JoinHandle<Result<(), MonitorError>>;

/// Assembles a [`Monitor`]. Without an explicit source the configured audit
/// device is opened; the default verifier and entitlement reader use
/// `codesign`.
pub struct MonitorBuilder {
    config: MonitorConfig,
    source: Option<Box<dyn RecordSource>>,
    verifier: Option<Arc<dyn TrustVerifier>>,
    entitlements: Option<Arc<dyn EntitlementReader>>,
    parents: Option<Arc<dyn ParentResolver>>,
}

impl MonitorBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            source: None,
            verifier: None,
            entitlements: None,
            parents: None,
        }
    }

    /// Read records from `source` instead of the audit device
    pub fn source(mut self, source: impl RecordSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn TrustVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn entitlement_reader(mut self, entitlements: Arc<dyn EntitlementReader>) -> Self {
        self.entitlements = Some(entitlements);
        self
    }

    /// Parent lookup for exec records. Defaults to the live process list
    /// when reading the device and to no lookup for other sources.
    pub fn parent_resolver(mut self, parents: Arc<dyn ParentResolver>) -> Self {
        self.parents = Some(parents);
        self
    }

    /// Open the source and start ingesting. Device and configuration errors
    /// are reported here, before any record is processed.
    pub fn start(self) -> Result<Monitor, MonitorError> {
        let monitor = self.build()?;
        monitor.run()?;
        Ok(monitor)
    }

    /// Open the source and assemble the pipeline without reading yet, so
    /// subscribers can register before the first event. Call
    /// [`Monitor::run`] to begin ingestion.
    pub fn build(self) -> Result<Monitor, MonitorError> {
        let MonitorBuilder {
            config,
            source,
            verifier,
            entitlements,
            parents,
        } = self;
        config.validate()?;

        let (source, default_parents): (Box<dyn RecordSource>, Arc<dyn ParentResolver>) = match source {
            Some(source) => (source, Arc::new(NoParentResolver)),
            None => (
                Box::new(AuditPipe::open(&config.audit.device, config.audit.class_mask)?),
                Arc::new(SystemParentResolver::new()),
            ),
        };
        let parents = parents.unwrap_or(default_parents);

        let diagnostics = Arc::new(Diagnostics::default());
        let table = Arc::new(ProcessTable::new(
            config.grace_period(),
            config.table.capacity,
            diagnostics.clone(),
        ));
        let hub = Arc::new(DispatchHub::new(
            config.dispatch.queue_capacity,
            config.dispatch.backpressure,
            diagnostics.clone(),
        ));
        let classifier = Arc::new(Classifier::new(
            verifier.unwrap_or_else(|| Arc::new(CodesignVerifier::default())),
            entitlements.unwrap_or_else(|| Arc::new(CodesignEntitlements::default())),
            config.classifier.cache_capacity,
            config.classifier.eager_entitlements,
        ));
        let pool = Arc::new(ClassifierPool::new(
            config.classifier.workers,
            config.classifier.queue_limit,
            classifier,
            table.clone(),
            diagnostics.clone(),
        )?);

        if config.audit.seed_running_processes {
            seed::seed_table(&table, &pool);
        }

        let decoder = StreamDecoder::new(Assembler::new(parents), diagnostics.clone());
        let ingestor = Ingestor::new(decoder, table.clone(), hub.clone(), pool.clone());

        Ok(Monitor {
            config,
            table,
            hub,
            pool,
            diagnostics,
            running: Arc::new(AtomicBool::new(true)),
            pending: Mutex::new(Some((source, ingestor))),
            ingest: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }
}

/// Reader loop run on the ingestion thread. The source (and with it the
/// device handle) is dropped when the loop returns.
fn ingest_loop(
    mut source: Box<dyn RecordSource>,
    mut ingestor: Ingestor,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) -> Result<(), MonitorError> {
    while running.load(Ordering::SeqCst) {
        match source.next_chunk(poll_interval) {
            Ok(None) => ingestor.idle(),
            Ok(Some(chunk)) if chunk.is_empty() => {
                ingestor.finish();
                info!("Audit stream ended");
                return Ok(());
            }
            Ok(Some(chunk)) => {
                ingestor.feed(chunk);
            }
            Err(err) => {
                error!("Ingestion stopped: {}", err);
                return Err(err);
            }
        }
    }
    debug!("Ingestion cancelled");
    Ok(())
}

/// A running monitoring session
pub struct Monitor {
    config: MonitorConfig,
    table: Arc<ProcessTable>,
    hub: Arc<DispatchHub>,
    pool: Arc<ClassifierPool>,
    diagnostics: Arc<Diagnostics>,
    running: Arc<AtomicBool>,
    /// Source and ingestor waiting for [`Monitor::run`]
    pending: Mutex<Option<(Box<dyn RecordSource>, Ingestor)>>,
    ingest: Mutex<Option<IngestHandle>>,
    stopped: AtomicBool,
}

impl Monitor {
    /// Start monitoring the audit device described by `config`
    pub fn start(config: MonitorConfig) -> Result<Self, MonitorError> {
        MonitorBuilder::new(config).start()
    }

    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    /// Spawn the ingestion thread. Only the first call has an effect.
    pub fn run(&self) -> Result<(), MonitorError> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some((source, ingestor)) = pending else {
            return Ok(());
        };
        let running = self.running.clone();
        let poll_interval = self.config.poll_interval();
        let handle = thread::Builder::new()
            .name("procinfo-ingest".to_string())
            .spawn(move || ingest_loop(source, ingestor, running, poll_interval))
            .map_err(|source| MonitorError::Spawn { name: "ingest", source })?;
        *self.handle() = Some(handle);
        info!("Process monitor started");
        Ok(())
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Every record currently in the table, oldest start first
    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        self.table.snapshot()
    }

    /// Ancestors of `pid`, parent first
    pub fn ancestors_of(&self, pid: Pid) -> Vec<ProcessRecord> {
        self.table.ancestors_of(pid)
    }

    pub fn get(&self, pid: Pid) -> Option<ProcessRecord> {
        self.table.get(pid)
    }

    /// Receive every lifecycle event published from now on
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, MonitorError>
    where
        F: FnMut(ProcessEvent) + Send + 'static,
    {
        self.hub.subscribe(callback)
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Entitlements of the image currently known for `pid`. Uses the eagerly
    /// extracted set when classification captured one.
    pub fn entitlements_of(&self, pid: Pid) -> Result<Option<HashMap<String, Value>>, SigningError> {
        let Some(record) = self.table.get(pid) else {
            return Ok(None);
        };
        if let Some(entitlements) = record.signing.descriptor().and_then(|d| d.entitlements.clone()) {
            return Ok(Some(entitlements));
        }
        self.pool.classifier().entitlements_of(&record.path).map(Some)
    }

    /// Whether the ingestion thread is still reading
    pub fn is_running(&self) -> bool {
        self.handle()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Block until the source ends (or fails). The monitor still needs
    /// [`Monitor::stop`] afterwards to release the other workers.
    pub fn wait(&self) -> Result<(), MonitorError> {
        let handle = self.handle().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| MonitorError::IngestPanicked)?,
            None => Ok(()),
        }
    }

    /// Stop ingestion, drain classification up to the configured timeout,
    /// close the hub and clear the table. Returns the ingestion error, if
    /// any. Calling it again is a no-op.
    pub fn stop(&self) -> Result<(), MonitorError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        let result = self.wait();

        if !self.pool.shutdown(self.config.shutdown_timeout()) {
            warn!("Classification did not drain within {:?}", self.config.shutdown_timeout());
        }
        self.hub.close();
        self.table.clear();
        info!("Process monitor stopped");
        result
    }

    fn handle(&self) -> std::sync::MutexGuard<'_, Option<IngestHandle>> {
        self.ingest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("Monitor stopped with error: {}", err);
        }
    }
}
