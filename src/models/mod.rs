//! Data models module
//!
//! Defines core data structures:
//! - AuditEvent: a process-exec or process-exit assembled from one audit record
//! - ProcessRecord: the long-lived entity kept in the process table
//! - SigningState / SigningDescriptor: the trust verdict attached to a record
//! - MonitorError: fatal pipeline and configuration errors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;


/// Process identifier as reported by the kernel
pub type Pid = u32;

/// Kernel-reported event time
pub type Timestamp = DateTime<Utc>;

/// Identity of one process image: pid values are reused, (pid, start_time) is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessKey {
    pub pid: Pid,
    pub start_time: Timestamp,
}

impl ProcessKey {
    pub fn new(pid: Pid, start_time: Timestamp) -> Self {
        Self { pid, start_time }
    }
}

/// A process image started (exec or posix_spawn)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStarted {
    pub pid: Pid,
    pub ppid: Pid,
    pub uid: u32,
    pub gid: u32,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub timestamp: Timestamp,
}

/// A process terminated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExited {
    pub pid: Pid,
    pub exit_code: i32,
    pub timestamp: Timestamp,
}

/// Lifecycle event assembled from a single kernel audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ProcessStarted(ProcessStarted),
    ProcessExited(ProcessExited),
}

impl AuditEvent {
    pub fn pid(&self) -> Pid {
        match self {
            AuditEvent::ProcessStarted(e) => e.pid,
            AuditEvent::ProcessExited(e) => e.pid,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            AuditEvent::ProcessStarted(e) => e.timestamp,
            AuditEvent::ProcessExited(e) => e.timestamp,
        }
    }
}

/// Code signature validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningStatus {
    Unsigned,
    AdHoc,
    Valid,
    Invalid,
    Revoked,
}

/// Trust verdict for one binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningDescriptor {
    pub status: SigningStatus,
    /// Signed by Apple proper
    pub is_apple: bool,
    /// Signed with an Apple-issued third-party certificate
    pub is_apple_dev_id: bool,
    /// Distributed through the Mac App Store
    pub is_app_store: bool,
    /// Signing authorities, leaf first
    pub authorities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<HashMap<String, serde_json::Value>>,
}

impl SigningDescriptor {
    pub fn unsigned() -> Self {
        Self {
            status: SigningStatus::Unsigned,
            is_apple: false,
            is_apple_dev_id: false,
            is_app_store: false,
            authorities: Vec::new(),
            entitlements: None,
        }
    }
}

/// Classification progress of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum SigningState {
    Pending,
    Resolved(SigningDescriptor),
    Unavailable(String),
}

impl SigningState {
    pub fn is_pending(&self) -> bool {
        matches!(self, SigningState::Pending)
    }

    pub fn descriptor(&self) -> Option<&SigningDescriptor> {
        match self {
            SigningState::Resolved(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// A process known to the table, alive or recently exited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub ppid: Pid,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub uid: u32,
    pub gid: u32,
    pub start_time: Timestamp,
    pub exit_code: Option<i32>,
    pub exit_time: Option<Timestamp>,
    /// Parent image captured at start, when the parent was already tracked.
    /// A weak reference: it may point at a record that has since been evicted.
    pub ancestor: Option<ProcessKey>,
    pub signing: SigningState,
}

impl ProcessRecord {
    pub fn from_started(event: &ProcessStarted, ancestor: Option<ProcessKey>) -> Self {
        Self {
            pid: event.pid,
            ppid: event.ppid,
            path: event.path.clone(),
            args: event.args.clone(),
            uid: event.uid,
            gid: event.gid,
            start_time: event.timestamp,
            exit_code: None,
            exit_time: None,
            ancestor,
            signing: SigningState::Pending,
        }
    }

    pub fn key(&self) -> ProcessKey {
        ProcessKey::new(self.pid, self.start_time)
    }

    pub fn ancestor_pid(&self) -> Option<Pid> {
        self.ancestor.map(|key| key.pid)
    }

    pub fn is_alive(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Executable name (last path component)
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "process", rename_all = "snake_case")]
pub enum ProcessEvent {
    Started(ProcessRecord),
    Exited(ProcessRecord),
}

impl ProcessEvent {
    pub fn record(&self) -> &ProcessRecord {
        match self {
            ProcessEvent::Started(record) | ProcessEvent::Exited(record) => record,
        }
    }
}

/// Errors that stop (or prevent) the monitoring pipeline
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to open audit device {}: {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure audit device ({request}): {source}")]
    DeviceConfigure {
        request: &'static str,
        source: nix::Error,
    },
    #[error("audit device read failed: {0}")]
    DeviceRead(#[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to read configuration {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("failed to build classification pool: {0}")]
    ClassifierPool(#[from] rayon::ThreadPoolBuildError),
    #[error("ingestion thread panicked")]
    IngestPanicked,
}
