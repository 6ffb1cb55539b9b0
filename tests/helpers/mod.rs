//! Shared fixtures: synthetic audit trails and scripted signing primitives

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

use procinfo::audit::writer::{exec_record, exit_record, spawn_record};
use procinfo::config::MonitorConfig;
use procinfo::models::{SigningStatus, Timestamp};
use procinfo::signing::{EntitlementReader, SigningError, TrustVerifier, Verification};

/// Fixed base time so printed timestamps are predictable
pub fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

/// launchd, a shell it spawned, a short-lived `true` spawned by the shell
/// and an exit for a pid that never started
pub fn short_lived_scenario() -> Vec<Vec<u8>> {
    vec![
        exec_record(1, "/sbin/launchd", &["launchd"], at(0)),
        spawn_record(1, 100, "/bin/zsh", &["zsh", "-l"], at(1)),
        spawn_record(100, 4242, "/usr/bin/true", &["true"], at(2)),
        exit_record(4242, 0, at(3)),
        exit_record(55, 1, at(4)),
    ]
}

/// Write `records` back to back into a temporary trail file
pub fn write_trail(records: &[Vec<u8>]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for record in records {
        file.write_all(record).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Configuration file that keeps tests fast and independent of the
/// user's own configuration
pub fn write_config(extra: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[audit]\npoll_interval_ms = 10\n{}", extra).unwrap();
    file.flush().unwrap();
    file
}

pub fn fast_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.audit.poll_interval_ms = 10;
    config.classifier.workers = 2;
    config
}

/// Poll `condition` for up to five seconds
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Verifier returning the same verdict for every path
pub struct ScriptedVerifier {
    verification: Verification,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn apple() -> Self {
        Self {
            verification: Verification {
                status: SigningStatus::Valid,
                authorities: vec![
                    "Software Signing".to_string(),
                    "Apple Code Signing Certification Authority".to_string(),
                    "Apple Root CA".to_string(),
                ],
                is_apple: true,
                is_apple_dev_id: false,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrustVerifier for ScriptedVerifier {
    fn verify(&self, _path: &Path) -> Result<Verification, SigningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verification.clone())
    }
}

/// Every binary carries the same single entitlement
pub struct SandboxEntitlements;

impl EntitlementReader for SandboxEntitlements {
    fn entitlements(&self, _path: &Path) -> Result<HashMap<String, serde_json::Value>, SigningError> {
        Ok(HashMap::from([(
            "com.apple.security.app-sandbox".to_string(),
            serde_json::Value::Bool(true),
        )]))
    }
}
