//! Output formatting module
//!
//! Handles:
//! - Human-readable event lines
//! - JSON lines output
//! - Path filtering of printed events
//! - The diagnostics summary printed at exit

use anyhow::{anyhow, Result};
use glob::Pattern;
use serde::Serialize;
use std::path::Path;
use std::time::SystemTime;
use time::OffsetDateTime;

use procinfo::constants::{EVENT_PROCESS_EXITED, EVENT_PROCESS_STARTED};
use procinfo::diagnostics::DiagnosticsSnapshot;
use procinfo::models::{Pid, ProcessEvent, ProcessRecord, SigningState, SigningStatus, Timestamp};

/// Check if a filter string contains glob pattern characters
fn is_glob_pattern(filter: &str) -> bool {
    filter.contains('*') || filter.contains('?') || filter.contains('[')
}

/// Executable path filter. Plain filters match by path prefix, filters with
/// glob characters match the whole path. No filters matches everything.
#[derive(Debug, Default)]
pub struct PathFilter {
    prefixes: Vec<String>,
    patterns: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(filters: &[String]) -> Result<Self> {
        let mut filter = Self::default();
        for value in filters {
            if is_glob_pattern(value) {
                let pattern = Pattern::new(value).map_err(|e| anyhow!("Invalid glob pattern '{}': {}", value, e))?;
                filter.patterns.push(pattern);
            } else {
                filter.prefixes.push(value.clone());
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.patterns.is_empty()
    }

    pub fn matches(&self, path: &Path) -> bool {
        if self.is_empty() {
            return true;
        }
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
            || self.patterns.iter().any(|pattern| pattern.matches_path(path))
    }
}

/// One printed event
#[derive(Debug, Serialize)]
pub struct EventLine {
    pub timestamp: String,
    pub event_type: &'static str,
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
    pub path: String,
    pub args: Vec<String>,
    pub uid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub signing: SigningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ancestry: Option<Vec<Pid>>,
}

/// ISO-8601 rendering of an event time
pub fn format_timestamp(timestamp: &Timestamp) -> Result<String> {
    let timestamp = OffsetDateTime::from(SystemTime::from(*timestamp));
    Ok(timestamp.format(&time::format_description::well_known::Iso8601::DEFAULT)?)
}

/// Build the printed form of `event`. `ancestors` is listed parent first
/// when ancestry output is enabled.
pub fn create_event_line(event: &ProcessEvent, ancestors: Option<&[ProcessRecord]>) -> Result<EventLine> {
    let record = event.record();
    let (event_type, time) = match event {
        ProcessEvent::Started(r) => (EVENT_PROCESS_STARTED, r.start_time),
        ProcessEvent::Exited(r) => (EVENT_PROCESS_EXITED, r.exit_time.unwrap_or(r.start_time)),
    };
    Ok(EventLine {
        timestamp: format_timestamp(&time)?,
        event_type,
        pid: record.pid,
        ppid: record.ppid,
        name: record.name(),
        path: record.path.display().to_string(),
        args: record.args.clone(),
        uid: record.uid,
        exit_code: record.exit_code,
        signing: record.signing.clone(),
        ancestry: ancestors.map(|chain| chain.iter().map(|r| r.pid).collect()),
    })
}

fn describe_signing(signing: &SigningState) -> String {
    match signing {
        SigningState::Pending => "pending".to_string(),
        SigningState::Unavailable(reason) => format!("unavailable ({})", reason),
        SigningState::Resolved(descriptor) => {
            let status = match descriptor.status {
                SigningStatus::Unsigned => "unsigned",
                SigningStatus::AdHoc => "ad-hoc",
                SigningStatus::Valid => "valid",
                SigningStatus::Invalid => "invalid",
                SigningStatus::Revoked => "revoked",
            };
            let signer = if descriptor.is_apple {
                Some("Apple")
            } else if descriptor.is_app_store {
                Some("App Store")
            } else if descriptor.is_apple_dev_id {
                Some("Developer ID")
            } else {
                None
            };
            match signer {
                Some(signer) => format!("{}, {}", status, signer),
                None => status.to_string(),
            }
        }
    }
}

/// Format an event as human-readable text
pub fn format_event_human(line: &EventLine) -> String {
    let mut text = match line.exit_code {
        Some(code) if line.event_type == EVENT_PROCESS_EXITED => format!(
            "[{}] Process exited: {} (PID: {}, exit code: {})",
            line.timestamp, line.name, line.pid, code
        ),
        _ if line.event_type == EVENT_PROCESS_EXITED => {
            format!("[{}] Process replaced: {} (PID: {})", line.timestamp, line.name, line.pid)
        }
        _ => format!(
            "[{}] Process started: {} (PID: {}, PPID: {})\n  Path: {}\n  Args: {}",
            line.timestamp,
            line.name,
            line.pid,
            line.ppid,
            line.path,
            line.args.join(" ")
        ),
    };
    if line.event_type == EVENT_PROCESS_EXITED {
        text.push_str(&format!("\n  Signing: {}", describe_signing(&line.signing)));
    }
    if let Some(ancestry) = &line.ancestry {
        let chain: Vec<String> = ancestry.iter().map(|pid| pid.to_string()).collect();
        text.push_str(&format!("\n  Ancestry: {}", if chain.is_empty() { "(none)".to_string() } else { chain.join(" <- ") }));
    }
    text
}

/// Format an event as a JSON line
pub fn format_event_json(line: &EventLine) -> Result<String> {
    Ok(serde_json::to_string(line)?)
}

/// Diagnostics summary as human-readable text
pub fn format_diagnostics_human(diagnostics: &DiagnosticsSnapshot) -> String {
    let mut lines = vec![
        "Monitoring Summary:".to_string(),
        format!("  Records decoded: {}", diagnostics.records_decoded),
        format!("  Events emitted: {}", diagnostics.events_emitted),
    ];
    let anomalies = [
        ("Malformed tokens", diagnostics.malformed_tokens),
        ("Invalid records", diagnostics.invalid_records),
        ("Skipped bytes", diagnostics.skipped_bytes),
        ("Duplicate starts", diagnostics.duplicate_starts),
        ("Orphan exits", diagnostics.orphan_exits),
        ("Late classifications", diagnostics.late_classifications),
        ("Saturated classifications", diagnostics.saturated_classifications),
        ("Truncated ancestry", diagnostics.truncated_ancestry),
        ("Dropped notifications", diagnostics.dropped_notifications),
    ];
    for (label, count) in anomalies {
        if count > 0 {
            lines.push(format!("  {}: {}", label, count));
        }
    }
    lines.join("\n")
}

/// Diagnostics summary as a JSON line
pub fn format_diagnostics_json(diagnostics: &DiagnosticsSnapshot) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "event_type": "diagnostics",
        "diagnostics": diagnostics,
    }))?)
}
