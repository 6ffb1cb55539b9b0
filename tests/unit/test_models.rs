//! Unit tests for the public data models
//!
//! Tests the JSON contract of:
//! - ProcessEvent: tagged with `event_type`, record under `process`
//! - AuditEvent: tagged with `event`
//! - SigningDescriptor: entitlements omitted when not extracted

use std::path::PathBuf;

use procinfo::models::*;

use crate::helpers::at;

fn started(pid: Pid) -> ProcessStarted {
    ProcessStarted {
        pid,
        ppid: 1,
        uid: 0,
        gid: 0,
        path: PathBuf::from("/usr/sbin/cfprefsd"),
        args: vec!["cfprefsd".to_string(), "agent".to_string()],
        timestamp: at(0),
    }
}

#[test]
fn test_process_event_json_shape() {
    let record = ProcessRecord::from_started(&started(88), Some(ProcessKey::new(1, at(-10))));
    let value = serde_json::to_value(ProcessEvent::Started(record)).unwrap();

    assert_eq!(value["event_type"], "started");
    assert_eq!(value["process"]["pid"], 88);
    assert_eq!(value["process"]["ancestor"]["pid"], 1);
    assert_eq!(value["process"]["signing"]["state"], "pending");
    assert!(value["process"]["exit_code"].is_null());
}

#[test]
fn test_process_event_round_trips() {
    let mut record = ProcessRecord::from_started(&started(88), None);
    record.exit_code = Some(0);
    record.exit_time = Some(at(1));
    let event = ProcessEvent::Exited(record);

    let json = serde_json::to_string(&event).unwrap();
    let parsed: ProcessEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
}

#[test]
fn test_audit_event_is_tagged() {
    let value = serde_json::to_value(AuditEvent::ProcessExited(ProcessExited {
        pid: 5,
        exit_code: 2,
        timestamp: at(0),
    }))
    .unwrap();

    assert_eq!(value["event"], "process_exited");
    assert_eq!(value["exit_code"], 2);
}

#[test]
fn test_descriptor_omits_missing_entitlements() {
    let descriptor = SigningDescriptor {
        status: SigningStatus::AdHoc,
        ..SigningDescriptor::unsigned()
    };
    let value = serde_json::to_value(&descriptor).unwrap();

    assert_eq!(value["status"], "ad_hoc");
    assert!(value.get("entitlements").is_none());
}

#[test]
fn test_monitor_error_messages_name_the_device() {
    let err = MonitorError::DeviceOpen {
        path: PathBuf::from("/dev/auditpipe"),
        source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
    };
    assert!(err.to_string().contains("/dev/auditpipe"));
}
