use std::sync::Arc;

use procinfo::audit::{ChannelSource, RecordWriter, TrailFile};
use procinfo::constants::AUE_EXECVE;
use procinfo::models::{Pid, SigningState};
use procinfo::monitor::Monitor;

use crate::helpers::*;

fn replay(records: &[Vec<u8>]) -> Monitor {
    let trail = write_trail(records);
    let monitor = Monitor::builder(fast_config())
        .source(TrailFile::open(trail.path()).unwrap())
        .verifier(Arc::new(ScriptedVerifier::apple()))
        .entitlement_reader(Arc::new(SandboxEntitlements))
        .start()
        .unwrap();
    monitor.wait().unwrap();
    monitor
}

fn pids(monitor: &Monitor) -> Vec<Pid> {
    monitor.snapshot().iter().map(|record| record.pid).collect()
}

#[test]
fn test_replay_builds_process_tree() {
    let monitor = replay(&short_lived_scenario());

    assert_eq!(pids(&monitor), vec![1, 100, 4242]);

    let child = monitor.get(4242).unwrap();
    assert_eq!(child.ppid, 100);
    assert_eq!(child.args, vec!["true".to_string()]);
    assert_eq!(child.exit_code, Some(0));
    assert_eq!(child.exit_time, Some(at(3)));

    let ancestry: Vec<Pid> = monitor.ancestors_of(4242).iter().map(|r| r.pid).collect();
    assert_eq!(ancestry, vec![100, 1]);
    assert!(monitor.ancestors_of(1).is_empty());

    let diagnostics = monitor.diagnostics();
    assert_eq!(diagnostics.records_decoded, 5);
    assert_eq!(diagnostics.events_emitted, 5);
    assert_eq!(diagnostics.orphan_exits, 1);
    assert!(monitor.get(55).is_none());

    monitor.stop().unwrap();
    assert!(monitor.snapshot().is_empty());
}

#[test]
fn test_chunk_boundaries_do_not_change_the_result() {
    let stream: Vec<u8> = short_lived_scenario().concat();
    let chunks: Vec<Vec<u8>> = stream.chunks(7).map(|chunk| chunk.to_vec()).collect();

    let monitor = Monitor::builder(fast_config())
        .source(ChannelSource::from_chunks(chunks))
        .verifier(Arc::new(ScriptedVerifier::apple()))
        .start()
        .unwrap();
    monitor.wait().unwrap();

    let whole = replay(&short_lived_scenario());
    assert_eq!(pids(&monitor), pids(&whole));
    assert_eq!(monitor.get(4242).unwrap().exit_time, whole.get(4242).unwrap().exit_time);
    assert_eq!(monitor.diagnostics().events_emitted, 5);
}

#[test]
fn test_garbage_between_records_is_skipped() {
    let mut records = short_lived_scenario();
    records.insert(2, vec![0xff; 13]);
    records.insert(0, vec![0x00; 5]);

    let monitor = replay(&records);

    assert_eq!(pids(&monitor), vec![1, 100, 4242]);
    let diagnostics = monitor.diagnostics();
    assert_eq!(diagnostics.events_emitted, 5);
    assert_eq!(diagnostics.skipped_bytes, 18);
}

#[test]
fn test_unknown_tokens_are_tolerated() {
    let record = RecordWriter::new(AUE_EXECVE, at(0))
        .raw_token(0xf0, b"future token")
        .subject64(0, 0, 300)
        .path("/usr/libexec/unknownd")
        .text("annotated")
        .exec_args(&["unknownd", "--flag"])
        .return32(0, 0)
        .finish64();

    let monitor = replay(&[record]);

    let record = monitor.get(300).unwrap();
    assert_eq!(record.args, vec!["unknownd".to_string(), "--flag".to_string()]);
    assert_eq!(monitor.diagnostics().malformed_tokens, 0);
}

#[test]
fn test_failed_exec_is_not_a_process() {
    let record = RecordWriter::new(AUE_EXECVE, at(0))
        .subject32(501, 20, 400)
        .path("/nonexistent")
        .exec_args(&["nonexistent"])
        .return32(2, u32::MAX)
        .finish();

    let monitor = replay(&[record]);

    assert!(monitor.get(400).is_none());
    assert_eq!(monitor.diagnostics().filtered_records, 1);
}

#[test]
fn test_classification_with_eager_entitlements() {
    let binary = tempfile::NamedTempFile::new().unwrap();
    let path = binary.path().to_str().unwrap().to_string();
    let verifier = Arc::new(ScriptedVerifier::apple());

    let mut config = fast_config();
    config.classifier.workers = 1;
    config.classifier.eager_entitlements = true;
    let trail = write_trail(&[
        procinfo::audit::writer::exec_record(500, &path, &["a"], at(0)),
        procinfo::audit::writer::exec_record(501, &path, &["b"], at(1)),
    ]);
    let monitor = Monitor::builder(config)
        .source(TrailFile::open(trail.path()).unwrap())
        .verifier(verifier.clone())
        .entitlement_reader(Arc::new(SandboxEntitlements))
        .start()
        .unwrap();
    monitor.wait().unwrap();

    assert!(wait_for(|| monitor
        .snapshot()
        .iter()
        .all(|record| !record.signing.is_pending())));

    let record = monitor.get(500).unwrap();
    let descriptor = record.signing.descriptor().unwrap();
    assert!(descriptor.is_apple);
    assert!(!descriptor.is_app_store);
    assert!(descriptor.entitlements.as_ref().unwrap().contains_key("com.apple.security.app-sandbox"));

    let entitlements = monitor.entitlements_of(501).unwrap().unwrap();
    assert_eq!(entitlements.len(), 1);

    // the second image of the same binary is served from the cache
    assert_eq!(verifier.calls(), 1);
    monitor.stop().unwrap();
}

#[test]
fn test_unreadable_binary_degrades_to_unavailable() {
    let monitor = replay(&[procinfo::audit::writer::exec_record(
        600,
        "/nonexistent/path/to/binary",
        &["binary"],
        at(0),
    )]);

    assert!(wait_for(|| monitor.get(600).map_or(false, |r| !r.signing.is_pending())));
    assert!(matches!(monitor.get(600).unwrap().signing, SigningState::Unavailable(_)));
    monitor.stop().unwrap();
}
