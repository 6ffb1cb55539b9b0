use std::sync::Arc;

use procinfo::audit::writer::{exec_record, exit_record};
use procinfo::audit::{Assembled, Assembler, RecordWriter, StreamDecoder};
use procinfo::constants::{AUE_EXECVE, AUE_FORK};
use procinfo::diagnostics::Diagnostics;
use procinfo::models::{AuditEvent, Pid};

use crate::helpers::{at, short_lived_scenario};

fn resolver(pid: Pid) -> Option<Pid> {
    (pid == 900).then_some(1)
}

#[test]
fn test_closure_resolves_exec_parent() {
    let assembler = Assembler::new(Arc::new(resolver));

    match assembler.assemble(&exec_record(900, "/bin/sh", &["sh"], at(0))).unwrap() {
        Assembled::Event(AuditEvent::ProcessStarted(started)) => assert_eq!(started.ppid, 1),
        other => panic!("unexpected {:?}", other),
    }
    match assembler.assemble(&exec_record(901, "/bin/sh", &["sh"], at(0))).unwrap() {
        Assembled::Event(AuditEvent::ProcessStarted(started)) => assert_eq!(started.ppid, 0),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_extended_subject_and_64_bit_header() {
    let record = RecordWriter::new(AUE_EXECVE, at(0))
        .subject32_ex(501, 20, 902)
        .path("/usr/bin/login")
        .exec_args(&["login", "-pf", "user"])
        .return32(0, 0)
        .finish64();
    let assembler = Assembler::new(Arc::new(resolver));

    match assembler.assemble(&record).unwrap() {
        Assembled::Event(AuditEvent::ProcessStarted(started)) => {
            assert_eq!(started.pid, 902);
            assert_eq!(started.uid, 501);
            assert_eq!(started.args.len(), 3);
            assert_eq!(started.timestamp, at(0));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_fork_is_filtered() {
    let record = RecordWriter::new(AUE_FORK, at(0)).subject32(0, 0, 1).return32(0, 2).finish();
    let assembler = Assembler::new(Arc::new(resolver));
    assert!(matches!(assembler.assemble(&record).unwrap(), Assembled::Filtered));
}

#[test]
fn test_byte_by_byte_feed_matches_single_feed() {
    let stream: Vec<u8> = short_lived_scenario().concat();

    let mut whole = StreamDecoder::new(Assembler::new(Arc::new(resolver)), Arc::new(Diagnostics::default()));
    let expected = whole.feed(&stream);

    let diagnostics = Arc::new(Diagnostics::default());
    let mut trickle = StreamDecoder::new(Assembler::new(Arc::new(resolver)), diagnostics.clone());
    let mut events = Vec::new();
    for byte in &stream {
        events.extend(trickle.feed(std::slice::from_ref(byte)));
    }

    assert_eq!(events, expected);
    assert_eq!(events.len(), 5);
    assert_eq!(trickle.pending_len(), 0);
    assert_eq!(diagnostics.snapshot().skipped_bytes, 0);
}

#[test]
fn test_truncated_tail_waits_for_more_data() {
    let record = exit_record(7, 0, at(0));
    let diagnostics = Arc::new(Diagnostics::default());
    let mut decoder = StreamDecoder::new(Assembler::new(Arc::new(resolver)), diagnostics.clone());

    assert!(decoder.feed(&record[..record.len() - 1]).is_empty());
    assert_eq!(decoder.pending_len(), record.len() - 1);
    assert_eq!(decoder.feed(&record[record.len() - 1..]).len(), 1);
    assert_eq!(diagnostics.snapshot().events_emitted, 1);
}
