use std::sync::Arc;

use procinfo::audit::writer::{exec_record, exit_record};
use procinfo::audit::ChannelSource;
use procinfo::monitor::Monitor;

use crate::helpers::*;

fn live_monitor(grace_period_secs: f64) -> (procinfo::audit::ChunkSender, Monitor) {
    let mut config = fast_config();
    config.table.grace_period_secs = grace_period_secs;
    let (tx, source) = ChannelSource::new();
    let monitor = Monitor::builder(config)
        .source(source)
        .verifier(Arc::new(ScriptedVerifier::apple()))
        .start()
        .unwrap();
    (tx, monitor)
}

#[test]
fn test_exited_process_stays_queryable_during_grace_period() {
    let (tx, monitor) = live_monitor(30.0);

    tx.send(exec_record(10, "/bin/sleep", &["sleep", "1"], at(0)));
    tx.send(exit_record(10, 0, at(1)));
    tx.send(exec_record(11, "/bin/ls", &["ls"], at(2)));
    assert!(wait_for(|| monitor.get(11).is_some()));

    let exited = monitor.get(10).unwrap();
    assert!(!exited.is_alive());
    assert_eq!(exited.exit_code, Some(0));
    monitor.stop().unwrap();
}

#[test]
fn test_exited_process_is_evicted_after_grace_period() {
    let (tx, monitor) = live_monitor(0.0);

    tx.send(exec_record(10, "/bin/sleep", &["sleep", "1"], at(0)));
    tx.send(exit_record(10, 0, at(1)));
    tx.send(exec_record(11, "/bin/ls", &["ls"], at(5)));

    assert!(wait_for(|| monitor.get(11).is_some() && monitor.get(10).is_none()));
    assert!(monitor.diagnostics().evicted_records >= 1);

    // an exit arriving after eviction does not resurrect the record
    tx.send(exit_record(10, 0, at(6)));
    assert!(wait_for(|| monitor.diagnostics().orphan_exits == 1));
    assert!(monitor.get(10).is_none());
    monitor.stop().unwrap();
}

#[test]
fn test_reused_pid_gets_a_new_record() {
    let (tx, monitor) = live_monitor(30.0);

    tx.send(exec_record(10, "/bin/sh", &["sh"], at(0)));
    tx.send(exit_record(10, 0, at(1)));
    tx.send(exec_record(10, "/bin/cat", &["cat"], at(2)));
    assert!(wait_for(|| monitor.get(10).map_or(false, |r| r.start_time == at(2))));

    let current = monitor.get(10).unwrap();
    assert!(current.is_alive());
    assert_eq!(current.args, vec!["cat".to_string()]);

    let images: Vec<_> = monitor.snapshot().into_iter().filter(|r| r.pid == 10).collect();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].exit_time, Some(at(1)));
    monitor.stop().unwrap();
}

#[test]
fn test_duplicate_start_keeps_the_first_record() {
    let (tx, monitor) = live_monitor(30.0);

    tx.send(exec_record(10, "/bin/sh", &["first"], at(0)));
    tx.send(exec_record(10, "/bin/sh", &["second"], at(0)));
    tx.send(exec_record(12, "/bin/ls", &["ls"], at(1)));
    assert!(wait_for(|| monitor.get(12).is_some()));

    assert_eq!(monitor.get(10).unwrap().args, vec!["first".to_string()]);
    assert_eq!(monitor.diagnostics().duplicate_starts, 1);
    monitor.stop().unwrap();
}
