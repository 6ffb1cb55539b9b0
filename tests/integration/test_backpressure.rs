use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use procinfo::audit::writer::exec_record;
use procinfo::audit::ChannelSource;
use procinfo::dispatch::Backpressure;
use procinfo::models::{Pid, ProcessEvent};
use procinfo::monitor::Monitor;

use crate::helpers::*;

fn ten_starts() -> Vec<Vec<u8>> {
    (1..=10).map(|pid| exec_record(pid, "/bin/sh", &["sh"], at(pid as i64))).collect()
}

#[test]
fn test_slow_subscriber_loses_oldest_notifications() {
    let mut config = fast_config();
    config.dispatch.queue_capacity = 2;
    config.dispatch.backpressure = Backpressure::DropOldest;
    let monitor = Monitor::builder(config)
        .source(ChannelSource::from_chunks(ten_starts()))
        .verifier(Arc::new(ScriptedVerifier::apple()))
        .build()
        .unwrap();

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let received = Arc::new(Mutex::new(Vec::<Pid>::new()));
    let sink = received.clone();
    let slow = monitor
        .subscribe(move |event: ProcessEvent| {
            let _ = gate_rx.recv();
            sink.lock().unwrap().push(event.record().pid);
        })
        .unwrap();

    monitor.run().unwrap();
    monitor.wait().unwrap();
    drop(gate_tx);
    monitor.stop().unwrap();
    slow.join();

    let received = received.lock().unwrap().clone();
    let dropped = monitor.diagnostics().dropped_notifications;
    assert!(dropped > 0);
    assert_eq!(received.len() as u64 + dropped, 10);
    assert_eq!(received.last(), Some(&10));
    assert!(received.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_panicking_subscriber_does_not_affect_others() {
    let monitor = Monitor::builder(fast_config())
        .source(ChannelSource::from_chunks(ten_starts()))
        .verifier(Arc::new(ScriptedVerifier::apple()))
        .build()
        .unwrap();

    let faulty = monitor
        .subscribe(|event: ProcessEvent| {
            if event.record().pid % 2 == 0 {
                panic!("subscriber failure");
            }
        })
        .unwrap();
    let (tx, rx) = mpsc::channel();
    let healthy = monitor
        .subscribe(move |event: ProcessEvent| {
            let _ = tx.send(event.record().pid);
        })
        .unwrap();

    monitor.run().unwrap();
    monitor.wait().unwrap();
    monitor.stop().unwrap();
    faulty.join();
    healthy.join();

    assert_eq!(rx.iter().collect::<Vec<Pid>>(), (1..=10).collect::<Vec<Pid>>());
    assert!(monitor.snapshot().is_empty());
}

#[test]
fn test_cancelled_subscription_stops_receiving() {
    let (tx, source) = ChannelSource::new();
    let monitor = Monitor::builder(fast_config())
        .source(source)
        .verifier(Arc::new(ScriptedVerifier::apple()))
        .start()
        .unwrap();

    let (events_tx, events_rx) = mpsc::channel();
    let subscription = monitor
        .subscribe(move |event: ProcessEvent| {
            let _ = events_tx.send(event.record().pid);
        })
        .unwrap();

    tx.send(exec_record(1, "/bin/sh", &["sh"], at(0)));
    assert_eq!(events_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 1);

    subscription.cancel();
    tx.send(exec_record(2, "/bin/sh", &["sh"], at(1)));
    assert!(wait_for(|| monitor.get(2).is_some()));
    monitor.stop().unwrap();

    assert!(events_rx.recv().is_err());
}
