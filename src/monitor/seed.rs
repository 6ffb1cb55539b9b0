//! Seeding the table with processes that were running before monitoring
//! started, so their exits are not reported as orphans.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;

use chrono::{TimeZone, Utc};
use log::{debug, info};
use sysinfo::{PidExt, ProcessExt, System, SystemExt};

use crate::constants::MAX_ANCESTRY_DEPTH;
use crate::models::{Pid, ProcessStarted};
use crate::signing::ClassifierPool;
use crate::table::ProcessTable;

fn raw_id<T: Deref<Target = u32>>(id: T) -> u32 {
    *id
}

/// Currently running processes as start events
pub fn running_processes() -> Vec<ProcessStarted> {
    let mut system = System::new();
    system.refresh_processes();

    system
        .processes()
        .values()
        .filter_map(|process| {
            let timestamp = Utc.timestamp_opt(process.start_time() as i64, 0).single()?;
            Some(ProcessStarted {
                pid: process.pid().as_u32(),
                ppid: process.parent().map(|parent| parent.as_u32()).unwrap_or(0),
                uid: process.user_id().map(|uid| raw_id(uid.clone())).unwrap_or(0),
                gid: process.group_id().map(|gid| raw_id(gid.clone())).unwrap_or(0),
                path: process.exe().to_path_buf(),
                args: process.cmd().to_vec(),
                timestamp,
            })
        })
        .collect()
}

/// Order `processes` so every parent precedes its children
pub fn parents_first(processes: Vec<ProcessStarted>) -> Vec<ProcessStarted> {
    let mut by_pid: HashMap<Pid, ProcessStarted> = processes.into_iter().map(|p| (p.pid, p)).collect();
    let mut pids: Vec<Pid> = by_pid.keys().copied().collect();
    pids.sort_unstable();

    let mut placed = HashSet::new();
    let mut ordered = Vec::with_capacity(by_pid.len());
    for pid in pids {
        let mut chain = Vec::new();
        let mut current = Some(pid);
        while let Some(pid) = current {
            if placed.contains(&pid) || chain.contains(&pid) || chain.len() > MAX_ANCESTRY_DEPTH {
                break;
            }
            let Some(process) = by_pid.get(&pid) else { break };
            chain.push(pid);
            current = Some(process.ppid).filter(|&ppid| ppid != pid);
        }
        for pid in chain.into_iter().rev() {
            placed.insert(pid);
            if let Some(process) = by_pid.remove(&pid) {
                ordered.push(process);
            }
        }
    }
    ordered
}

/// Insert every running process and queue its classification
pub fn seed_table(table: &ProcessTable, classifier: &ClassifierPool) -> usize {
    let processes = parents_first(running_processes());
    let mut seeded = 0;
    for process in &processes {
        match table.on_started(process) {
            Ok(record) => {
                seeded += 1;
                if !record.path.as_os_str().is_empty() {
                    classifier.submit(&record);
                }
            }
            Err(err) => debug!("Skipping seeded process: {}", err),
        }
    }
    info!("Seeded process table with {} running processes", seeded);
    seeded
}
