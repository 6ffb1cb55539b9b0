//! Process table
//!
//! Live and recently exited processes keyed by `(pid, start_time)`. One
//! ingestion thread writes; the classifier and any number of readers share
//! it. Every mutation happens under a single write lock, so `snapshot` and
//! `ancestors_of` never observe a half-applied event.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, warn};

use crate::constants::MAX_ANCESTRY_DEPTH;
use crate::diagnostics::Diagnostics;
use crate::models::{Pid, ProcessExited, ProcessKey, ProcessRecord, ProcessStarted, SigningState, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("duplicate start for pid {} at {}", .0.pid, .0.start_time)]
    DuplicateStart(ProcessKey),
}

#[derive(Default)]
struct TableState {
    records: HashMap<ProcessKey, ProcessRecord>,
    /// Current image of every live pid
    live: HashMap<Pid, ProcessKey>,
    /// Exited records in exit order, oldest first
    exited: VecDeque<ProcessKey>,
}

impl TableState {
    /// Live image of `pid`, else its most recent exited image
    fn lookup(&self, pid: Pid) -> Option<&ProcessRecord> {
        if let Some(key) = self.live.get(&pid) {
            return self.records.get(key);
        }
        self.records
            .values()
            .filter(|record| record.pid == pid)
            .max_by_key(|record| record.start_time)
    }

    /// Live parent image that may have launched a process started at `start_time`
    fn live_parent(&self, ppid: Pid, child: ProcessKey) -> Option<ProcessKey> {
        if ppid == 0 {
            return None;
        }
        self.live
            .get(&ppid)
            .copied()
            .filter(|key| *key != child && key.start_time <= child.start_time)
    }

    fn remove(&mut self, key: &ProcessKey) -> Option<ProcessRecord> {
        let record = self.records.remove(key)?;
        if self.live.get(&key.pid) == Some(key) {
            self.live.remove(&key.pid);
        }
        if let Some(pos) = self.exited.iter().position(|k| k == key) {
            self.exited.remove(pos);
        }
        Some(record)
    }
}

pub struct ProcessTable {
    state: RwLock<TableState>,
    grace_period: chrono::Duration,
    capacity: usize,
    diagnostics: Arc<Diagnostics>,
}

impl ProcessTable {
    pub fn new(grace_period: Duration, capacity: usize, diagnostics: Arc<Diagnostics>) -> Self {
        let grace_period = chrono::Duration::from_std(grace_period).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            state: RwLock::new(TableState::default()),
            grace_period,
            capacity: capacity.max(1),
            diagnostics,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TableState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert the record for a newly started image.
    ///
    /// A start for a pid whose current image started at or after this one is
    /// a duplicate and is dropped; the earlier record wins. A start for a pid
    /// with an older live image ends that image at the new start time.
    pub fn on_started(&self, event: &ProcessStarted) -> Result<ProcessRecord, TableError> {
        let key = ProcessKey::new(event.pid, event.timestamp);
        let mut state = self.write();

        let existing = state.live.get(&event.pid).copied();
        if state.records.contains_key(&key) || existing.map_or(false, |live| live.start_time >= key.start_time) {
            drop(state);
            self.diagnostics.add_duplicate_starts(1);
            debug!("Duplicate start for pid {} at {}, keeping earlier record", key.pid, key.start_time);
            return Err(TableError::DuplicateStart(key));
        }
        if let Some(previous) = existing {
            // exec replaced the image without an intervening exit
            if let Some(old) = state.records.get_mut(&previous) {
                old.exit_time = Some(event.timestamp);
                old.exit_code = None;
            }
            state.exited.push_back(previous);
        }

        let ancestor = state.live_parent(event.ppid, key);
        let record = ProcessRecord::from_started(event, ancestor);
        state.records.insert(key, record.clone());
        state.live.insert(event.pid, key);

        let evicted = self.enforce_capacity(&mut state);
        drop(state);
        if evicted > 0 {
            self.diagnostics.add_evicted_records(evicted as u64);
        }
        Ok(record)
    }

    /// Mark the live image of `event.pid` as exited. Exits for pids with no
    /// live image are counted and otherwise ignored.
    pub fn on_exited(&self, event: &ProcessExited) -> Option<ProcessRecord> {
        let mut state = self.write();
        let key = match state.live.remove(&event.pid) {
            Some(key) => key,
            None => {
                drop(state);
                self.diagnostics.add_orphan_exits(1);
                debug!("Exit for untracked pid {} (code {})", event.pid, event.exit_code);
                return None;
            }
        };
        let record = state.records.get_mut(&key)?;
        record.exit_code = Some(event.exit_code);
        record.exit_time = Some(event.timestamp.max(record.start_time));
        let record = record.clone();
        state.exited.push_back(key);
        Some(record)
    }

    /// Attach a classification result. Only a pending record is updated;
    /// a record evicted in the meantime stays evicted.
    pub fn attach_signing(&self, key: ProcessKey, signing: SigningState) -> bool {
        let mut state = self.write();
        let Some(record) = state.records.get_mut(&key) else {
            self.diagnostics.add_late_classifications(1);
            debug!("Classification for pid {} arrived after eviction", key.pid);
            return false;
        };
        if !record.signing.is_pending() {
            return false;
        }
        record.signing = signing;
        true
    }

    /// Ancestry chain of `pid`, parent first, excluding the process itself.
    ///
    /// Links captured at start are followed first; a record without one
    /// falls back to whichever live image of its ppid started before it.
    /// The walk stops at a root, an unresolvable link, a repeated key or
    /// `MAX_ANCESTRY_DEPTH` hops.
    pub fn ancestors_of(&self, pid: Pid) -> Vec<ProcessRecord> {
        let state = self.read();
        let mut chain = Vec::new();
        let mut current = match state.lookup(pid) {
            Some(record) => record,
            None => return chain,
        };
        let mut visited = HashSet::from([current.key()]);
        let mut truncated = false;

        loop {
            let next = match current.ancestor {
                Some(key) if state.records.contains_key(&key) => Some(key),
                Some(_) => {
                    truncated = true;
                    None
                }
                None => state.live_parent(current.ppid, current.key()),
            };
            let Some(next) = next else { break };
            if chain.len() >= MAX_ANCESTRY_DEPTH || !visited.insert(next) {
                truncated = true;
                break;
            }
            let Some(parent) = state.records.get(&next) else { break };
            chain.push(parent.clone());
            current = parent;
        }
        drop(state);

        if truncated {
            self.diagnostics.add_truncated_ancestry(1);
            debug!("Ancestry of pid {} truncated after {} links", pid, chain.len());
        }
        chain
    }

    /// Copy of every record, ordered by start time
    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<ProcessRecord> = self.read().records.values().cloned().collect();
        records.sort_by_key(|record| record.key().start_time);
        records
    }

    /// Live image of `pid`, else its most recent exited image
    pub fn get(&self, pid: Pid) -> Option<ProcessRecord> {
        self.read().lookup(pid).cloned()
    }

    pub fn get_by_key(&self, key: &ProcessKey) -> Option<ProcessRecord> {
        self.read().records.get(key).cloned()
    }

    /// Remove one record. Evicting an absent record is a no-op.
    pub fn evict(&self, key: &ProcessKey) -> Option<ProcessRecord> {
        let removed = self.write().remove(key);
        if removed.is_some() {
            self.diagnostics.add_evicted_records(1);
        }
        removed
    }

    /// Evict exited records whose grace period has elapsed at `now`
    pub fn evict_expired(&self, now: Timestamp) -> usize {
        let mut state = self.write();
        let expired: Vec<ProcessKey> = state
            .exited
            .iter()
            .filter(|key| {
                state.records.get(key).and_then(|r| r.exit_time).map_or(true, |exit_time| {
                    exit_time + self.grace_period <= now
                })
            })
            .copied()
            .collect();
        let evicted = expired.iter().filter(|key| state.remove(key).is_some()).count();
        drop(state);
        if evicted > 0 {
            self.diagnostics.add_evicted_records(evicted as u64);
            debug!("Evicted {} expired process records", evicted);
        }
        evicted
    }

    fn enforce_capacity(&self, state: &mut TableState) -> usize {
        let mut evicted = 0;
        while state.records.len() > self.capacity {
            let Some(oldest) = state.exited.pop_front() else {
                warn!(
                    "Process table over capacity ({} live records, capacity {})",
                    state.records.len(),
                    self.capacity
                );
                break;
            };
            if state.records.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_count(&self) -> usize {
        self.read().live.len()
    }

    /// Drop every record
    pub fn clear(&self) {
        let mut state = self.write();
        state.records.clear();
        state.live.clear();
        state.exited.clear();
    }
}
