//! Signing verdict cache
//!
//! Keyed by path; an entry is valid only while the binary's modification
//! time is unchanged. Least recently used entries go first when full.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::models::SigningDescriptor;

struct Entry {
    modified: SystemTime,
    descriptor: SigningDescriptor,
    last_used: u64,
}

#[derive(Default)]
struct Entries {
    map: HashMap<PathBuf, Entry>,
    clock: u64,
}

pub struct SigningCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl SigningCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached verdict for `path`, if it was computed for this `modified` time
    pub fn get(&self, path: &Path, modified: SystemTime) -> Option<SigningDescriptor> {
        let mut entries = self.lock();
        entries.clock += 1;
        let now = entries.clock;
        match entries.map.get_mut(path) {
            Some(entry) if entry.modified == modified => {
                entry.last_used = now;
                Some(entry.descriptor.clone())
            }
            Some(_) => {
                entries.map.remove(path);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, path: &Path, modified: SystemTime, descriptor: SigningDescriptor) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        if !entries.map.contains_key(path) && entries.map.len() >= self.capacity {
            let oldest = entries
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(path, _)| path.clone());
            if let Some(oldest) = oldest {
                entries.map.remove(&oldest);
            }
        }
        entries.clock += 1;
        let last_used = entries.clock;
        entries.map.insert(
            path.to_path_buf(),
            Entry {
                modified,
                descriptor,
                last_used,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().map.clear();
    }
}
