use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::transfer::{TransferKey, TransferSnapshot};

struct StoreEntry {
    generation: u64,
    snapshot: TransferSnapshot,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<TransferKey, StoreEntry>,
    next_generation: u64,
}

/// process-wide map of the latest snapshot per transfer
///
/// every access goes through a single store-wide lock, so a reader never sees
/// a half written snapshot and transfers on distinct keys cannot interfere.
/// a transfer is identified by its key plus the generation handed out by
/// [`StatusStore::begin`]; a later transfer for the same url replaces the entry
/// and the earlier one loses the right to write or retire it.
#[derive(Default)]
pub struct StatusStore {
    inner: Mutex<StoreInner>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // entries are plain values, a panicking writer cannot leave one half built
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// register a new transfer for `key`, replacing whatever was there
    pub fn begin(&self, key: &TransferKey, snapshot: TransferSnapshot) -> u64 {
        let mut inner = self.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;
        if inner
            .entries
            .insert(key.clone(), StoreEntry { generation, snapshot })
            .is_some()
        {
            tracing::debug!("Replacing previous status entry for {}", key);
        }
        generation
    }

    /// replace the snapshot of `key` if `generation` still owns it
    pub fn put(&self, key: &TransferKey, generation: u64, snapshot: TransferSnapshot) -> bool {
        let mut inner = self.lock();
        match inner.entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.snapshot = snapshot;
                true
            }
            _ => false,
        }
    }

    /// latest snapshot for `key`, `None` if never published or already retired
    pub fn get(&self, key: &TransferKey) -> Option<TransferSnapshot> {
        self.lock().entries.get(key).map(|entry| entry.snapshot.clone())
    }

    /// remove the entry for `key` if `generation` still owns it
    pub fn retire(&self, key: &TransferKey, generation: u64) -> bool {
        let mut inner = self.lock();
        let owned = inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if owned {
            inner.entries.remove(key);
        }
        owned
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
