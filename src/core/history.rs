use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::core::storage::PersistenceGateway;
use crate::shared::error::AppResult;
use crate::shared::types::{StatePatch, TranslationHistoryItem};

/// Maximum number of translations kept
pub const MAX_HISTORY_SIZE: usize = 50;

/// Bounded, newest-first translation history.
///
/// The in-memory list is authoritative. Every mutation writes the whole list
/// through the gateway while still holding the list lock, so writes land in
/// the order the mutations happened. A failed write is reported to the
/// caller but the in-memory change stands.
pub struct HistoryStore {
    items: Mutex<Vec<TranslationHistoryItem>>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl HistoryStore {
    /// Empty store; call `load` to pull persisted entries
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            gateway,
        }
    }

    fn lock_items(&self) -> MutexGuard<'_, Vec<TranslationHistoryItem>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("[HistoryStore] Mutex poisoned, recovering...");
                poisoned.into_inner()
            }
        }
    }

    /// Replace the in-memory list with what the gateway holds.
    /// Oversized persisted lists are cut to the newest entries.
    pub fn load(&self) -> AppResult<usize> {
        let mut persisted = self.gateway.load()?.history;
        if persisted.len() > MAX_HISTORY_SIZE {
            warn!(
                "[HistoryStore] Persisted history has {} entries, keeping newest {}",
                persisted.len(),
                MAX_HISTORY_SIZE
            );
            persisted.truncate(MAX_HISTORY_SIZE);
        }
        let count = persisted.len();
        *self.lock_items() = persisted;
        debug!(count, "Loaded translation history");
        Ok(count)
    }

    /// Prepend `item`, evict the oldest beyond the cap, persist the result
    pub fn append(&self, item: TranslationHistoryItem) -> AppResult<()> {
        let mut items = self.lock_items();
        items.insert(0, item);
        if items.len() > MAX_HISTORY_SIZE {
            items.truncate(MAX_HISTORY_SIZE);
        }
        // Written under the lock: stored order always matches mutation order
        self.gateway.save(StatePatch::history(items.clone()))
    }

    /// Empty the list and persist the empty list
    pub fn clear(&self) -> AppResult<()> {
        let mut items = self.lock_items();
        items.clear();
        self.gateway.save(StatePatch::history(Vec::new()))
    }

    /// Newest first
    pub fn list(&self) -> Vec<TranslationHistoryItem> {
        self.lock_items().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
