//! Persistence gateway for the single `{ scripts, history }` record.
//!
//! `save` merges: only the fields present in the patch replace stored data.

use std::path::Path;
use std::sync::{Arc, Mutex};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use crate::shared::error::{AppError, AppResult};
use crate::shared::types::{PersistedState, StatePatch};

/// Fixed key under which the whole record lives
pub const STORAGE_KEY: &str = "scriptdesk-data";
pub const DB_FILE_NAME: &str = "scriptdesk.redb";

/// Key: STORAGE_KEY, Value: JSON-serialized PersistedState
const STATE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("app_state");

pub trait PersistenceGateway: Send + Sync {
    /// Absent record yields empty scripts and history
    fn load(&self) -> AppResult<PersistedState>;
    /// Read-merge-write. On error the previously stored record is unchanged.
    fn save(&self, patch: StatePatch) -> AppResult<()>;
}

/// redb-backed gateway. The merge happens inside one write transaction.
pub struct RedbGateway {
    db: Arc<Mutex<Database>>,
}

impl RedbGateway {
    /// Open (or create) `scriptdesk.redb` inside `data_dir`
    pub fn open(data_dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Persistence(format!("Failed to create data directory: {}", e)))?;

        let path = data_dir.join(DB_FILE_NAME);
        let db = Database::create(&path)
            .map_err(|e| AppError::Persistence(format!("Failed to create database: {}", e)))?;

        {
            let write_txn = db.begin_write()
                .map_err(|e| AppError::Persistence(format!("Failed to begin write transaction: {}", e)))?;
            {
                let _table = write_txn.open_table(STATE_TABLE)
                    .map_err(|e| AppError::Persistence(format!("Failed to open table: {}", e)))?;
            }
            write_txn.commit()
                .map_err(|e| AppError::Persistence(format!("Failed to commit transaction: {}", e)))?;
        }

        debug!(path = %path.display(), "Opened state database");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn lock_db(&self) -> std::sync::MutexGuard<'_, Database> {
        match self.db.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("[RedbGateway] Database mutex poisoned, recovering...");
                poisoned.into_inner()
            }
        }
    }
}

fn decode(raw: &str) -> AppResult<PersistedState> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Persistence(format!("Stored state is unreadable: {}", e)))
}

impl PersistenceGateway for RedbGateway {
    fn load(&self) -> AppResult<PersistedState> {
        let db = self.lock_db();

        let read_txn = db.begin_read()
            .map_err(|e| AppError::Persistence(format!("Failed to begin read: {}", e)))?;

        let table = match read_txn.open_table(STATE_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(PersistedState::default()),
            Err(e) => return Err(AppError::Persistence(format!("Failed to open table: {}", e))),
        };

        let entry = table.get(STORAGE_KEY)
            .map_err(|e| AppError::Persistence(format!("Failed to read state: {}", e)))?;

        match entry {
            Some(value) => decode(value.value()),
            None => Ok(PersistedState::default()),
        }
    }

    fn save(&self, patch: StatePatch) -> AppResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let db = self.lock_db();

        let write_txn = db.begin_write()
            .map_err(|e| AppError::Persistence(format!("Failed to begin write: {}", e)))?;

        {
            let mut table = write_txn.open_table(STATE_TABLE)
                .map_err(|e| AppError::Persistence(format!("Failed to open table: {}", e)))?;

            let mut state = {
                let existing = table.get(STORAGE_KEY)
                    .map_err(|e| AppError::Persistence(format!("Failed to read state: {}", e)))?;
                match existing {
                    Some(value) => decode(value.value())?,
                    None => PersistedState::default(),
                }
            };

            patch.apply_to(&mut state);

            let serialized = serde_json::to_string(&state)
                .map_err(|e| AppError::Persistence(format!("Serialization error: {}", e)))?;

            table.insert(STORAGE_KEY, serialized.as_str())
                .map_err(|e| AppError::Persistence(format!("Failed to write state: {}", e)))?;
        }

        // Dropping an uncommitted transaction aborts it, so early returns above leave the old record
        write_txn.commit()
            .map_err(|e| AppError::Persistence(format!("Failed to commit: {}", e)))?;

        Ok(())
    }
}

/// In-memory gateway. Fallback when the database cannot be opened.
#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<PersistedState>,
    fail_writes: Mutex<Option<String>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(state),
            fail_writes: Mutex::new(None),
        }
    }

    /// Make subsequent saves fail with `message` (e.g. a quota error); `None` restores writes
    pub fn set_write_failure(&self, message: Option<&str>) {
        let mut fail = match self.fail_writes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *fail = message.map(str::to_string);
    }

    pub fn snapshot(&self) -> PersistedState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PersistenceGateway for InMemoryGateway {
    fn load(&self) -> AppResult<PersistedState> {
        Ok(self.snapshot())
    }

    fn save(&self, patch: StatePatch) -> AppResult<()> {
        let failure = match self.fail_writes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(message) = failure {
            return Err(AppError::Persistence(message));
        }

        let mut state = self.state.lock()
            .map_err(|e| AppError::Persistence(format!("Mutex poisoned: {}", e)))?;
        patch.apply_to(&mut state);
        Ok(())
    }
}

/// Open the redb gateway in `data_dir`, falling back to memory if that fails
pub fn open_gateway(data_dir: &Path) -> Arc<dyn PersistenceGateway> {
    match RedbGateway::open(data_dir) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            warn!("[Storage] Failed to initialize database: {}, using in-memory fallback", e);
            Arc::new(InMemoryGateway::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::{Script, TranslationDirection, TranslationHistoryItem};

    fn item(text: &str) -> TranslationHistoryItem {
        TranslationHistoryItem::new(text.into(), text.to_uppercase(), TranslationDirection::SourceToTarget)
    }

    #[test]
    fn fresh_database_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = RedbGateway::open(dir.path()).unwrap();
        assert_eq!(gateway.load().unwrap(), PersistedState::default());
    }

    #[test]
    fn history_save_leaves_scripts_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = RedbGateway::open(dir.path()).unwrap();

        let scripts = vec![Script::new("Act One"), Script::new("Act Two")];
        gateway.save(StatePatch::scripts(scripts.clone())).unwrap();
        gateway.save(StatePatch::history(vec![item("a")])).unwrap();

        let state = gateway.load().unwrap();
        assert_eq!(state.scripts, scripts);
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn scripts_save_leaves_history_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = RedbGateway::open(dir.path()).unwrap();

        let history = vec![item("b"), item("a")];
        gateway.save(StatePatch::history(history.clone())).unwrap();
        gateway.save(StatePatch::scripts(vec![Script::new("x")])).unwrap();

        assert_eq!(gateway.load().unwrap().history, history);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let history = vec![item("persisted")];
        {
            let gateway = RedbGateway::open(dir.path()).unwrap();
            gateway.save(StatePatch::history(history.clone())).unwrap();
        }
        let reopened = RedbGateway::open(dir.path()).unwrap();
        assert_eq!(reopened.load().unwrap().history, history);
    }

    #[test]
    fn in_memory_write_failure_keeps_previous_state() {
        let gateway = InMemoryGateway::new();
        gateway.save(StatePatch::history(vec![item("first")])).unwrap();

        gateway.set_write_failure(Some("quota exceeded"));
        let err = gateway.save(StatePatch::history(vec![])).unwrap_err();
        assert_eq!(err, AppError::Persistence("quota exceeded".into()));
        assert_eq!(gateway.load().unwrap().history.len(), 1);

        gateway.set_write_failure(None);
        gateway.save(StatePatch::history(vec![])).unwrap();
        assert!(gateway.load().unwrap().history.is_empty());
    }

    #[test]
    fn open_gateway_falls_back_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let gateway = open_gateway(&blocker);
        gateway.save(StatePatch::scripts(vec![Script::new("fallback")])).unwrap();
        assert_eq!(gateway.load().unwrap().scripts.len(), 1);
    }
}
