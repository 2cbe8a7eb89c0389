//! Saved-session storage.
//!
//! The running session is written through a [`PersistencePort`] after every
//! transition. Persistence never interrupts a session: the [`SnapshotStore`]
//! logs failures and carries on, and an unreadable snapshot reads as absent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::database::Database;
use crate::error::PersistenceError;
use crate::timer::SessionSnapshot;

/// Key the session snapshot is stored under.
pub const SNAPSHOT_KEY: &str = "session.snapshot";

/// Durable key-value storage for serialized payloads.
pub trait PersistencePort: Send + Sync {
    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError>;
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn clear(&self, key: &str) -> Result<(), PersistenceError>;
}

/// In-process storage. Can be told to fail, to exercise degraded paths.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw stored payload, bypassing failure injection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("storage unavailable".into()));
        }
        self.entries
            .lock()
            .map_err(|_| PersistenceError::Backend("storage lock poisoned".into()))
    }
}

impl PersistencePort for MemoryPersistence {
    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError> {
        self.entries()?.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn clear(&self, key: &str) -> Result<(), PersistenceError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Storage in the SQLite key-value table.
pub struct SqlitePersistence {
    db: Mutex<Database>,
}

impl SqlitePersistence {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Run `f` against the underlying database.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, rusqlite::Error>,
    ) -> Result<T, PersistenceError> {
        let db = self
            .db
            .lock()
            .map_err(|_| PersistenceError::Backend("database lock poisoned".into()))?;
        Ok(f(&db)?)
    }
}

impl PersistencePort for SqlitePersistence {
    fn save(&self, key: &str, payload: &str) -> Result<(), PersistenceError> {
        self.with_db(|db| db.kv_set(key, payload))
    }

    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.with_db(|db| db.kv_get(key))
    }

    fn clear(&self, key: &str) -> Result<(), PersistenceError> {
        self.with_db(|db| db.kv_delete(key))
    }
}

/// Reads and writes the session snapshot, swallowing storage failures.
#[derive(Clone)]
pub struct SnapshotStore {
    port: Arc<dyn PersistencePort>,
}

impl SnapshotStore {
    pub fn new(port: Arc<dyn PersistencePort>) -> Self {
        Self { port }
    }

    pub fn save(&self, snapshot: &SessionSnapshot) {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %PersistenceError::Encode(e.to_string()), "snapshot not saved");
                return;
            }
        };
        if let Err(e) = self.port.save(SNAPSHOT_KEY, &payload) {
            warn!(error = %e, "snapshot not saved");
        }
    }

    /// The saved snapshot, if one exists and can be decoded.
    ///
    /// An undecodable snapshot is cleared.
    pub fn load(&self) -> Option<SessionSnapshot> {
        let payload = match self.port.load(SNAPSHOT_KEY) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "snapshot could not be read");
                return None;
            }
        };
        match serde_json::from_str(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %PersistenceError::Decode(e.to_string()), "discarding unreadable snapshot");
                self.clear();
                None
            }
        }
    }

    pub fn clear(&self) {
        match self.port.clear(SNAPSHOT_KEY) {
            Ok(()) => debug!("snapshot cleared"),
            Err(e) => warn!(error = %e, "snapshot not cleared"),
        }
    }

    /// Whether `snapshot` is too old to offer for resume.
    ///
    /// Age runs from the pause instant for a paused snapshot and from the
    /// start anchor otherwise. A snapshot without that timestamp is stale.
    pub fn is_stale(snapshot: &SessionSnapshot, now_ms: u64, threshold_secs: u64) -> bool {
        match snapshot.authoritative_timestamp_ms() {
            Some(at) => now_ms.saturating_sub(at) > threshold_secs.saturating_mul(1000),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures;
    use crate::timer::{
        ClockState, CueScheduler, Position, SessionPlan, SessionSelection, SessionStatus,
    };

    const T0: u64 = 1_700_000_000_000;
    const HOUR: u64 = 3600;

    fn snapshot(status: SessionStatus, clock: ClockState) -> SessionSnapshot {
        let selection = SessionSelection::Meditation {
            session_id: "basic-breathing".into(),
            duration_minutes: 5,
        };
        SessionSnapshot {
            session_id: "s-1".into(),
            status,
            clock,
            position: Position::START,
            item_elapsed_secs: 0,
            plan: SessionPlan::resolve(&fixtures::manifest(), &selection, &CueScheduler::with_seed(1))
                .unwrap(),
            started_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn save_load_clear() {
        let store = SnapshotStore::new(Arc::new(MemoryPersistence::new()));
        assert!(store.load().is_none());

        let saved = snapshot(SessionStatus::Active, ClockState::armed_at(T0));
        store.save(&saved);
        assert_eq!(store.load(), Some(saved));

        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn failing_backend_is_swallowed() {
        let port = Arc::new(MemoryPersistence::new());
        let store = SnapshotStore::new(port.clone());
        port.set_failing(true);

        store.save(&snapshot(SessionStatus::Active, ClockState::armed_at(T0)));
        assert!(store.load().is_none());
        store.clear();

        port.set_failing(false);
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_snapshot_reads_as_absent_and_is_cleared() {
        let port = Arc::new(MemoryPersistence::new());
        port.save(SNAPSHOT_KEY, "{not json").unwrap();
        let store = SnapshotStore::new(port.clone());

        assert!(store.load().is_none());
        assert!(port.raw(SNAPSHOT_KEY).is_none());
    }

    #[test]
    fn sqlite_port_round_trips() {
        let port = SqlitePersistence::new(Database::open_memory().unwrap());
        port.save("k", "v").unwrap();
        assert_eq!(port.load("k").unwrap().as_deref(), Some("v"));
        port.clear("k").unwrap();
        assert!(port.load("k").unwrap().is_none());
    }

    #[test]
    fn staleness_uses_start_for_active_snapshots() {
        let active = snapshot(SessionStatus::Active, ClockState::armed_at(T0));
        assert!(!SnapshotStore::is_stale(&active, T0 + HOUR * 1000, HOUR));
        assert!(SnapshotStore::is_stale(&active, T0 + HOUR * 1000 + 1, HOUR));
    }

    #[test]
    fn staleness_uses_pause_instant_for_paused_snapshots() {
        let mut clock = ClockState::armed_at(T0);
        clock.freeze(SessionStatus::Active, T0 + 2 * HOUR * 1000, 300);
        let paused = snapshot(SessionStatus::Paused, clock);

        // Started three hours ago, paused one hour ago.
        assert!(!SnapshotStore::is_stale(&paused, T0 + 3 * HOUR * 1000, HOUR));
        assert!(SnapshotStore::is_stale(&paused, T0 + 3 * HOUR * 1000 + 1, HOUR));
    }

    #[test]
    fn snapshot_without_timestamp_is_stale() {
        let bare = snapshot(SessionStatus::Active, ClockState::default());
        assert!(SnapshotStore::is_stale(&bare, T0, HOUR));
    }
}
