//! Shared local-store service used by the app-facing CRUD path and the
//! sync engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::{Database, Filter, MetaStore, RecordStore, LAST_SYNC_AT};
use crate::error::{Error, Result};
use crate::models::{merge_fields, Fields, Payload, Record, RecordKind, StoredRecord};
use crate::sync::StatusPublisher;
use crate::util;

/// Thread-safe service owning the local database.
///
/// Both mutation paths (app CRUD and sync-engine merge writes) go through
/// the same mutex, so a UI write can never race a merge write on the same
/// row. The service also maintains the pending-sync counter incrementally:
/// one scan at open, then a delta on every dirty-flag transition.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    status: Arc<StatusPublisher>,
    pending: Arc<AtomicI64>,
}

impl LocalStore {
    /// Open (or create) the store at the given filesystem path.
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        status: Arc<StatusPublisher>,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&db_path).await?;
        Self::bootstrap(db, status).await
    }

    /// Open an in-memory store with its own status publisher (primarily
    /// for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_status(Arc::new(StatusPublisher::new())).await
    }

    /// Open an in-memory store sharing an existing status publisher.
    pub async fn open_in_memory_with_status(status: Arc<StatusPublisher>) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Self::bootstrap(db, status).await
    }

    async fn bootstrap(db: Database, status: Arc<StatusPublisher>) -> Result<Self> {
        let service = Self {
            db: Arc::new(Mutex::new(db)),
            status,
            pending: Arc::new(AtomicI64::new(0)),
        };

        service.recount_pending().await?;

        let last_sync = {
            let db = service.db.lock().await;
            MetaStore::new(db.connection()).get(LAST_SYNC_AT).await?
        };
        if let Some(raw) = last_sync {
            service.status.set_last_sync(util::parse_rfc3339(&raw)?);
        }

        Ok(service)
    }

    /// The status publisher fed by this store (shared with the engine and
    /// the connectivity monitor).
    #[must_use]
    pub fn status(&self) -> &Arc<StatusPublisher> {
        &self.status
    }

    /// Records with unpushed changes, across all collections.
    #[must_use]
    pub fn pending_count(&self) -> i64 {
        self.pending.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // App-facing typed CRUD
    // ------------------------------------------------------------------

    /// Insert a new record; it starts dirty and unpushed.
    pub async fn insert<P: Payload>(&self, payload: &P) -> Result<Record<P>> {
        payload.validate()?;
        let fields = payload.to_fields()?;

        let stored = {
            let db = self.db.lock().await;
            RecordStore::new(db.connection(), P::KIND)
                .insert(&fields)
                .await?
        };

        self.adjust_pending(1);
        stored.into_typed()
    }

    /// Fetch one record by local id, tombstones included.
    pub async fn get<P: Payload>(&self, local_id: i64) -> Result<Option<Record<P>>> {
        let db = self.db.lock().await;
        match RecordStore::new(db.connection(), P::KIND)
            .find(local_id)
            .await?
        {
            Some(stored) => Ok(Some(stored.into_typed()?)),
            None => Ok(None),
        }
    }

    /// Exact-match filtered read; tombstones excluded, order unspecified.
    pub async fn query<P: Payload>(&self, filter: &Filter) -> Result<Vec<Record<P>>> {
        let db = self.db.lock().await;
        RecordStore::new(db.connection(), P::KIND)
            .query(filter)
            .await?
            .into_iter()
            .map(StoredRecord::into_typed)
            .collect()
    }

    /// Merge `patch` into the record's payload; unspecified fields are
    /// untouched. The merged payload is validated as a `P` before writing.
    pub async fn update<P: Payload>(&self, local_id: i64, patch: &Fields) -> Result<Record<P>> {
        let db = self.db.lock().await;
        let store = RecordStore::new(db.connection(), P::KIND);

        let existing = store
            .find(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{local_id}", P::KIND)))?;
        let merged: P = P::from_fields(&merge_fields(&existing.fields, patch))?;
        merged.validate()?;

        let (was_dirty, stored) = store.update(local_id, patch).await?;
        drop(db);

        if !was_dirty {
            self.adjust_pending(1);
        }
        stored.into_typed()
    }

    /// Tombstone a record so the deletion replicates on the next push.
    pub async fn delete(&self, kind: RecordKind, local_id: i64) -> Result<()> {
        let was_dirty = {
            let db = self.db.lock().await;
            RecordStore::new(db.connection(), kind)
                .delete(local_id)
                .await?
        };

        if !was_dirty {
            self.adjust_pending(1);
        }
        Ok(())
    }

    /// Re-flag a record as needing sync, stamping now.
    pub async fn mark_for_sync(&self, kind: RecordKind, local_id: i64) -> Result<()> {
        let was_dirty = {
            let db = self.db.lock().await;
            RecordStore::new(db.connection(), kind)
                .set_dirty(local_id)
                .await?
        };

        if !was_dirty {
            self.adjust_pending(1);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sync-engine operations
    // ------------------------------------------------------------------

    /// Every record of a collection, tombstones included.
    pub async fn all_records(&self, kind: RecordKind) -> Result<Vec<StoredRecord>> {
        let db = self.db.lock().await;
        RecordStore::new(db.connection(), kind).all().await
    }

    /// Records of a collection with unpushed changes.
    pub async fn dirty_records(&self, kind: RecordKind) -> Result<Vec<StoredRecord>> {
        let db = self.db.lock().await;
        RecordStore::new(db.connection(), kind).dirty_records().await
    }

    /// Server ids of every record of a collection that has ever synced.
    pub async fn remote_ids(&self, kind: RecordKind) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        RecordStore::new(db.connection(), kind).remote_ids().await
    }

    /// Insert a record pulled from the remote store (clean).
    pub async fn insert_synced(
        &self,
        kind: RecordKind,
        remote_id: &str,
        fields: &Fields,
        deleted: bool,
        last_modified: DateTime<Utc>,
    ) -> Result<StoredRecord> {
        let db = self.db.lock().await;
        RecordStore::new(db.connection(), kind)
            .insert_synced(remote_id, fields, deleted, last_modified)
            .await
    }

    /// Overwrite a row with remote-side content and clear its dirty flag.
    pub async fn apply_remote(
        &self,
        kind: RecordKind,
        local_id: i64,
        fields: &Fields,
        deleted: bool,
        last_modified: DateTime<Utc>,
    ) -> Result<()> {
        let was_dirty = {
            let db = self.db.lock().await;
            let store = RecordStore::new(db.connection(), kind);
            let was_dirty = store
                .find(local_id)
                .await?
                .is_some_and(|record| record.dirty);
            store
                .apply_remote(local_id, fields, deleted, last_modified)
                .await?;
            was_dirty
        };

        if was_dirty {
            self.adjust_pending(-1);
        }
        Ok(())
    }

    /// Record a successful push: server id + commit timestamp, flag clear.
    pub async fn mark_synced(
        &self,
        kind: RecordKind,
        local_id: i64,
        remote_id: &str,
        last_modified: DateTime<Utc>,
    ) -> Result<()> {
        let was_dirty = {
            let db = self.db.lock().await;
            let store = RecordStore::new(db.connection(), kind);
            let was_dirty = store
                .find(local_id)
                .await?
                .is_some_and(|record| record.dirty);
            store.mark_synced(local_id, remote_id, last_modified).await?;
            was_dirty
        };

        if was_dirty {
            self.adjust_pending(-1);
        }
        Ok(())
    }

    /// Mark every record in every collection as synced without
    /// transferring anything. Returns how many flags were cleared.
    pub async fn clear_dirty_flags(&self) -> Result<u64> {
        let mut cleared = 0;
        {
            let db = self.db.lock().await;
            for kind in RecordKind::ALL {
                cleared += RecordStore::new(db.connection(), kind).clear_dirty().await?;
            }
        }

        self.pending.store(0, Ordering::SeqCst);
        self.status.set_pending(0);
        Ok(cleared)
    }

    /// Hard-remove every row of a collection (restore path only).
    pub async fn clear_collection(&self, kind: RecordKind) -> Result<u64> {
        let db = self.db.lock().await;
        RecordStore::new(db.connection(), kind).clear().await
    }

    /// Rescan dirty counts and republish. Used at open and after bulk
    /// operations that bypass per-row accounting.
    pub async fn recount_pending(&self) -> Result<i64> {
        let mut total = 0;
        {
            let db = self.db.lock().await;
            for kind in RecordKind::ALL {
                total += RecordStore::new(db.connection(), kind).count_dirty().await?;
            }
        }

        self.pending.store(total, Ordering::SeqCst);
        self.status.set_pending(total);
        Ok(total)
    }

    /// Persist and publish the wall-clock time of the last successful
    /// sync pass.
    pub async fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
        {
            let db = self.db.lock().await;
            MetaStore::new(db.connection())
                .set(LAST_SYNC_AT, &util::format_rfc3339_ms(&at))
                .await?;
        }
        self.status.set_last_sync(at);
        Ok(())
    }

    fn adjust_pending(&self, delta: i64) {
        let pending = self.pending.fetch_add(delta, Ordering::SeqCst) + delta;
        self.status.set_pending(pending);
    }
}

#[cfg(test)]
impl LocalStore {
    /// Test hook: pin a record's timestamp without touching its flags.
    pub(crate) async fn force_last_modified(
        &self,
        kind: RecordKind,
        local_id: i64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                &format!(
                    "UPDATE {} SET last_modified = ? WHERE local_id = ?",
                    kind.as_str()
                ),
                (util::format_rfc3339_ms(&at), local_id),
            )
            .await?;
        Ok(())
    }
}
