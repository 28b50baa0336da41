//! The replication engine: pull/push orchestration, conflict resolution,
//! and single-flight scheduling.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{merge_fields, Fields, RecordKind, StoredRecord};
use crate::remote::{RemoteRecord, RemoteStore, RemoteWrite, Session};
use crate::services::LocalStore;
use crate::sync::{
    ConnectivityMonitor, ScheduleHandle, Scheduler, StatusPublisher, Transition,
};
use crate::util;

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Conflict tally of one sync pass, summed across collections.
///
/// A non-empty `failed` list is the partial-failure surface: those
/// collections kept their dirty records and will be retried next pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub local_wins: u32,
    pub remote_wins: u32,
    pub merged: u32,
    pub failed: Vec<RecordKind>,
}

impl SyncOutcome {
    /// True when the pass moved no data and nothing failed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.local_wins == 0 && self.remote_wins == 0 && self.merged == 0 && self.failed.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CollectionTally {
    local_wins: u32,
    remote_wins: u32,
    merged: u32,
}

/// Planned local effect of one resolved record, applied only after the
/// collection's remote batch has committed.
enum Resolution {
    /// Local state goes to the remote store; attach the server id and
    /// commit timestamp afterwards.
    Push { local_id: i64, write_index: usize },
    /// Remote state overwrites the local row.
    Adopt { local_id: i64, record: RemoteRecord },
    /// Equal timestamps: the shallow merge goes to both stores.
    Merge {
        local_id: i64,
        write_index: usize,
        fields: Fields,
        deleted: bool,
    },
    /// Remote document never seen locally; insert it clean.
    PullNew { record: RemoteRecord },
}

/// Orchestrates replication between the local store and a remote store.
///
/// At most one pass runs at a time: a sync requested while one is in
/// flight is dropped, not queued. The engine is cheap to clone; clones
/// share all state including the single-flight guard.
#[derive(Clone)]
pub struct SyncEngine<R> {
    store: LocalStore,
    remote: R,
    session: Arc<RwLock<Option<Session>>>,
    monitor: Arc<ConnectivityMonitor>,
    status: Arc<StatusPublisher>,
    syncing: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
    remote_timeout: Duration,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Build an engine over an opened store and a remote adapter. The
    /// connectivity monitor and status publisher are shared with the
    /// store's publisher, so observers see one coherent snapshot.
    #[must_use]
    pub fn new(store: LocalStore, remote: R) -> Self {
        let status = Arc::clone(store.status());
        let monitor = Arc::new(ConnectivityMonitor::new(Arc::clone(&status)));
        Self {
            store,
            remote,
            session: Arc::new(RwLock::new(None)),
            monitor,
            status,
            syncing: Arc::new(AtomicBool::new(false)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Override the per-call remote deadline.
    #[must_use]
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// The connectivity monitor fed by `handle_connectivity`.
    #[must_use]
    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// The status publisher observers subscribe to.
    #[must_use]
    pub fn status(&self) -> &Arc<StatusPublisher> {
        &self.status
    }

    /// Install or clear the authenticated session.
    pub fn set_session(&self, session: Option<Session>) {
        let mut slot = match self.session.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = session;
    }

    fn session(&self) -> Option<Session> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Ask an in-flight pass to stop after the current collection. The
    /// in-flight remote call is still bounded by the per-call deadline.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Run one full sync pass now.
    ///
    /// Returns a zero outcome without touching any store when a pass is
    /// already in flight, when offline, or when no session is installed.
    /// Collection-level failures are reported in `SyncOutcome::failed`,
    /// never raised.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        let Some(_guard) = FlightGuard::acquire(&self.syncing, &self.status) else {
            debug!("sync already in flight; dropping request");
            return Ok(SyncOutcome::default());
        };
        if !self.monitor.is_online() {
            debug!("offline; skipping sync pass");
            return Ok(SyncOutcome::default());
        }
        let Some(session) = self.session() else {
            info!("no authenticated session; skipping sync pass");
            return Ok(SyncOutcome::default());
        };

        self.cancel_requested.store(false, Ordering::SeqCst);
        self.status.set_syncing(true);

        let mut outcome = SyncOutcome::default();
        let mut any_committed = false;
        for kind in RecordKind::ALL {
            if self.cancel_requested.load(Ordering::SeqCst) {
                warn!(collection = %kind, "sync pass cancelled; remaining collections stay dirty");
                break;
            }
            match self.sync_collection(&session, kind).await {
                Ok(tally) => {
                    any_committed = true;
                    outcome.local_wins += tally.local_wins;
                    outcome.remote_wins += tally.remote_wins;
                    outcome.merged += tally.merged;
                }
                Err(error) => {
                    warn!(collection = %kind, %error, "collection sync failed; skipping for this pass");
                    outcome.failed.push(kind);
                }
            }
        }

        if any_committed {
            self.store.set_last_sync(util::now_ms()).await?;
        }

        info!(
            local_wins = outcome.local_wins,
            remote_wins = outcome.remote_wins,
            merged = outcome.merged,
            failed = outcome.failed.len(),
            "sync pass finished"
        );
        Ok(outcome)
    }

    async fn sync_collection(
        &self,
        session: &Session,
        kind: RecordKind,
    ) -> Result<CollectionTally> {
        let dirty = self.store.dirty_records(kind).await?;
        let remote_records = self
            .with_deadline(self.remote.fetch_all(session, kind))
            .await?;

        let remote_by_id: HashMap<&str, &RemoteRecord> = remote_records
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect();

        let mut writes: Vec<RemoteWrite> = Vec::new();
        let mut plan: Vec<Resolution> = Vec::new();

        for record in &dirty {
            let counterpart = record
                .remote_id
                .as_deref()
                .and_then(|id| remote_by_id.get(id).copied());
            plan.push(resolve_record(record, counterpart, &mut writes));
        }

        // Remote documents never pulled before arrive as clean inserts,
        // tombstones included so a deletion from another device sticks.
        let known: HashSet<String> = self.store.remote_ids(kind).await?.into_iter().collect();
        for record in &remote_records {
            if !known.contains(&record.id) {
                plan.push(Resolution::PullNew {
                    record: record.clone(),
                });
            }
        }

        let committed = if writes.is_empty() {
            Vec::new()
        } else {
            let expected = writes.len();
            let committed = self
                .with_deadline(self.remote.batch_write(session, kind, writes))
                .await?;
            if committed.len() != expected {
                return Err(Error::RemoteUnavailable(format!(
                    "batch commit acknowledged {} of {expected} writes",
                    committed.len()
                )));
            }
            committed
        };

        // Local rows change only after the batch committed: a failed
        // collection stays fully dirty and a retried pass just
        // re-evaluates it.
        let mut tally = CollectionTally::default();
        for resolution in plan {
            match resolution {
                Resolution::Push {
                    local_id,
                    write_index,
                } => {
                    let commit = &committed[write_index];
                    self.store
                        .mark_synced(kind, local_id, &commit.id, commit.last_modified)
                        .await?;
                    tally.local_wins += 1;
                }
                Resolution::Adopt { local_id, record } => {
                    self.store
                        .apply_remote(
                            kind,
                            local_id,
                            &record.fields,
                            record.deleted,
                            record.last_modified,
                        )
                        .await?;
                    tally.remote_wins += 1;
                }
                Resolution::Merge {
                    local_id,
                    write_index,
                    fields,
                    deleted,
                } => {
                    let commit = &committed[write_index];
                    self.store
                        .apply_remote(kind, local_id, &fields, deleted, commit.last_modified)
                        .await?;
                    tally.merged += 1;
                }
                Resolution::PullNew { record } => {
                    self.store
                        .insert_synced(
                            kind,
                            &record.id,
                            &record.fields,
                            record.deleted,
                            record.last_modified,
                        )
                        .await?;
                }
            }
        }

        Ok(tally)
    }

    /// Push local dirty records to the remote store, one-directional: no
    /// remote read, no conflict comparison, remote state is overwritten.
    pub async fn push_all(&self) -> Result<SyncOutcome> {
        let Some(_guard) = FlightGuard::acquire(&self.syncing, &self.status) else {
            debug!("sync already in flight; dropping push request");
            return Ok(SyncOutcome::default());
        };
        if !self.monitor.is_online() {
            debug!("offline; skipping push");
            return Ok(SyncOutcome::default());
        }
        let Some(session) = self.session() else {
            info!("no authenticated session; skipping push");
            return Ok(SyncOutcome::default());
        };

        self.status.set_syncing(true);

        let mut outcome = SyncOutcome::default();
        let mut any_committed = false;
        for kind in RecordKind::ALL {
            match self.push_collection(&session, kind).await {
                Ok(pushed) => {
                    any_committed = true;
                    outcome.local_wins += pushed;
                }
                Err(error) => {
                    warn!(collection = %kind, %error, "collection push failed; skipping for this pass");
                    outcome.failed.push(kind);
                }
            }
        }

        if any_committed {
            self.store.set_last_sync(util::now_ms()).await?;
        }
        Ok(outcome)
    }

    async fn push_collection(&self, session: &Session, kind: RecordKind) -> Result<u32> {
        let dirty = self.store.dirty_records(kind).await?;
        if dirty.is_empty() {
            return Ok(0);
        }

        let writes = dirty
            .iter()
            .map(|record| RemoteWrite {
                id: record.remote_id.clone(),
                fields: record.fields.clone(),
                deleted: record.deleted,
            })
            .collect::<Vec<_>>();
        let expected = writes.len();

        let committed = self
            .with_deadline(self.remote.batch_write(session, kind, writes))
            .await?;
        if committed.len() != expected {
            return Err(Error::RemoteUnavailable(format!(
                "batch commit acknowledged {} of {expected} writes",
                committed.len()
            )));
        }

        for (record, commit) in dirty.iter().zip(&committed) {
            self.store
                .mark_synced(kind, record.local_id, &commit.id, commit.last_modified)
                .await?;
        }

        Ok(u32::try_from(expected).unwrap_or(u32::MAX))
    }

    /// Replace local content with remote content, collection by
    /// collection, with no conflict comparison. Destructive to local
    /// data; callers gate it behind explicit confirmation.
    pub async fn pull_all(&self) -> Result<u64> {
        let Some(_guard) = FlightGuard::acquire(&self.syncing, &self.status) else {
            warn!("sync already in flight; dropping restore request");
            return Ok(0);
        };
        if !self.monitor.is_online() {
            return Err(Error::RemoteUnavailable("offline".into()));
        }
        let Some(session) = self.session() else {
            return Err(Error::AuthRequired);
        };

        self.status.set_syncing(true);

        let result = self.pull_collections(&session).await;
        // The replace path bypasses per-row dirty accounting
        self.store.recount_pending().await?;

        let pulled = result?;
        self.store.set_last_sync(util::now_ms()).await?;
        info!(records = pulled, "restore finished");
        Ok(pulled)
    }

    async fn pull_collections(&self, session: &Session) -> Result<u64> {
        let mut pulled: u64 = 0;
        for kind in RecordKind::ALL {
            let remote_records = self
                .with_deadline(self.remote.fetch_all(session, kind))
                .await?;
            self.store.clear_collection(kind).await?;
            for record in &remote_records {
                self.store
                    .insert_synced(
                        kind,
                        &record.id,
                        &record.fields,
                        record.deleted,
                        record.last_modified,
                    )
                    .await?;
                pulled += 1;
            }
        }
        Ok(pulled)
    }

    /// Mark everything as synced without transferring any data.
    pub async fn clear_dirty_flags(&self) -> Result<u64> {
        self.store.clear_dirty_flags().await
    }

    /// Feed a platform connectivity signal. A rising edge (offline to
    /// online) triggers a sync pass; everything else only updates state.
    pub async fn handle_connectivity(&self, connected: bool) -> Result<Option<SyncOutcome>> {
        match self.monitor.report(connected) {
            Some(Transition::CameOnline) => Ok(Some(self.sync_now().await?)),
            _ => Ok(None),
        }
    }

    async fn with_deadline<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.remote_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(Error::RemoteUnavailable(format!(
                "remote call exceeded {}s deadline",
                self.remote_timeout.as_secs()
            ))),
        }
    }
}

impl<R> SyncEngine<R>
where
    R: RemoteStore + Clone + Send + Sync + 'static,
{
    /// Register the periodic background sync on the given scheduler.
    /// Dropping the handle stops it.
    pub fn start_periodic(&self, scheduler: &dyn Scheduler, interval: Duration) -> ScheduleHandle {
        let engine = self.clone();
        scheduler.schedule_recurring(
            interval,
            Box::new(move || {
                let engine = engine.clone();
                tokio::spawn(async move {
                    match engine.sync_now().await {
                        Ok(outcome) if !outcome.failed.is_empty() => {
                            warn!(
                                failed = outcome.failed.len(),
                                "periodic sync finished degraded"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => warn!(%error, "periodic sync failed"),
                    }
                });
            }),
        )
    }
}

/// Resolve one dirty record against its remote counterpart, staging any
/// remote write needed.
fn resolve_record(
    record: &StoredRecord,
    counterpart: Option<&RemoteRecord>,
    writes: &mut Vec<RemoteWrite>,
) -> Resolution {
    let Some(remote) = counterpart else {
        // Never pushed (or the document vanished remotely): insert it
        let write_index = writes.len();
        writes.push(RemoteWrite {
            id: record.remote_id.clone(),
            fields: record.fields.clone(),
            deleted: record.deleted,
        });
        return Resolution::Push {
            local_id: record.local_id,
            write_index,
        };
    };

    if record.last_modified > remote.last_modified {
        let write_index = writes.len();
        writes.push(RemoteWrite {
            id: Some(remote.id.clone()),
            fields: record.fields.clone(),
            deleted: record.deleted,
        });
        Resolution::Push {
            local_id: record.local_id,
            write_index,
        }
    } else if remote.last_modified > record.last_modified {
        Resolution::Adopt {
            local_id: record.local_id,
            record: remote.clone(),
        }
    } else {
        // Same millisecond on both sides: union the payloads, remote
        // fields winning collisions, and write the result everywhere
        let fields = merge_fields(&record.fields, &remote.fields);
        let write_index = writes.len();
        writes.push(RemoteWrite {
            id: Some(remote.id.clone()),
            fields: fields.clone(),
            deleted: remote.deleted,
        });
        Resolution::Merge {
            local_id: record.local_id,
            write_index,
            fields,
            deleted: remote.deleted,
        }
    }
}

/// Single-flight guard: released on every exit path, including panics,
/// so a failed pass can never wedge the engine in `Syncing`.
struct FlightGuard {
    syncing: Arc<AtomicBool>,
    status: Arc<StatusPublisher>,
}

impl FlightGuard {
    fn acquire(syncing: &Arc<AtomicBool>, status: &Arc<StatusPublisher>) -> Option<Self> {
        syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then(|| Self {
                syncing: Arc::clone(syncing),
                status: Arc::clone(status),
            })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.syncing.store(false, Ordering::SeqCst);
        self.status.set_syncing(false);
    }
}
