//! Per-collection record repository.

use chrono::{DateTime, Utc};
use libsql::Connection;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{merge_fields, Fields, RecordKind, StoredRecord};
use crate::util;

const COLUMNS: &str = "local_id, remote_id, payload, dirty, deleted, last_modified";

/// Exact-match predicate over payload fields, ANDed together.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`. Values must be JSON scalars.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// libSQL repository over one collection table.
///
/// The store is agnostic to what the dirty/tombstone flags mean; callers
/// (the local-store service and the sync engine) enforce the replication
/// invariants.
pub struct RecordStore<'a> {
    conn: &'a Connection,
    kind: RecordKind,
}

impl<'a> RecordStore<'a> {
    /// Create a repository for one collection on the given connection.
    pub const fn new(conn: &'a Connection, kind: RecordKind) -> Self {
        Self { conn, kind }
    }

    const fn table(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Insert a locally created record: dirty, no remote id.
    pub async fn insert(&self, fields: &Fields) -> Result<StoredRecord> {
        let now = util::now_ms();
        let payload = serde_json::to_string(fields)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (remote_id, payload, dirty, deleted, last_modified)
                     VALUES (NULL, ?, 1, 0, ?)",
                    self.table()
                ),
                (payload, util::format_rfc3339_ms(&now)),
            )
            .await?;

        Ok(StoredRecord {
            local_id: self.conn.last_insert_rowid(),
            remote_id: None,
            fields: fields.clone(),
            dirty: true,
            deleted: false,
            last_modified: now,
        })
    }

    /// Insert a record pulled from the remote store: clean, remote id set.
    pub async fn insert_synced(
        &self,
        remote_id: &str,
        fields: &Fields,
        deleted: bool,
        last_modified: DateTime<Utc>,
    ) -> Result<StoredRecord> {
        let payload = serde_json::to_string(fields)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (remote_id, payload, dirty, deleted, last_modified)
                     VALUES (?, ?, 0, ?, ?)",
                    self.table()
                ),
                (
                    remote_id.to_string(),
                    payload,
                    i64::from(deleted),
                    util::format_rfc3339_ms(&last_modified),
                ),
            )
            .await?;

        Ok(StoredRecord {
            local_id: self.conn.last_insert_rowid(),
            remote_id: Some(remote_id.to_string()),
            fields: fields.clone(),
            dirty: false,
            deleted,
            last_modified,
        })
    }

    /// Fetch a record by local id, tombstones included.
    pub async fn find(&self, local_id: i64) -> Result<Option<StoredRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {COLUMNS} FROM {} WHERE local_id = ?", self.table()),
                [local_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Fetch a record by its server-assigned id, tombstones included.
    pub async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<StoredRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {COLUMNS} FROM {} WHERE remote_id = ?", self.table()),
                [remote_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_record(&row)?)),
            None => Ok(None),
        }
    }

    /// All records including tombstones, in unspecified order.
    pub async fn all(&self) -> Result<Vec<StoredRecord>> {
        self.collect(
            &format!("SELECT {COLUMNS} FROM {}", self.table()),
            Vec::new(),
        )
        .await
    }

    /// Records with unpushed changes, tombstones included.
    pub async fn dirty_records(&self) -> Result<Vec<StoredRecord>> {
        self.collect(
            &format!("SELECT {COLUMNS} FROM {} WHERE dirty = 1", self.table()),
            Vec::new(),
        )
        .await
    }

    /// Server ids of every record that has ever been synced.
    pub async fn remote_ids(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT remote_id FROM {} WHERE remote_id IS NOT NULL",
                    self.table()
                ),
                (),
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    /// Exact-match filtered read over payload fields; tombstones excluded.
    pub async fn query(&self, filter: &Filter) -> Result<Vec<StoredRecord>> {
        let mut sql = format!("SELECT {COLUMNS} FROM {} WHERE deleted = 0", self.table());
        let mut params: Vec<libsql::Value> = Vec::new();

        if !filter.is_empty() {
            for (field, value) in &filter.clauses {
                validate_field_name(field)?;
                if value.is_null() {
                    sql.push_str(&format!(
                        " AND json_extract(payload, '$.{field}') IS NULL"
                    ));
                } else {
                    sql.push_str(&format!(" AND json_extract(payload, '$.{field}') = ?"));
                    params.push(scalar_to_sql(value)?);
                }
            }
        }

        self.collect(&sql, params).await
    }

    /// Shallow-merge `patch` into the payload; marks the record dirty with
    /// a fresh timestamp. Returns the prior dirty flag and the new row.
    pub async fn update(&self, local_id: i64, patch: &Fields) -> Result<(bool, StoredRecord)> {
        let existing = self
            .find(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{local_id}", self.kind)))?;

        let now = util::now_ms();
        let fields = merge_fields(&existing.fields, patch);
        let payload = serde_json::to_string(&fields)?;
        self.conn
            .execute(
                &format!(
                    "UPDATE {} SET payload = ?, dirty = 1, last_modified = ? WHERE local_id = ?",
                    self.table()
                ),
                (payload, util::format_rfc3339_ms(&now), local_id),
            )
            .await?;

        Ok((
            existing.dirty,
            StoredRecord {
                fields,
                dirty: true,
                last_modified: now,
                ..existing
            },
        ))
    }

    /// Tombstone a record: `deleted = 1`, dirty, fresh timestamp, so the
    /// deletion replicates instead of the record resurrecting on the next
    /// pull. Returns the prior dirty flag.
    pub async fn delete(&self, local_id: i64) -> Result<bool> {
        let existing = self
            .find(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{local_id}", self.kind)))?;

        let now = util::now_ms();
        self.conn
            .execute(
                &format!(
                    "UPDATE {} SET deleted = 1, dirty = 1, last_modified = ? WHERE local_id = ?",
                    self.table()
                ),
                (util::format_rfc3339_ms(&now), local_id),
            )
            .await?;

        Ok(existing.dirty)
    }

    /// Re-flag an existing record as needing sync, stamping now.
    pub async fn set_dirty(&self, local_id: i64) -> Result<bool> {
        let existing = self
            .find(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{}/{local_id}", self.kind)))?;

        let now = util::now_ms();
        self.conn
            .execute(
                &format!(
                    "UPDATE {} SET dirty = 1, last_modified = ? WHERE local_id = ?",
                    self.table()
                ),
                (util::format_rfc3339_ms(&now), local_id),
            )
            .await?;

        Ok(existing.dirty)
    }

    /// Overwrite a row with remote content and clear its dirty flag.
    pub async fn apply_remote(
        &self,
        local_id: i64,
        fields: &Fields,
        deleted: bool,
        last_modified: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(fields)?;
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET payload = ?, deleted = ?, last_modified = ?, dirty = 0
                     WHERE local_id = ?",
                    self.table()
                ),
                (
                    payload,
                    i64::from(deleted),
                    util::format_rfc3339_ms(&last_modified),
                    local_id,
                ),
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("{}/{local_id}", self.kind)));
        }
        Ok(())
    }

    /// Record a successful push: attach the server id and commit
    /// timestamp, clear the dirty flag.
    pub async fn mark_synced(
        &self,
        local_id: i64,
        remote_id: &str,
        last_modified: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET remote_id = ?, last_modified = ?, dirty = 0
                     WHERE local_id = ?",
                    self.table()
                ),
                (
                    remote_id.to_string(),
                    util::format_rfc3339_ms(&last_modified),
                    local_id,
                ),
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("{}/{local_id}", self.kind)));
        }
        Ok(())
    }

    /// Clear dirty flags without transferring anything. Returns how many
    /// rows were flipped.
    pub async fn clear_dirty(&self) -> Result<u64> {
        let changed = self
            .conn
            .execute(
                &format!("UPDATE {} SET dirty = 0 WHERE dirty = 1", self.table()),
                (),
            )
            .await?;
        Ok(changed)
    }

    /// Hard-remove every row. Restore path only; normal deletion writes a
    /// tombstone via [`RecordStore::delete`].
    pub async fn clear(&self) -> Result<u64> {
        let removed = self
            .conn
            .execute(&format!("DELETE FROM {}", self.table()), ())
            .await?;
        Ok(removed)
    }

    /// Count records with unpushed changes.
    pub async fn count_dirty(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT COUNT(*) FROM {} WHERE dirty = 1", self.table()),
                (),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    async fn collect(&self, sql: &str, params: Vec<libsql::Value>) -> Result<Vec<StoredRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record(&row)?);
        }
        Ok(records)
    }
}

fn parse_record(row: &libsql::Row) -> Result<StoredRecord> {
    let local_id: i64 = row.get(0)?;
    let remote_id = match row.get_value(1)? {
        libsql::Value::Text(id) => Some(id),
        _ => None,
    };
    let payload: String = row.get(2)?;
    let Value::Object(fields) = serde_json::from_str::<Value>(&payload)? else {
        return Err(Error::Storage(format!(
            "row {local_id} payload is not a JSON object"
        )));
    };
    let dirty = row.get::<i32>(3)? != 0;
    let deleted = row.get::<i32>(4)? != 0;
    let last_modified = util::parse_rfc3339(&row.get::<String>(5)?)?;

    Ok(StoredRecord {
        local_id,
        remote_id,
        fields,
        dirty,
        deleted,
        last_modified,
    })
}

fn validate_field_name(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid filter field name: {field}"
        )))
    }
}

fn scalar_to_sql(value: &Value) -> Result<libsql::Value> {
    match value {
        Value::Bool(b) => Ok(libsql::Value::Integer(i64::from(*b))),
        Value::Number(n) => n.as_i64().map_or_else(
            || {
                n.as_f64()
                    .map(libsql::Value::Real)
                    .ok_or_else(|| Error::InvalidInput(format!("unsupported number: {n}")))
            },
            |i| Ok(libsql::Value::Integer(i)),
        ),
        Value::String(s) => Ok(libsql::Value::Text(s.clone())),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(Error::InvalidInput(
            "filter values must be JSON scalars".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::db::Database;

    fn fields(value: Value) -> Fields {
        let Value::Object(map) = value else {
            unreachable!()
        };
        map
    }

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_find() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Goals);

        let record = store
            .insert(&fields(json!({"title": "Run", "progress": 10})))
            .await
            .unwrap();
        assert!(record.dirty);
        assert!(record.remote_id.is_none());

        let found = store.find(record.local_id).await.unwrap().unwrap();
        assert_eq!(found, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_filters_exact_match_and() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Goals);

        store
            .insert(&fields(json!({"title": "a", "completed": false, "progress": 10})))
            .await
            .unwrap();
        store
            .insert(&fields(json!({"title": "b", "completed": true, "progress": 10})))
            .await
            .unwrap();
        store
            .insert(&fields(json!({"title": "c", "completed": true, "progress": 90})))
            .await
            .unwrap();

        let done = store
            .query(&Filter::new().eq("completed", true))
            .await
            .unwrap();
        assert_eq!(done.len(), 2);

        let done_early = store
            .query(&Filter::new().eq("completed", true).eq("progress", 10))
            .await
            .unwrap();
        assert_eq!(done_early.len(), 1);
        assert_eq!(done_early[0].fields["title"], json!("b"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_rejects_hostile_field_names() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Goals);

        let filter = Filter::new().eq("title') OR 1=1 --", "x");
        assert!(store.query(&filter).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_merges_partial_payload() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Goals);

        let record = store
            .insert(&fields(json!({"title": "Run", "progress": 10, "completed": false})))
            .await
            .unwrap();

        let (was_dirty, updated) = store
            .update(record.local_id, &fields(json!({"progress": 55})))
            .await
            .unwrap();
        assert!(was_dirty);
        assert_eq!(updated.fields["progress"], json!(55));
        assert_eq!(updated.fields["title"], json!("Run"));
        assert_eq!(updated.fields["completed"], json!(false));
        assert!(updated.last_modified >= record.last_modified);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_record_is_not_found() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Goals);

        let result = store.update(999, &fields(json!({"progress": 1}))).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_writes_tombstone() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Habits);

        let record = store.insert(&fields(json!({"name": "Stretch"}))).await.unwrap();
        store.delete(record.local_id).await.unwrap();

        // Hidden from filtered reads, still present for the sync engine
        let visible = store.query(&Filter::new()).await.unwrap();
        assert!(visible.is_empty());

        let raw = store.find(record.local_id).await.unwrap().unwrap();
        assert!(raw.deleted);
        assert!(raw.dirty);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_attaches_remote_id_and_clears_dirty() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Moods);

        let record = store
            .insert(&fields(json!({"emotion": "calm", "intensity": 6})))
            .await
            .unwrap();
        let server_time = util::now_ms();
        store
            .mark_synced(record.local_id, "doc-1", server_time)
            .await
            .unwrap();

        let synced = store.find(record.local_id).await.unwrap().unwrap();
        assert_eq!(synced.remote_id.as_deref(), Some("doc-1"));
        assert!(!synced.dirty);
        assert_eq!(synced.last_modified, server_time);

        let by_remote = store.find_by_remote_id("doc-1").await.unwrap().unwrap();
        assert_eq!(by_remote.local_id, record.local_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_count_and_clear_dirty() {
        let db = setup().await;
        let store = RecordStore::new(db.connection(), RecordKind::Journal);

        store
            .insert(&fields(json!({"entry": "one"})))
            .await
            .unwrap();
        store
            .insert(&fields(json!({"entry": "two"})))
            .await
            .unwrap();
        assert_eq!(store.count_dirty().await.unwrap(), 2);

        let cleared = store.clear_dirty().await.unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(store.count_dirty().await.unwrap(), 0);
    }
}
