//! Sync metadata repository (key/value engine state).

use libsql::Connection;

use crate::error::Result;

/// Key under which the wall-clock time of the last successful sync lives.
pub const LAST_SYNC_AT: &str = "last_sync_at";

/// libSQL access to the `sync_meta` table.
pub struct MetaStore<'a> {
    conn: &'a Connection,
}

impl<'a> MetaStore<'a> {
    /// Create a repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Read a metadata value, `None` when unset.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_meta WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Upsert a metadata value.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_unset_key() {
        let db = Database::open_in_memory().await.unwrap();
        let meta = MetaStore::new(db.connection());
        assert_eq!(meta.get(LAST_SYNC_AT).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_and_overwrite() {
        let db = Database::open_in_memory().await.unwrap();
        let meta = MetaStore::new(db.connection());

        meta.set(LAST_SYNC_AT, "2026-01-01T00:00:00.000Z").await.unwrap();
        meta.set(LAST_SYNC_AT, "2026-02-01T00:00:00.000Z").await.unwrap();

        assert_eq!(
            meta.get(LAST_SYNC_AT).await.unwrap().as_deref(),
            Some("2026-02-01T00:00:00.000Z")
        );
    }
}
