//! Remote document-store boundary.

mod http;

pub use http::HttpRemoteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Fields, RecordKind};

/// Authenticated user context, produced by the external auth flow.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Remote namespace: every document lives under this user.
    pub user_id: String,
    /// Bearer token attached to every remote request.
    pub access_token: String,
}

impl Session {
    #[must_use]
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// One document as the remote store holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// Server-assigned document id.
    pub id: String,
    pub fields: Fields,
    /// Replicated tombstone flag.
    pub deleted: bool,
    /// Stamped by the remote backend's clock at commit time.
    pub last_modified: DateTime<Utc>,
}

/// One staged write within a collection batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    /// Existing document id, or `None` for an insert.
    pub id: Option<String>,
    pub fields: Fields,
    pub deleted: bool,
}

/// Commit acknowledgement for one write, position-aligned with the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedWrite {
    pub id: String,
    /// Server-clock commit time.
    pub last_modified: DateTime<Utc>,
}

/// Per-user, per-collection access to the cloud document store.
///
/// `batch_write` commits all-or-nothing within one collection; there is no
/// atomicity across collections. Implementations map transport failures to
/// `Error::RemoteUnavailable` and rejected credentials to
/// `Error::AuthRequired` so the engine can degrade instead of crashing.
pub trait RemoteStore {
    /// Read every document of the user's collection.
    fn fetch_all(
        &self,
        session: &Session,
        kind: RecordKind,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteRecord>>> + Send;

    /// Atomically commit a batch of writes to one collection. The result
    /// is position-aligned with `writes`.
    fn batch_write(
        &self,
        session: &Session,
        kind: RecordKind,
        writes: Vec<RemoteWrite>,
    ) -> impl std::future::Future<Output = Result<Vec<CommittedWrite>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_debug_redacts_token() {
        let session = Session::new("user-1", "secret-token");
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("user-1"));
    }
}
