//! Client configuration for the replication engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 30;

/// Replication settings.
///
/// `api_base_url` may be absent: the app then runs local-only and every
/// CRUD operation still works, which is the point of offline-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Base URL of the managed document API.
    pub api_base_url: Option<String>,
    /// Overall deadline for each remote call.
    pub request_timeout_secs: u64,
    /// Periodic background sync cadence.
    pub sync_interval_minutes: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
        }
    }
}

impl SyncSettings {
    /// Trim and validate the configured values.
    pub fn normalized(mut self) -> Result<Self> {
        self.api_base_url = match normalize_text_option(self.api_base_url.take()) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(url) => {
                return Err(Error::InvalidInput(format!(
                    "api_base_url must include http:// or https://, got '{url}'"
                )))
            }
            None => None,
        };
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if self.sync_interval_minutes == 0 {
            return Err(Error::InvalidInput(
                "sync_interval_minutes must be positive".into(),
            ));
        }
        Ok(self)
    }

    /// Whether a remote endpoint is configured at all.
    #[must_use]
    pub const fn is_remote_configured(&self) -> bool {
        self.api_base_url.is_some()
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes * 60)
    }
}
