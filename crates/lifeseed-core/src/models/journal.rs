//! Journal entry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Payload, RecordKind};
use crate::util;

/// A free-form journal entry, optionally tagged with a mood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    pub date: DateTime<Utc>,
}

impl JournalEntry {
    /// Create an entry dated now.
    #[must_use]
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            mood: None,
            date: util::now_ms(),
        }
    }
}

impl Payload for JournalEntry {
    const KIND: RecordKind = RecordKind::Journal;

    fn validate(&self) -> Result<()> {
        if self.entry.trim().is_empty() {
            return Err(Error::InvalidInput("journal entry cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_entry_new() {
        let entry = JournalEntry::new("Slept well, long walk at lunch.");
        assert!(entry.mood.is_none());
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_journal_entry_requires_text() {
        assert!(JournalEntry::new("\n").validate().is_err());
    }
}
