//! Mood check-in model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Payload, RecordKind};
use crate::util;

/// A single mood check-in with 1-10 intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mood {
    pub emotion: String,
    /// Strength of the emotion, 1-10.
    pub intensity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub date: DateTime<Utc>,
}

impl Mood {
    /// Create a check-in dated now.
    #[must_use]
    pub fn new(emotion: impl Into<String>, intensity: u8) -> Self {
        Self {
            emotion: emotion.into(),
            intensity,
            note: None,
            date: util::now_ms(),
        }
    }
}

impl Payload for Mood {
    const KIND: RecordKind = RecordKind::Moods;

    fn validate(&self) -> Result<()> {
        if self.emotion.trim().is_empty() {
            return Err(Error::InvalidInput("mood emotion cannot be empty".into()));
        }
        if !(1..=10).contains(&self.intensity) {
            return Err(Error::InvalidInput(format!(
                "mood intensity must be 1-10, got {}",
                self.intensity
            )));
        }
        Ok(())
    }
}
