//! Goal model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Payload, RecordKind};

/// A long-running goal with 0-100 progress tracking.
///
/// Field names serialize in camelCase to match the document shapes the
/// remote store already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Completion percentage, 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
}

impl Goal {
    /// Create a new goal with the given title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            progress: 0,
            completed: false,
            target_date: None,
        }
    }
}

impl Payload for Goal {
    const KIND: RecordKind = RecordKind::Goals;

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("goal title cannot be empty".into()));
        }
        if self.progress > 100 {
            return Err(Error::InvalidInput(format!(
                "goal progress must be 0-100, got {}",
                self.progress
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_goal_new() {
        let goal = Goal::new("Run a marathon");
        assert_eq!(goal.progress, 0);
        assert!(!goal.completed);
        assert!(goal.validate().is_ok());
    }

    #[test]
    fn test_goal_rejects_out_of_range_progress() {
        let goal = Goal {
            progress: 101,
            ..Goal::new("Overachieve")
        };
        assert!(goal.validate().is_err());
    }

    #[test]
    fn test_goal_rejects_blank_title() {
        assert!(Goal::new("   ").validate().is_err());
    }

    #[test]
    fn test_goal_serializes_camel_case() {
        let goal = Goal::new("Read more");
        let value = serde_json::to_value(&goal).unwrap();
        assert_eq!(value["title"], json!("Read more"));
        assert!(value.get("target_date").is_none());
        assert!(value.get("targetDate").is_none()); // omitted while unset
    }
}
