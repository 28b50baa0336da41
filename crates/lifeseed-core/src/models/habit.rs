//! Habit model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Payload, RecordKind};
use crate::util;

/// A recurring habit with its current streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub name: String,
    #[serde(default)]
    pub streak: u32,
    pub last_updated: DateTime<Utc>,
}

impl Habit {
    /// Create a habit with a zero streak, touched now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            streak: 0,
            last_updated: util::now_ms(),
        }
    }
}

impl Payload for Habit {
    const KIND: RecordKind = RecordKind::Habits;

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("habit name cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_habit_new() {
        let habit = Habit::new("Stretch");
        assert_eq!(habit.streak, 0);
        assert!(habit.validate().is_ok());
    }

    #[test]
    fn test_habit_requires_name() {
        assert!(Habit::new("  ").validate().is_err());
    }
}
