//! AI-generated insight model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Payload, RecordKind};
use crate::util;

/// An insight produced by the external text-generation service.
///
/// The generation pipeline is a black box to this crate; insights arrive
/// as finished text plus an optional structured payload and are replicated
/// like any other record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// Insight category, e.g. "pattern" or "suggestion".
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

const fn default_confidence() -> f64 {
    0.7
}

impl Insight {
    /// Create an insight with default confidence, stamped now.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            description: description.into(),
            data: None,
            confidence: default_confidence(),
            created_at: util::now_ms(),
        }
    }
}

impl Payload for Insight {
    const KIND: RecordKind = RecordKind::Insights;

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("insight title cannot be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidInput(format!(
                "insight confidence must be 0.0-1.0, got {}",
                self.confidence
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
    fn test_insight_kind_serializes_as_type() {
        let insight = Insight::new("pattern", "Morning moods", "Moods trend higher before noon.");
        let value = serde_json::to_value(&insight).unwrap();
        assert_eq!(value["type"], json!("pattern"));
        assert_eq!(value["confidence"], json!(0.7));
    }

    #[test]
    fn test_insight_confidence_bounds() {
        let mut insight = Insight::new("pattern", "t", "d");
        insight.confidence = 1.2;
        assert!(insight.validate().is_err());
        insight.confidence = 0.0;
        assert!(insight.validate().is_ok());
    }

    #[test]
    fn test_insight_defaults_confidence_when_absent() {
        let parsed: Insight = serde_json::from_value(json!({
            "type": "suggestion",
            "title": "Try journaling at night",
            "description": "Evening entries are rare.",
            "createdAt": "2026-01-05T08:00:00.000Z"
        }))
        .unwrap();
        assert!((parsed.confidence - 0.7).abs() < f64::EPSILON);
    }
}
