//! Record envelope shared by all collections.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// The five replicated collections, in the fixed order a sync pass
/// processes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Goals,
    Moods,
    Habits,
    Journal,
    Insights,
}

impl RecordKind {
    /// All collections in deterministic processing order.
    pub const ALL: [Self; 5] = [
        Self::Goals,
        Self::Moods,
        Self::Habits,
        Self::Journal,
        Self::Insights,
    ];

    /// Collection name, doubling as the local table name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Goals => "goals",
            Self::Moods => "moods",
            Self::Habits => "habits",
            Self::Journal => "journal",
            Self::Insights => "insights",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "goals" => Ok(Self::Goals),
            "moods" => Ok(Self::Moods),
            "habits" => Ok(Self::Habits),
            "journal" => Ok(Self::Journal),
            "insights" => Ok(Self::Insights),
            other => Err(Error::InvalidInput(format!("unknown collection: {other}"))),
        }
    }
}

/// Kind-specific payload fields as a JSON object.
pub type Fields = serde_json::Map<String, Value>;

/// A typed payload belonging to one collection.
pub trait Payload: Serialize + DeserializeOwned {
    /// The collection this payload belongs to.
    const KIND: RecordKind;

    /// Domain validation, checked before every insert/update.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Serialize into a document field map.
    fn to_fields(&self) -> Result<Fields> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(Error::InvalidInput(format!(
                "payload must serialize to an object, got {other}"
            ))),
        }
    }

    /// Deserialize from a document field map.
    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields.clone()))?)
    }
}

/// One local row as stored: envelope plus untyped payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Local primary key; never sent upstream.
    pub local_id: i64,
    /// Server-assigned document id; `None` until the first successful push.
    pub remote_id: Option<String>,
    /// Kind-specific payload fields.
    pub fields: Fields,
    /// Unpushed local changes.
    pub dirty: bool,
    /// Tombstone flag, synced like any other field.
    pub deleted: bool,
    /// Stamped on every local mutation; server clock after a push.
    pub last_modified: DateTime<Utc>,
}

impl StoredRecord {
    /// Decode the payload into its typed form.
    pub fn payload<P: Payload>(&self) -> Result<P> {
        P::from_fields(&self.fields)
    }

    /// Convert into a typed record.
    pub fn into_typed<P: Payload>(self) -> Result<Record<P>> {
        let payload = self.payload()?;
        Ok(Record {
            local_id: self.local_id,
            remote_id: self.remote_id,
            payload,
            dirty: self.dirty,
            deleted: self.deleted,
            last_modified: self.last_modified,
        })
    }
}

/// A typed view of a stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<P> {
    pub local_id: i64,
    pub remote_id: Option<String>,
    pub payload: P,
    pub dirty: bool,
    pub deleted: bool,
    pub last_modified: DateTime<Utc>,
}

/// Shallow-merge two field maps; `remote` wins on key collisions.
#[must_use]
pub fn merge_fields(local: &Fields, remote: &Fields) -> Fields {
    let mut merged = local.clone();
    for (key, value) in remote {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn kinds_parse_and_display_round_trip() {
        for kind in RecordKind::ALL {
            let parsed: RecordKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("attachments".parse::<RecordKind>().is_err());
    }

    #[test]
    fn merge_prefers_remote_on_collision() {
        let local = json!({"title": "local", "progress": 40, "completed": false});
        let remote = json!({"title": "remote", "note": "kept"});
        let (Value::Object(local), Value::Object(remote)) = (local, remote) else {
            unreachable!()
        };

        let merged = merge_fields(&local, &remote);
        assert_eq!(merged["title"], json!("remote"));
        assert_eq!(merged["progress"], json!(40));
        assert_eq!(merged["note"], json!("kept"));
        assert_eq!(merged["completed"], json!(false));
    }

    #[test]
    fn merge_of_disjoint_maps_is_the_union() {
        let (Value::Object(local), Value::Object(remote)) =
            (json!({"a": 1}), json!({"b": 2}))
        else {
            unreachable!()
        };

        let merged = merge_fields(&local, &remote);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], json!(2));
    }
}
