use std::env;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use lifeseed_core::config::SyncSettings;
use lifeseed_core::models::{Fields, StoredRecord};
use lifeseed_core::remote::{HttpRemoteStore, Session};
use lifeseed_core::sync::{StatusPublisher, SyncEngine, SyncOutcome};
use lifeseed_core::util::{self, normalize_text_option};
use lifeseed_core::{Goal, Habit, JournalEntry, LocalStore, Mood, RecordKind};

use crate::cli::{AddCommands, SyncCommands};
use crate::error::CliError;

const ENV_API_URL: &str = "LIFESEED_API_URL";
const ENV_USER_ID: &str = "LIFESEED_USER_ID";
const ENV_TOKEN: &str = "LIFESEED_TOKEN";

pub async fn open_store(db_path: Option<PathBuf>) -> Result<LocalStore, CliError> {
    let db_path = match db_path {
        Some(path) => path,
        None => default_db_path()?,
    };
    tracing::debug!(path = %db_path.display(), "opening local store");
    Ok(LocalStore::open_path(db_path, Arc::new(StatusPublisher::new())).await?)
}

fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("lifeseed").join("lifeseed.db"))
        .ok_or(CliError::NoDataDir)
}

pub async fn run_add(store: &LocalStore, record: AddCommands) -> Result<(), CliError> {
    match record {
        AddCommands::Goal { title, description } => {
            let title = title.join(" ");
            if title.trim().is_empty() {
                return Err(CliError::EmptyTitle);
            }
            let goal = Goal {
                description: description.unwrap_or_default(),
                ..Goal::new(title)
            };
            let inserted = store.insert(&goal).await?;
            println!("Added goal #{}", inserted.local_id);
        }
        AddCommands::Mood {
            emotion,
            intensity,
            note,
        } => {
            let mood = Mood {
                note,
                ..Mood::new(emotion, intensity)
            };
            let inserted = store.insert(&mood).await?;
            println!("Logged mood #{}", inserted.local_id);
        }
        AddCommands::Habit { name } => {
            let name = name.join(" ");
            if name.trim().is_empty() {
                return Err(CliError::EmptyHabitName);
            }
            let inserted = store.insert(&Habit::new(name)).await?;
            println!("Added habit #{}", inserted.local_id);
        }
        AddCommands::Journal { entry, mood } => {
            let entry = entry.join(" ");
            if entry.trim().is_empty() {
                return Err(CliError::EmptyEntry);
            }
            let journal = JournalEntry {
                mood,
                ..JournalEntry::new(entry)
            };
            let inserted = store.insert(&journal).await?;
            println!("Added journal entry #{}", inserted.local_id);
        }
    }
    Ok(())
}

pub async fn run_list(
    store: &LocalStore,
    kind: RecordKind,
    as_json: bool,
    include_deleted: bool,
) -> Result<(), CliError> {
    let records: Vec<StoredRecord> = store
        .all_records(kind)
        .await?
        .into_iter()
        .filter(|record| include_deleted || !record.deleted)
        .collect();

    if as_json {
        let items: Vec<RecordItem<'_>> = records.iter().map(record_to_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records in {kind}.");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record_line(record));
    }
    Ok(())
}

pub async fn run_delete(store: &LocalStore, kind: RecordKind, local_id: i64) -> Result<(), CliError> {
    store.delete(kind, local_id).await?;
    println!("Deleted {kind} record #{local_id} (will replicate on next sync)");
    Ok(())
}

pub fn run_status(store: &LocalStore) {
    let status = store.status().snapshot();
    let last_sync = status
        .last_sync
        .map_or_else(|| "never".to_string(), |at| util::format_rfc3339_ms(&at));
    println!("Pending sync: {} record(s)", store.pending_count());
    println!("Last sync:    {last_sync}");
}

pub async fn run_sync(store: &LocalStore, command: SyncCommands) -> Result<(), CliError> {
    match command {
        SyncCommands::ClearFlags => {
            // Local-only escape hatch; works without remote configuration
            let cleared = store.clear_dirty_flags().await?;
            println!("Marked {cleared} record(s) as synced");
        }
        SyncCommands::Now => {
            let engine = build_engine(store.clone())?;
            let outcome = engine.sync_now().await?;
            println!(
                "Sync complete: {} pushed, {} pulled, {} merged",
                outcome.local_wins, outcome.remote_wins, outcome.merged
            );
            print_failures(&outcome);
        }
        SyncCommands::Push => {
            let engine = build_engine(store.clone())?;
            let outcome = engine.push_all().await?;
            println!("Pushed {} record(s)", outcome.local_wins);
            print_failures(&outcome);
        }
        SyncCommands::Pull { yes } => {
            if !yes && !confirm_restore()? {
                return Err(CliError::RestoreCancelled);
            }
            let engine = build_engine(store.clone())?;
            let pulled = engine.pull_all().await?;
            println!("Restored {pulled} record(s) from the remote store");
        }
    }
    Ok(())
}

fn build_engine(store: LocalStore) -> Result<SyncEngine<HttpRemoteStore>, CliError> {
    let (settings, session) = remote_config_from_env()?;
    let base_url = settings
        .api_base_url
        .clone()
        .ok_or(CliError::SyncNotConfigured)?;
    let remote = HttpRemoteStore::new(base_url, settings.request_timeout())?;
    let engine =
        SyncEngine::new(store, remote).with_remote_timeout(settings.request_timeout());
    engine.set_session(Some(session));
    // A one-shot CLI run has no platform connectivity feed; assume online
    // and let the request surface RemoteUnavailable when it isn't
    engine.connectivity().report(true);
    Ok(engine)
}

fn remote_config_from_env() -> Result<(SyncSettings, Session), CliError> {
    build_remote_config(
        env::var(ENV_API_URL).ok(),
        env::var(ENV_USER_ID).ok(),
        env::var(ENV_TOKEN).ok(),
    )
}

fn build_remote_config(
    api_base_url: Option<String>,
    user_id: Option<String>,
    token: Option<String>,
) -> Result<(SyncSettings, Session), CliError> {
    let (Some(api_base_url), Some(user_id), Some(token)) = (
        normalize_text_option(api_base_url),
        normalize_text_option(user_id),
        normalize_text_option(token),
    ) else {
        return Err(CliError::SyncNotConfigured);
    };

    let settings = SyncSettings {
        api_base_url: Some(api_base_url),
        ..SyncSettings::default()
    }
    .normalized()?;
    Ok((settings, Session::new(user_id, token)))
}

fn print_failures(outcome: &SyncOutcome) {
    if !outcome.failed.is_empty() {
        let names: Vec<&str> = outcome.failed.iter().map(|kind| kind.as_str()).collect();
        eprintln!(
            "Warning: some collections did not sync and will retry: {}",
            names.join(", ")
        );
    }
}

fn confirm_restore() -> Result<bool, CliError> {
    print!("This replaces ALL local data with remote data. Type 'yes' to continue: ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordItem<'a> {
    local_id: i64,
    remote_id: Option<&'a str>,
    dirty: bool,
    deleted: bool,
    last_modified: String,
    fields: &'a Fields,
}

fn record_to_item(record: &StoredRecord) -> RecordItem<'_> {
    RecordItem {
        local_id: record.local_id,
        remote_id: record.remote_id.as_deref(),
        dirty: record.dirty,
        deleted: record.deleted,
        last_modified: util::format_rfc3339_ms(&record.last_modified),
        fields: &record.fields,
    }
}

fn format_record_line(record: &StoredRecord) -> String {
    let summary = record_summary(&record.fields);
    let mut flags = String::new();
    if record.dirty {
        flags.push_str(" [unsynced]");
    }
    if record.deleted {
        flags.push_str(" [deleted]");
    }
    format!("#{:<4} {summary}{flags}", record.local_id)
}

fn record_summary(fields: &Fields) -> String {
    for key in ["title", "name", "emotion", "entry"] {
        if let Some(Value::String(text)) = fields.get(key) {
            return text.chars().take(60).collect();
        }
    }
    "(no summary)".to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Fields {
        let Value::Object(map) = value else {
            unreachable!()
        };
        map
    }

    #[test]
    fn remote_config_requires_all_three_values() {
        assert!(matches!(
            build_remote_config(Some("https://api.example.com".into()), None, None),
            Err(CliError::SyncNotConfigured)
        ));
        assert!(matches!(
            build_remote_config(None, Some("user".into()), Some("token".into())),
            Err(CliError::SyncNotConfigured)
        ));

        let (settings, session) = build_remote_config(
            Some("https://api.example.com/".into()),
            Some("user-1".into()),
            Some("token".into()),
        )
        .unwrap();
        assert_eq!(
            settings.api_base_url.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(session.user_id, "user-1");
    }

    #[test]
    fn remote_config_rejects_invalid_url() {
        let result = build_remote_config(
            Some("api.example.com".into()),
            Some("user".into()),
            Some("token".into()),
        );
        assert!(matches!(result, Err(CliError::Core(_))));
    }

    #[test]
    fn summary_prefers_known_fields() {
        assert_eq!(
            record_summary(&fields(json!({"title": "Run", "entry": "x"}))),
            "Run"
        );
        assert_eq!(record_summary(&fields(json!({"emotion": "calm"}))), "calm");
        assert_eq!(record_summary(&fields(json!({"progress": 3}))), "(no summary)");
    }

    #[test]
    fn record_line_shows_flags() {
        let record = StoredRecord {
            local_id: 7,
            remote_id: None,
            fields: fields(json!({"name": "Stretch"})),
            dirty: true,
            deleted: true,
            last_modified: util::now_ms(),
        };
        let line = format_record_line(&record);
        assert!(line.contains("Stretch"));
        assert!(line.contains("[unsynced]"));
        assert!(line.contains("[deleted]"));
    }
}
