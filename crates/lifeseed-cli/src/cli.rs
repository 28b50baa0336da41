use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lifeseed_core::RecordKind;

#[derive(Parser)]
#[command(name = "lifeseed")]
#[command(about = "Track goals, moods, habits, and journal entries, offline-first")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a new record
    Add {
        #[command(subcommand)]
        record: AddCommands,
    },
    /// List records in a collection
    List {
        /// Collection to list
        #[arg(value_enum)]
        collection: CollectionArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Include tombstoned records
        #[arg(long)]
        deleted: bool,
    },
    /// Delete a record (tombstoned, so the deletion replicates)
    Delete {
        /// Collection the record lives in
        #[arg(value_enum)]
        collection: CollectionArg,
        /// Local record id
        local_id: i64,
    },
    /// Show replication status
    Status,
    /// Replicate with the remote store
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
pub enum AddCommands {
    /// Add a goal
    Goal {
        /// Goal title
        title: Vec<String>,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// Log a mood check-in
    Mood {
        /// Emotion name, e.g. "calm"
        emotion: String,
        /// Intensity, 1-10
        intensity: u8,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
    },
    /// Add a habit
    Habit {
        /// Habit name
        name: Vec<String>,
    },
    /// Write a journal entry
    Journal {
        /// Entry text
        entry: Vec<String>,
        /// Mood tag for the entry
        #[arg(long)]
        mood: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run one full sync pass now
    Now,
    /// Push local changes to the remote store (one-directional)
    Push,
    /// Replace ALL local data with remote data (destructive)
    Pull {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Mark everything as synced without transferring data
    ClearFlags,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CollectionArg {
    Goals,
    Moods,
    Habits,
    Journal,
    Insights,
}

impl From<CollectionArg> for RecordKind {
    fn from(value: CollectionArg) -> Self {
        match value {
            CollectionArg::Goals => Self::Goals,
            CollectionArg::Moods => Self::Moods,
            CollectionArg::Habits => Self::Habits,
            CollectionArg::Journal => Self::Journal,
            CollectionArg::Insights => Self::Insights,
        }
    }
}
