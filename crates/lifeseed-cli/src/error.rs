use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lifeseed_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No goal title provided")]
    EmptyTitle,
    #[error("No habit name provided")]
    EmptyHabitName,
    #[error("No journal entry text provided")]
    EmptyEntry,
    #[error("Could not determine a data directory; pass --db-path")]
    NoDataDir,
    #[error("Restore cancelled")]
    RestoreCancelled,
    #[error(
        "Sync is not configured. Set LIFESEED_API_URL, LIFESEED_USER_ID, and LIFESEED_TOKEN (an .env file works too)."
    )]
    SyncNotConfigured,
}
