mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let store = commands::open_store(cli.db_path).await?;

    match cli.command {
        Commands::Add { record } => commands::run_add(&store, record).await,
        Commands::List {
            collection,
            json,
            deleted,
        } => commands::run_list(&store, collection.into(), json, deleted).await,
        Commands::Delete {
            collection,
            local_id,
        } => commands::run_delete(&store, collection.into(), local_id).await,
        Commands::Status => {
            commands::run_status(&store);
            Ok(())
        }
        Commands::Sync { command } => commands::run_sync(&store, command).await,
    }
}
