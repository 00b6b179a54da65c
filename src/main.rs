use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use serde::Serialize;
use todo_store::collection::{DocumentCollection, MemoryCollection, PgCollection, TxContext};
use todo_store::config::{self, StoreConfig};
use todo_store::error::ErrorCode;
use todo_store::{ListStore, StoreError, db};
use tracing::Level;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("--memory starts empty; only ping, lists and create can run against it")]
    NeedsPersistence,
}

#[derive(Parser, Debug)]
#[command(name = "todo-store", about = "Inspect and edit to-do lists directly in the store")]
struct Cli {
    /// Use a throwaway in-memory collection instead of Postgres.
    ///
    /// The collection starts empty and is gone when the command exits, so
    /// only `ping`, `lists` and `create` are accepted with this flag.
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the store answers.
    Ping,
    /// List every list with its item count, ordered by name.
    Lists,
    /// Create an empty list and print its id.
    Create { name: String },
    /// Print one list with its items.
    Show { list_id: String },
    /// Delete a list and all of its items.
    Delete { list_id: String },
    /// Append an item to a list.
    Add { list_id: String, label: String },
    /// Mark an item as checked (or unchecked with `--unchecked`).
    Check {
        list_id: String,
        item_id: String,
        #[arg(long)]
        unchecked: bool,
    },
    /// Remove an item from a list.
    Remove { list_id: String, item_id: String },
}

impl Command {
    fn runs_without_state(&self) -> bool {
        matches!(self, Self::Ping | Self::Lists | Self::Create { .. })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if config::debug_enabled() { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(CliError::Store(e)) => {
            tracing::error!(code = e.error_code(), retryable = e.retryable(), error = %e, "store operation failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command ran but found nothing to act on.
async fn run(cli: Cli) -> Result<bool, CliError> {
    if cli.memory {
        if !cli.command.runs_without_state() {
            return Err(CliError::NeedsPersistence);
        }
        tracing::warn!("using in-memory collection; nothing will be persisted");
        return execute(&ListStore::new(MemoryCollection::new()), cli.command).await;
    }

    let cfg = StoreConfig::from_env()?;
    let pool = db::init_pool(&cfg).await?;
    let store = ListStore::new(PgCollection::new(pool));
    store.ping().await?;
    execute(&store, cli.command).await
}

async fn execute<C: DocumentCollection>(store: &ListStore<C>, command: Command) -> Result<bool, CliError> {
    let tx = TxContext::Detached;
    match command {
        Command::Ping => {
            store.ping().await?;
            print_json(&"pong")
        }
        Command::Lists => {
            let summaries: Vec<_> = store.list_summaries(tx).try_collect().await?;
            print_json(&summaries)
        }
        Command::Create { name } => {
            let id = store.create_list(&name, tx).await?;
            print_json(&serde_json::json!({ "id": id, "name": name }))
        }
        Command::Show { list_id } => print_json(&store.get_list(&list_id, tx).await?),
        Command::Delete { list_id } => {
            let deleted = store.delete_list(&list_id, tx).await?;
            print_json(&deleted)?;
            Ok(deleted)
        }
        Command::Add { list_id, label } => print_found(store.add_item(&list_id, &label, tx).await?),
        Command::Check { list_id, item_id, unchecked } => {
            print_found(store.set_item_checked(&list_id, &item_id, !unchecked, tx).await?)
        }
        Command::Remove { list_id, item_id } => print_found(store.remove_item(&list_id, &item_id, tx).await?),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<bool, CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(true)
}

fn print_found<T: Serialize>(value: Option<T>) -> Result<bool, CliError> {
    print_json(&value)?;
    Ok(value.is_some())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
