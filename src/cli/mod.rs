//! Administrative CLI (spec §6) — mirrors the HTTP API's write surface
//! for operators, plus `serve` to run the full service.

mod cache;
mod database;
mod duration;
mod generation_request;
mod problem;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::storage::{PostgresStorage, StorageGateway};
use crate::tracker::RequestTracker;

#[derive(Debug, Parser)]
#[command(name = "quizforge", about = "French grammar quiz generation and dispatch service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the HTTP API, worker pool, and sweeper until shutdown.
    Serve,
    /// Database administration.
    Database {
        #[command(subcommand)]
        action: DatabaseAction,
    },
    /// Problem pool administration.
    Problem {
        #[command(subcommand)]
        action: ProblemAction,
    },
    /// Generation request administration.
    GenerationRequest {
        #[command(subcommand)]
        action: GenerationRequestAction,
    },
    /// Cache administration on a running instance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum DatabaseAction {
    /// Seeds a small set of common verbs, idempotently.
    Init,
    /// Removes every entity tagged as test data.
    Clean,
}

#[derive(Debug, Subcommand)]
pub enum ProblemAction {
    /// Deletes problems older than the given duration.
    Purge {
        #[arg(long = "older-than")]
        older_than: String,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum GenerationRequestAction {
    /// Force-expires stale pending/processing requests.
    Clean {
        #[arg(long = "older-than")]
        older_than: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Reloads one or all in-process caches on a running instance.
    Reload {
        which: Option<String>,
        #[arg(long, env = "QUIZFORGE_ADMIN_API_KEY")]
        api_key: String,
        #[arg(long, env = "QUIZFORGE_API_BASE_URL", default_value = "http://localhost:8080")]
        base_url: String,
    },
}

/// Dispatches a parsed CLI command, connecting to storage directly where
/// that's sufficient and otherwise running the full service.
pub async fn dispatch(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve => crate::scheduler::run(config).await,
        Command::Database { action } => {
            let storage = connect(&config).await?;
            match action {
                DatabaseAction::Init => database::init(storage.as_ref()).await,
                DatabaseAction::Clean => database::clean(storage.as_ref()).await,
            }
        }
        Command::Problem { action } => {
            let storage = connect(&config).await?;
            match action {
                ProblemAction::Purge { older_than, topic, force } => {
                    let threshold = duration::parse_older_than(&older_than).map_err(anyhow::Error::msg)?;
                    problem::purge(storage.as_ref(), threshold, topic.as_deref(), force).await
                }
            }
        }
        Command::GenerationRequest { action } => {
            let storage = connect(&config).await?;
            let tracker = RequestTracker::new(storage);
            match action {
                GenerationRequestAction::Clean { older_than } => {
                    let threshold = duration::parse_older_than(&older_than).map_err(anyhow::Error::msg)?;
                    generation_request::clean(&tracker, threshold).await
                }
            }
        }
        Command::Cache { action } => match action {
            CacheAction::Reload { which, api_key, base_url } => {
                cache::reload(&base_url, &api_key, which.as_deref()).await
            }
        },
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<std::sync::Arc<dyn StorageGateway>> {
    let storage = PostgresStorage::connect(&config.database_url).await?;
    storage.migrate().await?;
    Ok(std::sync::Arc::new(storage))
}
