use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use common::{
    storage::{registry::TaskRegistry, store::StorageManager, types::ingestion_task::TaskStatus},
    utils::config::get_config,
};
use ingestion_pipeline::{
    follow_until_settled, utils::cache_invalidation::BroadcastCache, ConflictPolicy,
    IngestionConfig, IngestionOrchestrator, IngestionServices, SourceFile,
};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ingest", about = "Submit content for processing and indexing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a document (PDF, DOCX, text, ...)
    Document {
        path: PathBuf,
        /// Content source id this upload replaces
        #[arg(long)]
        replace: Option<String>,
    },
    /// Upload an audio or video file
    Multimedia {
        path: PathBuf,
        #[arg(long)]
        replace: Option<String>,
    },
    /// Crawl and ingest a web page
    Url {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
}

fn conflict_policy(replace: Option<String>) -> ConflictPolicy {
    match replace {
        Some(existing_source_id) => ConflictPolicy::Replace {
            existing_source_id: Some(existing_source_id),
        },
        None => ConflictPolicy::Original,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let storage = StorageManager::new(&config).await?;
    let cache = Arc::new(BroadcastCache::default());
    let mut invalidations = cache.subscribe();
    tokio::spawn(async move {
        while let Ok(invalidation) = invalidations.recv().await {
            debug!(
                chatbot_id = %invalidation.chatbot_id,
                scopes = ?invalidation.scopes,
                "Content caches invalidated"
            );
        }
    });

    let services = IngestionServices::from_config(&config, storage, cache)?;
    let orchestrator = IngestionOrchestrator::start(
        Arc::new(TaskRegistry::new()),
        services,
        IngestionConfig::from_app_config(&config),
    );

    let task = match cli.command {
        Command::Document { path, replace } => {
            let file = SourceFile::from_path(&path).await?;
            orchestrator
                .begin_document_ingestion(file, conflict_policy(replace))
                .await?
        }
        Command::Multimedia { path, replace } => {
            let file = SourceFile::from_path(&path).await?;
            orchestrator
                .begin_multimedia_ingestion(file, conflict_policy(replace))
                .await?
        }
        Command::Url { url, title } => orchestrator.begin_url_ingestion(&url, title).await?,
    };
    info!(task_id = %task.id, name = %task.name, "Ingestion submitted");

    let settled = follow_until_settled(&orchestrator, &[task.id]).await;
    let failed: Vec<_> = settled
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .collect();
    if failed.is_empty() {
        info!("Ingestion finished");
        return Ok(());
    }

    for task in &failed {
        error!(
            task_id = %task.id,
            name = %task.name,
            status = task.status.as_str(),
            error = task.error.as_deref().unwrap_or_default(),
            "Ingestion did not complete"
        );
    }
    Err(format!("{} ingestion task(s) did not complete", failed.len()).into())
}
