#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod types;
pub mod utils;

pub use pipeline::{
    ConflictPolicy, IngestionConfig, IngestionOrchestrator, IngestionServices, IngestionTuning,
    SourceFile,
};

use std::collections::HashMap;

use common::storage::types::ingestion_task::{IngestionTask, TaskStatus};
use tracing::info;

/// Logs every status change of `task_ids` until all of them are terminal or removed,
/// then returns their final snapshots.
pub async fn follow_until_settled(
    orchestrator: &IngestionOrchestrator,
    task_ids: &[String],
) -> Vec<IngestionTask> {
    let registry = orchestrator.registry();
    let mut changes = registry.changes();
    let mut last_seen: HashMap<String, (TaskStatus, u8)> = HashMap::new();

    loop {
        let snapshots: Vec<IngestionTask> = task_ids
            .iter()
            .filter_map(|task_id| registry.get(task_id))
            .collect();

        for task in &snapshots {
            let current = (task.status, task.progress);
            if last_seen.insert(task.id.clone(), current) != Some(current) {
                info!(
                    task_id = %task.id,
                    name = %task.name,
                    status = task.status.as_str(),
                    progress = task.progress,
                    message = %task.stage_message,
                    "Ingestion progress"
                );
            }
        }

        if snapshots.iter().all(|task| task.status.is_terminal()) {
            return snapshots;
        }
        if changes.changed().await.is_err() {
            return snapshots;
        }
    }
}
