use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::AppError;
use crate::storage::types::ingestion_task::{IngestionTask, NewTask, TaskUpdate};

/// In-memory store of ingestion tasks and the single writer of their lifecycle.
///
/// Every successful mutation bumps a revision counter observable through [`TaskRegistry::changes`].
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, IngestionTask>>,
    revision: watch::Sender<u64>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            tasks: RwLock::new(HashMap::new()),
            revision,
        }
    }

    /// Create a task with a fresh id and its kind's initial status.
    pub fn add(&self, data: NewTask) -> IngestionTask {
        let task = IngestionTask::new(data);
        debug!(
            task_id = %task.id,
            kind = task.kind.as_str(),
            status = task.status.as_str(),
            "Registered ingestion task"
        );
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id.clone(), task.clone());
        self.bump();
        task
    }

    /// Merge `update` into the task.
    ///
    /// Returns `Ok(None)` for unknown ids. Terminal tasks, non-edge status changes and
    /// reassigned backend identifiers are rejected without modifying the task.
    pub fn update(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> Result<Option<IngestionTask>, AppError> {
        let updated = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let Some(task) = tasks.get_mut(task_id) else {
                return Ok(None);
            };
            let previous = task.status;
            task.apply(update, Utc::now())?;
            if previous != task.status {
                debug!(
                    task_id = %task_id,
                    from = previous.as_str(),
                    to = task.status.as_str(),
                    "Task status changed"
                );
            }
            task.clone()
        };
        self.bump();
        Ok(Some(updated))
    }

    pub fn remove(&self, task_id: &str) -> Option<IngestionTask> {
        let removed = self
            .tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    pub fn get(&self, task_id: &str) -> Option<IngestionTask> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Vec<IngestionTask> {
        let mut tasks: Vec<IngestionTask> = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver that is notified after every successful add, update or removal.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::ingestion_task::{TaskKind, TaskStatus};

    fn document() -> NewTask {
        NewTask::document("report.pdf", "application/pdf", 2048)
    }

    #[test]
    fn test_add_and_get() {
        let registry = TaskRegistry::new();
        let task = registry.add(document());

        let stored = registry.get(&task.id).expect("task stored");
        assert_eq!(stored, task);
        assert_eq!(stored.kind, TaskKind::Document);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_update_unknown_task_is_noop() {
        let registry = TaskRegistry::new();
        let result = registry
            .update("missing", TaskUpdate::new().progress(10))
            .expect("no error for unknown ids");
        assert!(result.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_follows_lifecycle() {
        let registry = TaskRegistry::new();
        let task = registry.add(document());

        let updated = registry
            .update(
                &task.id,
                TaskUpdate::new()
                    .status(TaskStatus::Uploading)
                    .message("Uploading to storage..."),
            )
            .expect("valid edge")
            .expect("task exists");
        assert_eq!(updated.status, TaskStatus::Uploading);
        assert!(updated.updated_at >= task.updated_at);

        let err = registry
            .update(&task.id, TaskUpdate::new().status(TaskStatus::Completed))
            .expect_err("jump must be rejected");
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(
            registry.get(&task.id).expect("task").status,
            TaskStatus::Uploading
        );
    }

    #[test]
    fn test_terminal_tasks_are_frozen() {
        let registry = TaskRegistry::new();
        let task = registry.add(document());
        registry
            .update(
                &task.id,
                TaskUpdate::new()
                    .status(TaskStatus::Cancelled)
                    .message("Cancelled by user"),
            )
            .expect("cancel");

        let err = registry
            .update(&task.id, TaskUpdate::new().progress(50))
            .expect_err("terminal");
        assert!(matches!(err, AppError::TaskTerminal(_)));
        let stored = registry.get(&task.id).expect("task");
        assert_eq!(stored.progress, 0);
        assert_eq!(stored.stage_message, "Cancelled by user");
    }

    #[test]
    fn test_list_is_newest_first() {
        let registry = TaskRegistry::new();
        let first = registry.add(document());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = registry.add(NewTask::url("https://example.com", None));

        let ids: Vec<String> = registry.list().into_iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_remove_drops_task() {
        let registry = TaskRegistry::new();
        let task = registry.add(document());
        assert!(registry.remove(&task.id).is_some());
        assert!(registry.remove(&task.id).is_none());
        assert!(registry.get(&task.id).is_none());
    }

    #[tokio::test]
    async fn test_changes_are_signalled() {
        let registry = TaskRegistry::new();
        let mut changes = registry.changes();
        let initial = *changes.borrow_and_update();

        let task = registry.add(document());
        changes.changed().await.expect("signal after add");
        let after_add = *changes.borrow_and_update();
        assert!(after_add > initial);

        registry
            .update(&task.id, TaskUpdate::new().status(TaskStatus::Uploading))
            .expect("update");
        changes.changed().await.expect("signal after update");
        assert!(*changes.borrow_and_update() > after_add);
    }
}
