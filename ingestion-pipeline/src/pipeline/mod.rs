mod config;
mod entry_points;
mod multiplexer;
mod services;
mod status;

pub use config::{IngestionConfig, IngestionTuning};
pub use multiplexer::{ChannelMessage, ConnectionMultiplexer, RoutedEvent};
#[allow(clippy::module_name_repetitions)]
pub use services::{
    ConflictPolicy, ContentCache, IngestionServices, PipelineApi, SourceFile, StorageUploader,
    UpdateChannel,
};
pub use status::{
    classify, failure_detail, BackendStatus, StageEvent, StatusMapper, PARSE_FAILURE_MESSAGE,
};

use std::sync::{Arc, Weak};

use common::{
    error::AppError,
    storage::{
        registry::TaskRegistry,
        types::ingestion_task::{
            validate_transition, IngestionTask, ReplaceOutcome, StageKind, TaskKind, TaskStatus,
            TaskUpdate,
        },
    },
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::{
    backend::{
        BeginIndexingRequest, IndexingVariant, PipelineAccepted, ProcessDocumentRequest,
        ProcessMultimediaRequest, ProcessUrlRequest,
    },
    status_event::StatusEvent,
};

pub const MISSING_REFERENCE_MESSAGE: &str = "Missing reference ID for indexing.";
pub const STREAM_ERROR_MESSAGE: &str = "Live update stream reported an error";
pub const LOST_CONNECTION_MESSAGE: &str = "Lost connection to progress updates";

/// Stage-initiation call that starts the processing phase.
enum ProcessingRequest {
    Document(ProcessDocumentRequest),
    Url(ProcessUrlRequest),
    Multimedia(ProcessMultimediaRequest),
}

/// Drives ingestion tasks through upload, processing and indexing.
///
/// All status changes go through the shared [`TaskRegistry`]; live progress arrives
/// through the [`ConnectionMultiplexer`] and is applied by a dispatcher task.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionOrchestrator {
    registry: Arc<TaskRegistry>,
    multiplexer: ConnectionMultiplexer,
    services: IngestionServices,
    config: IngestionConfig,
}

impl IngestionOrchestrator {
    /// Builds the orchestrator and spawns its dispatcher. Must be called from within a tokio runtime.
    pub fn start(
        registry: Arc<TaskRegistry>,
        services: IngestionServices,
        config: IngestionConfig,
    ) -> Arc<Self> {
        let (multiplexer, events) = ConnectionMultiplexer::new(Arc::clone(&services.channel));
        let orchestrator = Arc::new(Self {
            registry,
            multiplexer,
            services,
            config,
        });
        tokio::spawn(dispatch_loop(Arc::downgrade(&orchestrator), events));
        orchestrator
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Job id and stage of the task's live subscription, if one is open.
    pub fn active_subscription(&self, task_id: &str) -> Option<(String, StageKind)> {
        self.multiplexer.active(task_id)
    }

    /// Resolves once `predicate` holds for the task. `None` if the task is removed first.
    pub async fn wait_for<F>(&self, task_id: &str, predicate: F) -> Option<IngestionTask>
    where
        F: Fn(&IngestionTask) -> bool,
    {
        let mut changes = self.registry.changes();
        loop {
            let task = self.registry.get(task_id)?;
            if predicate(&task) {
                return Some(task);
            }
            if changes.changed().await.is_err() {
                return self.registry.get(task_id);
            }
        }
    }

    pub async fn wait_until_terminal(&self, task_id: &str) -> Option<IngestionTask> {
        self.wait_for(task_id, |task| task.status.is_terminal()).await
    }

    /// Marks a running task cancelled and stops listening for its updates.
    /// In-flight backend calls are not interrupted; their results are discarded.
    pub fn cancel(&self, task_id: &str) -> Result<IngestionTask, AppError> {
        let task = self
            .registry
            .update(
                task_id,
                TaskUpdate::new()
                    .status(TaskStatus::Cancelled)
                    .message("Cancelled"),
            )?
            .ok_or_else(|| AppError::NotFound(format!("ingestion task {task_id}")))?;
        self.multiplexer.close(task_id);
        info!(%task_id, "Ingestion task cancelled");
        Ok(task)
    }

    /// Removes a finished task from the registry.
    pub fn dismiss(&self, task_id: &str) -> Result<IngestionTask, AppError> {
        let task = self
            .registry
            .get(task_id)
            .ok_or_else(|| AppError::NotFound(format!("ingestion task {task_id}")))?;
        if !task.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "ingestion task {task_id} is still {}",
                task.status.as_str()
            )));
        }
        self.multiplexer.close(task_id);
        self.registry
            .remove(task_id)
            .ok_or_else(|| AppError::NotFound(format!("ingestion task {task_id}")))
    }

    /// The task, unless it is gone or already terminal.
    fn live_task(&self, task_id: &str) -> Option<IngestionTask> {
        self.registry
            .get(task_id)
            .filter(|task| !task.status.is_terminal())
    }

    /// Applies `update`, logging instead of failing when the task moved on.
    fn transition(&self, task_id: &str, update: TaskUpdate) -> Option<IngestionTask> {
        match self.registry.update(task_id, update) {
            Ok(Some(task)) => Some(task),
            Ok(None) => {
                debug!(%task_id, "Task disappeared before update");
                None
            }
            Err(AppError::TaskTerminal(_)) => {
                debug!(%task_id, "Task already terminal; update dropped");
                None
            }
            Err(err) => {
                warn!(%task_id, error = %err, "Rejected task update");
                None
            }
        }
    }

    /// Closes the subscription and records `status`; `error` holds the bare cause,
    /// `message` the text shown for the stage.
    fn fail(&self, task_id: &str, status: TaskStatus, message: &str, error: &str) {
        self.multiplexer.close(task_id);
        if self
            .transition(
                task_id,
                TaskUpdate::new()
                    .status(status)
                    .message(message)
                    .error(error),
            )
            .is_some()
        {
            warn!(%task_id, status = status.as_str(), %error, "Ingestion task failed");
        }
    }

    /// Upload, then start processing. Used by document and multimedia ingestion.
    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    async fn run_upload_pipeline(&self, task_id: &str, file: SourceFile, policy: ConflictPolicy) {
        let chatbot_id = self.config.chatbot_id.as_str();
        if self
            .transition(
                task_id,
                TaskUpdate::new()
                    .status(TaskStatus::Uploading)
                    .progress(0)
                    .message("Uploading to storage..."),
            )
            .is_none()
        {
            return;
        }

        if let Some(source_id) = policy.replaced_source() {
            let outcome = match self
                .services
                .api
                .delete_content_source(chatbot_id, source_id)
                .await
            {
                Ok(()) => {
                    info!(%task_id, %source_id, "Removed replaced content source");
                    ReplaceOutcome::Replaced {
                        source_id: source_id.to_string(),
                    }
                }
                Err(err) => {
                    warn!(%task_id, %source_id, error = %err, "Could not remove replaced content source; uploading anyway");
                    ReplaceOutcome::ReplaceSkipped {
                        source_id: source_id.to_string(),
                        reason: failure_detail(&err),
                    }
                }
            };
            if self
                .transition(task_id, TaskUpdate::new().replace_outcome(outcome))
                .is_none()
            {
                return;
            }
        }

        let uploaded = self
            .services
            .uploader
            .upload(chatbot_id, &file, &policy)
            .await;
        if self.live_task(task_id).is_none() {
            debug!(%task_id, "Task ended while uploading");
            return;
        }
        let storage_path = match uploaded {
            Ok(path) => path,
            Err(err) => {
                let detail = failure_detail(&err);
                self.fail(
                    task_id,
                    TaskStatus::UploadFailed,
                    &format!("Upload failed: {detail}"),
                    &detail,
                );
                return;
            }
        };

        let reference_id = uuid::Uuid::new_v4().to_string();
        let Some(task) = self.transition(
            task_id,
            TaskUpdate::new()
                .status(TaskStatus::Uploaded)
                .progress(100)
                .message("Upload complete")
                .storage_path(storage_path.clone())
                .reference_id(reference_id.clone()),
        ) else {
            return;
        };
        info!(%task_id, %storage_path, %reference_id, "Source file uploaded");

        let request = match task.kind {
            TaskKind::Multimedia => ProcessingRequest::Multimedia(ProcessMultimediaRequest {
                user_id: self.config.user_id.clone(),
                chatbot_id: chatbot_id.to_string(),
                file_path: storage_path,
                reference_id,
                media_type: task
                    .media_kind
                    .map_or("audio", |kind| kind.as_str())
                    .to_string(),
                original_filename: file.name,
                file_size: task.file_size.unwrap_or_default(),
            }),
            TaskKind::Document | TaskKind::Url => {
                ProcessingRequest::Document(ProcessDocumentRequest {
                    user_id: self.config.user_id.clone(),
                    chatbot_id: chatbot_id.to_string(),
                    file_path_in_storage: storage_path,
                    reference_id,
                    file_name: file.name,
                    file_size: task.file_size.unwrap_or_default(),
                    content_type: file.content_type,
                })
            }
        };
        self.initiate_processing(task_id, request).await;
    }

    /// Submits a URL for processing. The task is already `processing_queued`.
    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    async fn run_url_pipeline(&self, task_id: &str, url: String, title: Option<String>) {
        let reference_id = uuid::Uuid::new_v4().to_string();
        if self
            .transition(
                task_id,
                TaskUpdate::new()
                    .reference_id(reference_id.clone())
                    .message("Submitting URL for processing..."),
            )
            .is_none()
        {
            return;
        }

        let request = ProcessingRequest::Url(ProcessUrlRequest {
            user_id: self.config.user_id.clone(),
            chatbot_id: self.config.chatbot_id.clone(),
            url,
            reference_id,
            title,
        });
        self.initiate_processing(task_id, request).await;
    }

    async fn initiate_processing(&self, task_id: &str, request: ProcessingRequest) {
        let api = &self.services.api;
        let result = match request {
            ProcessingRequest::Document(request) => api.process_document(request).await,
            ProcessingRequest::Url(request) => api.process_url(request).await,
            ProcessingRequest::Multimedia(request) => api.process_multimedia(request).await,
        };

        let Some(task) = self.live_task(task_id) else {
            debug!(%task_id, "Task ended while processing was requested");
            return;
        };
        let accepted = match result {
            Ok(accepted) => accepted,
            Err(err) => {
                let detail = failure_detail(&err);
                self.fail(
                    task_id,
                    TaskStatus::ProcessingFailed,
                    &format!("Failed to start processing: {detail}"),
                    &detail,
                );
                return;
            }
        };
        warn_on_reference_mismatch(&task, &accepted);

        let message = match (task.kind, task.media_kind, task.estimated_duration_secs) {
            (TaskKind::Multimedia, Some(media), Some(secs)) => format!(
                "{} queued for processing (about {secs}s)",
                media.label()
            ),
            _ => "Queued for processing".to_string(),
        };
        self.open_stage(
            task_id,
            &accepted.task_identifier,
            StageKind::Processing,
            TaskUpdate::new()
                .status(TaskStatus::ProcessingQueued)
                .progress(0)
                .message(message)
                .processing_job_id(accepted.task_identifier.clone())
                .clear_error(),
        );
    }

    /// Records the accepted stage on the task and subscribes to its updates.
    fn open_stage(&self, task_id: &str, job_id: &str, stage: StageKind, update: TaskUpdate) {
        if self.transition(task_id, update).is_none() {
            return;
        }
        self.multiplexer.open(task_id, job_id, stage);
        // A cancel may have landed between the update and the subscription.
        if self.live_task(task_id).is_none() {
            self.multiplexer.close(task_id);
            return;
        }
        info!(%task_id, %job_id, stage = stage.as_str(), "Stage accepted by backend");
    }

    fn dispatch(self: &Arc<Self>, message: ChannelMessage) {
        let Some(routed) = self.multiplexer.resolve(message) else {
            debug!("Dropping update for an unsubscribed job");
            return;
        };
        let RoutedEvent {
            task_id,
            job_id,
            stage,
            event,
        } = routed;

        let Some(task) = self.live_task(&task_id) else {
            debug!(%task_id, %job_id, event = event.kind(), "Ignoring update for finished task");
            self.multiplexer.close(&task_id);
            return;
        };

        match event {
            StageEvent::Update(status) => self.apply_update(&task, stage, &status),
            StageEvent::Complete(status) => {
                let orchestrator = Arc::clone(self);
                tokio::spawn(async move {
                    orchestrator.complete_stage(&task_id, stage, status).await;
                });
            }
            StageEvent::Error { message } => {
                let error = message.unwrap_or_else(|| STREAM_ERROR_MESSAGE.to_string());
                self.fail(
                    &task_id,
                    stage.failed_status(),
                    &format!("Error: {error}"),
                    &error,
                );
            }
            StageEvent::Close => self.handle_close(&task, &job_id),
        }
    }

    fn apply_update(&self, task: &IngestionTask, stage: StageKind, status: &StatusEvent) {
        let stage = status.stage().unwrap_or(stage);
        let next = match StatusMapper::try_map(&status.status, stage) {
            Some(next) => next,
            None => {
                warn!(
                    task_id = %task.id,
                    backend_status = %status.status,
                    "Unknown backend status; keeping current status"
                );
                task.status
            }
        };
        warn_on_reference_mismatch_event(task, status);

        let mut update = TaskUpdate::new();
        if next != task.status {
            if validate_transition(task.status, next).is_ok() {
                update = update.status(next);
            } else {
                debug!(
                    task_id = %task.id,
                    from = task.status.as_str(),
                    to = next.as_str(),
                    "Ignoring out-of-order status"
                );
            }
        }
        if let Some(progress) = status.progress() {
            update = update.progress(progress.max(task.progress));
        }
        if let Some(message) = status
            .current_step_description
            .as_deref()
            .filter(|message| !message.trim().is_empty())
        {
            update = update.message(message);
        }
        if !update.is_empty() {
            self.transition(&task.id, update);
        }
    }

    #[tracing::instrument(skip_all, fields(task_id = %task_id, stage = stage.as_str()))]
    async fn complete_stage(&self, task_id: &str, stage: StageKind, status: StatusEvent) {
        match stage {
            StageKind::Processing => self.begin_indexing(task_id).await,
            StageKind::Indexing => {
                self.multiplexer.close(task_id);
                let message = status
                    .current_step_description
                    .clone()
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "Ready".to_string());
                if self
                    .transition(
                        task_id,
                        TaskUpdate::new()
                            .status(TaskStatus::Completed)
                            .progress(status.progress().unwrap_or(100))
                            .message(message)
                            .clear_error(),
                    )
                    .is_some()
                {
                    self.services.cache.invalidate(&self.config.chatbot_id);
                    info!(%task_id, "Ingestion task completed");
                }
            }
        }
    }

    async fn begin_indexing(&self, task_id: &str) {
        self.multiplexer.close(task_id);
        let Some(task) = self.live_task(task_id) else {
            return;
        };
        let Some(reference_id) = task.backend_reference_id.clone() else {
            self.fail(
                task_id,
                TaskStatus::ProcessingFailed,
                &format!("Error: {MISSING_REFERENCE_MESSAGE}"),
                MISSING_REFERENCE_MESSAGE,
            );
            return;
        };

        self.services.cache.invalidate(&self.config.chatbot_id);
        if self
            .transition(
                task_id,
                TaskUpdate::new()
                    .progress(100)
                    .message("Processing complete, starting indexing..."),
            )
            .is_none()
        {
            return;
        }

        let request = BeginIndexingRequest {
            user_id: self.config.user_id.clone(),
            chatbot_id: self.config.chatbot_id.clone(),
            reference_id,
        };
        let result = self
            .services
            .api
            .begin_indexing(request, IndexingVariant::for_kind(task.kind))
            .await;

        if self.live_task(task_id).is_none() {
            debug!(%task_id, "Task ended while indexing was requested");
            return;
        }
        match result {
            Ok(accepted) => self.open_stage(
                task_id,
                &accepted.task_identifier,
                StageKind::Indexing,
                TaskUpdate::new()
                    .status(TaskStatus::IndexingQueued)
                    .progress(0)
                    .message("Queued for indexing")
                    .indexing_job_id(accepted.task_identifier.clone())
                    .clear_error(),
            ),
            Err(err) => {
                let detail = failure_detail(&err);
                self.fail(
                    task_id,
                    TaskStatus::IndexingFailed,
                    &format!("Failed to start indexing: {detail}"),
                    &detail,
                );
            }
        }
    }

    fn handle_close(self: &Arc<Self>, task: &IngestionTask, job_id: &str) {
        warn!(
            task_id = %task.id,
            %job_id,
            status = task.status.as_str(),
            "Status stream closed before a terminal event"
        );
        let Some(grace) = self.config.tuning.close_grace else {
            return;
        };

        let orchestrator = Arc::downgrade(self);
        let task_id = task.id.clone();
        let last_seen = task.updated_at;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.expire_silent_task(&task_id, last_seen);
            }
        });
    }

    fn expire_silent_task(&self, task_id: &str, last_seen: chrono::DateTime<chrono::Utc>) {
        let Some(task) = self.live_task(task_id) else {
            return;
        };
        if task.updated_at != last_seen || self.multiplexer.active(task_id).is_some() {
            return;
        }
        self.fail(
            task_id,
            TaskStatus::FailedPermanently,
            &format!("Error: {LOST_CONNECTION_MESSAGE}"),
            LOST_CONNECTION_MESSAGE,
        );
    }
}

async fn dispatch_loop(
    orchestrator: Weak<IngestionOrchestrator>,
    mut events: mpsc::UnboundedReceiver<ChannelMessage>,
) {
    while let Some(message) = events.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        orchestrator.dispatch(message);
    }
    debug!("Ingestion dispatcher stopped");
}

fn warn_on_reference_mismatch(task: &IngestionTask, accepted: &PipelineAccepted) {
    if let (Some(ours), Some(theirs)) = (
        task.backend_reference_id.as_deref(),
        accepted.reference_id.as_deref(),
    ) {
        if ours != theirs {
            warn!(task_id = %task.id, ours, theirs, "Backend echoed a different reference id; keeping ours");
        }
    }
}

fn warn_on_reference_mismatch_event(task: &IngestionTask, status: &StatusEvent) {
    if let (Some(ours), Some(theirs)) = (
        task.backend_reference_id.as_deref(),
        status.reference_id.as_deref(),
    ) {
        if ours != theirs {
            debug!(task_id = %task.id, ours, theirs, "Status event carries a different reference id");
        }
    }
}

#[cfg(test)]
mod tests;
