use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use uuid::Uuid;

use crate::error::AppError;

pub const MIN_ESTIMATED_DURATION_SECS: u64 = 30;
pub const MAX_ESTIMATED_DURATION_SECS: u64 = 300;
const ESTIMATED_SECS_PER_MIB: u64 = 10;
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Document,
    Url,
    Multimedia,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Document => "document",
            TaskKind::Url => "url",
            TaskKind::Multimedia => "multimedia",
        }
    }
}

/// One of the two backend pipeline phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Processing,
    Indexing,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Processing => "processing",
            StageKind::Indexing => "indexing",
        }
    }

    /// Parses the backend `task_type` vocabulary (`DOCUMENT_INDEXING`, `URL_PROCESSING`, ...).
    pub fn from_task_type(task_type: &str) -> Self {
        if task_type.to_ascii_uppercase().contains("INDEXING") {
            StageKind::Indexing
        } else {
            StageKind::Processing
        }
    }

    pub fn failed_status(&self) -> TaskStatus {
        match self {
            StageKind::Processing => TaskStatus::ProcessingFailed,
            StageKind::Indexing => TaskStatus::IndexingFailed,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    PendingUpload,
    Uploading,
    UploadFailed,
    Uploaded,
    ProcessingQueued,
    Processing,
    ProcessingFailed,
    IndexingQueued,
    Indexing,
    IndexingFailed,
    Completed,
    FailedPermanently,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::PendingUpload => "pending_upload",
            TaskStatus::Uploading => "uploading",
            TaskStatus::UploadFailed => "upload_failed",
            TaskStatus::Uploaded => "uploaded",
            TaskStatus::ProcessingQueued => "processing_queued",
            TaskStatus::Processing => "processing",
            TaskStatus::ProcessingFailed => "processing_failed",
            TaskStatus::IndexingQueued => "indexing_queued",
            TaskStatus::Indexing => "indexing",
            TaskStatus::IndexingFailed => "indexing_failed",
            TaskStatus::Completed => "completed",
            TaskStatus::FailedPermanently => "failed_permanently",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::UploadFailed
                | TaskStatus::ProcessingFailed
                | TaskStatus::IndexingFailed
                | TaskStatus::Completed
                | TaskStatus::FailedPermanently
                | TaskStatus::Cancelled
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TaskStatus::UploadFailed
                | TaskStatus::ProcessingFailed
                | TaskStatus::IndexingFailed
                | TaskStatus::FailedPermanently
        )
    }

    /// The backend stage this status belongs to, if any.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            TaskStatus::ProcessingQueued | TaskStatus::Processing | TaskStatus::ProcessingFailed => {
                Some(StageKind::Processing)
            }
            TaskStatus::IndexingQueued | TaskStatus::Indexing | TaskStatus::IndexingFailed => {
                Some(StageKind::Indexing)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Video when the extension or MIME type says so; everything else is treated as audio.
    pub fn detect(file_name: &str, content_type: &str) -> Self {
        let extension = std::path::Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let video_extension = extension
            .as_deref()
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext));

        if video_extension || content_type.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Audio
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Video => "Video",
            MediaKind::Audio => "Audio",
        }
    }
}

/// Rough processing estimate shown while a multimedia task runs.
pub fn estimate_processing_secs(file_size: u64) -> u64 {
    let mib = file_size / (1024 * 1024);
    mib.saturating_mul(ESTIMATED_SECS_PER_MIB)
        .clamp(MIN_ESTIMATED_DURATION_SECS, MAX_ESTIMATED_DURATION_SECS)
}

/// Result of the best-effort removal of a prior content source under the `replace` policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplaceOutcome {
    Replaced { source_id: String },
    ReplaceSkipped { source_id: String, reason: String },
}

#[derive(Debug, Clone, Copy)]
enum TaskTransition {
    BeginUpload,
    FinishUpload,
    FailUpload,
    QueueProcessing,
    StartProcessing,
    FailProcessing,
    QueueIndexing,
    StartIndexing,
    FailIndexing,
    Complete,
    FailPermanently,
    Cancel,
}

impl TaskTransition {
    fn as_str(&self) -> &'static str {
        match self {
            TaskTransition::BeginUpload => "begin_upload",
            TaskTransition::FinishUpload => "finish_upload",
            TaskTransition::FailUpload => "fail_upload",
            TaskTransition::QueueProcessing => "queue_processing",
            TaskTransition::StartProcessing => "start_processing",
            TaskTransition::FailProcessing => "fail_processing",
            TaskTransition::QueueIndexing => "queue_indexing",
            TaskTransition::StartIndexing => "start_indexing",
            TaskTransition::FailIndexing => "fail_indexing",
            TaskTransition::Complete => "complete",
            TaskTransition::FailPermanently => "fail_permanently",
            TaskTransition::Cancel => "cancel",
        }
    }

    /// The single event that can lead into `target`.
    fn into_status(target: TaskStatus) -> Option<Self> {
        match target {
            TaskStatus::PendingUpload => None,
            TaskStatus::Uploading => Some(TaskTransition::BeginUpload),
            TaskStatus::Uploaded => Some(TaskTransition::FinishUpload),
            TaskStatus::UploadFailed => Some(TaskTransition::FailUpload),
            TaskStatus::ProcessingQueued => Some(TaskTransition::QueueProcessing),
            TaskStatus::Processing => Some(TaskTransition::StartProcessing),
            TaskStatus::ProcessingFailed => Some(TaskTransition::FailProcessing),
            TaskStatus::IndexingQueued => Some(TaskTransition::QueueIndexing),
            TaskStatus::Indexing => Some(TaskTransition::StartIndexing),
            TaskStatus::IndexingFailed => Some(TaskTransition::FailIndexing),
            TaskStatus::Completed => Some(TaskTransition::Complete),
            TaskStatus::FailedPermanently => Some(TaskTransition::FailPermanently),
            TaskStatus::Cancelled => Some(TaskTransition::Cancel),
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: TaskLifecycleMachine,
        initial: PendingUpload,
        states: [
            PendingUpload, Uploading, UploadFailed, Uploaded, ProcessingQueued, Processing,
            ProcessingFailed, IndexingQueued, Indexing, IndexingFailed, Completed,
            FailedPermanently, Cancelled
        ],
        events {
            begin_upload {
                transition: { from: PendingUpload, to: Uploading }
                transition: { from: ProcessingQueued, to: Uploading }
            }
            finish_upload {
                transition: { from: Uploading, to: Uploaded }
            }
            fail_upload {
                transition: { from: Uploading, to: UploadFailed }
            }
            queue_processing {
                transition: { from: Uploaded, to: ProcessingQueued }
            }
            start_processing {
                transition: { from: ProcessingQueued, to: Processing }
            }
            fail_processing {
                transition: { from: Uploaded, to: ProcessingFailed }
                transition: { from: ProcessingQueued, to: ProcessingFailed }
                transition: { from: Processing, to: ProcessingFailed }
            }
            queue_indexing {
                transition: { from: ProcessingQueued, to: IndexingQueued }
                transition: { from: Processing, to: IndexingQueued }
            }
            start_indexing {
                transition: { from: IndexingQueued, to: Indexing }
            }
            fail_indexing {
                transition: { from: ProcessingQueued, to: IndexingFailed }
                transition: { from: Processing, to: IndexingFailed }
                transition: { from: IndexingQueued, to: IndexingFailed }
                transition: { from: Indexing, to: IndexingFailed }
            }
            complete {
                transition: { from: IndexingQueued, to: Completed }
                transition: { from: Indexing, to: Completed }
            }
            fail_permanently {
                transition: { from: PendingUpload, to: FailedPermanently }
                transition: { from: Uploading, to: FailedPermanently }
                transition: { from: Uploaded, to: FailedPermanently }
                transition: { from: ProcessingQueued, to: FailedPermanently }
                transition: { from: Processing, to: FailedPermanently }
                transition: { from: IndexingQueued, to: FailedPermanently }
                transition: { from: Indexing, to: FailedPermanently }
            }
            cancel {
                transition: { from: PendingUpload, to: Cancelled }
                transition: { from: Uploading, to: Cancelled }
                transition: { from: Uploaded, to: Cancelled }
                transition: { from: ProcessingQueued, to: Cancelled }
                transition: { from: Processing, to: Cancelled }
                transition: { from: IndexingQueued, to: Cancelled }
                transition: { from: Indexing, to: Cancelled }
            }
        }
    }

    pub(super) fn pending_upload() -> TaskLifecycleMachine<(), PendingUpload> {
        TaskLifecycleMachine::new(())
    }

    pub(super) fn uploading() -> TaskLifecycleMachine<(), Uploading> {
        pending_upload()
            .begin_upload()
            .expect("begin_upload transition from PendingUpload should exist")
    }

    pub(super) fn uploaded() -> TaskLifecycleMachine<(), Uploaded> {
        uploading()
            .finish_upload()
            .expect("finish_upload transition from Uploading should exist")
    }

    pub(super) fn processing_queued() -> TaskLifecycleMachine<(), ProcessingQueued> {
        uploaded()
            .queue_processing()
            .expect("queue_processing transition from Uploaded should exist")
    }

    pub(super) fn processing() -> TaskLifecycleMachine<(), Processing> {
        processing_queued()
            .start_processing()
            .expect("start_processing transition from ProcessingQueued should exist")
    }

    pub(super) fn indexing_queued() -> TaskLifecycleMachine<(), IndexingQueued> {
        processing()
            .queue_indexing()
            .expect("queue_indexing transition from Processing should exist")
    }

    pub(super) fn indexing() -> TaskLifecycleMachine<(), Indexing> {
        indexing_queued()
            .start_indexing()
            .expect("start_indexing transition from IndexingQueued should exist")
    }
}

fn invalid_transition(state: TaskStatus, event: TaskTransition) -> AppError {
    AppError::InvalidTransition {
        from: state.as_str().to_string(),
        event: event.as_str().to_string(),
    }
}

#[allow(clippy::too_many_lines)]
fn compute_next_state(state: TaskStatus, event: TaskTransition) -> Result<TaskStatus, AppError> {
    use lifecycle::*;
    use TaskStatus as S;
    use TaskTransition as T;

    match (state, event) {
        (S::PendingUpload, T::BeginUpload) => pending_upload()
            .begin_upload()
            .map(|_| S::Uploading)
            .map_err(|_| invalid_transition(state, event)),
        (S::ProcessingQueued, T::BeginUpload) => processing_queued()
            .begin_upload()
            .map(|_| S::Uploading)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploading, T::FinishUpload) => uploading()
            .finish_upload()
            .map(|_| S::Uploaded)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploading, T::FailUpload) => uploading()
            .fail_upload()
            .map(|_| S::UploadFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploaded, T::QueueProcessing) => uploaded()
            .queue_processing()
            .map(|_| S::ProcessingQueued)
            .map_err(|_| invalid_transition(state, event)),
        (S::ProcessingQueued, T::StartProcessing) => processing_queued()
            .start_processing()
            .map(|_| S::Processing)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploaded, T::FailProcessing) => uploaded()
            .fail_processing()
            .map(|_| S::ProcessingFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::ProcessingQueued, T::FailProcessing) => processing_queued()
            .fail_processing()
            .map(|_| S::ProcessingFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::Processing, T::FailProcessing) => processing()
            .fail_processing()
            .map(|_| S::ProcessingFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::ProcessingQueued, T::QueueIndexing) => processing_queued()
            .queue_indexing()
            .map(|_| S::IndexingQueued)
            .map_err(|_| invalid_transition(state, event)),
        (S::Processing, T::QueueIndexing) => processing()
            .queue_indexing()
            .map(|_| S::IndexingQueued)
            .map_err(|_| invalid_transition(state, event)),
        (S::IndexingQueued, T::StartIndexing) => indexing_queued()
            .start_indexing()
            .map(|_| S::Indexing)
            .map_err(|_| invalid_transition(state, event)),
        (S::ProcessingQueued, T::FailIndexing) => processing_queued()
            .fail_indexing()
            .map(|_| S::IndexingFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::Processing, T::FailIndexing) => processing()
            .fail_indexing()
            .map(|_| S::IndexingFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::IndexingQueued, T::FailIndexing) => indexing_queued()
            .fail_indexing()
            .map(|_| S::IndexingFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::Indexing, T::FailIndexing) => indexing()
            .fail_indexing()
            .map(|_| S::IndexingFailed)
            .map_err(|_| invalid_transition(state, event)),
        (S::IndexingQueued, T::Complete) => indexing_queued()
            .complete()
            .map(|_| S::Completed)
            .map_err(|_| invalid_transition(state, event)),
        (S::Indexing, T::Complete) => indexing()
            .complete()
            .map(|_| S::Completed)
            .map_err(|_| invalid_transition(state, event)),
        (S::PendingUpload, T::FailPermanently) => pending_upload()
            .fail_permanently()
            .map(|_| S::FailedPermanently)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploading, T::FailPermanently) => uploading()
            .fail_permanently()
            .map(|_| S::FailedPermanently)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploaded, T::FailPermanently) => uploaded()
            .fail_permanently()
            .map(|_| S::FailedPermanently)
            .map_err(|_| invalid_transition(state, event)),
        (S::ProcessingQueued, T::FailPermanently) => processing_queued()
            .fail_permanently()
            .map(|_| S::FailedPermanently)
            .map_err(|_| invalid_transition(state, event)),
        (S::Processing, T::FailPermanently) => processing()
            .fail_permanently()
            .map(|_| S::FailedPermanently)
            .map_err(|_| invalid_transition(state, event)),
        (S::IndexingQueued, T::FailPermanently) => indexing_queued()
            .fail_permanently()
            .map(|_| S::FailedPermanently)
            .map_err(|_| invalid_transition(state, event)),
        (S::Indexing, T::FailPermanently) => indexing()
            .fail_permanently()
            .map(|_| S::FailedPermanently)
            .map_err(|_| invalid_transition(state, event)),
        (S::PendingUpload, T::Cancel) => pending_upload()
            .cancel()
            .map(|_| S::Cancelled)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploading, T::Cancel) => uploading()
            .cancel()
            .map(|_| S::Cancelled)
            .map_err(|_| invalid_transition(state, event)),
        (S::Uploaded, T::Cancel) => uploaded()
            .cancel()
            .map(|_| S::Cancelled)
            .map_err(|_| invalid_transition(state, event)),
        (S::ProcessingQueued, T::Cancel) => processing_queued()
            .cancel()
            .map(|_| S::Cancelled)
            .map_err(|_| invalid_transition(state, event)),
        (S::Processing, T::Cancel) => processing()
            .cancel()
            .map(|_| S::Cancelled)
            .map_err(|_| invalid_transition(state, event)),
        (S::IndexingQueued, T::Cancel) => indexing_queued()
            .cancel()
            .map(|_| S::Cancelled)
            .map_err(|_| invalid_transition(state, event)),
        (S::Indexing, T::Cancel) => indexing()
            .cancel()
            .map(|_| S::Cancelled)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

/// Checks that `from -> to` is a lifecycle edge. Staying in the same status is always allowed.
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), AppError> {
    if from == to {
        return Ok(());
    }
    let event = TaskTransition::into_status(to).ok_or_else(|| AppError::InvalidTransition {
        from: from.as_str().to_string(),
        event: format!("enter {}", to.as_str()),
    })?;
    let next = compute_next_state(from, event)?;
    debug_assert_eq!(next, to);
    Ok(())
}

/// Data supplied when a task is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub kind: TaskKind,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<u64>,
    pub media_kind: Option<MediaKind>,
}

impl NewTask {
    pub fn document(name: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::Document,
            source_url: None,
            title: None,
            content_type: Some(content_type.into()),
            file_size: Some(size),
            media_kind: None,
        }
    }

    pub fn url(url: impl Into<String>, title: Option<String>) -> Self {
        let url = url.into();
        Self {
            name: title.clone().unwrap_or_else(|| url.clone()),
            kind: TaskKind::Url,
            source_url: Some(url),
            title,
            content_type: None,
            file_size: None,
            media_kind: None,
        }
    }

    pub fn multimedia(
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TaskKind::Multimedia,
            source_url: None,
            title: None,
            content_type: Some(content_type.into()),
            file_size: Some(size),
            media_kind: Some(media_kind),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionTask {
    pub id: String,
    pub name: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub stage_message: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<u64>,
    pub storage_path: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub estimated_duration_secs: Option<u64>,
    pub backend_reference_id: Option<String>,
    pub backend_processing_job_id: Option<String>,
    pub backend_indexing_job_id: Option<String>,
    pub replace_outcome: Option<ReplaceOutcome>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionTask {
    pub fn new(data: NewTask) -> Self {
        let now = Utc::now();
        let (status, stage_message) = match (data.kind, data.media_kind) {
            (TaskKind::Document, _) => (TaskStatus::PendingUpload, "Waiting to upload".to_string()),
            (TaskKind::Url, _) => (
                TaskStatus::ProcessingQueued,
                "Preparing to process URL".to_string(),
            ),
            (TaskKind::Multimedia, media) => (
                TaskStatus::ProcessingQueued,
                format!(
                    "Preparing {} upload",
                    media.map_or("media", |kind| kind.as_str())
                ),
            ),
        };
        let estimated_duration_secs = match data.kind {
            TaskKind::Multimedia => Some(estimate_processing_secs(data.file_size.unwrap_or(0))),
            TaskKind::Document | TaskKind::Url => None,
        };

        Self {
            id: Uuid::new_v4().to_string(),
            name: data.name,
            kind: data.kind,
            status,
            progress: 0,
            stage_message,
            source_url: data.source_url,
            title: data.title,
            content_type: data.content_type,
            file_size: data.file_size,
            storage_path: None,
            media_kind: data.media_kind,
            estimated_duration_secs,
            backend_reference_id: None,
            backend_processing_job_id: None,
            backend_indexing_job_id: None,
            replace_outcome: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges `update` into the task after validating it as a whole; on error nothing changes.
    pub fn apply(&mut self, update: TaskUpdate, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::TaskTerminal(self.id.clone()));
        }

        if let Some(next) = update.status {
            validate_transition(self.status, next)?;
            if next == TaskStatus::Uploading
                && self.status == TaskStatus::ProcessingQueued
                && self.backend_processing_job_id.is_some()
            {
                return Err(invalid_transition(self.status, TaskTransition::BeginUpload));
            }
        }

        check_set_once(
            &self.id,
            "reference id",
            self.backend_reference_id.as_deref(),
            update.reference_id.as_deref(),
        )?;
        check_set_once(
            &self.id,
            "processing job id",
            self.backend_processing_job_id.as_deref(),
            update.processing_job_id.as_deref(),
        )?;
        check_set_once(
            &self.id,
            "indexing job id",
            self.backend_indexing_job_id.as_deref(),
            update.indexing_job_id.as_deref(),
        )?;

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.stage_message {
            self.stage_message = message;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(reference_id) = update.reference_id {
            self.backend_reference_id = Some(reference_id);
        }
        if let Some(job_id) = update.processing_job_id {
            self.backend_processing_job_id = Some(job_id);
        }
        if let Some(job_id) = update.indexing_job_id {
            self.backend_indexing_job_id = Some(job_id);
        }
        if let Some(path) = update.storage_path {
            self.storage_path = Some(path);
        }
        if let Some(outcome) = update.replace_outcome {
            self.replace_outcome = Some(outcome);
        }
        self.updated_at = now;

        Ok(())
    }
}

fn check_set_once(
    task_id: &str,
    field: &str,
    current: Option<&str>,
    next: Option<&str>,
) -> Result<(), AppError> {
    match (current, next) {
        (Some(current), Some(next)) if current != next => Err(AppError::Validation(format!(
            "task {task_id}: {field} is already assigned ({current}), refusing {next}"
        ))),
        _ => Ok(()),
    }
}

/// Partial set of fields merged into a task by [`crate::storage::registry::TaskRegistry::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub stage_message: Option<String>,
    /// `Some(None)` clears the error.
    pub error: Option<Option<String>>,
    pub reference_id: Option<String>,
    pub processing_job_id: Option<String>,
    pub indexing_job_id: Option<String>,
    pub storage_path: Option<String>,
    pub replace_outcome: Option<ReplaceOutcome>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.stage_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    #[must_use]
    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    #[must_use]
    pub fn reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    #[must_use]
    pub fn processing_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.processing_job_id = Some(job_id.into());
        self
    }

    #[must_use]
    pub fn indexing_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.indexing_job_id = Some(job_id.into());
        self
    }

    #[must_use]
    pub fn storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn replace_outcome(mut self, outcome: ReplaceOutcome) -> Self {
        self.replace_outcome = Some(outcome);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
