use common::{
    error::AppError,
    storage::types::ingestion_task::{IngestionTask, MediaKind, NewTask},
    utils::ingest_limits::{validate_identity, validate_upload, validate_url},
};
use tracing::info;

use super::{ConflictPolicy, IngestionOrchestrator, SourceFile};

impl IngestionOrchestrator {
    /// Uploads a document and starts its processing.
    ///
    /// Returns once the backend has accepted (or refused) the processing stage; the rest
    /// of the pipeline continues in the background. Only invalid input is an `Err`: later
    /// failures are recorded on the returned task.
    #[tracing::instrument(skip_all, fields(file_name = %file.name))]
    pub async fn begin_document_ingestion(
        &self,
        file: SourceFile,
        policy: ConflictPolicy,
    ) -> Result<IngestionTask, AppError> {
        self.validate_file(&file)?;

        let task = self.registry.add(NewTask::document(
            file.name.clone(),
            file.content_type.clone(),
            file.size(),
        ));
        info!(task_id = %task.id, "Document ingestion started");

        self.run_upload_pipeline(&task.id, file, policy).await;
        Ok(self.snapshot(task))
    }

    /// Submits a URL for processing; `title` is used as the task name when present.
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub async fn begin_url_ingestion(
        &self,
        url: &str,
        title: Option<String>,
    ) -> Result<IngestionTask, AppError> {
        validate_identity(&self.config.chatbot_id, &self.config.user_id)?;
        let url = validate_url(url)?;
        let title = title.filter(|title| !title.trim().is_empty());

        let task = self.registry.add(NewTask::url(url.clone(), title.clone()));
        info!(task_id = %task.id, "URL ingestion started");

        self.run_url_pipeline(&task.id, url, title).await;
        Ok(self.snapshot(task))
    }

    /// Uploads an audio or video file and starts its transcription.
    #[tracing::instrument(skip_all, fields(file_name = %file.name))]
    pub async fn begin_multimedia_ingestion(
        &self,
        file: SourceFile,
        policy: ConflictPolicy,
    ) -> Result<IngestionTask, AppError> {
        self.validate_file(&file)?;

        let media_kind = MediaKind::detect(&file.name, &file.content_type);
        let task = self.registry.add(NewTask::multimedia(
            file.name.clone(),
            file.content_type.clone(),
            file.size(),
            media_kind,
        ));
        info!(
            task_id = %task.id,
            media_kind = media_kind.as_str(),
            estimated_secs = task.estimated_duration_secs,
            "Multimedia ingestion started"
        );

        self.run_upload_pipeline(&task.id, file, policy).await;
        Ok(self.snapshot(task))
    }

    fn validate_file(&self, file: &SourceFile) -> Result<(), AppError> {
        validate_identity(&self.config.chatbot_id, &self.config.user_id)?;
        validate_upload(self.config.max_upload_bytes, &file.name, file.bytes.len())?;
        Ok(())
    }

    fn snapshot(&self, task: IngestionTask) -> IngestionTask {
        self.registry.get(&task.id).unwrap_or(task)
    }
}
