use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::AppError,
    storage::store::StorageManager,
    utils::config::AppConfig,
};
use futures::stream::BoxStream;

use crate::{
    types::{
        backend::{
            BeginIndexingRequest, IndexingVariant, PipelineAccepted, ProcessDocumentRequest,
            ProcessMultimediaRequest, ProcessUrlRequest,
        },
        status_event::StatusEvent,
    },
    utils::{
        backend_api::HttpPipelineApi, cache_invalidation::BroadcastCache,
        status_stream::SseUpdateChannel, storage_upload::ObjectStoreUploader,
    },
};

/// A file handed to a document or multimedia entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, AppError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::Validation(format!("{} has no file name", path.display())))?;
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        Ok(Self::new(name, content_type, Bytes::from(bytes)))
    }

    pub fn size(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }
}

/// How an upload treats an existing source with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep both; the new file gets a suffixed name.
    #[default]
    Original,
    /// Overwrite, removing the previous content source first when its id is known.
    Replace { existing_source_id: Option<String> },
}

impl ConflictPolicy {
    pub fn replaced_source(&self) -> Option<&str> {
        match self {
            ConflictPolicy::Replace {
                existing_source_id: Some(id),
            } => Some(id.as_str()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait StorageUploader: Send + Sync {
    /// Stores `file` for `chatbot_id` and returns its storage path.
    async fn upload(
        &self,
        chatbot_id: &str,
        file: &SourceFile,
        policy: &ConflictPolicy,
    ) -> Result<String, AppError>;
}

#[async_trait]
pub trait PipelineApi: Send + Sync {
    async fn process_document(
        &self,
        request: ProcessDocumentRequest,
    ) -> Result<PipelineAccepted, AppError>;

    async fn process_url(&self, request: ProcessUrlRequest) -> Result<PipelineAccepted, AppError>;

    async fn process_multimedia(
        &self,
        request: ProcessMultimediaRequest,
    ) -> Result<PipelineAccepted, AppError>;

    async fn begin_indexing(
        &self,
        request: BeginIndexingRequest,
        variant: IndexingVariant,
    ) -> Result<PipelineAccepted, AppError>;

    async fn delete_content_source(
        &self,
        chatbot_id: &str,
        source_id: &str,
    ) -> Result<(), AppError>;
}

/// Ordered status events for one backend job.
#[async_trait]
pub trait UpdateChannel: Send + Sync {
    /// Items are decoded events; an `Err` item reports an undecodable payload or transport failure.
    async fn subscribe(
        &self,
        job_id: &str,
    ) -> Result<BoxStream<'static, Result<StatusEvent, AppError>>, AppError>;
}

pub trait ContentCache: Send + Sync {
    fn invalidate(&self, chatbot_id: &str);
}

/// The collaborators an orchestrator drives.
#[derive(Clone)]
pub struct IngestionServices {
    pub uploader: Arc<dyn StorageUploader>,
    pub api: Arc<dyn PipelineApi>,
    pub channel: Arc<dyn UpdateChannel>,
    pub cache: Arc<dyn ContentCache>,
}

impl IngestionServices {
    /// HTTP, SSE, object-store and broadcast implementations wired from configuration.
    pub fn from_config(
        config: &AppConfig,
        storage: StorageManager,
        cache: Arc<BroadcastCache>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            uploader: Arc::new(ObjectStoreUploader::new(storage)),
            api: Arc::new(HttpPipelineApi::from_config(config)?),
            channel: Arc::new(SseUpdateChannel::from_config(config)?),
            cache,
        })
    }
}
