use common::storage::types::ingestion_task::TaskKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessDocumentRequest {
    pub user_id: String,
    pub chatbot_id: String,
    pub file_path_in_storage: String,
    pub reference_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessUrlRequest {
    pub user_id: String,
    pub chatbot_id: String,
    pub url: String,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessMultimediaRequest {
    pub user_id: String,
    pub chatbot_id: String,
    pub file_path: String,
    pub reference_id: String,
    /// `video` or `audio`.
    pub media_type: String,
    pub original_filename: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BeginIndexingRequest {
    pub user_id: String,
    pub chatbot_id: String,
    pub reference_id: String,
}

/// Which begin-indexing endpoint serves a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingVariant {
    Standard,
    Multimedia,
}

impl IndexingVariant {
    pub fn for_kind(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Multimedia => IndexingVariant::Multimedia,
            TaskKind::Document | TaskKind::Url => IndexingVariant::Standard,
        }
    }
}

/// Body of a `202 Accepted` stage-initiation response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PipelineAccepted {
    pub task_identifier: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeleteSourceResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
