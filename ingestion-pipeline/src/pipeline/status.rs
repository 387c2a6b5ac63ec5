use common::{
    error::AppError,
    storage::types::ingestion_task::{StageKind, TaskStatus},
};

use crate::types::status_event::StatusEvent;

pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse message.";

/// Backend status vocabulary understood by [`StatusMapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl BackendStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        [
            ("QUEUED", BackendStatus::Queued),
            ("PROCESSING", BackendStatus::Processing),
            ("COMPLETED", BackendStatus::Completed),
            ("FAILED", BackendStatus::Failed),
        ]
        .into_iter()
        .find_map(|(name, status)| raw.eq_ignore_ascii_case(name).then_some(status))
    }
}

/// Translates backend status strings into task statuses for a given stage.
pub struct StatusMapper;

impl StatusMapper {
    /// `None` when `backend_status` is outside the known vocabulary.
    pub fn try_map(backend_status: &str, stage: StageKind) -> Option<TaskStatus> {
        let status = BackendStatus::parse(backend_status)?;
        Some(match (status, stage) {
            (BackendStatus::Queued, StageKind::Processing) => TaskStatus::ProcessingQueued,
            (BackendStatus::Queued, StageKind::Indexing) => TaskStatus::IndexingQueued,
            // The processing -> indexing handoff is driven by the Complete event.
            (BackendStatus::Processing | BackendStatus::Completed, StageKind::Processing) => {
                TaskStatus::Processing
            }
            (BackendStatus::Processing, StageKind::Indexing) => TaskStatus::Indexing,
            (BackendStatus::Completed, StageKind::Indexing) => TaskStatus::Completed,
            (BackendStatus::Failed, stage) => stage.failed_status(),
        })
    }

    /// Unknown statuses leave `current` unchanged.
    pub fn map(backend_status: &str, stage: StageKind, current: TaskStatus) -> TaskStatus {
        Self::try_map(backend_status, stage).unwrap_or(current)
    }
}

/// A subscription event after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Update(StatusEvent),
    Complete(StatusEvent),
    Error { message: Option<String> },
    Close,
}

impl StageEvent {
    /// Whether the subscription ends after this event.
    pub fn is_final(&self) -> bool {
        !matches!(self, StageEvent::Update(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StageEvent::Update(_) => "update",
            StageEvent::Complete(_) => "complete",
            StageEvent::Error { .. } => "error",
            StageEvent::Close => "close",
        }
    }
}

pub fn classify(event: StatusEvent) -> StageEvent {
    let status = event.status.trim();
    if status.eq_ignore_ascii_case("COMPLETED") && !event.has_error() {
        return StageEvent::Complete(event);
    }
    if status.eq_ignore_ascii_case("FAILED")
        || status.eq_ignore_ascii_case("CANCELLED")
        || event.has_error()
    {
        return StageEvent::Error {
            message: event.error_text(),
        };
    }
    StageEvent::Update(event)
}

/// The collaborator's own message, without the error category prefix `Display` adds.
pub fn failure_detail(err: &AppError) -> String {
    match err {
        AppError::InternalError(message)
        | AppError::Validation(message)
        | AppError::NotFound(message)
        | AppError::Channel(message) => message.clone(),
        AppError::Api { status, body } if body.trim().is_empty() => {
            format!("Request failed with status {status}")
        }
        AppError::Api { body, .. } => body.clone(),
        AppError::Storage(err) => err.to_string(),
        AppError::Reqwest(err) => err.to_string(),
        AppError::Io(err) => err.to_string(),
        AppError::Json(err) => err.to_string(),
        AppError::Anyhow(err) => err.to_string(),
        other => other.to_string(),
    }
}

/// Error event for a failed subscription item: undecodable payloads get a fixed message,
/// transport failures carry their own text.
pub fn classify_failure(err: &AppError) -> StageEvent {
    let message = match err {
        AppError::Json(_) => PARSE_FAILURE_MESSAGE.to_string(),
        other => failure_detail(other),
    };
    StageEvent::Error {
        message: Some(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(status: &str) -> StatusEvent {
        serde_json::from_value(json!({ "task_identifier": "J1", "status": status }))
            .expect("event")
    }

    #[test]
    fn maps_processing_stage() {
        let current = TaskStatus::ProcessingQueued;
        let stage = StageKind::Processing;
        assert_eq!(
            StatusMapper::map("QUEUED", stage, current),
            TaskStatus::ProcessingQueued
        );
        assert_eq!(
            StatusMapper::map("processing", stage, current),
            TaskStatus::Processing
        );
        assert_eq!(
            StatusMapper::map("COMPLETED", stage, current),
            TaskStatus::Processing
        );
        assert_eq!(
            StatusMapper::map("Failed", stage, current),
            TaskStatus::ProcessingFailed
        );
    }

    #[test]
    fn maps_indexing_stage() {
        let current = TaskStatus::IndexingQueued;
        let stage = StageKind::Indexing;
        assert_eq!(
            StatusMapper::map("QUEUED", stage, current),
            TaskStatus::IndexingQueued
        );
        assert_eq!(
            StatusMapper::map("PROCESSING", stage, current),
            TaskStatus::Indexing
        );
        assert_eq!(
            StatusMapper::map("COMPLETED", stage, current),
            TaskStatus::Completed
        );
        assert_eq!(
            StatusMapper::map("FAILED", stage, current),
            TaskStatus::IndexingFailed
        );
    }

    #[test]
    fn unknown_status_keeps_current() {
        assert_eq!(
            StatusMapper::map("RETRYING", StageKind::Indexing, TaskStatus::Indexing),
            TaskStatus::Indexing
        );
        assert!(StatusMapper::try_map("", StageKind::Processing).is_none());
    }

    #[test]
    fn classifies_terminal_statuses() {
        assert!(matches!(classify(event("COMPLETED")), StageEvent::Complete(_)));
        assert!(matches!(
            classify(event("failed")),
            StageEvent::Error { message: None }
        ));
        assert!(matches!(
            classify(event("CANCELLED")),
            StageEvent::Error { .. }
        ));
        assert!(matches!(classify(event("PROCESSING")), StageEvent::Update(_)));
    }

    #[test]
    fn error_details_force_an_error() {
        let event: StatusEvent = serde_json::from_value(json!({
            "task_identifier": "J1",
            "status": "PROCESSING",
            "error_details": "worker crashed"
        }))
        .expect("event");
        assert_eq!(
            classify(event),
            StageEvent::Error {
                message: Some("worker crashed".into())
            }
        );
    }

    #[test]
    fn failures_are_errors() {
        let json_err = serde_json::from_str::<StatusEvent>("{not json")
            .map(|_| ())
            .expect_err("invalid json");
        assert_eq!(
            classify_failure(&AppError::Json(json_err)),
            StageEvent::Error {
                message: Some(PARSE_FAILURE_MESSAGE.into())
            }
        );
        assert_eq!(
            classify_failure(&AppError::Channel("connection reset".into())),
            StageEvent::Error {
                message: Some("connection reset".into())
            }
        );
    }

    #[test]
    fn failure_detail_drops_category_prefix() {
        assert_eq!(
            failure_detail(&AppError::InternalError("quota exceeded".into())),
            "quota exceeded"
        );
        assert_eq!(
            failure_detail(&AppError::Api {
                status: 503,
                body: "indexer offline".into(),
            }),
            "indexer offline"
        );
        assert_eq!(
            failure_detail(&AppError::Api {
                status: 502,
                body: "  ".into(),
            }),
            "Request failed with status 502"
        );
        assert_eq!(
            failure_detail(&AppError::Validation("bad name".into())),
            "bad name"
        );
    }
}
