use common::storage::types::ingestion_task::StageKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One `data:` payload from the backend status stream.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StatusEvent {
    pub task_identifier: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub current_step_description: Option<String>,
    #[serde(default)]
    pub progress_percentage: Option<f64>,
    #[serde(default)]
    pub error_details: Option<Value>,
}

impl StatusEvent {
    /// Stage named by `task_type`, if the backend sent one.
    pub fn stage(&self) -> Option<StageKind> {
        self.task_type.as_deref().map(StageKind::from_task_type)
    }

    /// Progress as a whole percentage in `0..=100`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn progress(&self) -> Option<u8> {
        self.progress_percentage
            .filter(|value| value.is_finite())
            .map(|value| value.round().clamp(0.0, 100.0) as u8)
    }

    pub fn error_text(&self) -> Option<String> {
        match self.error_details.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_text().is_some()
    }
}
