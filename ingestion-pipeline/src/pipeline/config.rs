use std::time::Duration;

use common::utils::config::AppConfig;

#[derive(Debug, Clone, Default)]
pub struct IngestionTuning {
    /// How long a task may stay silent after its update stream closed without a
    /// terminal event before it is failed. `None` only logs the closure.
    pub close_grace: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub chatbot_id: String,
    pub user_id: String,
    pub max_upload_bytes: usize,
    pub tuning: IngestionTuning,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            chatbot_id: config.chatbot_id.clone(),
            user_id: config.user_id.clone(),
            max_upload_bytes: config.max_upload_bytes,
            tuning: IngestionTuning {
                close_grace: config.close_grace_secs.map(Duration::from_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_identity_and_grace_from_app_config() {
        let app = AppConfig {
            chatbot_id: "bot-1".into(),
            user_id: "user-1".into(),
            close_grace_secs: Some(90),
            ..Default::default()
        };
        let config = IngestionConfig::from_app_config(&app);
        assert_eq!(config.chatbot_id, "bot-1");
        assert_eq!(config.user_id, "user-1");
        assert_eq!(config.tuning.close_grace, Some(Duration::from_secs(90)));
        assert!(IngestionConfig::default().tuning.close_grace.is_none());
    }
}
