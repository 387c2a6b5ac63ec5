use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_backend_api_url")]
    pub backend_api_url: String,
    #[serde(default = "default_content_api_url")]
    pub content_api_url: String,
    pub chatbot_id: String,
    pub user_id: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Seconds a task may sit idle after its update channel closed without a
    /// terminal event before it is marked `failed_permanently`. Unset disables it.
    #[serde(default)]
    pub close_grace_secs: Option<u64>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_backend_api_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_content_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_api_url: default_backend_api_url(),
            content_api_url: default_content_api_url(),
            chatbot_id: String::new(),
            user_id: String::new(),
            data_dir: default_data_dir(),
            storage: default_storage_kind(),
            request_timeout_secs: default_request_timeout_secs(),
            close_grace_secs: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
