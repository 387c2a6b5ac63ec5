use async_trait::async_trait;
use common::{error::AppError, storage::store::StorageManager};
use tracing::{debug, info};

use crate::pipeline::{ConflictPolicy, SourceFile, StorageUploader};

const MAX_NAME_SUFFIX: u32 = 1_000;

/// Uploads source files to `{chatbot_id}/{file_name}` in the configured object store.
#[derive(Clone)]
pub struct ObjectStoreUploader {
    storage: StorageManager,
}

impl ObjectStoreUploader {
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    /// First free `{prefix}/{stem} (n).{ext}` location, starting from the plain name.
    async fn free_location(&self, prefix: &str, file_name: &str) -> Result<String, AppError> {
        let plain = format!("{prefix}/{file_name}");
        if !self.storage.exists(&plain).await? {
            return Ok(plain);
        }

        let (stem, extension) = split_extension(file_name);
        for n in 1..=MAX_NAME_SUFFIX {
            let candidate = match extension {
                Some(ext) => format!("{prefix}/{stem} ({n}).{ext}"),
                None => format!("{prefix}/{stem} ({n})"),
            };
            if !self.storage.exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(AppError::Validation(format!(
            "Too many files named {file_name} in {prefix}"
        )))
    }
}

fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    }
}

fn sanitize_name(name: &str) -> String {
    name.trim().replace(['/', '\\'], "_")
}

#[async_trait]
impl StorageUploader for ObjectStoreUploader {
    async fn upload(
        &self,
        chatbot_id: &str,
        file: &SourceFile,
        policy: &ConflictPolicy,
    ) -> Result<String, AppError> {
        let file_name = sanitize_name(&file.name);
        let location = match policy {
            ConflictPolicy::Original => self.free_location(chatbot_id, &file_name).await?,
            ConflictPolicy::Replace { .. } => format!("{chatbot_id}/{file_name}"),
        };
        debug!(%location, size = file.bytes.len(), "Uploading source file");

        self.storage.put(&location, file.bytes.clone()).await?;
        info!(%location, "Stored source file");

        Ok(location)
    }
}
