use std::time::Duration;

use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::{
    pipeline::PipelineApi,
    types::backend::{
        BeginIndexingRequest, DeleteSourceResponse, IndexingVariant, PipelineAccepted,
        ProcessDocumentRequest, ProcessMultimediaRequest, ProcessUrlRequest,
    },
};

/// JSON client for the backend stage-initiation endpoints and the content-source API.
#[derive(Clone)]
pub struct HttpPipelineApi {
    client: Client,
    backend_api_url: String,
    content_api_url: String,
}

impl HttpPipelineApi {
    pub fn new(client: Client, backend_api_url: &str, content_api_url: &str) -> Self {
        Self {
            client,
            backend_api_url: backend_api_url.trim_end_matches('/').to_string(),
            content_api_url: content_api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::new(
            client,
            &config.backend_api_url,
            &config.content_api_url,
        ))
    }

    async fn initiate<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<PipelineAccepted, AppError> {
        let endpoint = format!("{}{path}", self.backend_api_url);
        debug!(%endpoint, "Initiating backend stage");

        let response = self.client.post(&endpoint).json(body).send().await?;
        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            warn!(%endpoint, status = status.as_u16(), %body, "Backend rejected stage initiation");
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let accepted: PipelineAccepted = response.json().await?;
        debug!(
            %endpoint,
            job_id = %accepted.task_identifier,
            message = accepted.message.as_deref().unwrap_or_default(),
            "Backend accepted stage"
        );
        Ok(accepted)
    }

    fn content_source_url(&self, chatbot_id: &str, source_id: &str) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.content_api_url).map_err(|err| {
            AppError::Validation(format!(
                "Invalid content API url '{}': {err}",
                self.content_api_url
            ))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                AppError::Validation(format!(
                    "Content API url '{}' cannot carry a path",
                    self.content_api_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "chatbots", chatbot_id, "content-sources", source_id]);
        Ok(url)
    }
}

#[async_trait]
impl PipelineApi for HttpPipelineApi {
    async fn process_document(
        &self,
        request: ProcessDocumentRequest,
    ) -> Result<PipelineAccepted, AppError> {
        self.initiate("/documents/initiate-processing", &request)
            .await
    }

    async fn process_url(&self, request: ProcessUrlRequest) -> Result<PipelineAccepted, AppError> {
        self.initiate("/urls/", &request).await
    }

    async fn process_multimedia(
        &self,
        request: ProcessMultimediaRequest,
    ) -> Result<PipelineAccepted, AppError> {
        self.initiate("/multimedia/", &request).await
    }

    async fn begin_indexing(
        &self,
        request: BeginIndexingRequest,
        variant: IndexingVariant,
    ) -> Result<PipelineAccepted, AppError> {
        let path = match variant {
            IndexingVariant::Standard => "/indexing/initiate-indexing",
            IndexingVariant::Multimedia => "/multimedia/index",
        };
        self.initiate(path, &request).await
    }

    async fn delete_content_source(
        &self,
        chatbot_id: &str,
        source_id: &str,
    ) -> Result<(), AppError> {
        let url = self.content_source_url(chatbot_id, source_id)?;
        let response = self.client.delete(url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: DeleteSourceResponse = serde_json::from_str(&body)?;
        if parsed.success {
            Ok(())
        } else {
            Err(AppError::Api {
                status: status.as_u16(),
                body: parsed
                    .error
                    .unwrap_or_else(|| "content source deletion was not confirmed".to_string()),
            })
        }
    }
}
