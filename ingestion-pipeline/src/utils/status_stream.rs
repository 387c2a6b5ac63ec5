use std::time::Duration;

use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use eventsource_stream::Eventsource;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{header::ACCEPT, Client};
use tracing::debug;

use crate::{pipeline::UpdateChannel, types::status_event::StatusEvent};

/// Server-sent-events subscription to `GET {backend}/tasks/{job_id}/status-stream`.
#[derive(Clone)]
pub struct SseUpdateChannel {
    client: Client,
    backend_api_url: String,
}

impl SseUpdateChannel {
    pub fn new(client: Client, backend_api_url: &str) -> Self {
        Self {
            client,
            backend_api_url: backend_api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Streams stay open for the whole stage, so only connecting is time-limited.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::new(client, &config.backend_api_url))
    }
}

#[async_trait]
impl UpdateChannel for SseUpdateChannel {
    async fn subscribe(
        &self,
        job_id: &str,
    ) -> Result<BoxStream<'static, Result<StatusEvent, AppError>>, AppError> {
        let endpoint = format!("{}/tasks/{job_id}/status-stream", self.backend_api_url);
        debug!(%endpoint, %job_id, "Opening status stream");

        let response = self
            .client
            .get(&endpoint)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let events = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(
                        serde_json::from_str::<StatusEvent>(&event.data).map_err(AppError::from),
                    ),
                    Err(err) => Some(Err(AppError::Channel(err.to_string()))),
                }
            })
            .boxed();

        Ok(events)
    }
}
