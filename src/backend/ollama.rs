use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::{
    backend::{BackendGenerateRequest, ByteStream, InferenceBackend},
    config::AppConfig,
    error::ServiceError,
};

#[derive(Clone)]
pub struct OllamaBackend {
    http_client: reqwest::Client,
    base_url: String,
    model_id: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model_id: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_id: model_id.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.backend_url, config.model_id.clone())
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate(&self, prompt: &str) -> Result<ByteStream, ServiceError> {
        let body = BackendGenerateRequest {
            model: &self.model_id,
            prompt,
            stream: true,
        };

        let response = self
            .http_client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::BackendStatus(status));
        }
        debug!(%status, model = %self.model_id, "backend accepted generation");

        Ok(response.bytes_stream().map_err(ServiceError::from).boxed())
    }
}
