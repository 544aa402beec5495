use futures::{StreamExt, stream::BoxStream};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::{backend::GenerationRequest, decode::Utf8Decoder};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("prompt must not be blank")]
    EmptyPrompt,
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay returned {0}")]
    Status(StatusCode),
}

/// Decoded text chunks of one relay response.
pub type TextStream = BoxStream<'static, Result<String, ClientError>>;

#[derive(Clone)]
pub struct RelayClient {
    http_client: reqwest::Client,
    relay_url: String,
}

impl RelayClient {
    pub fn new(relay_url: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            relay_url: relay_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.relay_url)
    }

    /// Prepares a generation. Nothing is sent until the returned stream is
    /// first polled; connection and status failures arrive as stream items.
    pub fn generate(&self, prompt: &str) -> Result<TextStream, ClientError> {
        if prompt.trim().is_empty() {
            return Err(ClientError::EmptyPrompt);
        }

        let request = self
            .http_client
            .post(self.generate_url())
            .json(&GenerationRequest {
                prompt: prompt.to_string(),
            });

        let stream = async_stream::stream! {
            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    yield Err(ClientError::Http(err));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                yield Err(ClientError::Status(status));
                return;
            }
            debug!(%status, "relay stream opened");

            let mut decoder = Utf8Decoder::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        let text = decoder.decode(&bytes);
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    Err(err) => {
                        yield Err(ClientError::Http(err));
                        return;
                    }
                }
            }

            let tail = decoder.finish();
            if !tail.is_empty() {
                yield Ok(tail);
            }
        };

        Ok(stream.boxed())
    }
}
