mod ollama;
mod types;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::ServiceError;

pub use ollama::OllamaBackend;
pub use types::{BackendGenerateRequest, GenerationRequest};

/// Raw bytes as the backend produced them, in emission order.
pub type ByteStream = BoxStream<'static, Result<Bytes, ServiceError>>;

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Starts a streaming generation. Resolves once the backend accepted the
    /// request; the body is read lazily through the returned stream.
    async fn generate(&self, prompt: &str) -> Result<ByteStream, ServiceError>;
}
