use serde::{Deserialize, Serialize};

/// Body accepted by the relay's generate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
}

/// Body sent to the inference backend's `/api/generate`.
#[derive(Debug, Serialize)]
pub struct BackendGenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
}
