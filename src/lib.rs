pub mod backend;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod fragment;
pub mod relay;
pub mod reveal;
pub mod server;
pub mod session;

pub use backend::{GenerationRequest, InferenceBackend, OllamaBackend};
pub use client::{ClientError, RelayClient};
pub use config::AppConfig;
pub use reveal::{Article, RevealOutcome, RevealPipeline, RevealStatus, Viewport};
pub use server::build_router;
pub use session::{GenerationSession, SessionManager};
