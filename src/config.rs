use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL_ID: &str = "llama3";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub backend_url: String,
    pub model_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    /// Builds the config from an arbitrary key lookup. Unset or unparsable
    /// values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("SERVER_ADDR")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000));

        let backend_url = lookup("OLLAMA_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let model_id = lookup("MODEL_ID")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        Self {
            listen_addr,
            backend_url,
            model_id,
        }
    }
}
