use serde::{Deserialize, Serialize};

use super::{env_parse, env_str, env_str_or};

/// Endpoint for the external vector-store service backing the RAG tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".into(),
            api_key: None,
            timeout_ms: 10_000,
            max_retries: 2,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: env_str_or("RETRIEVAL_BASE_URL", &d.base_url),
            api_key: env_str("RETRIEVAL_API_KEY"),
            timeout_ms: env_parse("RETRIEVAL_TIMEOUT_MS", 10_000),
            max_retries: env_parse("RETRIEVAL_MAX_RETRIES", 2),
        }
    }
}
