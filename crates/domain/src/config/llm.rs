use serde::{Deserialize, Serialize};

use super::{env_parse, env_str, env_str_or};

/// Endpoint for the Qwen-compatible service that hosts both the thinking
/// and the instruct model behind one base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QwenConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model id used when a request asks for the thinking configuration.
    pub thinking_model: String,
    /// Model id used when a request asks for the instruct configuration.
    pub instruct_model: String,
}

impl Default for QwenConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".into(),
            api_key: None,
            thinking_model: "qwen3-32b".into(),
            instruct_model: "qwen3-32b-instruct".into(),
        }
    }
}

impl QwenConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: env_str_or("QWEN_BASE_URL", &d.base_url),
            api_key: env_str("QWEN_API_KEY"),
            thinking_model: env_str_or("QWEN_THINKING_MODEL", &d.thinking_model),
            instruct_model: env_str_or("QWEN_INSTRUCT_MODEL", &d.instruct_model),
        }
    }
}

/// Endpoint for the plain chat model (no reasoning surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepseekConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for DeepseekConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".into(),
            api_key: None,
            model: "deepseek-chat".into(),
        }
    }
}

impl DeepseekConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: env_str_or("DEEPSEEK_BASE_URL", &d.base_url),
            api_key: env_str("DEEPSEEK_API_KEY"),
            model: env_str_or("DEEPSEEK_MODEL", &d.model),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub qwen: QwenConfig,
    #[serde(default)]
    pub deepseek: DeepseekConfig,
    /// Retry budget for idempotent transport failures (connection reset,
    /// 5xx). Never applied to an already-started stream.
    pub max_retries: u32,
    /// Deadline for any single provider request.
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            qwen: QwenConfig::default(),
            deepseek: DeepseekConfig::default(),
            max_retries: 2,
            request_timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            qwen: QwenConfig::from_env(),
            deepseek: DeepseekConfig::from_env(),
            max_retries: env_parse("PROVIDER_MAX_RETRIES", 2),
            request_timeout_ms: env_parse("LOOP_REQUEST_TIMEOUT_MS", 120_000),
        }
    }
}
