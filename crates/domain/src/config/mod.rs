//! Process-wide configuration, read once from the environment at startup.
//!
//! Every knob has a default so the server boots in a dev environment with
//! nothing set. Values that fail to parse log a warning and fall back —
//! startup never aborts on a malformed optional variable.

mod agent_loop;
mod conversation;
mod llm;
mod retrieval;
mod server;

pub use agent_loop::*;
pub use conversation::*;
pub use llm::*;
pub use retrieval::*;
pub use server::*;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent_loop: AgentLoopConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Assemble the full configuration from process environment variables.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            llm: LlmConfig::from_env(),
            agent_loop: AgentLoopConfig::from_env(),
            conversation: ConversationConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Env helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read an env var, treating unset and blank the same.
pub(crate) fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_str_or(key: &str, default: &str) -> String {
    env_str(key).unwrap_or_else(|| default.to_owned())
}

/// Parse an env var, falling back to `default` (with a warning) on garbage.
pub(crate) fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env_str(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable value, using default");
            default
        }),
    }
}

/// Parse an optional env var; `None` when unset, warning + `None` on garbage.
pub(crate) fn env_parse_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_str(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "unparseable value, ignoring");
            None
        }
    }
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    match env_str(key).as_deref() {
        None => default,
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        Some(other) => {
            tracing::warn!(key, value = other, "unparseable boolean, using default");
            default
        }
    }
}
