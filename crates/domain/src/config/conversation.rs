use serde::{Deserialize, Serialize};

use super::{env_parse, env_str, env_str_or};

/// Which backing store holds conversations. Chosen once at startup; a
/// single process instance uses exactly one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    #[default]
    InMemory,
    Database,
}

impl StorageMode {
    pub fn from_env() -> Self {
        match env_str("CONVERSATION_STORAGE_MODE").as_deref() {
            None | Some("in-memory") => StorageMode::InMemory,
            Some("database") => StorageMode::Database,
            Some(other) => {
                tracing::warn!(value = other, "unknown CONVERSATION_STORAGE_MODE, using in-memory");
                StorageMode::InMemory
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub storage_mode: StorageMode,
    /// SQLite file used by the `database` mode.
    pub database_path: String,
    /// Rolling window size W: the model sees at most the last W stored
    /// messages, grown backwards so a TOOL message never starts the window.
    pub rolling_window_size: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::InMemory,
            database_path: "./data/conversations.db".into(),
            rolling_window_size: 20,
        }
    }
}

impl ConversationConfig {
    pub fn from_env() -> Self {
        Self {
            storage_mode: StorageMode::from_env(),
            database_path: env_str_or("CONVERSATION_DATABASE_PATH", "./data/conversations.db"),
            rolling_window_size: env_parse("CONVERSATION_ROLLING_WINDOW_SIZE", 20),
        }
    }
}
