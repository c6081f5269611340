//! SQLite-backed [`ConversationStore`]. Persistent across restarts.
//!
//! Connections are opened per operation and every call runs under
//! `spawn_blocking` so the async runtime never blocks on disk I/O.
//! Timestamps are stored as RFC 3339 text; deleting a conversation
//! cascades to its messages via the foreign key.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use rl_domain::conversation::{Conversation, ConversationStatus, StoredMessage};
use rl_domain::error::{Error, Result};
use rl_domain::message::Role;

use crate::store::ConversationStore;

pub struct SqliteConversationStore {
    db_path: PathBuf,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    conversation_id  varchar(36) PRIMARY KEY,
    caller_id        varchar(100) NOT NULL,
    user_id          varchar(100),
    account_id       varchar(100),
    created_at       text NOT NULL,
    updated_at       text NOT NULL,
    last_message_at  text,
    message_count    int NOT NULL DEFAULT 0,
    tool_calls_count int NOT NULL DEFAULT 0,
    total_tokens     int NOT NULL DEFAULT 0,
    status           varchar(20) NOT NULL DEFAULT 'active',
    s3_key           varchar(255),
    metadata         text
);

CREATE TABLE IF NOT EXISTS conversation_messages (
    message_id      varchar(36) PRIMARY KEY,
    conversation_id varchar(36) NOT NULL
        REFERENCES conversations(conversation_id) ON DELETE CASCADE,
    role            varchar(20) NOT NULL,
    content         text NOT NULL,
    tool_call_id    varchar(100),
    created_at      text NOT NULL,
    token_count     int NOT NULL DEFAULT 0,
    metadata        text
);

CREATE INDEX IF NOT EXISTS idx_conversations_caller
    ON conversations(caller_id);
CREATE INDEX IF NOT EXISTS idx_conversations_caller_created
    ON conversations(caller_id, created_at);
CREATE INDEX IF NOT EXISTS idx_conversations_status
    ON conversations(status);
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON conversation_messages(conversation_id);
"#;

impl SqliteConversationStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = open(&db_path)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::Storage(e.to_string()))?;

        tracing::info!(path = %db_path.display(), "conversation database ready");
        Ok(Self { db_path })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || op(open(&path)?))
            .await
            .map_err(|e| Error::Internal(format!("blocking task: {e}")))?
    }
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::Storage(e.to_string()))?;
    Ok(conn)
}

// ── row mapping ────────────────────────────────────────────────────

fn parse_ts(raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawConversation> {
    Ok(RawConversation {
        conversation_id: row.get(0)?,
        caller_id: row.get(1)?,
        user_id: row.get(2)?,
        account_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        last_message_at: row.get(6)?,
        message_count: row.get(7)?,
        tool_calls_count: row.get(8)?,
        total_tokens: row.get(9)?,
        status: row.get(10)?,
        s3_key: row.get(11)?,
        metadata: row.get(12)?,
    })
}

struct RawConversation {
    conversation_id: String,
    caller_id: String,
    user_id: Option<String>,
    account_id: Option<String>,
    created_at: String,
    updated_at: String,
    last_message_at: Option<String>,
    message_count: u32,
    tool_calls_count: u32,
    total_tokens: i64,
    status: String,
    s3_key: Option<String>,
    metadata: Option<String>,
}

impl RawConversation {
    fn into_domain(self) -> Result<Conversation> {
        Ok(Conversation {
            conversation_id: self.conversation_id,
            caller_id: self.caller_id,
            user_id: self.user_id,
            account_id: self.account_id,
            created_at: parse_ts(self.created_at)?,
            updated_at: parse_ts(self.updated_at)?,
            last_message_at: self.last_message_at.map(parse_ts).transpose()?,
            message_count: self.message_count,
            tool_calls_count: self.tool_calls_count,
            total_tokens: self.total_tokens.max(0) as u64,
            status: ConversationStatus::parse(&self.status)
                .ok_or_else(|| Error::Storage(format!("unknown status {:?}", self.status)))?,
            s3_key: self.s3_key,
            metadata: self.metadata,
        })
    }
}

const CONVERSATION_COLUMNS: &str = "conversation_id, caller_id, user_id, account_id, \
     created_at, updated_at, last_message_at, message_count, tool_calls_count, \
     total_tokens, status, s3_key, metadata";

#[async_trait::async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let c = conversation.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO conversations (conversation_id, caller_id, user_id, account_id, \
                 created_at, updated_at, last_message_at, message_count, tool_calls_count, \
                 total_tokens, status, s3_key, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    c.conversation_id,
                    c.caller_id,
                    c.user_id,
                    c.account_id,
                    c.created_at.to_rfc3339(),
                    c.updated_at.to_rfc3339(),
                    c.last_message_at.map(|t| t.to_rfc3339()),
                    c.message_count,
                    c.tool_calls_count,
                    c.total_tokens as i64,
                    c.status.as_str(),
                    c.s3_key,
                    c.metadata,
                ],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let id = conversation_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE conversation_id = ?1"
                ))
                .map_err(|e| Error::Storage(e.to_string()))?;
            let mut rows = stmt
                .query_map(params![id], row_to_conversation)
                .map_err(|e| Error::Storage(e.to_string()))?;
            match rows.next() {
                Some(raw) => Ok(Some(
                    raw.map_err(|e| Error::Storage(e.to_string()))?.into_domain()?,
                )),
                None => Ok(None),
            }
        })
        .await
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        let c = conversation.clone();
        self.blocking(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE conversations SET caller_id = ?2, user_id = ?3, account_id = ?4, \
                     created_at = ?5, updated_at = ?6, last_message_at = ?7, message_count = ?8, \
                     tool_calls_count = ?9, total_tokens = ?10, status = ?11, s3_key = ?12, \
                     metadata = ?13 WHERE conversation_id = ?1",
                    params![
                        c.conversation_id,
                        c.caller_id,
                        c.user_id,
                        c.account_id,
                        c.created_at.to_rfc3339(),
                        c.updated_at.to_rfc3339(),
                        c.last_message_at.map(|t| t.to_rfc3339()),
                        c.message_count,
                        c.tool_calls_count,
                        c.total_tokens as i64,
                        c.status.as_str(),
                        c.s3_key,
                        c.metadata,
                    ],
                )
                .map_err(|e| Error::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(Error::NotFound(format!("conversation {}", c.conversation_id)));
            }
            Ok(())
        })
        .await
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<()> {
        let m = message.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO conversation_messages (message_id, conversation_id, role, content, \
                 tool_call_id, created_at, token_count, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    m.message_id,
                    m.conversation_id,
                    m.role.as_str(),
                    m.content,
                    m.tool_call_id,
                    m.created_at.to_rfc3339(),
                    m.token_count,
                    m.metadata,
                ],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let id = conversation_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT message_id, conversation_id, role, content, tool_call_id, \
                     created_at, token_count, metadata FROM conversation_messages \
                     WHERE conversation_id = ?1 ORDER BY created_at, message_id",
                )
                .map_err(|e| Error::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, u32>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                })
                .map_err(|e| Error::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                let (message_id, conversation_id, role, content, tool_call_id, created_at, token_count, metadata) =
                    row.map_err(|e| Error::Storage(e.to_string()))?;
                messages.push(StoredMessage {
                    message_id,
                    conversation_id,
                    role: Role::parse(&role)
                        .ok_or_else(|| Error::Storage(format!("unknown role {role:?}")))?,
                    content,
                    tool_call_id,
                    created_at: parse_ts(created_at)?,
                    token_count,
                    metadata,
                });
            }
            Ok(messages)
        })
        .await
    }

    async fn recent_by_caller(&self, caller_id: &str, limit: usize) -> Result<Vec<Conversation>> {
        let caller = caller_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE caller_id = ?1 ORDER BY updated_at DESC LIMIT ?2"
                ))
                .map_err(|e| Error::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![caller, limit as i64], row_to_conversation)
                .map_err(|e| Error::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for raw in rows {
                out.push(raw.map_err(|e| Error::Storage(e.to_string()))?.into_domain()?);
            }
            Ok(out)
        })
        .await
    }
}
