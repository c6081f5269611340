//! The persistent conversation model.
//!
//! A [`Conversation`] is the only long-lived entity. Its message stream is
//! deliberately short: user turns and final assistant turns only. The tool
//! exchanges of a turn are summarised into the assistant message's
//! [`MessageMetadata`] blob rather than persisted as rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Role;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    Active,
    Archived,
    Deleted,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
            ConversationStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConversationStatus::Active),
            "archived" => Some(ConversationStatus::Archived),
            "deleted" => Some(ConversationStatus::Deleted),
            _ => None,
        }
    }
}

/// One persistent conversation. Counters are maintained by the orchestrator
/// and must always reflect the stored messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub caller_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u32,
    pub tool_calls_count: u32,
    pub total_tokens: u64,
    pub status: ConversationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl Conversation {
    pub fn new(caller_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: uuid::Uuid::new_v4().to_string(),
            caller_id: caller_id.into(),
            user_id: None,
            account_id: None,
            created_at: now,
            updated_at: now,
            last_message_at: None,
            message_count: 0,
            tool_calls_count: 0,
            total_tokens: 0,
            status: ConversationStatus::Active,
            s3_key: None,
            metadata: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stored message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One persisted turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Set iff `role == Tool`; matches the id the assistant used when
    /// requesting the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub token_count: u32,
    /// [`MessageMetadata`] JSON, only meaningful on assistant messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl StoredMessage {
    pub fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            tool_call_id: None,
            created_at: Utc::now(),
            token_count: 0,
            metadata: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assistant message metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Summary of one tool result stored in metadata. Large payloads are never
/// inlined — `summary` is a short description of what the tool returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
    pub success: bool,
}

/// One tool call recorded against the assistant message that requested it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: ToolResultSummary,
    pub success: bool,
    pub iteration: u32,
}

/// Per-iteration slice of the turn: reasoning produced and tools invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationData {
    pub iteration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub tool_call_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetrics {
    pub iterations: u32,
    pub total_tokens: u64,
}

/// The metadata blob persisted next to a final assistant message.
///
/// This is how a turn's tool exchanges survive: the persistent message
/// stream holds only user and final-assistant rows, so a re-loaded
/// conversation can be summarised but not replayed tool-by-tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Sorted by iteration, strictly increasing and contiguous from 1.
    pub iteration_data: Vec<IterationData>,
    pub metrics: TurnMetrics,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Working context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Transient per-turn working value: the conversation plus its rolling
/// window of messages. Derived on every turn, never persisted as such.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub conversation: Conversation,
    pub messages: Vec<StoredMessage>,
    pub total_tokens: u64,
}
