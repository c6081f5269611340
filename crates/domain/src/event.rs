//! Client-facing turn events.
//!
//! One [`TurnEvent`] becomes one SSE frame: the variant name is the
//! `event:` line and the serialized fields are the `data:` payload, so the
//! enum is untagged and every payload field is camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stage tag attached to reasoning traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReasoningStage {
    Planning,
}

/// Events emitted to the client during one turn.
///
/// Every stream terminates with exactly one `Completed` or `Error`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TurnEvent {
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        iteration: Option<u32>,
    },

    #[serde(rename_all = "camelCase")]
    ToolCallStart {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        tool_name: String,
        tool_call_id: String,
        arguments: serde_json::Value,
        iteration: u32,
    },

    #[serde(rename_all = "camelCase")]
    ToolCallResult {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        tool_name: String,
        tool_call_id: String,
        result: String,
        success: bool,
        iteration: u32,
    },

    #[serde(rename_all = "camelCase")]
    ResponseChunk {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        content: String,
        iteration: u32,
        is_final_answer: bool,
    },

    #[serde(rename_all = "camelCase")]
    ReasoningTrace {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        content: String,
        stage: ReasoningStage,
        iteration: u32,
    },

    #[serde(rename_all = "camelCase")]
    Completed {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        iterations_used: u32,
        tokens_used: u64,
    },

    #[serde(rename_all = "camelCase")]
    Error {
        conversation_id: String,
        timestamp: DateTime<Utc>,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl TurnEvent {
    /// The SSE `event:` name for this variant.
    pub fn event_name(&self) -> &'static str {
        match self {
            TurnEvent::StatusUpdate { .. } => "StatusUpdate",
            TurnEvent::ToolCallStart { .. } => "ToolCallStart",
            TurnEvent::ToolCallResult { .. } => "ToolCallResult",
            TurnEvent::ResponseChunk { .. } => "ResponseChunk",
            TurnEvent::ReasoningTrace { .. } => "ReasoningTrace",
            TurnEvent::Completed { .. } => "Completed",
            TurnEvent::Error { .. } => "Error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Completed { .. } | TurnEvent::Error { .. })
    }
}
