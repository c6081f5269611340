//! Provider-level streaming vocabulary.
//!
//! Every LLM adapter normalises its wire protocol into [`StreamEvent`]s.
//! Tool-call argument fragments are assembled inside the adapter; a
//! [`StreamEvent::ToolCallsReady`] carries only complete calls.

use std::pin::Pin;

use serde::Serialize;

use crate::message::ToolCall;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while a provider response streams in.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A user-visible text delta.
    Token { text: String },

    /// A reasoning delta from a dedicated channel (e.g. `reasoning_content`).
    ///
    /// Only emitted by providers whose wire protocol separates reasoning
    /// from content. Models that embed reasoning inline in the content
    /// stream emit plain [`StreamEvent::Token`]s instead, and the thinking
    /// strategy recovers the split.
    Thinking { text: String },

    /// All tool calls requested in this response, surfaced once their ids,
    /// names, and argument strings are complete.
    ToolCallsReady { calls: Vec<ToolCall> },

    /// Stream is finished. `tokens_used` is usually only known here.
    Done {
        tokens_used: Option<u32>,
        finish_reason: Option<String>,
    },
}

/// A complete (non-streaming) provider response.
#[derive(Debug, Clone, Default)]
pub struct ProviderMessage {
    pub content: Option<String>,
    /// Reasoning from a dedicated wire field, when the protocol has one.
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tokens_used: u32,
}

/// Static capability descriptor for one provider configuration.
///
/// `supports_reasoning_stream` marks endpoints whose wire protocol carries
/// a dedicated reasoning channel; consumers that have no reasoning surface
/// drop such deltas regardless of this flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub name: String,
    pub supports_streaming: bool,
    pub supports_reasoning_stream: bool,
    pub supports_tool_calling: bool,
}
