//! The turn runtime: orchestrator loop, finalize phase, tool dispatch,
//! metadata aggregation, and per-conversation turn locks.
//!
//! Entry points: [`Orchestrator::process_message_stream`] for SSE and
//! [`Orchestrator::process_message_sync`] for the blocking path.

pub mod finalize;
pub mod metadata;
pub mod orchestrator;
pub mod turn_lock;

pub use orchestrator::{Orchestrator, SyncResult};
pub use turn_lock::TurnLockMap;

use rl_domain::conversation::StoredMessage;
use rl_domain::message::{ChatMessage, Role};

/// System prompt prepended to every working message list. Explains the
/// agentic workflow the model is driving.
pub(crate) const ORCHESTRATOR_SYSTEM_PROMPT: &str = "\
You are a knowledge-base assistant that works in iterations.

Each iteration you may either call tools or answer. Use `rag_search` to look \
up documents in the knowledge base whenever the user's question might be \
covered by it; refine your query and search again if the first results are \
not enough. When you have gathered everything you need, call \
`finalize_answer` with the full context you collected and the user's \
question — that produces the final answer for the user. For trivial \
questions that need no knowledge-base support you may answer directly \
instead.";

/// Label for the pre-retrieval system message.
pub(crate) const PRE_RETRIEVED_HEADER: &str = "Pre-Retrieved Knowledge Base Context";

/// Convert the persisted rolling window into provider messages.
pub(crate) fn window_to_messages(window: &[StoredMessage]) -> Vec<ChatMessage> {
    window
        .iter()
        .map(|m| match m.role {
            Role::Tool => ChatMessage::tool_result(
                m.tool_call_id.clone().unwrap_or_default(),
                m.content.clone(),
            ),
            role => ChatMessage {
                role,
                content: m.content.clone(),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
        })
        .collect()
}

/// Re-apply the window cut to an overgrown working list, preserving the
/// leading system messages and never letting the cut land on a TOOL
/// message (its requesting assistant must stay in range).
pub(crate) fn trim_working(working: &mut Vec<ChatMessage>, keep: usize) {
    let lead = working
        .iter()
        .take_while(|m| m.role == Role::System)
        .count();
    let body_len = working.len() - lead;
    if keep == 0 || body_len <= keep {
        return;
    }

    let mut start = lead + (body_len - keep);
    while start > lead && working[start].role == Role::Tool {
        start -= 1;
    }
    working.drain(lead..start);
}

/// Truncate on a char boundary, appending an ellipsis when cut.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
