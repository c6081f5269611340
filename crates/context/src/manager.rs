//! The context manager: one façade over whichever store is active.
//!
//! Owns the rolling-window policy and the token estimate, and keeps the
//! conversation counters consistent with the stored messages on every
//! mutation.

use std::sync::Arc;

use chrono::Utc;

use rl_domain::conversation::{
    Conversation, ConversationContext, ConversationStatus, StoredMessage,
};
use rl_domain::error::{Error, Result};
use rl_domain::message::Role;

use crate::store::ConversationStore;

/// Cheap token estimate: four characters per token, never zero.
///
/// No production decision depends on exact counts, so a real tokenizer
/// would be wasted latency here.
pub fn estimate_tokens(content: &str) -> u32 {
    ((content.len() / 4) as u32).max(1)
}

pub struct ContextManager {
    store: Arc<dyn ConversationStore>,
    window_size: usize,
}

impl ContextManager {
    pub fn new(store: Arc<dyn ConversationStore>, window_size: usize) -> Self {
        Self { store, window_size }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    // ── loading ──────────────────────────────────────────────────

    /// Load a conversation and its rolling window. Deleted conversations
    /// behave as if they never existed.
    pub async fn load(&self, conversation_id: &str) -> Result<ConversationContext> {
        let conversation = self.require(conversation_id).await?;
        let messages = self.store.fetch_messages(conversation_id).await?;
        let window = rolling_window(messages, self.window_size);
        Ok(ConversationContext {
            total_tokens: conversation.total_tokens,
            conversation,
            messages: window,
        })
    }

    /// The full stored history, without the window cut.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        self.require(conversation_id).await?;
        self.store.fetch_messages(conversation_id).await
    }

    /// The conversation row alone, without loading messages.
    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.require(conversation_id).await
    }

    async fn require(&self, conversation_id: &str) -> Result<Conversation> {
        match self.store.fetch_conversation(conversation_id).await? {
            Some(c) if c.status != ConversationStatus::Deleted => Ok(c),
            _ => Err(Error::NotFound(format!("conversation {conversation_id}"))),
        }
    }

    // ── creation ─────────────────────────────────────────────────

    pub async fn create_conversation(
        &self,
        caller_id: &str,
        user_id: Option<String>,
        account_id: Option<String>,
        initial_message: Option<String>,
    ) -> Result<Conversation> {
        let mut conversation = Conversation::new(caller_id);
        conversation.user_id = user_id;
        conversation.account_id = account_id;
        self.store.insert_conversation(&conversation).await?;

        if let Some(text) = initial_message.filter(|t| !t.trim().is_empty()) {
            let message = StoredMessage::new(&conversation.conversation_id, Role::User, text);
            let ctx = self
                .add_message(&conversation.conversation_id, message)
                .await?;
            return Ok(ctx.conversation);
        }

        Ok(conversation)
    }

    // ── appending ────────────────────────────────────────────────

    /// Append one message atomically: stamp its token estimate, bump the
    /// conversation counters, and return the refreshed context.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        message: StoredMessage,
    ) -> Result<ConversationContext> {
        let mut conversation = self.require(conversation_id).await?;

        let mut message = message;
        if message.token_count == 0 {
            message.token_count = estimate_tokens(&message.content);
        }

        self.store.append_message(&message).await?;

        conversation.message_count += 1;
        conversation.total_tokens += u64::from(message.token_count);
        conversation.last_message_at = Some(message.created_at);
        conversation.updated_at = Utc::now();
        self.store.update_conversation(&conversation).await?;

        let messages = self.store.fetch_messages(conversation_id).await?;
        let window = rolling_window(messages, self.window_size);
        Ok(ConversationContext {
            total_tokens: conversation.total_tokens,
            conversation,
            messages: window,
        })
    }

    /// Same as [`add_message`](Self::add_message), storing `metadata_json`
    /// verbatim alongside the message.
    pub async fn add_message_with_metadata(
        &self,
        conversation_id: &str,
        mut message: StoredMessage,
        metadata_json: String,
    ) -> Result<ConversationContext> {
        message.metadata = Some(metadata_json);
        self.add_message(conversation_id, message).await
    }

    // ── persistence of counters ──────────────────────────────────

    /// Persist counter updates accumulated during a turn.
    pub async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conversation = conversation.clone();
        conversation.updated_at = Utc::now();
        self.store.update_conversation(&conversation).await
    }

    pub async fn recent_by_caller(
        &self,
        caller_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        self.store.recent_by_caller(caller_id, limit).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rolling window
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cut the message list down to its last `window_size` entries, growing
/// the window backwards while the cut would start on a TOOL message —
/// a tool result whose requesting assistant fell outside the window would
/// be unresolvable.
pub fn rolling_window(messages: Vec<StoredMessage>, window_size: usize) -> Vec<StoredMessage> {
    if window_size == 0 || messages.len() <= window_size {
        return messages;
    }

    let mut start = messages.len() - window_size;
    while start > 0 && messages[start].role == Role::Tool {
        start -= 1;
    }
    messages[start..].to_vec()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
