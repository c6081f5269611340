//! The storage contract and the in-memory implementation.

use std::collections::HashMap;

use parking_lot::RwLock;

use rl_domain::conversation::{Conversation, StoredMessage};
use rl_domain::error::{Error, Result};

/// Persistence boundary for conversations and their messages.
///
/// Implementations serialise mutations per conversation; the gateway's
/// turn lock already guarantees at most one writing turn per conversation,
/// so a store only needs its own internal consistency.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    async fn update_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Append one message. Messages are append-only: nothing ever rewrites
    /// or reorders what was stored.
    async fn append_message(&self, message: &StoredMessage) -> Result<()>;

    /// All stored messages of a conversation, ordered by `created_at`.
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>>;

    /// Most recently updated conversations for one caller.
    async fn recent_by_caller(&self, caller_id: &str, limit: usize) -> Result<Vec<Conversation>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversation store held entirely in process memory. The default mode;
/// state does not survive a restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    messages: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.conversations.write();
        if conversations.contains_key(&conversation.conversation_id) {
            return Err(Error::Storage(format!(
                "conversation {} already exists",
                conversation.conversation_id
            )));
        }
        conversations.insert(conversation.conversation_id.clone(), conversation.clone());
        Ok(())
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().get(conversation_id).cloned())
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.conversations.write();
        match conversations.get_mut(&conversation.conversation_id) {
            Some(slot) => {
                *slot = conversation.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!(
                "conversation {}",
                conversation.conversation_id
            ))),
        }
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<()> {
        self.messages
            .write()
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .messages
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_by_caller(&self, caller_id: &str, limit: usize) -> Result<Vec<Conversation>> {
        let mut matches: Vec<Conversation> = self
            .conversations
            .read()
            .values()
            .filter(|c| c.caller_id == caller_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rl_domain::message::Role;

    #[tokio::test]
    async fn insert_is_unique_per_id() {
        let store = InMemoryConversationStore::new();
        let conv = Conversation::new("a@b");
        store.insert_conversation(&conv).await.unwrap();
        assert!(store.insert_conversation(&conv).await.is_err());
    }

    #[tokio::test]
    async fn messages_keep_append_order() {
        let store = InMemoryConversationStore::new();
        let conv = Conversation::new("a@b");
        store.insert_conversation(&conv).await.unwrap();

        for i in 0..3 {
            let msg = StoredMessage::new(&conv.conversation_id, Role::User, format!("m{i}"));
            store.append_message(&msg).await.unwrap();
        }

        let messages = store.fetch_messages(&conv.conversation_id).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
    }

    #[tokio::test]
    async fn recent_by_caller_filters_and_limits() {
        let store = InMemoryConversationStore::new();
        for _ in 0..3 {
            store
                .insert_conversation(&Conversation::new("alice"))
                .await
                .unwrap();
        }
        store
            .insert_conversation(&Conversation::new("bob"))
            .await
            .unwrap();

        let recent = store.recent_by_caller("alice", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|c| c.caller_id == "alice"));
    }

    #[tokio::test]
    async fn update_unknown_conversation_is_not_found() {
        let store = InMemoryConversationStore::new();
        let conv = Conversation::new("a@b");
        assert!(matches!(
            store.update_conversation(&conv).await,
            Err(Error::NotFound(_))
        ));
    }
}
