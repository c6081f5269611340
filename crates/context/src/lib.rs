//! Conversation state: loading, appending, persistence, and the rolling
//! window handed to the model.
//!
//! Two storage modes exist behind one [`ConversationStore`] contract — an
//! in-memory map and a SQLite database — and the [`ContextManager`] applies
//! the same rolling-window policy over whichever one is active, so the
//! modes cannot diverge behaviourally.

pub mod manager;
pub mod sqlite;
pub mod store;

pub use manager::{estimate_tokens, ContextManager};
pub use sqlite::SqliteConversationStore;
pub use store::{ConversationStore, InMemoryConversationStore};
