//! Per-conversation turn exclusivity.
//!
//! Each conversation runs at most one turn at a time. A second message
//! arriving while a turn is in flight is rejected immediately with a busy
//! error rather than queued — the caller can retry once its stream ends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct TurnLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for TurnLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the turn for a conversation. `None` means a turn is already
    /// running. The permit releases on drop.
    pub fn try_acquire(&self, conversation_id: &str) -> Option<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(conversation_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().ok()
    }

    /// Whether a turn is currently running for this conversation.
    pub fn is_busy(&self, conversation_id: &str) -> bool {
        self.locks
            .lock()
            .get(conversation_id)
            .map(|sem| sem.available_permits() == 0)
            .unwrap_or(false)
    }

    /// Drop lock entries for conversations with no running turn.
    pub fn prune_idle(&self) {
        self.locks.lock().retain(|_, sem| sem.available_permits() == 0);
    }
}
