use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::ConversationState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// In-memory table of active dialogs, at most one per user.
///
/// The lock is private and held only for the map operation itself; callers
/// receive clones and never hold a guard across I/O. A poisoned lock is
/// recovered, since every critical section leaves the map consistent.
#[derive(Debug, Default)]
pub struct ConversationStore {
    entries: RwLock<HashMap<UserId, ConversationState>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: UserId) -> Option<ConversationState> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&user).cloned()
    }

    pub fn set(&self, user: UserId, state: ConversationState) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(user, state);
    }

    /// Removes the entry, returning whatever was there.
    pub fn delete(&self, user: UserId) -> Option<ConversationState> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&user)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
