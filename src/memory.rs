//! Per-session conversation memory.
//!
//! A [`MemoryStore`] is a keyed store with get / append / trim semantics:
//! each session id maps to its most recent `window` messages (6 by default,
//! the last three user/assistant exchanges). Sessions are created by their
//! first append and are never evicted by this layer.
//!
//! [`SessionLocks`] serializes whole orchestration runs per session id so
//! two concurrent queries on the same session cannot interleave their reads
//! and writes.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{Message, Role};

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Stored messages for `session_id`, oldest first. Empty if unknown.
    async fn get(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Append one message, then keep only the most recent `window` entries.
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()>;

    /// Maximum number of messages kept per session.
    fn window(&self) -> usize;
}

/// Process-lifetime memory store.
pub struct InMemoryStore {
    window: usize,
    sessions: Mutex<HashMap<String, VecDeque<Message>>>,
}

impl InMemoryStore {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, session_id: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(session_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push_back(Message::with_role(role, content));
        while history.len() > self.window {
            history.pop_front();
        }
        Ok(())
    }

    fn window(&self) -> usize {
        self.window
    }
}

/// One async mutex per session id.
#[derive(Default, Clone)]
pub struct SessionLocks {
    locks: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `session_id`, then hold it until the
    /// guard is dropped.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Drop entries nobody is holding or waiting on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn append_turns(store: &InMemoryStore, session: &str, n: usize) {
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.append(session, role, &format!("turn {}", i)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let store = InMemoryStore::new(6);
        assert!(store.get("nobody").await.unwrap().is_empty());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_window_keeps_all_below_cap() {
        let store = InMemoryStore::new(6);
        append_turns(&store, "s1", 4).await;
        let history = store.get("s1").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content.as_deref(), Some("turn 0"));
    }

    #[tokio::test]
    async fn test_window_drops_oldest() {
        let store = InMemoryStore::new(6);
        append_turns(&store, "s1", 8).await;
        let history = store.get("s1").await.unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].content.as_deref(), Some("turn 2"));
        assert_eq!(history[5].content.as_deref(), Some("turn 7"));
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = InMemoryStore::new(6);
        append_turns(&store, "a", 2).await;
        append_turns(&store, "b", 3).await;
        assert_eq!(store.get("a").await.unwrap().len(), 2);
        assert_eq!(store.get("b").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_session_lock_serializes_same_id() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s1").await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("s1").await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        // A different session is not blocked.
        let _other = locks.acquire("s2").await;

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
