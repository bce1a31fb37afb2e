//! # Conversation Session Management
//!
//! One session per live WebSocket connection, holding that connection's
//! conversation history. Sessions are created at connect time (only when
//! the conversation engine is configured), replaced wholesale on a clear
//! request, and destroyed at disconnect. Nothing is persisted: a restart
//! forgets every conversation.
//!
//! ## Session Lifecycle:
//! 1. **Created**: empty history installed when the connection opens
//! 2. **Active**: pipeline workers append user/model exchange pairs
//! 3. **Reset**: a clear request swaps in a fresh history, same connection id
//! 4. **Removed**: disconnect discards the entry; in-flight workers holding
//!    the old `Arc` finish against a detached session whose result is dropped

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};

/// Who produced a turn in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Wire-format role name used by the conversation engine API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One utterance in a conversation history.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Per-connection conversation state.
///
/// ## Thread Safety:
/// The history lives behind a `tokio::sync::Mutex` so a pipeline worker can
/// hold the guard across the (awaited) engine call. That makes each
/// read-modify-write on one connection's history atomic: two workers for
/// the same connection serialize on this lock, while workers for different
/// connections never contend.
pub struct Session {
    /// Connection id that owns this session
    pub user_id: String,

    /// Ordered user/model exchange history
    history: Mutex<Vec<ChatTurn>>,
}

impl Session {
    /// Create a session with an empty history.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Lock the history for a read-modify-write spanning an engine call.
    pub async fn lock_history(&self) -> MutexGuard<'_, Vec<ChatTurn>> {
        self.history.lock().await
    }

    /// Snapshot of the current history (for inspection and tests).
    pub async fn history_snapshot(&self) -> Vec<ChatTurn> {
        self.history.lock().await.clone()
    }

    /// Number of turns currently recorded.
    pub async fn turn_count(&self) -> usize {
        self.history.lock().await.len()
    }
}

/// Process-wide mapping from connection id to session.
///
/// An explicit, injected object rather than a module-level global: the
/// dispatcher owns one registry and hands it to the pipeline, so tests run
/// against a fresh registry per case.
///
/// ## Thread Safety:
/// `RwLock<HashMap<..>>` serializes map mutations; `get` clones the `Arc`
/// out so no map lock is ever held across an await point. Per-id history
/// atomicity is the session's own job (see [`Session`]).
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Install a fresh empty-history session for `id`, overwriting any
    /// stale entry left by a reused connection id.
    pub fn create(&self, id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(id.to_string(), Arc::new(Session::new(id)));
    }

    /// Look up the session for a connection, if one exists.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().unwrap();
        sessions.get(id).cloned()
    }

    /// Replace an existing session's history with a fresh one under the
    /// same connection id. Returns whether a session existed to reset.
    ///
    /// The replacement is a new `Session` object: workers still holding the
    /// old `Arc` finish their exchange against the detached history, which
    /// is dropped with their last reference.
    pub fn reset(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(id) {
            sessions.insert(id.to_string(), Arc::new(Session::new(id)));
            true
        } else {
            false
        }
    }

    /// Remove a connection's session. No-op when absent.
    pub fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(id);
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap();
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_then_disconnect_leaves_no_entry() {
        let registry = SessionRegistry::new();
        registry.create("conn-1");
        assert!(registry.get("conn-1").is_some());

        registry.remove("conn-1");
        assert!(registry.get("conn-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = SessionRegistry::new();
        registry.remove("never-existed");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_overwrites_stale_entry() {
        let registry = SessionRegistry::new();
        registry.create("conn-1");
        let stale = registry.get("conn-1").unwrap();

        registry.create("conn-1");
        let fresh = registry.get("conn-1").unwrap();

        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reset_without_session_reports_false() {
        let registry = SessionRegistry::new();
        assert!(!registry.reset("conn-1"));
    }

    #[tokio::test]
    async fn test_reset_installs_empty_history_with_same_id() {
        let registry = SessionRegistry::new();
        registry.create("conn-1");

        let before = registry.get("conn-1").unwrap();
        {
            let mut history = before.lock_history().await;
            history.push(ChatTurn::user("hello"));
            history.push(ChatTurn::model("hi there"));
        }
        assert_eq!(before.turn_count().await, 2);

        assert!(registry.reset("conn-1"));
        let after = registry.get("conn-1").unwrap();

        // Same connection id, new object, empty history.
        assert_eq!(after.user_id, "conn-1");
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.turn_count().await, 0);

        // The detached session keeps its old history until dropped.
        assert_eq!(before.turn_count().await, 2);
    }

    #[tokio::test]
    async fn test_histories_are_isolated_per_connection() {
        let registry = SessionRegistry::new();
        registry.create("conn-a");
        registry.create("conn-b");

        let a = registry.get("conn-a").unwrap();
        a.lock_history().await.push(ChatTurn::user("only for a"));

        let b = registry.get("conn-b").unwrap();
        assert_eq!(b.turn_count().await, 0);
        assert_eq!(a.turn_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialize_per_session() {
        let registry = Arc::new(SessionRegistry::new());
        registry.create("conn-1");
        let session = registry.get("conn-1").unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                let mut history = session.lock_history().await;
                let text = format!("utterance {}", i);
                history.push(ChatTurn::user(text.clone()));
                history.push(ChatTurn::model(format!("reply to {}", text)));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every exchange landed as an adjacent pair; nothing interleaved.
        let history = session.history_snapshot().await;
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Model);
            assert!(pair[1].text.contains(&pair[0].text));
        }
    }
}
