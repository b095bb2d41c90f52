use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::debug;

use crate::domain::memory::ConversationMemory;

/// External identity a conversation belongs to: the console surface has one
/// implicit session, the chat platform one per chat id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Console,
    Chat(i64),
}

/// One isolated conversation. The memory sits behind an async mutex whose
/// guard is held for the duration of a job: that is the per-session
/// single-flight discipline. A second message for the same identity queues
/// on the lock instead of interleaving with the job in flight.
pub struct Session {
    state: AsyncMutex<ConversationMemory>,
}

impl Session {
    fn new(capacity: usize) -> Self {
        Self {
            state: AsyncMutex::new(ConversationMemory::new(capacity)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ConversationMemory> {
        self.state.lock().await
    }

    pub async fn clear(&self) {
        self.state.lock().await.clear();
    }

    pub async fn turn_count(&self) -> usize {
        self.state.lock().await.count()
    }
}

/// Process-lifetime map from identity to session, created lazily on first
/// resolve. No persistence: everything is dropped at shutdown.
pub struct SessionRegistry {
    capacity: usize,
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `key`, creating it atomically if absent.
    /// Concurrent resolves of the same key observe the same session.
    pub fn resolve(&self, key: SessionKey) -> Arc<Session> {
        let mut sessions = self.sessions.lock().expect("session registry lock");
        if let Some(existing) = sessions.get(&key) {
            return existing.clone();
        }
        debug!(?key, "Creating session");
        let session = Arc::new(Session::new(self.capacity));
        sessions.insert(key, session.clone());
        session
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry lock").len()
    }

    /// Drops every session. Only meant for process teardown; sessions still
    /// referenced by in-flight jobs stay alive until those jobs finish.
    pub fn remove_all(&self) {
        self.sessions
            .lock()
            .expect("session registry lock")
            .clear();
    }
}
