
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One answered question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Ordered history of one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    turns: Vec<Turn>,
}

impl Session {
    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The `max_turns` most recent turns, oldest first
    #[inline]
    pub fn recent(&self, max_turns: usize) -> &[Turn] {
        let skip = self.turns.len().saturating_sub(max_turns);
        self.turns.get(skip..).unwrap_or_default()
    }

    #[inline]
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Shared handle to a session; holding its lock serialises turns
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

#[derive(Debug)]
struct Entry {
    session: SessionHandle,
    last_access: Instant,
}

impl Entry {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

/// Conversation histories keyed by caller-supplied session id
///
/// Sessions idle for at least the TTL are dropped, either when next
/// looked up or by [`evict_expired`](Self::evict_expired). A session whose
/// handle is still held by a turn in progress is never evicted.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle to the session `id`, creating it when absent or expired
    #[inline]
    pub fn checkout(&self, id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut sessions = self.map();

        if let Some(entry) = sessions.get_mut(id) {
            if !entry.in_use() && now.duration_since(entry.last_access) >= self.ttl {
                debug!("Session {} expired, starting afresh", id);
                entry.session = SessionHandle::default();
            }
            entry.last_access = now;
            return Arc::clone(&entry.session);
        }

        debug!("Creating session {}", id);
        let session = SessionHandle::default();
        sessions.insert(
            id.to_string(),
            Entry {
                session: Arc::clone(&session),
                last_access: now,
            },
        );
        session
    }

    /// Mark a session as used now, e.g. once its turn has completed
    #[inline]
    pub fn touch(&self, id: &str) {
        if let Some(entry) = self.map().get_mut(id) {
            entry.last_access = Instant::now();
        }
    }

    /// Drop the session `id`; returns whether it existed
    #[inline]
    pub fn clear(&self, id: &str) -> bool {
        let removed = self.map().remove(id).is_some();
        if removed {
            debug!("Cleared session {}", id);
        }
        removed
    }

    /// Drop every idle session older than the TTL, returning how many went
    #[inline]
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.map();
        let before = sessions.len();

        sessions.retain(|_, entry| {
            entry.in_use() || now.duration_since(entry.last_access) < self.ttl
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            warn!("Evicted {} idle sessions", evicted);
        }
        evicted
    }

    /// Copy of the recorded turns of `id`, if the session exists
    #[inline]
    pub async fn history(&self, id: &str) -> Option<Vec<Turn>> {
        let handle = self.map().get(id).map(|entry| Arc::clone(&entry.session))?;
        let session = handle.lock().await;
        Some(session.turns().to_vec())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
