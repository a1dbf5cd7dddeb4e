//! ============================================================================
//! Session Buffers - Per-session mutable state and its registry
//! ============================================================================
//! Every session id maps to one `SessionBuffer` behind its own async mutex.
//! Whoever holds the mutex owns the buffer for the duration of a whole
//! ingestion batch or timer callback, which serializes same-session work while
//! different sessions proceed in parallel.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// State for one conversation session
#[derive(Debug)]
pub struct SessionBuffer {
    /// Fragments not yet flushed, in arrival order
    pub pending_messages: Vec<String>,
    /// A question-collection window is active
    pub trigger_open: bool,
    pub trigger_opened_at: Option<Instant>,
    /// Fragments gathered while the window is open
    pub collected_question: Vec<String>,
    /// A response was already produced for the current cycle
    pub response_sent: bool,
    pub last_activity_at: Instant,
    /// Incremented every time a window opens
    pub cycle: u64,
    pub(crate) reaper: Option<JoinHandle<()>>,
    pub(crate) recall_timer: Option<JoinHandle<()>>,
}

impl SessionBuffer {
    pub fn new(now: Instant) -> Self {
        Self {
            pending_messages: Vec::new(),
            trigger_open: false,
            trigger_opened_at: None,
            collected_question: Vec::new(),
            response_sent: false,
            last_activity_at: now,
            cycle: 0,
            reaper: None,
            recall_timer: None,
        }
    }

    /// Join and clear pending text in one step; `None` when nothing is pending
    pub fn take_pending(&mut self) -> Option<String> {
        if self.pending_messages.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending_messages).join(" "))
    }

    /// No pending text and no open window
    pub fn is_idle(&self) -> bool {
        self.pending_messages.is_empty() && !self.trigger_open
    }

    /// Install a new stale-buffer timer, cancelling the one it supersedes
    pub(crate) fn replace_reaper(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.reaper.replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn cancel_timers(&mut self) {
        if let Some(handle) = self.reaper.take() {
            handle.abort();
        }
        if let Some(handle) = self.recall_timer.take() {
            handle.abort();
        }
    }
}

impl Default for SessionBuffer {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

pub type SharedBuffer = Arc<Mutex<SessionBuffer>>;

/// Registry of session buffers keyed by session id
#[derive(Default)]
pub struct SessionBufferStore {
    sessions: RwLock<HashMap<String, SharedBuffer>>,
}

impl SessionBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing buffer for `session_id`, or a fresh one inserted on the spot
    pub async fn get(&self, session_id: &str) -> SharedBuffer {
        if let Some(buffer) = self.sessions.read().await.get(session_id) {
            return buffer.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Creating buffer for session {}", session_id);
                Arc::new(Mutex::new(SessionBuffer::new(Instant::now())))
            })
            .clone()
    }

    /// Existing buffer only. Timer callbacks use this so a fired timer never
    /// recreates an evicted session.
    pub async fn lookup(&self, session_id: &str) -> Option<SharedBuffer> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle for at least `idle_for` that hold no pending text,
    /// have no open window and are not in use. Returns the evicted ids.
    pub async fn evict_idle(&self, now: Instant, idle_for: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut evicted = Vec::new();

        sessions.retain(|session_id, buffer| {
            // Clones only come out of the map, which we hold exclusively
            if Arc::strong_count(buffer) > 1 {
                return true;
            }
            let Ok(mut state) = buffer.try_lock() else {
                return true;
            };

            let expired = state.is_idle()
                && now.saturating_duration_since(state.last_activity_at) >= idle_for;
            if expired {
                state.cancel_timers();
                evicted.push(session_id.clone());
            }
            !expired
        });

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_pending_joins_and_clears() {
        let mut buffer = SessionBuffer::default();
        assert_eq!(buffer.take_pending(), None);

        buffer.pending_messages = vec!["hello".to_string(), "world.".to_string()];
        assert_eq!(buffer.take_pending(), Some("hello world.".to_string()));
        assert!(buffer.pending_messages.is_empty());
    }

    #[tokio::test]
    async fn test_get_creates_once() {
        let store = SessionBufferStore::new();
        assert!(store.lookup("a").await.is_none());

        let first = store.get("a").await;
        first.lock().await.pending_messages.push("x".to_string());

        let second = store.get("a").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.pending_messages, vec!["x".to_string()]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionBufferStore::new();
        store.get("a").await.lock().await.pending_messages.push("from a".to_string());
        store.get("b").await.lock().await.pending_messages.push("from b".to_string());

        let flushed = store.get("a").await.lock().await.take_pending();
        assert_eq!(flushed, Some("from a".to_string()));
        assert_eq!(
            store.get("b").await.lock().await.pending_messages,
            vec!["from b".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_respects_pending_state() {
        let store = SessionBufferStore::new();
        store.get("quiet").await;
        store.get("pending").await.lock().await.pending_messages.push("half a".to_string());
        store.get("asking").await.lock().await.trigger_open = true;

        let idle_for = Duration::from_secs(60);
        assert!(store.evict_idle(Instant::now(), idle_for).await.is_empty());

        tokio::time::advance(idle_for).await;
        let evicted = store.evict_idle(Instant::now(), idle_for).await;
        assert_eq!(evicted, vec!["quiet".to_string()]);
        assert!(store.lookup("quiet").await.is_none());
        assert!(store.lookup("pending").await.is_some());
        assert!(store.lookup("asking").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_skips_buffers_in_use() {
        let store = SessionBufferStore::new();
        let held = store.get("busy").await;

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(store
            .evict_idle(Instant::now(), Duration::from_secs(60))
            .await
            .is_empty());

        drop(held);
        assert_eq!(
            store.evict_idle(Instant::now(), Duration::from_secs(60)).await,
            vec!["busy".to_string()]
        );
    }
}
