//! In-memory session store
//!
//! Sessions live only as long as the process. Each session sits behind its
//! own handle so unrelated conversations never contend on a shared lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::session::{Role, Session, Turn};

/// Retention limits applied by the store. Zero / `None` disables a limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLimits {
    /// Maximum turns kept per session
    pub max_turns: usize,
    /// Idle time after which a session is discarded
    pub ttl: Option<Duration>,
    /// Maximum number of live sessions
    pub max_sessions: usize,
}

impl From<&SessionConfig> for SessionLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            ttl: (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs)),
            max_sessions: config.max_sessions,
        }
    }
}

/// Shared handle to one live session
pub struct SessionHandle {
    /// Held for the duration of a whole chat turn
    turn_gate: Mutex<()>,
    session: Mutex<Session>,
    last_seen_ms: AtomicI64,
    recency: AtomicU64,
}

impl SessionHandle {
    fn new(id: &str, recency: u64) -> Self {
        Self {
            turn_gate: Mutex::new(()),
            session: Mutex::new(Session::new(id)),
            last_seen_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            recency: AtomicU64::new(recency),
        }
    }

    /// Wait for exclusive use of this session for one chat turn.
    ///
    /// Turns for the same session run one at a time in arrival order.
    pub async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn_gate.lock().await
    }

    /// Lock the session data. Do not hold across long awaits.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// Copy of the current session state
    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    fn idle_for(&self, now_ms: i64) -> Duration {
        let idle = now_ms.saturating_sub(self.last_seen_ms.load(Ordering::Relaxed));
        Duration::from_millis(idle.max(0) as u64)
    }
}

/// Process-wide mapping from session id to conversation log
pub struct SessionStore {
    sessions: DashMap<String, Arc<SessionHandle>>,
    limits: SessionLimits,
    clock: AtomicU64,
}

impl SessionStore {
    /// Create a store with the given retention limits
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            sessions: DashMap::new(),
            limits,
            clock: AtomicU64::new(0),
        }
    }

    /// Create a store without any retention limits
    pub fn unbounded() -> Self {
        Self::new(SessionLimits::default())
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn touch(&self, handle: &SessionHandle) {
        handle
            .last_seen_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        handle.recency.store(self.tick(), Ordering::Relaxed);
    }

    fn is_expired(&self, handle: &SessionHandle, now_ms: i64) -> bool {
        self.limits
            .ttl
            .is_some_and(|ttl| handle.idle_for(now_ms) > ttl)
    }

    /// Get the live session for an id, creating an empty one if it does not
    /// exist or has expired.
    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionHandle> {
        let now_ms = Utc::now().timestamp_millis();
        let mut created = false;

        let handle = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_expired(entry.get(), now_ms) {
                    debug!("Session expired, starting fresh: {}", session_id);
                    entry.insert(Arc::new(SessionHandle::new(session_id, self.tick())));
                    created = true;
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                created = true;
                entry
                    .insert(Arc::new(SessionHandle::new(session_id, self.tick())))
                    .value()
                    .clone()
            }
        };

        self.touch(&handle);

        if created {
            info!("Created session: {}", session_id);
            self.enforce_capacity(session_id);
        }

        handle
    }

    /// Append one turn to a session's log, creating the session if needed
    pub async fn append(&self, session_id: &str, role: Role, content: impl Into<String>) {
        let handle = self.get_or_create(session_id);
        let mut session = handle.lock().await;
        session.push(Turn::new(role, content));

        let trimmed = session.enforce_limit(self.limits.max_turns);
        if trimmed > 0 {
            debug!("Trimmed {} old turns from session {}", trimmed, session_id);
        }
    }

    fn lookup(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.get(session_id).map(|e| Arc::clone(e.value()))?;
        if self.is_expired(&handle, Utc::now().timestamp_millis()) {
            return None;
        }
        Some(handle)
    }

    /// Snapshot of a session's turns, if the session is live
    pub async fn history(&self, session_id: &str) -> Option<Vec<Turn>> {
        let handle = self.lookup(session_id)?;
        let session = handle.lock().await;
        Some(session.turns.clone())
    }

    /// Snapshot of a whole session, if it is live
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let handle = self.lookup(session_id)?;
        Some(handle.snapshot().await)
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!("Removed session: {}", session_id);
        }
        removed
    }

    /// Drop every session idle for longer than the TTL
    pub fn evict_expired(&self) -> usize {
        if self.limits.ttl.is_none() {
            return 0;
        }

        let now_ms = Utc::now().timestamp_millis();
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| !self.is_expired(handle, now_ms));
        let evicted = before.saturating_sub(self.sessions.len());

        if evicted > 0 {
            info!("Evicted {} expired sessions", evicted);
        }
        evicted
    }

    /// Evict least-recently-active sessions while over capacity
    fn enforce_capacity(&self, keep: &str) {
        let max = self.limits.max_sessions;
        if max == 0 {
            return;
        }

        while self.sessions.len() > max {
            let oldest = self
                .sessions
                .iter()
                .filter(|e| e.key() != keep)
                .min_by_key(|e| e.value().recency.load(Ordering::Relaxed))
                .map(|e| e.key().clone());

            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                    info!("Session capacity reached, evicted: {}", id);
                }
                None => break,
            }
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of all sessions currently held
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::unbounded()
    }
}
