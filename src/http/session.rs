//! Server-side HTTP sessions.
//!
//! # Responsibilities
//! - Own every live session, keyed by an unguessable id
//! - Expire sessions after their max inactive interval
//! - Hand out thin [`HttpSession`] accessors to request handlers
//!
//! # Design Decisions
//! - `DashMap` keeps lookups lock-free across connection tasks
//! - Attribute values are `serde_json::Value` so heterogeneous data fits
//! - Expired sessions are dropped lazily on lookup and by a periodic sweeper

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time;
use uuid::Uuid;

use crate::http::HttpError;
use crate::observability::metrics;

/// Milliseconds since the unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// State of one session.
#[derive(Debug)]
struct SessionData {
    id: String,
    creation_time: i64,
    last_accessed_time: AtomicI64,
    /// Seconds; <= 0 never expires.
    max_inactive_interval: AtomicI64,
    is_new: AtomicBool,
    valid: AtomicBool,
    attributes: DashMap<String, Value>,
}

impl SessionData {
    fn is_expired(&self, now: i64) -> bool {
        let max = self.max_inactive_interval.load(Ordering::Relaxed);
        max > 0 && now - self.last_accessed_time.load(Ordering::Relaxed) > max * 1000
    }
}

/// Thread-safe store of live sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, Arc<SessionData>>>,
    default_max_inactive: i64,
}

impl SessionStore {
    /// Create an empty store whose sessions expire after `max_inactive_secs`.
    pub fn new(max_inactive_secs: i64) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            default_max_inactive: max_inactive_secs,
        }
    }

    /// Create and register a new session.
    pub fn create(&self) -> HttpSession {
        let now = now_millis();
        let data = Arc::new(SessionData {
            id: Uuid::new_v4().simple().to_string(),
            creation_time: now,
            last_accessed_time: AtomicI64::new(now),
            max_inactive_interval: AtomicI64::new(self.default_max_inactive),
            is_new: AtomicBool::new(true),
            valid: AtomicBool::new(true),
            attributes: DashMap::new(),
        });
        self.inner.insert(data.id.clone(), Arc::clone(&data));
        metrics::record_sessions(self.inner.len());
        tracing::debug!(session_id = %data.id, "Session created");
        HttpSession {
            data,
            store: self.clone(),
        }
    }

    /// Look up a live session and mark it accessed.
    ///
    /// A session found by a later request is no longer new.
    pub fn access(&self, id: &str) -> Option<HttpSession> {
        let data = self.inner.get(id).map(|r| Arc::clone(r.value()))?;
        let now = now_millis();
        if !data.valid.load(Ordering::Acquire) || data.is_expired(now) {
            self.remove(id);
            return None;
        }
        data.last_accessed_time.store(now, Ordering::Relaxed);
        data.is_new.store(false, Ordering::Relaxed);
        Some(HttpSession {
            data,
            store: self.clone(),
        })
    }

    /// Drop a session from the store.
    fn remove(&self, id: &str) {
        if let Some((_, data)) = self.inner.remove(id) {
            data.valid.store(false, Ordering::Release);
            metrics::record_sessions(self.inner.len());
        }
    }

    /// Remove every expired session. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = now_millis();
        let before = self.inner.len();
        self.inner.retain(|_, data| {
            let keep = data.valid.load(Ordering::Acquire) && !data.is_expired(now);
            if !keep {
                data.valid.store(false, Ordering::Release);
            }
            keep
        });
        let purged = before.saturating_sub(self.inner.len());
        metrics::record_sessions(self.inner.len());
        purged
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Purge expired sessions every `interval` until shutdown.
    pub async fn run_sweeper(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(interval);
        tracing::debug!(interval = ?interval, "Session sweeper starting");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = self.len(), "Expired sessions purged");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Accessor for one session, handed out by
/// [`HttpServerRequest::get_session`](crate::http::HttpServerRequest::get_session).
#[derive(Debug, Clone)]
pub struct HttpSession {
    data: Arc<SessionData>,
    store: SessionStore,
}

impl HttpSession {
    /// True until a later request accesses the session.
    pub fn is_new(&self) -> bool {
        self.data.is_new.load(Ordering::Relaxed)
    }

    pub fn id(&self) -> &str {
        &self.data.id
    }

    /// Creation time in milliseconds since epoch.
    pub fn creation_time(&self) -> i64 {
        self.data.creation_time
    }

    /// Last access time in milliseconds since epoch.
    pub fn last_accessed_time(&self) -> i64 {
        self.data.last_accessed_time.load(Ordering::Relaxed)
    }

    /// Seconds of inactivity before expiry; 0 or less never expires.
    pub fn max_inactive_interval(&self) -> i64 {
        self.data.max_inactive_interval.load(Ordering::Relaxed)
    }

    pub fn set_max_inactive_interval(&self, secs: i64) -> Result<&Self, HttpError> {
        self.ensure_valid()?;
        self.data.max_inactive_interval.store(secs, Ordering::Relaxed);
        Ok(self)
    }

    pub fn is_valid(&self) -> bool {
        self.data.valid.load(Ordering::Acquire)
    }

    /// Snapshot of every attribute.
    pub fn attributes(&self) -> Result<HashMap<String, Value>, HttpError> {
        self.ensure_valid()?;
        Ok(self
            .data
            .attributes
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect())
    }

    pub fn attribute(&self, key: &str) -> Result<Option<Value>, HttpError> {
        self.ensure_valid()?;
        Ok(self.data.attributes.get(key).map(|r| r.value().clone()))
    }

    pub fn set_attribute(&self, key: &str, value: impl Into<Value>) -> Result<&Self, HttpError> {
        self.ensure_valid()?;
        if key.trim().is_empty() {
            return Err(HttpError::InvalidAttribute("key must not be blank".into()));
        }
        self.data.attributes.insert(key.to_string(), value.into());
        Ok(self)
    }

    pub fn remove_attribute(&self, key: &str) -> Result<&Self, HttpError> {
        self.ensure_valid()?;
        self.data.attributes.remove(key);
        Ok(self)
    }

    /// End the session; later lookups will not find it.
    pub fn invalidate(&self) -> Result<&Self, HttpError> {
        self.ensure_valid()?;
        self.store.remove(&self.data.id);
        tracing::debug!(session_id = %self.data.id, "Session invalidated");
        Ok(self)
    }

    fn ensure_valid(&self) -> Result<(), HttpError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(HttpError::SessionInvalidated(self.data.id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_then_access() {
        let store = SessionStore::new(1800);
        let session = store.create();
        assert!(session.is_new());
        assert_eq!(store.len(), 1);

        let again = store.access(session.id()).unwrap();
        assert_eq!(again.id(), session.id());
        assert!(!again.is_new());
        assert!(again.last_accessed_time() >= again.creation_time());
        assert!(store.access("unknown").is_none());
    }

    #[test]
    fn attributes_are_shared() {
        let store = SessionStore::new(1800);
        let session = store.create();
        session.set_attribute("hits", 3).unwrap();
        session.set_attribute("user", json!({"name": "ann"})).unwrap();

        let other = store.access(session.id()).unwrap();
        assert_eq!(other.attribute("hits").unwrap(), Some(json!(3)));
        assert_eq!(other.attributes().unwrap().len(), 2);

        other.remove_attribute("hits").unwrap();
        assert_eq!(session.attribute("hits").unwrap(), None);
        assert!(session.set_attribute(" ", 1).is_err());
    }

    #[test]
    fn invalidate_ends_lifecycle() {
        let store = SessionStore::new(1800);
        let session = store.create();
        session.invalidate().unwrap();
        assert!(store.is_empty());
        assert!(store.access(session.id()).is_none());
        assert!(matches!(
            session.set_attribute("k", 1),
            Err(HttpError::SessionInvalidated(_))
        ));
        assert!(session.invalidate().is_err());
    }

    #[test]
    fn expired_sessions_are_purged() {
        let store = SessionStore::new(1800);
        let session = store.create();
        session.set_max_inactive_interval(1).unwrap();
        session.data.last_accessed_time.store(now_millis() - 5_000, Ordering::Relaxed);

        let keeper = store.create();
        keeper.set_max_inactive_interval(0).unwrap();
        keeper.data.last_accessed_time.store(0, Ordering::Relaxed);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(!session.is_valid());
        assert!(keeper.is_valid());
    }

    #[test]
    fn expired_session_not_returned_on_access() {
        let store = SessionStore::new(1);
        let session = store.create();
        session.data.last_accessed_time.store(now_millis() - 2_000, Ordering::Relaxed);
        assert!(store.access(session.id()).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let store = SessionStore::new(1800);
        let shutdown = crate::lifecycle::Shutdown::new();
        let handle = tokio::spawn(store.clone().run_sweeper(Duration::from_millis(10), shutdown.subscribe()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.trigger();
        handle.await.unwrap();
    }
}
