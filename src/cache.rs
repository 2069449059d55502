//! Session cache: process-local, non-authoritative.
//!
//! Dropping an entry only costs a reconstruction. Callers touch an entry
//! only while holding that session's lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::session::{Session, SessionId};

pub struct SessionCache {
    entries: RwLock<HashMap<SessionId, Session>>,
    capacity: usize,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        })
    }

    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.entries.read().await.get(id).cloned()
    }

    /// Insert or replace. At capacity, the least recently updated other
    /// session is evicted first. A zero capacity disables caching.
    pub async fn put(&self, session: Session) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().await;
        if !entries.contains_key(&session.id) && entries.len() >= self.capacity {
            let oldest = entries
                .values()
                .min_by_key(|s| s.updated_at)
                .map(|s| s.id.clone());
            if let Some(oldest) = oldest {
                debug!(session_id = %oldest, "Cache full, evicting");
                entries.remove(&oldest);
            }
        }
        entries.insert(session.id.clone(), session);
    }

    pub async fn evict(&self, id: &SessionId) -> Option<Session> {
        self.entries.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
