//! Per-session mutual exclusion with a bounded wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::error::SessionError;
use crate::session::SessionId;

/// Held for one read-modify-append-write cycle on a session.
pub struct SessionGuard {
    _guard: OwnedMutexGuard<()>,
}

pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
    wait: Duration,
}

impl SessionLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait,
        }
    }

    fn lock_for(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop entries nobody holds or waits on.
        if locks.len() > 256 {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait up to the configured bound for exclusive access to `id`.
    pub async fn acquire(&self, id: &SessionId) -> Result<SessionGuard, SessionError> {
        let lock = self.lock_for(id);
        match tokio::time::timeout(self.wait, lock.lock_owned()).await {
            Ok(guard) => Ok(SessionGuard { _guard: guard }),
            Err(_) => {
                warn!(session_id = %id, waited = ?self.wait, "Timed out waiting for session lock");
                Err(SessionError::Busy {
                    session_id: id.to_string(),
                    waited: self.wait,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_then_times_out() {
        let locks = SessionLocks::new(Duration::from_millis(20));
        let id = SessionId::from("s");
        let _held = locks.acquire(&id).await.unwrap();
        let err = locks.acquire(&id).await.err().unwrap();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn release_lets_next_caller_in() {
        let locks = SessionLocks::new(Duration::from_millis(20));
        let id = SessionId::from("s");
        drop(locks.acquire(&id).await.unwrap());
        assert!(locks.acquire(&id).await.is_ok());
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let locks = SessionLocks::new(Duration::from_millis(20));
        let _a = locks.acquire(&SessionId::from("a")).await.unwrap();
        assert!(locks.acquire(&SessionId::from("b")).await.is_ok());
    }

    #[tokio::test]
    async fn waiter_proceeds_when_holder_finishes() {
        let locks = Arc::new(SessionLocks::new(Duration::from_secs(2)));
        let id = SessionId::from("s");
        let held = locks.acquire(&id).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move { locks.acquire(&id).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }
}
