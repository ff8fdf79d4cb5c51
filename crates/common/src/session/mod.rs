//! Session scopes
//!
//! A session owns a cancellation token. Tool batches race against it, so
//! closing or evicting a session abandons in-flight retrieval calls. The
//! registry bounds the number of live sessions and drops idle ones.

use crate::config::SessionConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifetime handle of one agent session
#[derive(Debug)]
pub struct SessionScope {
    id: Uuid,
    token: CancellationToken,
    created_at: DateTime<Utc>,
}

impl SessionScope {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel everything running under this session
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Error returned to work abandoned by a close
    pub fn closed_error(&self) -> AppError {
        AppError::SessionClosed {
            id: self.id.to_string(),
        }
    }
}

impl Default for SessionScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Public view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionScope> for SessionInfo {
    fn from(scope: &SessionScope) -> Self {
        Self {
            id: scope.id,
            created_at: scope.created_at,
        }
    }
}

struct SessionEntry {
    scope: Arc<SessionScope>,
    last_active: Instant,
}

/// Live sessions with a capacity bound and an idle TTL
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_sessions, Duration::from_secs(config.idle_ttl_secs))
    }

    /// Open a session, evicting the least recently active one when full
    pub async fn open(&self) -> Arc<SessionScope> {
        let scope = Arc::new(SessionScope::new());
        let mut sessions = self.sessions.write().await;

        let mut evicted = 0;
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_active)
                .map(|(id, _)| *id)
            else {
                break;
            };
            if let Some(entry) = sessions.remove(&oldest) {
                entry.scope.close();
                evicted += 1;
                info!(session_id = %oldest, "Session evicted at capacity");
            }
        }

        sessions.insert(
            scope.id(),
            SessionEntry {
                scope: Arc::clone(&scope),
                last_active: Instant::now(),
            },
        );
        metrics::record_sessions(sessions.len(), evicted);
        debug!(session_id = %scope.id(), "Session opened");

        scope
    }

    /// Look up a session and mark it active
    pub async fn touch(&self, id: Uuid) -> Result<Arc<SessionScope>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;
        entry.last_active = Instant::now();
        Ok(Arc::clone(&entry.scope))
    }

    /// Remove a session and cancel its in-flight work
    pub async fn close(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .remove(&id)
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;
        entry.scope.close();
        metrics::record_sessions(sessions.len(), 0);
        info!(session_id = %id, "Session closed");
        Ok(())
    }

    /// Drop sessions idle for at least the TTL, returning how many went
    pub async fn sweep(&self) -> usize {
        self.sweep_idle(Instant::now()).await
    }

    async fn sweep_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|id, entry| {
            let idle = now.saturating_duration_since(entry.last_active) >= self.idle_ttl;
            if idle {
                entry.scope.close();
                debug!(session_id = %id, "Idle session evicted");
            }
            !idle
        });

        let evicted = before - sessions.len();
        metrics::record_sessions(sessions.len(), evicted);
        evicted
    }

    /// Close every session
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        for entry in sessions.values() {
            entry.scope.close();
        }
        sessions.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_touch_close() {
        let registry = SessionRegistry::new(4, Duration::from_secs(60));
        let scope = registry.open().await;

        let found = registry.touch(scope.id()).await.unwrap();
        assert_eq!(found.id(), scope.id());

        registry.close(scope.id()).await.unwrap();
        assert!(scope.is_closed());
        assert!(matches!(
            registry.touch(scope.id()).await,
            Err(AppError::SessionNotFound { .. })
        ));
        assert!(registry.close(scope.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_active() {
        let registry = SessionRegistry::new(2, Duration::from_secs(60));
        let first = registry.open().await;
        let second = registry.open().await;

        // Touching the first makes the second the eviction candidate
        tokio::time::sleep(Duration::from_millis(2)).await;
        registry.touch(first.id()).await.unwrap();

        let third = registry.open().await;
        assert_eq!(registry.len().await, 2);
        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert!(registry.touch(third.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_swept() {
        let registry = SessionRegistry::new(8, Duration::from_secs(60));
        let scope = registry.open().await;

        assert_eq!(registry.sweep().await, 0);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(registry.sweep_idle(later).await, 1);
        assert!(scope.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_all() {
        let registry = SessionRegistry::new(8, Duration::from_secs(60));
        let a = registry.open().await;
        let b = registry.open().await;
        registry.shutdown().await;
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(registry.len().await, 0);
    }
}
