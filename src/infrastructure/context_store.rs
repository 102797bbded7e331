//! Session-scoped entity carry-over between turns.

use crate::domain::query::EntityBag;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Key of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub timestamp: DateTime<Utc>,
    pub entities: EntityBag,
}

/// Opaque get/put store. Implementations own locking and expiry.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Option<EntityBag>;
    async fn put(&self, key: &SessionKey, entities: EntityBag, ttl: Duration);
    /// Snapshots of live entries, oldest first.
    async fn history(&self, key: &SessionKey) -> Vec<ContextSnapshot>;
    async fn delete(&self, key: &SessionKey);
}

const MAX_HISTORY: usize = 20;
const DEFAULT_PURGE_THRESHOLD: usize = 1024;

/// Expiry for a TTL, capped at one year when the TTL is out of range.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let cap = chrono::Duration::days(365);
    chrono::Duration::from_std(ttl)
        .ok()
        .filter(|ttl| *ttl <= cap)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now + cap)
}

struct SessionEntry {
    snapshots: Vec<ContextSnapshot>,
    expires_at: DateTime<Utc>,
}

impl SessionEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn sweep_expired(sessions: &mut HashMap<SessionKey, SessionEntry>, now: DateTime<Utc>) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| !entry.is_expired(now));
    before - sessions.len()
}

/// Process-local store. Expired sessions are swept on `put` once the map
/// holds `purge_threshold` sessions.
pub struct InMemoryContextStore {
    sessions: RwLock<HashMap<SessionKey, SessionEntry>>,
    purge_threshold: usize,
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::with_purge_threshold(DEFAULT_PURGE_THRESHOLD)
    }
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purge_threshold(purge_threshold: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            purge_threshold: purge_threshold.max(1),
        }
    }

    #[cfg(test)]
    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(&self, key: &SessionKey) -> Option<EntityBag> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(key)?;
        if entry.is_expired(Utc::now()) {
            return None;
        }
        entry.snapshots.last().map(|s| s.entities.clone())
    }

    async fn put(&self, key: &SessionKey, entities: EntityBag, ttl: Duration) {
        let now = Utc::now();
        let expires_at = expiry_after(now, ttl);
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.purge_threshold {
            let evicted = sweep_expired(&mut sessions, now);
            if evicted > 0 {
                debug!("Evicted {} expired sessions", evicted);
            }
        }

        let entry = sessions.entry(key.clone()).or_insert_with(|| SessionEntry {
            snapshots: Vec::new(),
            expires_at,
        });
        if entry.is_expired(now) {
            entry.snapshots.clear();
        }
        entry.snapshots.push(ContextSnapshot {
            timestamp: now,
            entities,
        });
        if entry.snapshots.len() > MAX_HISTORY {
            let excess = entry.snapshots.len() - MAX_HISTORY;
            entry.snapshots.drain(..excess);
        }
        entry.expires_at = expires_at;
        debug!(
            "Stored context for {}/{} ({} snapshots)",
            key.user_id,
            key.session_id,
            entry.snapshots.len()
        );
    }

    async fn history(&self, key: &SessionKey) -> Vec<ContextSnapshot> {
        let sessions = self.sessions.read().await;
        match sessions.get(key) {
            Some(entry) if !entry.is_expired(Utc::now()) => entry.snapshots.clone(),
            _ => Vec::new(),
        }
    }

    async fn delete(&self, key: &SessionKey) {
        self.sessions.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::EntityType;

    fn key() -> SessionKey {
        SessionKey::new("u1", "s1")
    }

    #[tokio::test]
    async fn test_get_returns_latest_put() {
        let store = InMemoryContextStore::new();
        let ttl = Duration::from_secs(60);
        store
            .put(&key(), EntityBag::new().with(EntityType::BookTitle, "三体"), ttl)
            .await;
        store
            .put(&key(), EntityBag::new().with(EntityType::AuthorName, "鲁迅"), ttl)
            .await;

        let current = store.get(&key()).await.unwrap();
        assert_eq!(current.get(EntityType::AuthorName), Some("鲁迅"));
        assert_eq!(store.history(&key()).await.len(), 2);
        assert!(store.get(&SessionKey::new("u1", "other")).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_invisible() {
        let store = InMemoryContextStore::new();
        store
            .put(&key(), EntityBag::new().with(EntityType::BookTitle, "三体"), Duration::ZERO)
            .await;
        assert!(store.get(&key()).await.is_none());
        assert!(store.history(&key()).await.is_empty());
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_put_evicts_stale_sessions() {
        let store = InMemoryContextStore::with_purge_threshold(3);
        for i in 0..3 {
            let stale = SessionKey::new("u1", format!("old-{}", i));
            store
                .put(&stale, EntityBag::new().with(EntityType::BookTitle, "三体"), Duration::ZERO)
                .await;
        }
        store
            .put(&key(), EntityBag::new().with(EntityType::AuthorName, "鲁迅"), Duration::from_secs(60))
            .await;

        assert_eq!(store.session_count().await, 1);
        assert!(store.get(&key()).await.is_some());
    }

    #[tokio::test]
    async fn test_huge_ttl_is_capped() {
        let store = InMemoryContextStore::new();
        store
            .put(&key(), EntityBag::new().with(EntityType::BookTitle, "三体"), Duration::from_secs(u64::MAX))
            .await;
        assert!(store.get(&key()).await.is_some());

        let now = Utc::now();
        let far = expiry_after(now, Duration::from_secs(i64::MAX as u64 / 1000));
        assert_eq!(far, now + chrono::Duration::days(365));
        assert_eq!(expiry_after(now, Duration::from_secs(60)), now + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_delete_and_history_cap() {
        let store = InMemoryContextStore::new();
        for i in 0..25 {
            let bag = EntityBag::new().with(EntityType::Date, format!("2024-01-{:02}", i + 1));
            store.put(&key(), bag, Duration::from_secs(60)).await;
        }
        let history = store.history(&key()).await;
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0].entities.get(EntityType::Date), Some("2024-01-06"));

        store.delete(&key()).await;
        assert!(store.get(&key()).await.is_none());
    }
}
