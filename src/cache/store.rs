//! Cache backing stores

use crate::cache::fingerprint::Fingerprint;
use crate::errors::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Stored result of a fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry expiring `ttl` from now
    pub fn new(fingerprint: Fingerprint, value: Value, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            fingerprint,
            value,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Key-value store holding cache entries
///
/// Implementations may be remote; every operation can fail with
/// `CacheError::Unavailable`, which callers treat as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// Returns whether an entry was removed
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError>;

    /// Remove the entry only if it is expired and still carries `expires_at`
    ///
    /// An entry rewritten since it was read is left alone. Stores without an
    /// atomic compare-and-delete keep the default, which removes nothing and
    /// leaves reclaiming to `sweep_expired`.
    async fn remove_if_expired(
        &self,
        _fingerprint: &Fingerprint,
        _expires_at: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        Ok(false)
    }

    /// Drop expired entries, returning how many were removed
    async fn sweep_expired(&self) -> Result<usize, CacheError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(fingerprint)
            .filter(|entry| !entry.is_expired())
            .cloned())
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(fingerprint).is_some())
    }

    async fn remove_if_expired(
        &self,
        fingerprint: &Fingerprint,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let stale = entries
            .get(fingerprint)
            .is_some_and(|entry| entry.expires_at == expires_at && entry.is_expired());
        if stale {
            entries.remove(fingerprint);
        }
        Ok(stale)
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        Ok(before - entries.len())
    }
}
